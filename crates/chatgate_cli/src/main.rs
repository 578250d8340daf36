use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{bail, Context};
use chatgate::{alias_list, resolve_model, ControllerConfig};
use chatgate_cli::backends::backend_from_config;
use chatgate_cli::config::EnvConfig;
use chatgate_cli::logging::init_file_logging;
use chatgate_cli::runtime::{Runtime, RuntimeEvent};
use chatgate_cli::terminal::TerminalFrontend;
use history_store::SettingsStore;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let config = EnvConfig::from_env().context("invalid configuration")?;
    std::fs::create_dir_all(&config.config_root).with_context(|| {
        format!(
            "failed to create config directory '{}'",
            config.config_root.display()
        )
    })?;
    let log_path = init_file_logging(&config.config_root)?;
    info!(log = %log_path.display(), backend = ?config.backend, "chatgate starting");

    let model = match config.model.as_deref() {
        Some(name) => match resolve_model(name) {
            Some(entry) => entry.id.to_string(),
            None => bail!("Unknown model: {name}. Available: {}", alias_list()),
        },
        None => ControllerConfig::default().model,
    };

    let settings_store = SettingsStore::new(&config.config_root);
    let settings = settings_store.load().unwrap_or_else(|error| {
        warn!(error = %error, "ignoring unreadable settings");
        Default::default()
    });

    let backend = backend_from_config(&config).context("failed to set up backend")?;
    let profile = backend.profile();

    let mut runtime = Runtime::new(
        backend,
        &config.config_root,
        ControllerConfig {
            model,
            settings,
            inactivity: config.inactivity,
        },
    );
    let mut frontend = TerminalFrontend::new(io::stdout());
    frontend.banner(&profile.display_name, runtime.controller().model());

    runtime.check_backend();
    spawn_input_reader(runtime.sender())?;
    runtime.run(&mut frontend);

    info!("chatgate exiting");
    Ok(())
}

fn spawn_input_reader(sender: Sender<RuntimeEvent>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("chatgate-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if sender.send(RuntimeEvent::Input(line)).is_err() {
                    return;
                }
            }
            let _ = sender.send(RuntimeEvent::InputClosed);
        })
        .context("failed to spawn input reader")?;
    Ok(())
}
