use std::sync::Arc;

use backend_cli::{ClaudeCliBackend, CliBackendConfig};
use backend_mock::ScriptedBackend;
use chat_protocol::{Backend, BackendInitError};

use crate::config::{BackendKind, EnvConfig};

pub fn backend_from_config(config: &EnvConfig) -> Result<Arc<dyn Backend>, BackendInitError> {
    match config.backend {
        BackendKind::Cli => {
            let backend = ClaudeCliBackend::new(CliBackendConfig::new(&config.cli_path))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Mock => Ok(Arc::new(ScriptedBackend::demo())),
    }
}
