//! File-backed persistence for chat transcripts and user settings.

mod error;
mod paths;
mod store;

pub use error::HistoryStoreError;
pub use paths::{default_config_root, session_file_name, sessions_dir, settings_path};
pub use store::{HistoryStore, SettingsStore};
