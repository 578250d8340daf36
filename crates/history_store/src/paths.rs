use std::path::{Path, PathBuf};

use crate::error::HistoryStoreError;

pub const APP_DIR: &str = "chatgate";
pub const SESSIONS_DIR: &str = "sessions";
pub const SETTINGS_FILE: &str = "settings.json";

/// `<platform config dir>/chatgate`.
pub fn default_config_root() -> Result<PathBuf, HistoryStoreError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(HistoryStoreError::NoConfigDir)
}

#[must_use]
pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join(SESSIONS_DIR)
}

#[must_use]
pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Session ids become file names, so anything that could escape the
/// sessions directory is refused.
pub fn session_file_name(session_id: &str) -> Result<String, HistoryStoreError> {
    let trimmed = session_id.trim();
    let invalid = trimmed.is_empty()
        || trimmed != session_id
        || session_id == "."
        || session_id == ".."
        || session_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(HistoryStoreError::InvalidSessionId {
            id: session_id.to_string(),
        });
    }

    Ok(format!("{session_id}.json"))
}

/// Writes through a sibling temp file and renames it into place.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), HistoryStoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| HistoryStoreError::io("creating directory", parent, source))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, contents)
        .map_err(|source| HistoryStoreError::io("writing temp file", &temp, source))?;
    std::fs::rename(&temp, path)
        .map_err(|source| HistoryStoreError::io("renaming temp file", path, source))
}
