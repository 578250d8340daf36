use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chat_protocol::{ChatSession, Settings};
use tracing::{debug, warn};

use crate::error::HistoryStoreError;
use crate::paths::{session_file_name, sessions_dir, settings_path, write_atomically};

/// Chat transcripts stored one JSON document per session under
/// `<root>/sessions/<id>.json`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    #[must_use]
    pub fn new(config_root: &Path) -> Self {
        Self {
            dir: sessions_dir(config_root),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, HistoryStoreError> {
        Ok(self.dir.join(session_file_name(session_id)?))
    }

    pub fn save(&self, session: &ChatSession) -> Result<(), HistoryStoreError> {
        let path = self.session_path(&session.id)?;
        let json = serde_json::to_vec_pretty(session)
            .map_err(|source| HistoryStoreError::json_serialize(&path, source))?;
        write_atomically(&path, &json)?;
        debug!(session_id = %session.id, messages = session.messages.len(), "saved chat");
        Ok(())
    }

    /// Saved chats, most recent first. Files that cannot be read or parsed
    /// are skipped.
    pub fn list(&self) -> Result<Vec<ChatSession>, HistoryStoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryStoreError::io(
                    "listing sessions",
                    &self.dir,
                    source,
                ))
            }
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!(dir = %self.dir.display(), error = %error, "skipping unreadable entry");
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match read_session(&path) {
                Ok(session) => sessions.push(session),
                Err(error) => warn!(error = %error, "skipping unreadable chat file"),
            }
        }

        // RFC 3339 UTC timestamps order lexically.
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub fn load(&self, session_id: &str) -> Result<ChatSession, HistoryStoreError> {
        let path = self.session_path(session_id)?;
        if !path.exists() {
            return Err(HistoryStoreError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        read_session(&path)
    }

    /// Removes a saved chat. Deleting an unknown id is not an error.
    pub fn delete(&self, session_id: &str) -> Result<(), HistoryStoreError> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HistoryStoreError::io("deleting session", &path, source)),
        }
    }
}

fn read_session(path: &Path) -> Result<ChatSession, HistoryStoreError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| HistoryStoreError::io("reading session", path, source))?;
    serde_json::from_str(&contents).map_err(|source| HistoryStoreError::json_parse(path, source))
}

/// `<root>/settings.json`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(config_root: &Path) -> Self {
        Self {
            path: settings_path(config_root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields default settings.
    pub fn load(&self) -> Result<Settings, HistoryStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(HistoryStoreError::io(
                    "reading settings",
                    &self.path,
                    source,
                ))
            }
        };

        serde_json::from_str(&contents)
            .map_err(|source| HistoryStoreError::json_parse(&self.path, source))
    }

    pub fn save(&self, settings: &Settings) -> Result<(), HistoryStoreError> {
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|source| HistoryStoreError::json_serialize(&self.path, source))?;
        write_atomically(&self.path, &json)
    }

    #[must_use]
    pub fn validate_folder(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
