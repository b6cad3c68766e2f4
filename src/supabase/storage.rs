//! Session persistence: one JSON file holding the current session.
//!
//! A missing or unreadable file means "signed out". Writes go to a sibling
//! temp file first and are renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::backend::BackendError;
use crate::model::Session;

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved session, if any. Corrupt files are logged and ignored.
    #[must_use]
    pub fn load(&self) -> Option<Session> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session file unreadable");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt session file");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns `Storage` if the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<(), BackendError> {
        let json = serde_json::to_string_pretty(session).map_err(|e| BackendError::Storage(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| storage_error(&tmp, &e))?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, &e))
    }

    /// Remove the saved session. A file that is already gone is fine.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the file exists and cannot be removed.
    pub fn clear(&self) -> Result<(), BackendError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&self.path, &e)),
        }
    }
}

fn storage_error(path: &Path, e: &std::io::Error) -> BackendError {
    BackendError::Storage(format!("{}: {e}", path.display()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), BackendError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| storage_error(path, &e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), BackendError> {
    Ok(())
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
