//! Persisted portal cookies, so restarts skip the login round-trip.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seatwatch::TrackerResult;

/// Cookie session saved after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub portal_url: String,
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<String>,
}

impl StoredSession {
    pub fn new(portal_url: &str, cookies: Vec<String>) -> Self {
        Self {
            portal_url: portal_url.to_string(),
            saved_at: Utc::now(),
            cookies,
        }
    }
}

/// JSON file holding one [`StoredSession`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved session for `portal_url`. Missing, unreadable or foreign sessions
    /// yield `None` so the caller logs in afresh.
    pub fn load(&self, portal_url: &str) -> Option<StoredSession> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("cannot read session file {}: {e}", self.path.display());
                return None;
            }
        };

        let session: StoredSession = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("ignoring corrupt session file {}: {e}", self.path.display());
                return None;
            }
        };

        if session.portal_url != portal_url || session.cookies.is_empty() {
            tracing::debug!("saved session does not apply to {portal_url}");
            return None;
        }
        Some(session)
    }

    pub fn save(&self, session: &StoredSession) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json)?;
        restrict_permissions(&self.path)?;
        tracing::debug!("session saved to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> TrackerResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
