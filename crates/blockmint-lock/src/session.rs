//! "Unlocked this session" marker storage
//!
//! The marker lets a reload within the same session skip the initial lock.
//! It is keyed by lock variant so the primary and compliance locks never
//! share it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionStoreError;

/// Session-scoped marker storage
pub trait SessionStore: Send + Sync {
    /// When the marker for `key` was set, if present
    fn marked_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionStoreError>;

    /// Whether the marker for `key` is present
    fn is_marked(&self, key: &str) -> Result<bool, SessionStoreError> {
        Ok(self.marked_at(key)?.is_some())
    }

    /// Set the marker for `key`
    fn mark(&self, key: &str) -> Result<(), SessionStoreError>;

    /// Remove the marker for `key`
    fn clear(&self, key: &str) -> Result<(), SessionStoreError>;
}

/// Marker record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMarker {
    unlocked_at: DateTime<Utc>,
}

/// Process-scoped store; markers die with the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    markers: Mutex<HashMap<String, SessionMarker>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn marked_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionStoreError> {
        let markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(markers.get(key).map(|m| m.unlocked_at))
    }

    fn mark(&self, key: &str) -> Result<(), SessionStoreError> {
        let mut markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        markers.insert(
            key.to_string(),
            SessionMarker {
                unlocked_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SessionStoreError> {
        let mut markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        markers.remove(key);
        Ok(())
    }
}

/// File-backed store under the user's runtime directory
///
/// The runtime directory is emptied when the user's login session ends,
/// which gives the marker the same lifetime as browser session storage.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store under `$XDG_RUNTIME_DIR/blockmint`, falling back to the temp dir
    pub fn new() -> Self {
        let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self::with_dir(base.join("blockmint"))
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn marker_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for FileSessionStore {
    fn marked_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionStoreError> {
        let path = self.marker_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str::<SessionMarker>(&contents) {
            Ok(marker) => Ok(Some(marker.unlocked_at)),
            Err(e) => {
                // A torn or foreign file never counts as an unlock
                tracing::warn!("Ignoring unreadable session marker {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    fn mark(&self, key: &str) -> Result<(), SessionStoreError> {
        fs::create_dir_all(&self.dir)?;

        let contents = serde_json::to_string(&SessionMarker {
            unlocked_at: Utc::now(),
        })?;

        // Write atomically
        let path = self.marker_path(key);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SessionStoreError> {
        match fs::remove_file(self.marker_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
