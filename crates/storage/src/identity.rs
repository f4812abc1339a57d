use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::model::SessionId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::repository::{IdentityStore, StorageError};

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    session_id: SessionId,
    created_at: DateTime<Utc>,
}

/// Identity slot kept in a small JSON file on the client machine.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "identity".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn unavailable(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Unavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<SessionId>, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(unavailable(&self.path, &err)),
        };
        let stored: StoredIdentity = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        debug!(path = %self.path.display(), session_id = %stored.session_id, "loaded identity");
        Ok(Some(stored.session_id))
    }

    async fn save(&self, id: SessionId) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(parent, &e))?;
        }

        let body = serde_json::to_vec_pretty(&StoredIdentity {
            session_id: id,
            created_at: Utc::now(),
        })
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // Write then rename so a crash never leaves a truncated identity file.
        let staging = self.staging_path();
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| unavailable(&staging, &e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, &e))?;
        debug!(path = %self.path.display(), session_id = %id, "saved identity");
        Ok(())
    }
}
