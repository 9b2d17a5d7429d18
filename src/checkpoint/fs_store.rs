//! Filesystem-backed checkpoint store.
//!
//! One pretty-printed JSON document per run at `<dir>/<id>.json`, owner
//! read/write only. A single async mutex serializes every operation so
//! writes stay ordered, and publication goes through a sibling temp file
//! renamed into place so concurrent readers never observe a torn
//! document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use super::store::{CheckpointStore, Result, StoreError};
use super::types::TreeCheckpoint;

/// Expand a leading `$HOME` / `${HOME}` token to the current user's home
/// directory. Paths without the token pass through untouched.
fn expand_home(dir: &str) -> PathBuf {
    let rest = if let Some(rest) = dir.strip_prefix("${HOME}") {
        rest
    } else if let Some(rest) = dir.strip_prefix("$HOME") {
        rest
    } else {
        return PathBuf::from(dir);
    };
    match std::env::var("HOME") {
        Ok(home) => {
            let mut path = PathBuf::from(home);
            path.push(rest.trim_start_matches('/'));
            path
        }
        Err(_) => PathBuf::from(dir),
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// JSON-file-per-checkpoint store rooted at a single directory.
pub struct FsCheckpointStore {
    dir: PathBuf,
    // Serializes all store operations; atomic publication is via
    // temp-file + rename inside the lock.
    lock: Mutex<()>,
}

impl FsCheckpointStore {
    /// Open (and create, `0700`, on first use) the store directory.
    ///
    /// A leading `$HOME`/`${HOME}` token in `dir` is expanded first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub async fn open(dir: impl AsRef<str>) -> Result<Self> {
        let dir = expand_home(dir.as_ref());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(format!("creating store directory {}", dir.display()), e))?;
        restrict_permissions(&dir, 0o700)
            .await
            .map_err(|e| StoreError::io(format!("restricting store directory {}", dir.display()), e))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Directory the store persists into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn check_id(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidInput {
                message: "checkpoint id must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Write the document to a sibling temp file and rename it into place.
    async fn publish(&self, id: &str, body: &str) -> Result<()> {
        let target = self.document_path(id);
        let temp = self.dir.join(format!("{id}.json.tmp"));
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| StoreError::io(format!("writing {}", temp.display()), e))?;
        restrict_permissions(&temp, 0o600)
            .await
            .map_err(|e| StoreError::io(format!("restricting {}", temp.display()), e))?;
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| StoreError::io(format!("publishing {}", target.display()), e))?;
        Ok(())
    }

    /// Read and decode every `*.json` document, skipping the undecodable.
    async fn read_all(&self) -> Result<Vec<TreeCheckpoint>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(format!("listing {}", self.dir.display()), e))?;
        let mut checkpoints = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(format!("listing {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = match tokio::fs::read_to_string(&path).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint");
                    continue;
                }
            };
            match serde_json::from_str::<TreeCheckpoint>(&body) {
                Ok(cp) => checkpoints.push(cp),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping undecodable checkpoint");
                }
            }
        }
        Ok(checkpoints)
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn save(&self, checkpoint: &TreeCheckpoint) -> Result<()> {
        Self::check_id(&checkpoint.id)?;
        let mut stamped = checkpoint.clone();
        stamped.last_updated = Utc::now();
        let body = serde_json::to_string_pretty(&stamped).map_err(|e| StoreError::Serialization {
            message: format!("encoding checkpoint {}", stamped.id),
            source: e,
        })?;
        let _guard = self.lock.lock().await;
        self.publish(&stamped.id, &body).await
    }

    async fn load(&self, id: &str) -> Result<TreeCheckpoint> {
        Self::check_id(id)?;
        let path = self.document_path(id);
        let _guard = self.lock.lock().await;
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(StoreError::io(format!("reading {}", path.display()), e)),
        };
        serde_json::from_str(&body).map_err(|e| StoreError::Serialization {
            message: format!("decoding checkpoint {id}"),
            source: e,
        })
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Self::check_id(id)?;
        let path = self.document_path(id);
        let _guard = self.lock.lock().await;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn list(&self) -> Result<Vec<TreeCheckpoint>> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Self::check_id(id)?;
        let path = self.document_path(id);
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(StoreError::io(format!("deleting {}", path.display()), e)),
        }
    }

    async fn prune(&self, older_than: chrono::Duration) -> Result<usize> {
        if older_than <= chrono::Duration::zero() {
            return Err(StoreError::InvalidInput {
                message: "prune threshold must be positive".into(),
            });
        }
        let cutoff = Utc::now() - older_than;
        let _guard = self.lock.lock().await;
        let stale: Vec<String> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|cp| cp.last_updated < cutoff)
            .map(|cp| cp.id)
            .collect();
        let mut removed = 0;
        for id in stale {
            let path = self.document_path(&id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(format!("pruning {}", path.display()), e)),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_token_expands() {
        // SAFETY: tests in this module run single-threaded over env vars.
        unsafe { std::env::set_var("HOME", "/home/mirror") };
        assert_eq!(
            expand_home("${HOME}/.mirrortree/checkpoints"),
            PathBuf::from("/home/mirror/.mirrortree/checkpoints")
        );
        assert_eq!(
            expand_home("$HOME/.mirrortree"),
            PathBuf::from("/home/mirror/.mirrortree")
        );
        assert_eq!(expand_home("/var/lib/mt"), PathBuf::from("/var/lib/mt"));
    }
}
