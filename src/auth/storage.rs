use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::auth::token::{AccountData, AuthAccount};

/// Persistence port for the current session.
///
/// `load_local_authentication` never fails: absent or unreadable data is `None`
/// so a corrupted session cannot block start-up.
#[async_trait]
pub trait AuthLocalStoragePlatform<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    /// Persist `account`, overwriting any prior value
    async fn save_local_authentication(&self, account: &AuthAccount<D>) -> Result<()>;

    /// Remove the stored session; a no-op when nothing is stored
    async fn clear_local_authentication(&self) -> Result<()>;

    async fn load_local_authentication(&self) -> Option<AuthAccount<D>>;
}

/// Process-local storage, lost on exit
pub struct MemoryAuthStorage<D> {
    account: RwLock<Option<AuthAccount<D>>>,
}

impl<D> MemoryAuthStorage<D> {
    pub fn new() -> Self {
        Self {
            account: RwLock::new(None),
        }
    }
}

impl<D> Default for MemoryAuthStorage<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: AccountData> AuthLocalStoragePlatform<D> for MemoryAuthStorage<D> {
    async fn save_local_authentication(&self, account: &AuthAccount<D>) -> Result<()> {
        *self.account.write().await = Some(account.clone());
        Ok(())
    }

    async fn clear_local_authentication(&self) -> Result<()> {
        self.account.write().await.take();
        Ok(())
    }

    async fn load_local_authentication(&self) -> Option<AuthAccount<D>> {
        self.account.read().await.clone()
    }
}

/// On-disk session with integrity check
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionPayload {
    /// The serialized account
    account: Value,
    /// When this entry was written
    saved_at: DateTime<Utc>,
    /// SHA-256 of the serialized account
    integrity_hash: String,
}

/// JSON file storage.
///
/// Writes go to a sibling temp file that is then renamed over the target, so a
/// failed write leaves the previous session intact.
pub struct FileAuthStorage<D> {
    path: PathBuf,
    /// Serializes writers sharing this instance
    write_lock: tokio::sync::Mutex<()>,
    _account: PhantomData<fn() -> D>,
}

impl<D: AccountData> FileAuthStorage<D> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
            _account: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn integrity_hash(account: &Value) -> Result<String> {
        let bytes = serde_json::to_vec(account)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn read_payload(&self) -> Result<Option<AuthAccount<D>>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };

        let payload: SessionPayload =
            serde_json::from_slice(&raw).map_err(|e| anyhow!("Failed to deserialize session payload: {}", e))?;

        if Self::integrity_hash(&payload.account)? != payload.integrity_hash {
            error!(path = %self.path.display(), "Session integrity check failed, possible tampering");
            return Err(anyhow!("Session integrity check failed"));
        }

        let account = serde_json::from_value(payload.account)?;
        debug!(path = %self.path.display(), saved_at = %payload.saved_at, "Session loaded from disk");
        Ok(Some(account))
    }
}

#[async_trait]
impl<D: AccountData> AuthLocalStoragePlatform<D> for FileAuthStorage<D> {
    async fn save_local_authentication(&self, account: &AuthAccount<D>) -> Result<()> {
        let account = serde_json::to_value(account)?;
        let payload = SessionPayload {
            integrity_hash: Self::integrity_hash(&account)?,
            account,
            saved_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(path = %self.path.display(), "Session stored");
        Ok(())
    }

    async fn clear_local_authentication(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Session removed from disk");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session to remove");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }

    async fn load_local_authentication(&self) -> Option<AuthAccount<D>> {
        match self.read_payload().await {
            Ok(account) => account,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session");
                None
            }
        }
    }
}
