//! Persistent key/value store for the privileged host
//!
//! A JSON object of string keys to string values. The credential pair lives
//! under `credentials` as the same JSON string the boundary carries, so the
//! host never needs to understand anything else in the file.
//!
//! Writes use temp file + rename and are serialized by a tokio Mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use peerlink_auth::{CREDENTIALS_KEY, CredentialPair};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub struct HostStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl HostStore {
    /// Load the store from `path`.
    ///
    /// A missing file means an empty store; the file (and its directory) is
    /// created on the first write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading host store: {e}")))?;
            let entries: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing host store: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded host store");
            entries
        } else {
            info!(path = %path.display(), "host store not found, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.state.lock().await.get(key).cloned()
    }

    /// Insert or replace a value and persist. Writing the value already
    /// stored is a no-op.
    ///
    /// Memory only changes once the file write succeeds, so a failed write
    /// can be retried with the same value.
    pub async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.get(key) == Some(&value) {
            return Ok(());
        }
        let mut next = state.clone();
        next.insert(key.to_string(), value);
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(key, "host store updated");
        Ok(())
    }

    /// Remove a key and persist. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.contains_key(key) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.remove(key);
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(key, "host store key removed");
        Ok(true)
    }

    /// Drop every key and persist.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_empty() {
            return Ok(());
        }
        write_atomic(&self.path, &BTreeMap::new()).await?;
        state.clear();
        debug!("host store cleared");
        Ok(())
    }

    /// The stored credential pair, if any.
    pub async fn credentials(&self) -> Result<Option<CredentialPair>> {
        let Some(value) = self.get(CREDENTIALS_KEY).await else {
            return Ok(None);
        };
        serde_json::from_str(&value)
            .map(Some)
            .map_err(|e| Error::Parse(format!("stored credentials: {e}")))
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write the store atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing host store: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating host store directory: {e}")))?;

    let tmp_path = dir.join(format!(".host-store.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp host store: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting host store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp host store: {e}")))?;

    debug!(path = %path.display(), "persisted host store");
    Ok(())
}
