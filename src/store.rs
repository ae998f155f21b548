//! Token persistence.
//!
//! The session manager only ever talks to a [`TokenStore`]; which backend
//! sits behind it is the caller's choice.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;
use crate::types::Session;

/// Key-value storage for the current [`Session`].
///
/// Pure storage: implementations do not validate what they hold.
pub trait TokenStore: Send + Sync + 'static {
    /// Load the stored session, if any.
    fn get(&self) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Replace the stored session.
    fn set(&self, session: Session) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: TokenStore> TokenStore for Arc<T> {
    fn get(&self) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send {
        (**self).get()
    }

    fn set(&self, session: Session) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set(session)
    }
}

// ── In-memory ──────────────────────────────────────────────────────

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Option<Session>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: RwLock::new(Some(session)),
        }
    }

    fn snapshot(&self) -> Option<Session> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, session: Session) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(session),
            Err(poisoned) => *poisoned.into_inner() = Some(session),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.snapshot())
    }

    async fn set(&self, session: Session) -> Result<(), StoreError> {
        self.replace(session);
        Ok(())
    }
}

// ── File-backed ────────────────────────────────────────────────────

/// On-disk layout: three string-keyed entries.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    netatmo_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    netatmo_refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    netatmo_token_expiry: Option<String>,
}

impl StoredEntries {
    fn into_session(self) -> Option<Session> {
        let access_token = self.netatmo_token?;
        let refresh_token = self.netatmo_refresh_token?;
        let raw_expiry = self.netatmo_token_expiry?;
        match raw_expiry.trim().parse::<i64>() {
            Ok(expires_at) => Some(Session {
                access_token,
                refresh_token,
                expires_at,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Stored token expiry is not a number; ignoring session");
                None
            }
        }
    }
}

impl From<Session> for StoredEntries {
    fn from(session: Session) -> Self {
        Self {
            netatmo_token: Some(session.access_token),
            netatmo_refresh_token: Some(session.refresh_token),
            netatmo_token_expiry: Some(session.expires_at.to_string()),
        }
    }
}

/// JSON file store that survives restarts.
///
/// Written with owner-only permissions on Unix.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the token file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sibling of the token file with a random suffix, so concurrent writers
    /// never share a temp file and its name cannot be guessed ahead of time.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens".into());
        name.push(format!(".{:016x}.tmp", rand::random::<u64>()));
        self.path.with_file_name(name)
    }
}

/// Create `path` (which must not exist) owner-only and write `body` to it.
async fn write_new_secure(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<Session>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entries: StoredEntries = serde_json::from_slice(&raw)?;
        Ok(entries.into_session())
    }

    async fn set(&self, session: Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(&StoredEntries::from(session))?;
        let tmp = self.temp_path();
        let written = match write_new_secure(&tmp, &body).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
