//! Durable session identity
//!
//! One opaque token per profile scopes every turn to the same logical
//! conversation on the service side. The token lives in a small file under
//! the platform data directory and survives restarts; if that storage is
//! unavailable the identity degrades to process lifetime and the session
//! keeps working without persistence.

use std::fs;
use std::path::{Path, PathBuf};

/// Storage key, used as the file name under the data directory
const STORAGE_KEY: &str = "chat_session_id";

/// A conversation-scoping token, stable across restarts when storage works
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    token: String,
    persisted: bool,
}

impl SessionIdentity {
    /// Default storage path for the token file
    pub fn storage_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rill")
            .join(STORAGE_KEY)
    }

    /// Load the stored token, or mint one and persist it before first use.
    pub fn load_or_create() -> Self {
        Self::load_or_create_at(Self::storage_path())
    }

    /// Same as [`load_or_create`](Self::load_or_create) with an explicit
    /// storage location.
    pub fn load_or_create_at(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if let Ok(stored) = fs::read_to_string(path) {
            let stored = stored.trim();
            if !stored.is_empty() {
                return Self {
                    token: stored.to_owned(),
                    persisted: true,
                };
            }
        }

        let token = uuid::Uuid::new_v4().to_string();
        let persisted = match Self::store(path, &token) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "session identity storage unavailable; token will not survive restart"
                );
                false
            }
        };

        Self { token, persisted }
    }

    fn store(path: &Path, token: &str) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, token)
    }

    /// The opaque token value
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the token survives a restart
    pub fn is_persistent(&self) -> bool {
        self.persisted
    }
}
