use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::ApiError;

pub type SharedSecrets = Arc<ArcSwap<HashMap<String, String>>>;

/// Source of provider credentials. A missing key means the matching source is skipped.
pub trait SecretProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// JSON key/value credential store with an environment fallback.
///
/// The whole map lives behind an `ArcSwap` so readers never block while the
/// file is being rewritten through [`SecretStore::update`].
pub struct SecretStore {
    path: PathBuf,
    shared: SharedSecrets,
    env_fallback: bool,
}

impl SecretStore {
    /// Load the store from `path`, creating an empty `{}` file when it does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = Self::read_file(&path).await;
        Self {
            path,
            shared: Arc::new(ArcSwap::from_pointee(values)),
            env_fallback: true,
        }
    }

    /// Build a store from fixed values, without touching the filesystem or the environment.
    pub fn from_values(path: impl Into<PathBuf>, values: HashMap<String, String>) -> Self {
        Self {
            path: path.into(),
            shared: Arc::new(ArcSwap::from_pointee(values)),
            env_fallback: false,
        }
    }

    pub fn without_env_fallback(mut self) -> Self {
        self.env_fallback = false;
        self
    }

    async fn read_file(path: &Path) -> HashMap<String, String> {
        match tokio::fs::read(path).await {
            Ok(data) => {
                if data.iter().all(|b| b.is_ascii_whitespace()) {
                    tracing::info!(path = %path.display(), "secret store is empty");
                    return HashMap::new();
                }
                match serde_json::from_slice::<HashMap<String, String>>(&data) {
                    Ok(values) => {
                        tracing::info!(path = %path.display(), keys = values.len(), "secret store loaded");
                        values
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "secret store is malformed, using empty store");
                        HashMap::new()
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "secret store not found, creating empty store");
                if let Err(e) = tokio::fs::write(path, b"{}").await {
                    tracing::warn!(path = %path.display(), error = %e, "could not create empty secret store");
                }
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read secret store, using empty store");
                HashMap::new()
            }
        }
    }

    /// Re-read the backing file and swap the in-memory snapshot.
    pub async fn reload(&self) {
        let values = Self::read_file(&self.path).await;
        self.shared.store(Arc::new(values));
    }

    pub fn shared(&self) -> SharedSecrets {
        self.shared.clone()
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.shared.load_full()
    }

    /// Merge `changes` into the store and persist it. Empty values remove the key.
    pub async fn update(&self, changes: HashMap<String, String>) -> Result<Arc<HashMap<String, String>>, ApiError> {
        let mut next = self.shared.load().as_ref().clone();
        for (key, value) in changes {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(ApiError::validation("Secret keys must not be empty"));
            }
            if value.is_empty() {
                next.remove(&key);
            } else {
                next.insert(key, value);
            }
        }

        let serialized = serde_json::to_vec_pretty(&next)?;
        tokio::fs::write(&self.path, serialized).await?;

        let arc = Arc::new(next);
        self.shared.store(arc.clone());
        tracing::info!(path = %self.path.display(), keys = arc.len(), "secret store updated");
        Ok(arc)
    }
}

impl SecretProvider for SecretStore {
    fn get(&self, key: &str) -> Option<String> {
        let stored = self
            .shared
            .load()
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        stored.or_else(|| {
            if self.env_fallback {
                std::env::var(key).ok().filter(|v| !v.trim().is_empty())
            } else {
                None
            }
        })
    }
}
