//! Key-value persistence for login state
//!
//! `FileStore` keeps a single JSON object on disk and rewrites it through a
//! temp file plus rename, so a crash mid-write leaves the old file intact.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::services::xtream::Credentials;

/// Storage key for panel credentials
const CREDENTIALS_KEY: &str = "xtream_credentials";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Opaque get/set/clear storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// JSON file store
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`; parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Map::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(entries)?;

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.read_all().await?;
        Ok(entries.get(key).and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

/// Typed credential persistence on top of a key-value store
pub struct CredentialStore<S> {
    store: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored credentials; a corrupt entry reads as none
    pub async fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(raw) = self.store.get(CREDENTIALS_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(creds) => Ok(Some(creds)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored credentials: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, creds: &Credentials) -> Result<(), StoreError> {
        let raw = serde_json::to_string(creds)?;
        self.store.set(CREDENTIALS_KEY, &raw).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIALS_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("host:8080", "a", "b").unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = CredentialStore::new(MemoryStore::new());
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&creds()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(creds()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        CredentialStore::new(FileStore::new(&path))
            .save(&creds())
            .await
            .unwrap();

        let reopened = CredentialStore::new(FileStore::new(&path));
        assert_eq!(reopened.load().await.unwrap(), Some(creds()));

        reopened.clear().await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));

        store.set("theme", "dark").await.unwrap();
        CredentialStore::new(FileStore::new(dir.path().join("state.json")))
            .save(&creds())
            .await
            .unwrap();

        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn test_corrupt_credentials_read_as_none() {
        let kv = MemoryStore::new();
        kv.set(CREDENTIALS_KEY, "{not json").await.unwrap();
        let store = CredentialStore::new(kv);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("anything").await.unwrap(), None);
        store.remove("anything").await.unwrap();
    }
}
