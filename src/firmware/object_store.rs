//! Blob storage collaborator (C13). Grounded on the original's dummy
//! filesystem-backed `objectstorage.FS`: a flat `root_dir/key` layout with
//! no further structure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;

use crate::error::{AfasError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn store(&self, key: &str, blob: &[u8]) -> Result<()>;
}

/// Flat-file object store rooted at `root_dir`, one file per key.
pub struct FsObjectStore {
    root_dir: PathBuf,
}

impl FsObjectStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.path_for(key)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AfasError::NotFound(format!("object '{key}'"))
            } else {
                AfasError::Internal(format!("reading object '{key}': {e}"))
            }
        })
    }

    async fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = Path::new(&path).parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AfasError::Internal(format!("creating object dir: {e}")))?;
        }
        fs::write(&path, blob)
            .await
            .map_err(|e| AfasError::Internal(format!("writing object '{key}': {e}")))
    }
}

/// In-memory object store used by default and in tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    blobs: DashMap<String, Arc<[u8]>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .map(|b| b.to_vec())
            .ok_or_else(|| AfasError::NotFound(format!("object '{key}'")))
    }

    async fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_string(), Arc::from(blob));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrips() {
        let store = InMemoryObjectStore::new();
        store.store("abc", b"hello").await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn in_memory_missing_key_is_not_found() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.get("missing").await,
            Err(AfasError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_roundtrips_through_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.store("blob-1", b"firmware bytes").await.unwrap();
        let read_back = store.get("blob-1").await.unwrap();
        assert_eq!(read_back, b"firmware bytes");
    }

    #[tokio::test]
    async fn fs_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.get("nope").await,
            Err(AfasError::NotFound(_))
        ));
    }
}
