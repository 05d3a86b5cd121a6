//! Object storage seam: message bodies and drafts live here, keyed by path.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Object metadata as string key/value pairs (`key-id`, `algorithm`, ...).
pub type ObjectMetadata = HashMap<String, String>;

/// Metadata key holding the sealing key id of a stored object.
pub const METADATA_KEY_ID: &str = "key-id";
/// Metadata key holding the sealing algorithm of a stored object.
pub const METADATA_ALGORITHM: &str = "algorithm";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist (a 404 from the backend).
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage request cancelled")]
    Cancelled,

    #[error("storage: {0}")]
    Other(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning the key actually written.
    async fn upload(&self, data: Vec<u8>, key: &str, metadata: Option<ObjectMetadata>) -> StorageResult<String>;
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;
    async fn get_object_metadata(&self, key: &str) -> StorageResult<ObjectMetadata>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
    /// Every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct StoredObject {
    data: Vec<u8>,
    metadata: ObjectMetadata,
    last_modified: chrono::DateTime<chrono::Utc>,
}

/// Object store held in process memory. Keys are kept ordered so listings
/// are deterministic.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, data: Vec<u8>, key: &str, metadata: Option<ObjectMetadata>) -> StorageResult<String> {
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                metadata: metadata.unwrap_or_default(),
                last_modified: chrono::Utc::now(),
            },
        );
        Ok(key.to_string())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_object_metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.metadata.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectSummary {
                key: k.clone(),
                last_modified: o.last_modified,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_download_delete() {
        let store = InMemoryObjectStore::new();
        let mut meta = ObjectMetadata::new();
        meta.insert(METADATA_KEY_ID.into(), "k1".into());
        store.upload(b"abc".to_vec(), "a/draft/1", Some(meta)).await.unwrap();

        assert_eq!(store.download("a/draft/1").await.unwrap(), b"abc");
        assert_eq!(store.get_object_metadata("a/draft/1").await.unwrap()[METADATA_KEY_ID], "k1");
        store.delete("a/draft/1").await.unwrap();
        assert!(matches!(store.download("a/draft/1").await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete("a/draft/1").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_by_prefix() {
        let store = InMemoryObjectStore::new();
        for key in ["a/draft/1", "a/draft/2", "a/email/1", "b/draft/1"] {
            store.upload(vec![], key, None).await.unwrap();
        }
        let keys: Vec<String> = store.list("a/draft/").await.unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["a/draft/1", "a/draft/2"]);
    }
}
