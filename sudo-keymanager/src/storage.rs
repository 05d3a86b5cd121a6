//! Storage backends: where key records live.

use crate::error::{KeyManagerError, Result};
use crate::types::{KeyId, KeyKind, KeyRecord};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Backend for persisting key records.
///
/// - InMemoryKeyStorage (testing, ephemeral sessions)
/// - FileKeyStorage (one JSON file per key)
/// - a platform keystore wrapper (production)
pub trait KeyStorage: Send + Sync {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>>;
    fn put(&self, record: &KeyRecord) -> Result<()>;
    fn delete(&self, id: &KeyId) -> Result<bool>;
    fn list(&self) -> Result<Vec<KeyRecord>>;
    fn clear(&self) -> Result<()>;

    fn list_by_kind(&self, kind: KeyKind) -> Result<Vec<KeyRecord>> {
        Ok(self.list()?.into_iter().filter(|k| k.kind == kind).collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryKeyStorage {
    keys: RwLock<HashMap<String, KeyRecord>>,
}

impl InMemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStorage for InMemoryKeyStorage {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>> {
        Ok(self.keys.read().get(id.as_str()).cloned())
    }

    fn put(&self, record: &KeyRecord) -> Result<()> {
        self.keys
            .write()
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &KeyId) -> Result<bool> {
        Ok(self.keys.write().remove(id.as_str()).is_some())
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let mut keys: Vec<KeyRecord> = self.keys.read().values().cloned().collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        self.keys.write().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// File-based storage (one JSON file per key).
///
/// Directory layout:
/// ```text
/// keys/
///   {key_id}.json
/// ```
pub struct FileKeyStorage {
    dir: PathBuf,
}

impl FileKeyStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| KeyManagerError::Storage(format!("create dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn key_path(&self, id: &KeyId) -> PathBuf {
        // Key ids from the service may contain path separators.
        let safe: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn read_key_file(&self, path: &Path) -> Result<KeyRecord> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| KeyManagerError::Storage(format!("read: {}", e)))?;
        serde_json::from_str(&data).map_err(|e| KeyManagerError::Storage(format!("parse: {}", e)))
    }
}

impl KeyStorage for FileKeyStorage {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>> {
        let path = self.key_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_key_file(&path).map(Some)
    }

    fn put(&self, record: &KeyRecord) -> Result<()> {
        let path = self.key_path(&record.id);
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| KeyManagerError::Storage(format!("serialize: {}", e)))?;
        // Atomic write: write to temp, then rename
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(|e| KeyManagerError::Storage(format!("write: {}", e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| KeyManagerError::Storage(format!("rename: {}", e)))?;
        Ok(())
    }

    fn delete(&self, id: &KeyId) -> Result<bool> {
        let path = self.key_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| KeyManagerError::Storage(format!("delete: {}", e)))?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let mut keys = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| KeyManagerError::Storage(format!("readdir: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| KeyManagerError::Storage(format!("entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                keys.push(self.read_key_file(&path)?);
            }
        }
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        for record in self.list()? {
            self.delete(&record.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileKeyStorage::new(dir.path()).unwrap();
        let record = KeyRecord::new_symmetric(KeyId::new("k1"), &[7u8; 32]);

        storage.put(&record).unwrap();
        let loaded = storage.get(&KeyId::new("k1")).unwrap().unwrap();
        assert_eq!(loaded.material, record.material);
        assert_eq!(storage.list().unwrap().len(), 1);

        assert!(storage.delete(&KeyId::new("k1")).unwrap());
        assert!(!storage.delete(&KeyId::new("k1")).unwrap());
        assert!(storage.get(&KeyId::new("k1")).unwrap().is_none());
    }

    #[test]
    fn file_backend_sanitizes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileKeyStorage::new(dir.path()).unwrap();
        let record = KeyRecord::new_symmetric(KeyId::new("../escape/attempt"), &[1u8; 32]);
        storage.put(&record).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(storage.get(&KeyId::new("../escape/attempt")).unwrap().is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let storage = InMemoryKeyStorage::new();
        for i in 0..3 {
            storage
                .put(&KeyRecord::new_symmetric(KeyId::new(format!("k{}", i)), &[0u8; 32]))
                .unwrap();
        }
        storage.clear().unwrap();
        assert!(storage.list().unwrap().is_empty());
    }
}
