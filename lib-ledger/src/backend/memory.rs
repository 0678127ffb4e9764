//! In-memory storage backend.
//!
//! Backs tests and ephemeral deployments. Keys are held in a `BTreeMap`, so
//! prefix scans come back in lexicographic order without extra work.

use super::traits::{BatchOp, StorageBackend};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Non-durable backend over a sorted in-memory map
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read().get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.write().remove(key);
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.read().contains_key(key))
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut map = self.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = MemoryBackend::new();
        backend.put(b"k1", b"v1").await.unwrap();

        assert_eq!(backend.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
        assert!(backend.contains(b"k1").await.unwrap());

        backend.delete(b"k1").await.unwrap();
        assert_eq!(backend.get(b"k1").await.unwrap(), None);
        assert!(backend.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_is_ordered() {
        let backend = MemoryBackend::new();
        backend.put(b"user/bb", b"2").await.unwrap();
        backend.put(b"user/aa", b"1").await.unwrap();
        backend.put(b"global/stats", b"g").await.unwrap();

        let entries = backend.scan_prefix(b"user/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"user/aa".to_vec());
        assert_eq!(entries[1].0, b"user/bb".to_vec());
    }

    #[tokio::test]
    async fn test_write_batch_applies_in_order() {
        let backend = MemoryBackend::new();
        backend
            .write_batch(vec![
                BatchOp::put(b"a".as_slice(), b"1".to_vec()),
                BatchOp::put(b"a".as_slice(), b"2".to_vec()),
                BatchOp::delete(b"gone".as_slice()),
            ])
            .await
            .unwrap();

        assert_eq!(backend.get(b"a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.len().await.unwrap(), 1);
    }
}
