//! Sled-based storage backend.
//!
//! Durable key-value storage for the action ledger using sled, an embedded
//! database with crash recovery.
//!
//! # Features
//!
//! - Async-compatible API using spawn_blocking for I/O operations
//! - Batch operations for atomic writes
//! - Key/value size limits to prevent resource exhaustion

use super::traits::{BatchOp, StorageBackend};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Maximum key size (256 bytes - sufficient for 32-byte hashes with prefixes)
pub const MAX_KEY_SIZE: usize = 256;

/// Maximum value size (256 KB - ledger records are small JSON documents)
pub const MAX_VALUE_SIZE: usize = 256 * 1024;

/// Maximum operations per batch
pub const MAX_BATCH_OPS: usize = 10_000;

/// Sled backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database failed to open
    #[error("Database open failed: {0}")]
    OpenFailed(String),

    /// Write operation failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Read operation failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Flush operation failed
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Key exceeds maximum allowed size
    #[error("Key exceeds maximum size of {max} bytes (got {actual})")]
    KeyTooLarge { max: usize, actual: usize },

    /// Value exceeds maximum allowed size
    #[error("Value exceeds maximum size of {max} bytes (got {actual})")]
    ValueTooLarge { max: usize, actual: usize },

    /// Empty key not allowed
    #[error("Empty keys are not allowed")]
    EmptyKey,

    /// Batch exceeds limits
    #[error("Batch has {actual} operations, max is {max}")]
    BatchTooLarge { max: usize, actual: usize },

    /// Blocking task failed to complete
    #[error("Task execution failed: {0}")]
    TaskFailed(String),
}

fn validate_key(key: &[u8]) -> std::result::Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(StorageError::KeyTooLarge {
            max: MAX_KEY_SIZE,
            actual: key.len(),
        });
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> std::result::Result<(), StorageError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(StorageError::ValueTooLarge {
            max: MAX_VALUE_SIZE,
            actual: value.len(),
        });
    }
    Ok(())
}

/// Durable backend over a sled tree
#[derive(Clone, Debug)]
pub struct SledBackend {
    tree: sled::Tree,
    db: sled::Db,
}

impl SledBackend {
    /// Open or create a sled database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        let tree = db
            .open_tree("action_ledger")
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        debug!(path = %path.as_ref().display(), "opened sled ledger backend");
        Ok(Self { tree, db })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(sled::Tree) -> std::result::Result<T, StorageError> + Send + 'static,
    {
        let tree = self.tree.clone();
        let out = tokio::task::spawn_blocking(move || f(tree))
            .await
            .map_err(|e| StorageError::TaskFailed(e.to_string()))??;
        Ok(out)
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;
        let (key, value) = (key.to_vec(), value.to_vec());
        self.blocking(move |tree| {
            tree.insert(key, value)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let key = key.to_vec();
        self.blocking(move |tree| {
            tree.get(key)
                .map(|v| v.map(|ivec| ivec.to_vec()))
                .map_err(|e| StorageError::ReadFailed(e.to_string()))
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        let key = key.to_vec();
        self.blocking(move |tree| {
            tree.remove(key)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn contains(&self, key: &[u8]) -> Result<bool> {
        validate_key(key)?;
        let key = key.to_vec();
        self.blocking(move |tree| {
            tree.contains_key(key)
                .map_err(|e| StorageError::ReadFailed(e.to_string()))
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = prefix.to_vec();
        self.blocking(move |tree| {
            let mut entries = Vec::new();
            for item in tree.scan_prefix(prefix) {
                let (k, v) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
                entries.push((k.to_vec(), v.to_vec()));
            }
            Ok(entries)
        })
        .await
    }

    async fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        if ops.len() > MAX_BATCH_OPS {
            return Err(StorageError::BatchTooLarge {
                max: MAX_BATCH_OPS,
                actual: ops.len(),
            }
            .into());
        }
        for op in &ops {
            match op {
                BatchOp::Put { key, value } => {
                    validate_key(key)?;
                    validate_value(value)?;
                }
                BatchOp::Delete { key } => validate_key(key)?,
            }
        }

        self.blocking(move |tree| {
            let mut batch = sled::Batch::default();
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => batch.insert(key, value),
                    BatchOp::Delete { key } => batch.remove(key),
                }
            }
            tree.apply_batch(batch)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            db.flush()
                .map(|_| ())
                .map_err(|e| StorageError::FlushFailed(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))??;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        self.blocking(move |tree| Ok(tree.len())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = SledBackend::open(dir.path()).unwrap();
            backend.put(b"user/aa", b"{\"pending\":3}").await.unwrap();
            backend.flush().await.unwrap();
        }

        let backend = SledBackend::open(dir.path()).unwrap();
        assert_eq!(
            backend.get(b"user/aa").await.unwrap(),
            Some(b"{\"pending\":3}".to_vec())
        );
    }

    #[tokio::test]
    async fn test_rejects_oversized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();

        let huge_key = vec![1u8; MAX_KEY_SIZE + 1];
        assert!(backend.put(&huge_key, b"v").await.is_err());
        assert!(backend.put(b"", b"v").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();

        backend
            .write_batch(vec![
                BatchOp::put(b"user/bb".as_slice(), b"2".to_vec()),
                BatchOp::put(b"user/aa".as_slice(), b"1".to_vec()),
            ])
            .await
            .unwrap();

        let entries = backend.scan_prefix(b"user/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"user/aa".to_vec());
    }
}
