//! Storage backend abstraction.
//!
//! The ledger needs very little from its store: point reads and writes,
//! ordered prefix scans, and atomic multi-key batches. Anything satisfying
//! [`StorageBackend`] can hold the ledger; the trait deliberately stays
//! below record semantics, trading in raw bytes only.

use anyhow::Result;
use async_trait::async_trait;

/// One operation in an atomic write batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove a key
    Delete { key: Vec<u8> },
}

impl BatchOp {
    /// Shorthand for a put operation
    pub fn put(key: impl Into<Vec<u8>>, value: Vec<u8>) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    /// Shorthand for a delete operation
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Async key-value storage for ledger state.
///
/// Implementations must be safe for concurrent use; the ledger layers its
/// own read-modify-write serialization on top.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or overwrite a key-value pair.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Read a value, `None` when the key is absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove a key; absent keys are not an error.
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Whether a key exists.
    async fn contains(&self, key: &[u8]) -> Result<bool>;

    /// All entries whose key starts with `prefix`, in lexicographic key
    /// order. Scan order is what makes batch input deterministic, so
    /// implementations must honor it.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply a batch of operations atomically, in order.
    async fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Make previous writes durable.
    async fn flush(&self) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
