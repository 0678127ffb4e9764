//! Action ledger errors.
//!
//! Ledger writes are not transactional with the chain: a failed
//! `record_action` loses that action and must be logged at the calling
//! boundary, never escalated into the batch pipeline.

use thiserror::Error;

/// Error during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The underlying store rejected or failed the operation
    #[error("Ledger backend error: {0}")]
    Backend(#[from] anyhow::Error),

    /// A stored record failed to decode
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
