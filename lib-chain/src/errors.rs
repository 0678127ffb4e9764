//! Chain-side operation errors.
//!
//! Every failing chain operation leaves state untouched, so any error here
//! is safe to retry wholesale once its cause is addressed. `ExhaustedSupply`
//! is the one terminal, non-retryable case.

use lib_types::{Amount, TokenId, TxHash};
use thiserror::Error;

/// Error during chain-side operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The supply cap has been reached; no further minting is possible
    #[error("Supply exhausted: all {total_minted} atomic units minted")]
    ExhaustedSupply {
        /// Final total, equal to the token's max supply
        total_minted: Amount,
    },

    /// The caller minted too recently on the direct path
    #[error("Cooldown active: {remaining_secs}s remaining")]
    CooldownActive {
        /// Seconds until the caller may mint again
        remaining_secs: u64,
    },

    /// Gate balance below the required burn amount
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    /// Gate allowance below the required burn amount
    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: Amount, need: Amount },

    /// Batch user/amount arrays differ in length
    #[error("Malformed batch: {users} users, {amounts} amounts")]
    MalformedBatch { users: usize, amounts: usize },

    /// Caller lacks the authority for this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No token with the given id
    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    /// No receipt recorded for the given transaction hash
    #[error("Transaction not found: {0}")]
    TxNotFound(TxHash),

    /// Rejected deployment or call parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Arithmetic overflow
    #[error("Arithmetic overflow")]
    Overflow,
}

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;
