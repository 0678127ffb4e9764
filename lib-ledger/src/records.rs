//! Ledger record types.

use lib_types::{Address, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-user action accounting
///
/// Created lazily on the user's first recorded action. `pending_actions`
/// only ever decreases through a confirmed settlement or a resync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Actions recorded but not yet settled on chain
    pub pending_actions: u64,
    /// Actions settled by confirmed batches
    pub processed_actions: u64,
    /// All actions ever recorded (`pending + processed` when consistent)
    pub total_actions: u64,
    /// Time of the most recent recorded action
    pub last_action_at: Timestamp,
    /// Time of the most recent settlement covering this user
    pub last_settled_at: Timestamp,
}

/// Ledger-wide aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Sum of all pending action counts
    pub total_pending: u64,
    /// Sum of all settled action counts
    pub total_processed: u64,
    /// Confirmed settlement batches to date
    pub batch_count: u64,
}

/// One user's pending work, as input to batch building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUser {
    /// User address
    pub user: Address,
    /// Unsettled action count
    pub actions: u64,
}
