//! Batch construction.
//!
//! Greedy partition of pending users into bounded batches. Users are taken
//! in ledger order; the current batch closes when the next user's pending
//! count would overflow it. A single user whose pending count alone exceeds
//! the bound is submitted as one oversized single-user batch; splitting one
//! user across batches would let a mid-sequence failure retry an
//! already-settled remainder and double-credit them.

use lib_ledger::PendingUser;
use lib_types::{Address, Amount};
use thiserror::Error;
use tracing::{debug, warn};

/// Batch construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchBuildError {
    /// Converting an action count to a token amount overflowed
    #[error("Amount overflow for {actions} actions")]
    AmountOverflow { actions: u64 },
}

/// One user's share of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    /// User to credit
    pub user: Address,
    /// Pending actions covered by this batch
    pub actions: u64,
    /// Token amount to mint (`actions × per_action_amount`)
    pub amount: Amount,
}

/// A bounded group of users settled together in one transaction.
///
/// Ephemeral: exists only during one settlement cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Entries in ledger order
    pub entries: Vec<BatchEntry>,
    /// Summed action count
    pub total_actions: u64,
    /// Summed token amount
    pub total_amount: Amount,
}

impl Batch {
    fn push(&mut self, entry: BatchEntry) {
        self.total_actions += entry.actions;
        self.total_amount += entry.amount;
        self.entries.push(entry);
    }

    /// Number of users in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Users column, for the chain call
    pub fn users(&self) -> Vec<Address> {
        self.entries.iter().map(|e| e.user).collect()
    }

    /// Amounts column, for the chain call
    pub fn amounts(&self) -> Vec<Amount> {
        self.entries.iter().map(|e| e.amount).collect()
    }
}

/// Partitions pending users into submission-ready batches
#[derive(Debug, Clone, Copy)]
pub struct BatchBuilder {
    /// Skip the cycle when total pending actions are below this
    pub min_trigger_actions: u64,
    /// Maximum summed action count per batch
    pub max_batch_actions: u64,
    /// Token amount minted per action
    pub per_action_amount: Amount,
}

impl BatchBuilder {
    /// Create a builder with explicit thresholds
    pub fn new(min_trigger_actions: u64, max_batch_actions: u64, per_action_amount: Amount) -> Self {
        Self {
            min_trigger_actions,
            max_batch_actions,
            per_action_amount,
        }
    }

    /// Build batches from the ledger's pending users.
    ///
    /// Returns an empty list when total pending work is below the trigger.
    pub fn build(&self, pending: &[PendingUser]) -> Result<Vec<Batch>, BatchBuildError> {
        let total: u64 = pending.iter().map(|p| p.actions).sum();
        if total < self.min_trigger_actions {
            debug!(
                total,
                trigger = self.min_trigger_actions,
                "pending below trigger, skipping cycle"
            );
            return Ok(Vec::new());
        }

        let mut batches = Vec::new();
        let mut current = Batch::default();

        for user in pending {
            if user.actions == 0 {
                continue;
            }
            if user.actions > self.max_batch_actions {
                warn!(
                    user = %user.user,
                    actions = user.actions,
                    max = self.max_batch_actions,
                    "single user exceeds batch bound, submitting oversized batch"
                );
            }

            // Close the batch the next user would overflow.
            if !current.is_empty() && current.total_actions + user.actions > self.max_batch_actions
            {
                batches.push(std::mem::take(&mut current));
            }

            let amount = self
                .per_action_amount
                .checked_mul(user.actions as Amount)
                .ok_or(BatchBuildError::AmountOverflow {
                    actions: user.actions,
                })?;
            current.push(BatchEntry {
                user: user.user,
                actions: user.actions,
                amount,
            });
        }

        if !current.is_empty() {
            batches.push(current);
        }

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn pending(counts: &[u64]) -> Vec<PendingUser> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &actions)| PendingUser {
                user: addr(i as u8 + 1),
                actions,
            })
            .collect()
    }

    #[test]
    fn test_below_trigger_builds_nothing() {
        let builder = BatchBuilder::new(10, 100, 1);
        let batches = builder.build(&pending(&[4, 5])).unwrap();
        assert!(batches.is_empty());

        // At the trigger the cycle runs.
        let batches = builder.build(&pending(&[4, 6])).unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_every_batch_respects_the_bound() {
        let builder = BatchBuilder::new(10, 100, 1);
        let batches = builder.build(&pending(&[60, 50, 40])).unwrap();

        assert!(!batches.is_empty());
        for batch in &batches {
            assert!(batch.total_actions <= 100);
        }
        let settled: u64 = batches.iter().map(|b| b.total_actions).sum();
        assert_eq!(settled, 150);
    }

    #[test]
    fn test_greedy_packing_in_ledger_order() {
        let builder = BatchBuilder::new(0, 100, 1);
        let batches = builder.build(&pending(&[60, 30, 20, 80])).unwrap();

        // 60+30 fit; adding 20 would overflow, so it opens batch two and
        // 80 still fits beside it.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].total_actions, 90);
        assert_eq!(batches[1].total_actions, 100);
        assert_eq!(batches[0].entries[0].user, addr(1));
    }

    #[test]
    fn test_oversized_user_gets_own_batch() {
        let builder = BatchBuilder::new(0, 100, 1);
        let batches = builder.build(&pending(&[30, 250, 30])).unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].total_actions, 250);
        assert_eq!(batches[0].total_actions, 30);
        assert_eq!(batches[2].total_actions, 30);
    }

    #[test]
    fn test_amounts_scale_per_action() {
        let builder = BatchBuilder::new(0, 100, lib_types::UNIT);
        let batches = builder.build(&pending(&[3])).unwrap();

        assert_eq!(batches[0].entries[0].amount, lib_types::whole(3));
        assert_eq!(batches[0].total_amount, lib_types::whole(3));
    }

    #[test]
    fn test_amount_overflow_is_reported() {
        let builder = BatchBuilder::new(0, u64::MAX, Amount::MAX);
        let err = builder.build(&pending(&[2])).unwrap_err();
        assert_eq!(err, BatchBuildError::AmountOverflow { actions: 2 });
    }
}
