//! Batch submission and reconciliation.
//!
//! For each batch: broadcast, poll to finality, then (only on
//! confirmation) decrement the covered pending counts, fold the totals
//! into the global stats, and notify observers. A failed or timed-out
//! batch is abandoned for the cycle with the ledger untouched; the same
//! work is rebuilt and retried next cycle.

use crate::batch::Batch;
use crate::client::{ClientError, SettlementClient};
use lib_chain::{ChainEvent, EventPublisher, TxStatus};
use lib_ledger::ActionLedger;
use lib_types::{unix_now, Amount, TokenId, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Totals from one settlement cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Batches broadcast this cycle
    pub batches_submitted: usize,
    /// Batches confirmed and reconciled
    pub batches_confirmed: usize,
    /// Actions settled by confirmed batches
    pub actions_settled: u64,
    /// Token amount settled by confirmed batches
    pub amount_settled: Amount,
}

/// Submits batches and reconciles the ledger after confirmation
pub struct BatchSubmitter {
    client: Arc<dyn SettlementClient>,
    ledger: Arc<ActionLedger>,
    publisher: EventPublisher,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl BatchSubmitter {
    /// Create a submitter over a client and ledger
    pub fn new(
        client: Arc<dyn SettlementClient>,
        ledger: Arc<ActionLedger>,
        publisher: EventPublisher,
        confirm_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            ledger,
            publisher,
            confirm_timeout,
            poll_interval,
        }
    }

    /// Settle a cycle's batches in order.
    ///
    /// Each batch is handled independently: one failure abandons that batch
    /// only, and later batches still get their chance.
    pub async fn settle(&self, token: TokenId, batches: Vec<Batch>) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            batches_submitted: batches.len(),
            ..CycleOutcome::default()
        };

        for (index, batch) in batches.iter().enumerate() {
            match self.settle_one(token, batch).await {
                Ok(()) => {
                    outcome.batches_confirmed += 1;
                    outcome.actions_settled += batch.total_actions;
                    outcome.amount_settled += batch.total_amount;
                }
                Err(e) => {
                    // Pending counts are untouched, so this work is
                    // naturally retried on the next cycle.
                    warn!(
                        batch = index,
                        users = batch.len(),
                        "abandoning batch for this cycle: {}",
                        e
                    );
                }
            }
        }

        outcome
    }

    async fn settle_one(&self, token: TokenId, batch: &Batch) -> Result<(), ClientError> {
        let hash = self
            .client
            .submit_batch(token, batch.users(), batch.amounts())
            .await?;
        info!(tx = %hash, users = batch.len(), actions = batch.total_actions, "batch submitted");

        self.await_confirmation(hash).await?;
        self.reconcile(batch).await;

        self.publisher
            .publish(ChainEvent::BatchProcessed {
                user_count: batch.len(),
                total_amount: batch.total_amount,
                timestamp: unix_now(),
            })
            .await;

        Ok(())
    }

    /// Poll the receipt until it is decided or the deadline passes.
    async fn await_confirmation(&self, hash: TxHash) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            match self.client.tx_status(hash).await? {
                TxStatus::Confirmed { block } => {
                    info!(tx = %hash, block, "batch confirmed");
                    return Ok(());
                }
                TxStatus::Failed { reason } => {
                    return Err(ClientError::Rejected(reason));
                }
                TxStatus::Pending => {
                    if Instant::now() >= deadline {
                        return Err(ClientError::Unavailable(format!(
                            "confirmation timed out after {:?}",
                            self.confirm_timeout
                        )));
                    }
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Write the confirmed batch back to the ledger.
    ///
    /// A reconcile failure here cannot un-confirm the chain, so it is
    /// logged and left for the periodic resync to repair.
    async fn reconcile(&self, batch: &Batch) {
        let now = unix_now();
        for entry in &batch.entries {
            if let Err(e) = self.ledger.reconcile(entry.user, entry.actions, now).await {
                error!(user = %entry.user, "reconcile failed, resync will repair: {}", e);
            }
        }
        if let Err(e) = self.ledger.apply_settlement_stats(batch.total_actions).await {
            error!("global stats update failed, resync will repair: {}", e);
        }
    }
}
