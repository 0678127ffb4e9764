//! Periodic settlement service.
//!
//! One cycle: resync (on cadence) → read pending → build batches →
//! submit → await confirmation → reconcile. The cycle mutex is an explicit
//! non-overlap guard: a tick that arrives while a cycle is still in flight
//! is skipped outright, because two concurrent cycles would read the same
//! unreconciled pending counts and settle them twice.

use crate::batch::BatchBuilder;
use crate::config::SettlementConfig;
use crate::submitter::{BatchSubmitter, CycleOutcome};
use anyhow::Result;
use lib_ledger::ActionLedger;
use lib_types::TokenId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Scheduled driver of the settlement pipeline
pub struct SettlementService {
    config: SettlementConfig,
    token: TokenId,
    ledger: Arc<ActionLedger>,
    builder: BatchBuilder,
    submitter: BatchSubmitter,
    cycle_guard: Mutex<()>,
    cycles_run: AtomicU32,
    shutdown: Arc<Notify>,
}

impl SettlementService {
    /// Create a service settling one token
    pub fn new(
        config: SettlementConfig,
        token: TokenId,
        ledger: Arc<ActionLedger>,
        builder: BatchBuilder,
        submitter: BatchSubmitter,
    ) -> Self {
        Self {
            config,
            token,
            ledger,
            builder,
            submitter,
            cycle_guard: Mutex::new(()),
            cycles_run: AtomicU32::new(0),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop [`Self::run`] from another task
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the scheduler until shutdown.
    ///
    /// The first cycle runs immediately at startup; subsequent cycles fire
    /// every `cycle_secs`.
    pub async fn run(&self) {
        info!(
            cycle_secs = self.config.cycle_secs,
            min_trigger = self.config.min_trigger_actions,
            max_batch = self.config.max_batch_actions,
            "settlement service started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.cycle_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = self.shutdown.notified() => {
                    info!("settlement service stopping");
                    return;
                }
            }
        }
    }

    /// One scheduler tick, guarded against overlap with a running cycle.
    pub async fn tick(&self) {
        // Explicit non-overlap guard: never start a cycle while a prior
        // cycle's submission or reconciliation is still in flight.
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("previous settlement cycle still in flight, skipping tick");
            return;
        };

        if let Err(e) = self.run_cycle_locked().await {
            warn!("settlement cycle failed: {}", e);
        }
    }

    /// Run one full settlement cycle (blocking on the guard).
    ///
    /// Exposed for tests and one-shot invocations.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let _guard = self.cycle_guard.lock().await;
        self.run_cycle_locked().await
    }

    async fn run_cycle_locked(&self) -> Result<CycleOutcome> {
        let cycle = self.cycles_run.fetch_add(1, Ordering::SeqCst);

        if self.config.resync_every_cycles > 0 && cycle % self.config.resync_every_cycles == 0 {
            let report = self.ledger.resync().await?;
            debug!(
                scanned = report.users_scanned,
                corrected = report.users_corrected,
                "ledger resync complete"
            );
        }

        let pending = self.ledger.all_pending_users().await?;
        let total: u64 = pending.iter().map(|p| p.actions).sum();
        debug!(users = pending.len(), total, "cycle pending snapshot");

        let batches = self.builder.build(&pending)?;
        if batches.is_empty() {
            debug!("nothing to settle this cycle");
            return Ok(CycleOutcome::default());
        }

        let outcome = self.submitter.settle(self.token, batches).await;
        info!(
            submitted = outcome.batches_submitted,
            confirmed = outcome.batches_confirmed,
            actions = outcome.actions_settled,
            "settlement cycle complete"
        );

        self.ledger.flush().await?;
        Ok(outcome)
    }
}
