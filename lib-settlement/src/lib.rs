//! Off-chain aggregation and batch settlement pipeline.
//!
//! Reads pending action counts from the ledger, partitions them into
//! bounded batches, submits each batch to the chain, awaits finality, and
//! reconciles the ledger afterwards. One cycle runs to completion or
//! explicit abandonment before the next tick begins; the service holds an
//! explicit non-overlap guard so two cycles can never read the same
//! unreconciled pending counts and double-settle them.
//!
//! Settlement is retry-safe by construction: pending counts are only
//! decremented after on-chain confirmation, so an abandoned batch is simply
//! rebuilt on the next cycle.

pub mod batch;
pub mod client;
pub mod config;
pub mod service;
pub mod submitter;

pub use batch::{Batch, BatchBuildError, BatchBuilder, BatchEntry};
pub use client::{ClientError, FailoverClient, NodeClient, SettlementClient};
pub use config::SettlementConfig;
pub use service::SettlementService;
pub use submitter::{BatchSubmitter, CycleOutcome};
