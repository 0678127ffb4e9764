//! Authoritative chain-side state for bounded-supply token issuance.
//!
//! # Components
//!
//! - [`IssuanceToken`]: the per-token supply state machine with two mint
//!   entry points, a cooldown-limited direct path and an authority-gated
//!   batch path. Both consult the same `total_minted` counter, so the
//!   supply cap holds regardless of which path reaches it first.
//! - [`GateToken`]: balance/allowance ledger for the burn gate.
//! - [`TokenFactory`]: burn-gated deployment of new issuance tokens plus a
//!   creation-ordered registry.
//! - [`ChainNode`]: the single arbitration point that linearizes every
//!   mutating call and exposes a transaction-receipt surface for
//!   settlement polling.
//! - [`EventPublisher`]: typed fan-out of [`ChainEvent`] notifications.

pub mod errors;
pub mod events;
pub mod factory;
pub mod gate;
pub mod issuance;
pub mod node;

pub use errors::ChainError;
pub use events::{ChainEvent, ChainEventListener, EventPublisher};
pub use factory::{FactoryConfig, TokenFactory, TokenRecord};
pub use gate::GateToken;
pub use issuance::{IssuancePhase, IssuanceToken, MinterStats, TokenInfo};
pub use node::{ChainNode, TxStatus};
