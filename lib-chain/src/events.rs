//! Chain event emission infrastructure.
//!
//! All state changes in the issuance system emit typed events. External
//! observers subscribe through [`EventPublisher`]; the registry is decoupled
//! from both the state machines that produce events and the settlement
//! client that triggers them.

use anyhow::Result;
use async_trait::async_trait;
use lib_types::{Address, Amount, Timestamp, TokenId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Issuance-system events that clients can subscribe to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainEvent {
    /// An action was credited with minted tokens (either mint path)
    ActionProcessed {
        /// Credited user
        user: Address,
        /// Amount minted, after any cap truncation
        amount: Amount,
        /// Timestamp of the credit
        timestamp: Timestamp,
    },

    /// The supply cap was reached; the token is now terminal
    SupplyExhausted {
        /// Final minted total, equal to max supply
        total_minted: Amount,
        /// Timestamp of the final mint
        timestamp: Timestamp,
    },

    /// A settlement batch was confirmed and reconciled
    BatchProcessed {
        /// Number of users covered by the batch
        user_count: usize,
        /// Total amount settled
        total_amount: Amount,
        /// Timestamp of reconciliation
        timestamp: Timestamp,
    },

    /// A new issuance token was deployed through the factory
    TokenDeployed {
        /// Identifier of the new token
        token_id: TokenId,
        /// Token name
        name: String,
        /// Token symbol
        symbol: String,
        /// Deploying address
        creator: Address,
        /// Supply cap of the new token
        total_supply: Amount,
        /// Deployment timestamp
        timestamp: Timestamp,
    },

    /// The factory's required burn amount was changed
    BurnAmountChanged {
        /// Previous burn amount
        old: Amount,
        /// New burn amount, applies to future deployments only
        new: Amount,
    },
}

impl std::fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainEvent::ActionProcessed { user, amount, .. } => {
                write!(f, "ActionProcessed(user={:?}, amount={})", user, amount)
            }
            ChainEvent::SupplyExhausted { total_minted, .. } => {
                write!(f, "SupplyExhausted(total={})", total_minted)
            }
            ChainEvent::BatchProcessed {
                user_count,
                total_amount,
                ..
            } => {
                write!(
                    f,
                    "BatchProcessed(users={}, amount={})",
                    user_count, total_amount
                )
            }
            ChainEvent::TokenDeployed { symbol, .. } => {
                write!(f, "TokenDeployed(symbol={})", symbol)
            }
            ChainEvent::BurnAmountChanged { old, new } => {
                write!(f, "BurnAmountChanged({}->{})", old, new)
            }
        }
    }
}

// ============================================================================
// EVENT LISTENER TRAIT
// ============================================================================

/// Trait for entities that listen to chain events
#[async_trait]
pub trait ChainEventListener: Send {
    /// Called when a chain event occurs.
    ///
    /// Async so listeners can perform I/O without blocking other listeners.
    async fn on_event(&mut self, event: ChainEvent) -> Result<()>;
}

// ============================================================================
// EVENT PUBLISHER
// ============================================================================

/// Thread-safe fan-out publisher for chain events
#[derive(Clone, Default)]
pub struct EventPublisher {
    listeners: Arc<Mutex<Vec<Box<dyn ChainEventListener>>>>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").finish()
    }
}

impl EventPublisher {
    /// Create a new publisher with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to chain events
    pub async fn subscribe(&self, listener: Box<dyn ChainEventListener>) {
        self.listeners.lock().await.push(listener);
    }

    /// Publish an event to all subscribers.
    ///
    /// A listener error is logged and never stops the fan-out.
    pub async fn publish(&self, event: ChainEvent) {
        let mut listeners = self.listeners.lock().await;
        for listener in listeners.iter_mut() {
            if let Err(e) = listener.on_event(event.clone()).await {
                tracing::warn!("event listener error on {}: {}", event, e);
            }
        }
    }

    /// Publish a sequence of events in order
    pub async fn publish_all(&self, events: Vec<ChainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Number of subscribed listeners
    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Arc<Mutex<Vec<ChainEvent>>>,
    }

    #[async_trait]
    impl ChainEventListener for Recorder {
        async fn on_event(&mut self, event: ChainEvent) -> Result<()> {
            self.seen.lock().await.push(event);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ChainEventListener for Failing {
        async fn on_event(&mut self, _event: ChainEvent) -> Result<()> {
            anyhow::bail!("listener down")
        }
    }

    #[tokio::test]
    async fn test_publish_fans_out_past_failures() {
        let publisher = EventPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        publisher.subscribe(Box::new(Failing)).await;
        publisher
            .subscribe(Box::new(Recorder { seen: seen.clone() }))
            .await;
        assert_eq!(publisher.listener_count().await, 2);

        publisher
            .publish(ChainEvent::BurnAmountChanged { old: 1, new: 2 })
            .await;

        let events = seen.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ChainEvent::BurnAmountChanged { old: 1, new: 2 });
    }
}
