//! In-process chain node: the single arbitration point.
//!
//! Every mutating call on a token (direct mints, batch settlements,
//! deployments) goes through one async mutex here, mirroring the
//! transaction ordering a chain provides natively. This is the only
//! synchronization the shared `total_minted` counters need; callers never
//! take application-level locks of their own.
//!
//! Batch submissions follow the broadcast-then-poll shape the settlement
//! pipeline expects: `submit_batch` returns a transaction hash immediately
//! and records a receipt, and `tx_status` serves the poll loop. Chain-side
//! failures are atomic: a failed transaction leaves no partial state.

use crate::errors::{ChainError, Result};
use crate::events::EventPublisher;
use crate::factory::{TokenFactory, TokenRecord};
use crate::issuance::{MinterStats, TokenInfo};
use lib_types::{unix_now, Address, Amount, BlockHeight, Timestamp, TokenId, TxHash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Broadcast but not yet decided
    Pending,
    /// Applied at the given block
    Confirmed { block: BlockHeight },
    /// Rejected; state untouched
    Failed { reason: String },
}

struct NodeState {
    factory: TokenFactory,
    height: BlockHeight,
    receipts: HashMap<TxHash, TxStatus>,
}

/// Linearizing front-end over the factory and its deployed tokens
#[derive(Clone)]
pub struct ChainNode {
    state: Arc<Mutex<NodeState>>,
    publisher: EventPublisher,
}

impl ChainNode {
    /// Create a node over a freshly constructed factory
    pub fn new(factory: TokenFactory, publisher: EventPublisher) -> Self {
        Self {
            state: Arc::new(Mutex::new(NodeState {
                factory,
                height: 0,
                receipts: HashMap::new(),
            })),
            publisher,
        }
    }

    /// Publisher external observers subscribe through
    pub fn events(&self) -> EventPublisher {
        self.publisher.clone()
    }

    // ========================================================================
    // MUTATING ENTRY POINTS
    // ========================================================================

    /// Direct mint path; identity is the transaction sender.
    pub async fn mint_for_caller(&self, token_id: TokenId, caller: Address) -> Result<Amount> {
        let now = unix_now();
        let (credited, events) = {
            let mut state = self.state.lock().await;
            let token = state
                .factory
                .get_mut(&token_id)
                .ok_or(ChainError::TokenNotFound(token_id))?;
            let credited = token.mint_for_caller(caller, now)?;
            let events = token.take_events();
            state.height += 1;
            (credited, events)
        };

        self.publisher.publish_all(events).await;
        Ok(credited)
    }

    /// Broadcast a settlement batch. Always yields a hash; the confirmed or
    /// failed outcome is read back through [`Self::tx_status`].
    pub async fn submit_batch(
        &self,
        token_id: TokenId,
        users: Vec<Address>,
        amounts: Vec<Amount>,
        authority: Address,
    ) -> TxHash {
        let now = unix_now();
        let (hash, events) = {
            let mut state = self.state.lock().await;
            let hash = derive_tx_hash(&token_id, &users, &amounts, state.height, now);

            let applied = match state.factory.get_mut(&token_id) {
                Some(token) => token
                    .process_batch(authority, &users, &amounts, now)
                    .map(|_| token.take_events()),
                None => Err(ChainError::TokenNotFound(token_id)),
            };

            match applied {
                Ok(events) => {
                    state.height += 1;
                    let block = state.height;
                    state.receipts.insert(hash, TxStatus::Confirmed { block });
                    (hash, events)
                }
                Err(e) => {
                    tracing::warn!(tx = %hash, "batch rejected: {}", e);
                    state.receipts.insert(
                        hash,
                        TxStatus::Failed {
                            reason: e.to_string(),
                        },
                    );
                    (hash, Vec::new())
                }
            }
        };

        self.publisher.publish_all(events).await;
        hash
    }

    /// Receipt lookup for the settlement poll loop
    pub async fn tx_status(&self, hash: &TxHash) -> Option<TxStatus> {
        self.state.lock().await.receipts.get(hash).cloned()
    }

    /// Deploy a new issuance token through the burn-gated factory
    pub async fn create_token(
        &self,
        creator: Address,
        name: String,
        symbol: String,
        total_supply: Amount,
    ) -> Result<TokenId> {
        let now = unix_now();
        let (token_id, events) = {
            let mut state = self.state.lock().await;
            let token_id = state
                .factory
                .create_token(creator, name, symbol, total_supply, now)?;
            let events = state.factory.take_events();
            state.height += 1;
            (token_id, events)
        };

        self.publisher.publish_all(events).await;
        Ok(token_id)
    }

    /// Change the factory burn requirement. Owner only.
    pub async fn set_required_burn_amount(&self, caller: Address, amount: Amount) -> Result<()> {
        let events = {
            let mut state = self.state.lock().await;
            state.factory.set_required_burn_amount(caller, amount)?;
            state.height += 1;
            state.factory.take_events()
        };

        self.publisher.publish_all(events).await;
        Ok(())
    }

    // ========================================================================
    // GATE OPERATIONS
    // ========================================================================

    /// Issue gate tokens. Restricted to the factory owner.
    pub async fn gate_mint(&self, caller: Address, to: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().await;
        if caller != state.factory.owner {
            return Err(ChainError::Unauthorized(
                "caller is not the factory owner".to_string(),
            ));
        }
        state.factory.gate.mint(to, amount)
    }

    /// Approve the factory to burn from the caller's gate balance
    pub async fn gate_approve(&self, owner: Address, amount: Amount) {
        let mut state = self.state.lock().await;
        let factory_address = state.factory.address;
        state.factory.gate.approve(owner, factory_address, amount);
    }

    /// Gate-token balance of an account
    pub async fn gate_balance(&self, owner: &Address) -> Amount {
        self.state.lock().await.factory.gate.balance_of(owner)
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    /// Read-only token summary
    pub async fn token_info(&self, token_id: &TokenId) -> Result<TokenInfo> {
        let state = self.state.lock().await;
        state
            .factory
            .get(token_id)
            .map(|t| t.info())
            .ok_or(ChainError::TokenNotFound(*token_id))
    }

    /// Token balance of a user
    pub async fn balance_of(&self, token_id: &TokenId, user: &Address) -> Result<Amount> {
        let state = self.state.lock().await;
        state
            .factory
            .get(token_id)
            .map(|t| t.balance_of(user))
            .ok_or(ChainError::TokenNotFound(*token_id))
    }

    /// Per-user issuance statistics
    pub async fn minter_stats(&self, token_id: &TokenId, user: &Address) -> Result<MinterStats> {
        let state = self.state.lock().await;
        state
            .factory
            .get(token_id)
            .map(|t| t.minter_stats(user))
            .ok_or(ChainError::TokenNotFound(*token_id))
    }

    /// Seconds until `user` may direct-mint again
    pub async fn cooldown_remaining(
        &self,
        token_id: &TokenId,
        user: &Address,
        now: Timestamp,
    ) -> Result<u64> {
        let state = self.state.lock().await;
        state
            .factory
            .get(token_id)
            .map(|t| t.cooldown_remaining(user, now))
            .ok_or(ChainError::TokenNotFound(*token_id))
    }

    /// Number of deployed tokens
    pub async fn token_count(&self) -> usize {
        self.state.lock().await.factory.token_count()
    }

    /// Paginated deployment records
    pub async fn records(&self, offset: usize, limit: usize) -> Vec<TokenRecord> {
        self.state.lock().await.factory.records(offset, limit)
    }

    /// Deployment records for one creator
    pub async fn records_by_creator(&self, creator: &Address) -> Vec<TokenRecord> {
        self.state.lock().await.factory.records_by_creator(creator)
    }

    /// Current block height
    pub async fn height(&self) -> BlockHeight {
        self.state.lock().await.height
    }
}

/// Hash the batch payload together with chain position for a unique tx id.
fn derive_tx_hash(
    token_id: &TokenId,
    users: &[Address],
    amounts: &[Amount],
    height: BlockHeight,
    now: Timestamp,
) -> TxHash {
    let mut hasher = Sha256::new();
    hasher.update(token_id.as_bytes());
    for user in users {
        hasher.update(user.as_bytes());
    }
    for amount in amounts {
        hasher.update(amount.to_be_bytes());
    }
    hasher.update(height.to_be_bytes());
    hasher.update(now.to_be_bytes());
    TxHash::new(hasher.finalize().into())
}
