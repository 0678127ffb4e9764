//! Settlement chain clients.
//!
//! The pipeline talks to the chain through [`SettlementClient`], a narrow
//! seam: broadcast a batch, poll a receipt. [`NodeClient`] drives an
//! in-process [`ChainNode`]; [`FailoverClient`] layers an ordered list of
//! backends with a consecutive-failure circuit breaker on top, so a dead
//! endpoint is skipped until its cooldown elapses instead of stalling every
//! cycle.

use async_trait::async_trait;
use lib_chain::{ChainNode, TxStatus};
use lib_types::{unix_now, Address, Amount, Timestamp, TokenId, TxHash};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Settlement client errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Endpoint could not be reached; try another or retry later
    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),

    /// The chain answered and rejected the transaction; state unchanged
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// No receipt recorded for the given hash
    #[error("Unknown transaction: {0}")]
    UnknownTx(TxHash),

    /// Every configured endpoint failed
    #[error("All endpoints failed")]
    AllEndpointsFailed,
}

/// Narrow chain access used by the settlement pipeline
#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Broadcast a settlement batch; returns the transaction hash.
    async fn submit_batch(
        &self,
        token: TokenId,
        users: Vec<Address>,
        amounts: Vec<Amount>,
    ) -> Result<TxHash, ClientError>;

    /// Poll the receipt for a broadcast transaction.
    async fn tx_status(&self, hash: TxHash) -> Result<TxStatus, ClientError>;
}

// ============================================================================
// IN-PROCESS CLIENT
// ============================================================================

/// Client over an in-process chain node
#[derive(Clone)]
pub struct NodeClient {
    node: ChainNode,
    /// Settlement identity the batches are signed with
    authority: Address,
}

impl NodeClient {
    /// Create a client submitting as the given settlement authority
    pub fn new(node: ChainNode, authority: Address) -> Self {
        Self { node, authority }
    }
}

#[async_trait]
impl SettlementClient for NodeClient {
    async fn submit_batch(
        &self,
        token: TokenId,
        users: Vec<Address>,
        amounts: Vec<Amount>,
    ) -> Result<TxHash, ClientError> {
        Ok(self
            .node
            .submit_batch(token, users, amounts, self.authority)
            .await)
    }

    async fn tx_status(&self, hash: TxHash) -> Result<TxStatus, ClientError> {
        self.node
            .tx_status(&hash)
            .await
            .ok_or(ClientError::UnknownTx(hash))
    }
}

// ============================================================================
// FAILOVER CLIENT
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct EndpointState {
    consecutive_failures: u32,
    tripped_until: Option<Timestamp>,
}

impl EndpointState {
    fn is_tripped(&self, now: Timestamp) -> bool {
        matches!(self.tripped_until, Some(until) if now < until)
    }
}

/// Ordered-fallback client with a simple circuit breaker.
///
/// Backends are tried in configuration order. Only transport failures
/// ([`ClientError::Unavailable`]) advance to the next backend and count
/// toward tripping; a chain answer, even a rejection, is authoritative
/// and is returned as-is.
pub struct FailoverClient {
    endpoints: Vec<Arc<dyn SettlementClient>>,
    states: Mutex<Vec<EndpointState>>,
    trip_threshold: u32,
    trip_cooldown_secs: u64,
}

impl FailoverClient {
    /// Create a failover client over ordered backends
    pub fn new(
        endpoints: Vec<Arc<dyn SettlementClient>>,
        trip_threshold: u32,
        trip_cooldown_secs: u64,
    ) -> Self {
        let states = Mutex::new(vec![EndpointState::default(); endpoints.len()]);
        Self {
            endpoints,
            states,
            trip_threshold,
            trip_cooldown_secs,
        }
    }

    async fn try_each<'a, T, F, Fut>(&'a self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut(&'a dyn SettlementClient) -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>> + 'a,
    {
        let now = unix_now();

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            {
                let mut states = self.states.lock().await;
                let state = &mut states[index];
                if state.is_tripped(now) {
                    debug!(endpoint = index, "skipping tripped endpoint");
                    continue;
                }
                // Cooldown elapsed: give the endpoint a fresh chance.
                if state.tripped_until.take().is_some() {
                    state.consecutive_failures = 0;
                }
            }

            match op(endpoint.as_ref()).await {
                Ok(value) => {
                    self.states.lock().await[index] = EndpointState::default();
                    return Ok(value);
                }
                Err(ClientError::Unavailable(reason)) => {
                    let mut states = self.states.lock().await;
                    let state = &mut states[index];
                    state.consecutive_failures += 1;
                    warn!(
                        endpoint = index,
                        failures = state.consecutive_failures,
                        "endpoint unavailable: {}",
                        reason
                    );
                    if state.consecutive_failures >= self.trip_threshold {
                        state.tripped_until = Some(now + self.trip_cooldown_secs);
                        warn!(
                            endpoint = index,
                            cooldown_secs = self.trip_cooldown_secs,
                            "endpoint tripped"
                        );
                    }
                }
                // The chain answered; its verdict stands.
                Err(other) => return Err(other),
            }
        }

        Err(ClientError::AllEndpointsFailed)
    }
}

#[async_trait]
impl SettlementClient for FailoverClient {
    async fn submit_batch(
        &self,
        token: TokenId,
        users: Vec<Address>,
        amounts: Vec<Amount>,
    ) -> Result<TxHash, ClientError> {
        self.try_each(|endpoint| {
            let users = users.clone();
            let amounts = amounts.clone();
            async move { endpoint.submit_batch(token, users, amounts).await }
        })
        .await
    }

    async fn tx_status(&self, hash: TxHash) -> Result<TxStatus, ClientError> {
        self.try_each(|endpoint| async move { endpoint.tx_status(hash).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Endpoint that fails its first `fail_first` calls, then succeeds.
    struct Flaky {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SettlementClient for Flaky {
        async fn submit_batch(
            &self,
            _token: TokenId,
            _users: Vec<Address>,
            _amounts: Vec<Amount>,
        ) -> Result<TxHash, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(ClientError::Unavailable("connection refused".to_string()))
            } else {
                Ok(TxHash::new([7; 32]))
            }
        }

        async fn tx_status(&self, _hash: TxHash) -> Result<TxStatus, ClientError> {
            Ok(TxStatus::Confirmed { block: 1 })
        }
    }

    fn payload() -> (TokenId, Vec<Address>, Vec<Amount>) {
        (TokenId::new([1; 32]), vec![Address::new([2; 32])], vec![5])
    }

    #[tokio::test]
    async fn test_falls_through_to_healthy_endpoint() {
        let dead = Arc::new(Flaky::new(u32::MAX));
        let healthy = Arc::new(Flaky::new(0));
        let client = FailoverClient::new(vec![dead, healthy], 3, 300);

        let (token, users, amounts) = payload();
        let hash = client.submit_batch(token, users, amounts).await.unwrap();
        assert_eq!(hash, TxHash::new([7; 32]));
    }

    #[tokio::test]
    async fn test_trips_after_threshold_and_skips() {
        let dead = Arc::new(Flaky::new(u32::MAX));
        let healthy = Arc::new(Flaky::new(0));
        let client =
            FailoverClient::new(vec![dead.clone(), healthy], 2, 300);

        let (token, users, amounts) = payload();
        for _ in 0..4 {
            client
                .submit_batch(token, users.clone(), amounts.clone())
                .await
                .unwrap();
        }

        // Two failures tripped the dead endpoint; later calls skip it.
        assert_eq!(dead.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_not_failed_over() {
        struct Rejecting;

        #[async_trait]
        impl SettlementClient for Rejecting {
            async fn submit_batch(
                &self,
                _token: TokenId,
                _users: Vec<Address>,
                _amounts: Vec<Amount>,
            ) -> Result<TxHash, ClientError> {
                Err(ClientError::Rejected("unauthorized".to_string()))
            }

            async fn tx_status(&self, _hash: TxHash) -> Result<TxStatus, ClientError> {
                Err(ClientError::Rejected("unauthorized".to_string()))
            }
        }

        let never_reached = Arc::new(Flaky::new(0));
        let client = FailoverClient::new(
            vec![Arc::new(Rejecting), never_reached.clone()],
            3,
            300,
        );

        let (token, users, amounts) = payload();
        let err = client.submit_batch(token, users, amounts).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(never_reached.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_endpoints_failed() {
        let client = FailoverClient::new(vec![Arc::new(Flaky::new(u32::MAX))], 3, 300);
        let (token, users, amounts) = payload();
        let err = client.submit_batch(token, users, amounts).await.unwrap_err();
        assert_eq!(err, ClientError::AllEndpointsFailed);
    }
}
