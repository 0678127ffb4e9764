//! Settlement pipeline configuration.
//!
//! Thresholds and cadences for the batch cycle.

use serde::{Deserialize, Serialize};

/// Configuration for the settlement pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    // =========================================================================
    // Scheduling
    // =========================================================================
    /// Seconds between settlement cycles
    pub cycle_secs: u64,
    /// Run a full ledger resync every N cycles (0 disables)
    pub resync_every_cycles: u32,

    // =========================================================================
    // Batch Thresholds
    // =========================================================================
    /// Skip the cycle entirely when total pending actions are below this
    pub min_trigger_actions: u64,
    /// Maximum summed action count per batch
    pub max_batch_actions: u64,

    // =========================================================================
    // Confirmation Polling
    // =========================================================================
    /// Give up waiting for a transaction after this many seconds
    pub confirm_timeout_secs: u64,
    /// Delay between status polls, in milliseconds
    pub confirm_poll_ms: u64,

    // =========================================================================
    // Endpoint Failover
    // =========================================================================
    /// Consecutive failures before an endpoint is tripped
    pub trip_threshold: u32,
    /// Seconds a tripped endpoint is skipped before retrying
    pub trip_cooldown_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            // Scheduling
            cycle_secs: 900, // 15 minutes
            resync_every_cycles: 16,

            // Batch thresholds
            min_trigger_actions: 10,
            max_batch_actions: 100,

            // Confirmation polling
            confirm_timeout_secs: 120,
            confirm_poll_ms: 500,

            // Endpoint failover
            trip_threshold: 3,
            trip_cooldown_secs: 300,
        }
    }
}

impl SettlementConfig {
    /// Create a fast, permissive config for testing
    pub fn for_testing() -> Self {
        Self {
            cycle_secs: 1,
            resync_every_cycles: 1,
            min_trigger_actions: 0,
            max_batch_actions: u64::MAX,
            confirm_timeout_secs: 2,
            confirm_poll_ms: 10,
            trip_threshold: 2,
            trip_cooldown_secs: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SettlementConfig::default();
        assert_eq!(config.cycle_secs, 900);
        assert_eq!(config.min_trigger_actions, 10);
        assert_eq!(config.max_batch_actions, 100);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SettlementConfig::default();
        let encoded = toml::to_string(&config).unwrap();
        let decoded: SettlementConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.cycle_secs, config.cycle_secs);
        assert_eq!(decoded.trip_threshold, config.trip_threshold);
    }
}
