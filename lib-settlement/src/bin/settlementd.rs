//! Settlement daemon.
//!
//! Runs the periodic batch-settlement pipeline against a durable sled
//! ledger and an in-process chain node. Remote chain deployments plug in
//! behind the same `SettlementClient` seam.

use anyhow::{Context, Result};
use lib_chain::{ChainNode, EventPublisher, FactoryConfig, GateToken, TokenFactory};
use lib_ledger::{ActionLedger, SledBackend};
use lib_settlement::{
    BatchBuilder, BatchSubmitter, FailoverClient, NodeClient, SettlementConfig, SettlementService,
};
use lib_types::{whole, Address};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Token parameters for the locally hosted issuance instance
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenSection {
    name: String,
    symbol: String,
    /// Supply cap in whole tokens
    max_supply_tokens: u64,
    /// Mint per action in whole tokens
    per_action_tokens: u64,
    /// Direct-mint cooldown in seconds
    cooldown_secs: u64,
    /// Gate tokens burned per factory deployment, in whole tokens
    required_burn_tokens: u64,
}

impl Default for TokenSection {
    fn default() -> Self {
        Self {
            name: "Ember".to_string(),
            symbol: "EMBR".to_string(),
            max_supply_tokens: 666_666_666,
            per_action_tokens: 1,
            cooldown_secs: 60,
            required_burn_tokens: 1_000,
        }
    }
}

/// Daemon configuration file shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DaemonConfig {
    /// Ledger database directory (overridable with --data-dir)
    data_dir: Option<PathBuf>,
    #[serde(default)]
    token: TokenSection,
    #[serde(default)]
    settlement: SettlementConfig,
}

struct CliArgs {
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_cli_args();
    let config = load_configuration(&args)?;
    let data_dir = args
        .data_dir
        .or(config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(".settlementd"));

    // Durable ledger.
    let backend = SledBackend::open(data_dir.join("ledger"))
        .with_context(|| format!("opening ledger at {}", data_dir.display()))?;
    let ledger = Arc::new(ActionLedger::new(Arc::new(backend)));

    // In-process chain: factory owner and settlement authority are fixed
    // local identities.
    let owner = role_address("owner");
    let authority = role_address("settlement-authority");
    let publisher = EventPublisher::new();
    let factory = TokenFactory::new(
        role_address("factory"),
        owner,
        authority,
        GateToken::new("GATE"),
        FactoryConfig {
            // Genesis deployment is free; the configured gate applies to
            // everything after it.
            required_burn_amount: 0,
            per_action_amount: whole(config.token.per_action_tokens),
            cooldown_secs: config.token.cooldown_secs,
        },
    );
    let node = ChainNode::new(factory, publisher.clone());

    let token = node
        .create_token(
            owner,
            config.token.name.clone(),
            config.token.symbol.clone(),
            whole(config.token.max_supply_tokens),
        )
        .await?;
    node.set_required_burn_amount(owner, whole(config.token.required_burn_tokens))
        .await?;
    info!(token = %token, symbol = %config.token.symbol, "issuance token ready");

    // Pipeline wiring: the node client sits behind the failover pool so a
    // remote deployment can add endpoints without touching the submitter.
    let client = Arc::new(FailoverClient::new(
        vec![Arc::new(NodeClient::new(node.clone(), authority))],
        config.settlement.trip_threshold,
        config.settlement.trip_cooldown_secs,
    ));
    let builder = BatchBuilder::new(
        config.settlement.min_trigger_actions,
        config.settlement.max_batch_actions,
        whole(config.token.per_action_tokens),
    );
    let submitter = BatchSubmitter::new(
        client,
        ledger.clone(),
        publisher,
        Duration::from_secs(config.settlement.confirm_timeout_secs),
        Duration::from_millis(config.settlement.confirm_poll_ms),
    );
    let service = Arc::new(SettlementService::new(
        config.settlement,
        token,
        ledger,
        builder,
        submitter,
    ));

    let shutdown = service.shutdown_handle();
    let runner = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.notify_one();
    runner.await?;

    Ok(())
}

/// Parse command-line arguments
fn parse_cli_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();
    let mut config = None;
    let mut data_dir = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" => {
                if i + 1 < args.len() {
                    data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            other => {
                eprintln!("unknown argument: {}", other);
                eprintln!("usage: settlementd [--config <path>] [--data-dir <path>]");
                std::process::exit(2);
            }
        }
    }

    CliArgs { config, data_dir }
}

/// Load the TOML configuration, falling back to defaults without a file.
fn load_configuration(args: &CliArgs) -> Result<DaemonConfig> {
    match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?;
            Ok(config)
        }
        None => {
            info!("no config file given, using defaults");
            Ok(DaemonConfig::default())
        }
    }
}

/// Deterministic local identity for a named role.
fn role_address(role: &str) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"settlementd/");
    hasher.update(role.as_bytes());
    Address::new(hasher.finalize().into())
}
