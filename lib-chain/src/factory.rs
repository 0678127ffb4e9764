//! Burn-gated token factory and registry.
//!
//! Deploying a new issuance token requires burning a fixed amount of the
//! gating token. The factory keeps an index of every deployment in creation
//! order; records are immutable once written.

use crate::errors::{ChainError, Result};
use crate::events::ChainEvent;
use crate::gate::GateToken;
use crate::issuance::IssuanceToken;
use lib_types::{Address, Amount, Timestamp, TokenId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Immutable record of one factory deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Identifier of the deployed token
    pub token_id: TokenId,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Deploying address
    pub creator: Address,
    /// Supply cap the token was seeded with
    pub max_supply: Amount,
    /// Deployment timestamp
    pub created_at: Timestamp,
}

/// Issuance parameters the factory seeds every deployment with
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Gate tokens burned per deployment
    pub required_burn_amount: Amount,
    /// Per-action mint amount for deployed tokens
    pub per_action_amount: Amount,
    /// Direct-mint cooldown for deployed tokens, in seconds
    pub cooldown_secs: u64,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            required_burn_amount: lib_types::whole(1_000),
            per_action_amount: lib_types::UNIT,
            cooldown_secs: 60,
        }
    }
}

/// Burn-gated creator of bounded-supply issuance tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFactory {
    /// Factory's own address, the spender of gate-token allowances
    pub address: Address,
    /// May change the required burn amount
    pub owner: Address,
    /// Settlement authority wired into every deployed token
    pub settlement_authority: Address,
    /// Gate tokens burned per deployment
    pub required_burn_amount: Amount,
    /// Per-action amount seeded into deployed tokens
    pub per_action_amount: Amount,
    /// Cooldown seeded into deployed tokens
    pub cooldown_secs: u64,
    /// Burn-gate ledger
    pub gate: GateToken,

    tokens: HashMap<TokenId, IssuanceToken>,
    records: Vec<TokenRecord>,

    #[serde(skip)]
    events: Vec<ChainEvent>,
}

impl TokenFactory {
    /// Create a factory with an empty registry
    pub fn new(
        address: Address,
        owner: Address,
        settlement_authority: Address,
        gate: GateToken,
        config: FactoryConfig,
    ) -> Self {
        Self {
            address,
            owner,
            settlement_authority,
            required_burn_amount: config.required_burn_amount,
            per_action_amount: config.per_action_amount,
            cooldown_secs: config.cooldown_secs,
            gate,
            tokens: HashMap::new(),
            records: Vec::new(),
            events: Vec::new(),
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Deploy a new issuance token, burning the required gate amount.
    ///
    /// The creator must have approved the factory for at least
    /// `required_burn_amount`; allowance is checked before balance.
    pub fn create_token(
        &mut self,
        creator: Address,
        name: String,
        symbol: String,
        total_supply: Amount,
        now: Timestamp,
    ) -> Result<TokenId> {
        if self.required_burn_amount > 0 {
            self.gate
                .burn_from(self.address, creator, self.required_burn_amount)?;
        }

        let token_id = self.derive_token_id(&name, &symbol, &creator, now);
        let token = IssuanceToken::deploy(
            token_id,
            name.clone(),
            symbol.clone(),
            total_supply,
            self.per_action_amount,
            self.cooldown_secs,
            self.settlement_authority,
            creator,
            now,
        )?;

        self.tokens.insert(token_id, token);
        self.records.push(TokenRecord {
            token_id,
            name: name.clone(),
            symbol: symbol.clone(),
            creator,
            max_supply: total_supply,
            created_at: now,
        });
        self.events.push(ChainEvent::TokenDeployed {
            token_id,
            name,
            symbol,
            creator,
            total_supply,
            timestamp: now,
        });

        tracing::info!(token = %token_id, "token deployed");
        Ok(token_id)
    }

    /// Change the burn requirement for future deployments. Owner only.
    pub fn set_required_burn_amount(&mut self, caller: Address, new_amount: Amount) -> Result<()> {
        if caller != self.owner {
            return Err(ChainError::Unauthorized(
                "caller is not the factory owner".to_string(),
            ));
        }

        let old = self.required_burn_amount;
        self.required_burn_amount = new_amount;
        self.events.push(ChainEvent::BurnAmountChanged {
            old,
            new: new_amount,
        });

        Ok(())
    }

    /// Drain events emitted since the last call
    pub fn take_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // REGISTRY READS (deterministic by creation order)
    // ========================================================================

    /// Number of tokens ever deployed
    pub fn token_count(&self) -> usize {
        self.records.len()
    }

    /// Paginated slice of deployment records in creation order
    pub fn records(&self, offset: usize, limit: usize) -> Vec<TokenRecord> {
        self.records
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// All records deployed by `creator`, in creation order
    pub fn records_by_creator(&self, creator: &Address) -> Vec<TokenRecord> {
        self.records
            .iter()
            .filter(|r| r.creator == *creator)
            .cloned()
            .collect()
    }

    /// Record at a creation-order index
    pub fn get_by_index(&self, index: usize) -> Option<&TokenRecord> {
        self.records.get(index)
    }

    /// Deployed token by id
    pub fn get(&self, token_id: &TokenId) -> Option<&IssuanceToken> {
        self.tokens.get(token_id)
    }

    /// Mutable deployed token by id
    pub fn get_mut(&mut self, token_id: &TokenId) -> Option<&mut IssuanceToken> {
        self.tokens.get_mut(token_id)
    }

    /// Deterministic id from the deployment inputs and registry position.
    fn derive_token_id(
        &self,
        name: &str,
        symbol: &str,
        creator: &Address,
        now: Timestamp,
    ) -> TokenId {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(creator.as_bytes());
        hasher.update((self.records.len() as u64).to_be_bytes());
        hasher.update(now.to_be_bytes());
        TokenId::new(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn factory(required_burn: Amount) -> TokenFactory {
        let mut gate = GateToken::new("GATE");
        gate.mint(addr(1), 10_000).unwrap();
        TokenFactory::new(
            addr(0xfa),
            addr(0xaa),
            addr(0xee),
            gate,
            FactoryConfig {
                required_burn_amount: required_burn,
                per_action_amount: 5,
                cooldown_secs: 30,
            },
        )
    }

    #[test]
    fn test_create_token_burns_and_registers() {
        let mut f = factory(1_000);
        f.gate.approve(addr(1), addr(0xfa), 1_000);

        let id = f
            .create_token(addr(1), "Alpha".to_string(), "ALPHA".to_string(), 50_000, 99)
            .unwrap();

        assert_eq!(f.gate.balance_of(&addr(1)), 9_000);
        assert_eq!(f.token_count(), 1);

        let token = f.get(&id).unwrap();
        assert_eq!(token.max_supply, 50_000);
        assert_eq!(token.per_action_amount, 5);
        assert_eq!(token.cooldown_secs, 30);
        assert_eq!(token.settlement_authority, addr(0xee));

        let events = f.take_events();
        assert!(matches!(
            events[0],
            ChainEvent::TokenDeployed { total_supply: 50_000, .. }
        ));
    }

    #[test]
    fn test_create_token_gate_failures() {
        let mut f = factory(1_000);

        // No approval yet: allowance failure even though balance is ample.
        assert_eq!(
            f.create_token(addr(1), "Alpha".to_string(), "A".to_string(), 1_000, 0),
            Err(ChainError::InsufficientAllowance {
                have: 0,
                need: 1_000
            })
        );

        // Approved but broke: balance failure.
        f.gate.approve(addr(2), addr(0xfa), 1_000);
        assert_eq!(
            f.create_token(addr(2), "Beta".to_string(), "B".to_string(), 1_000, 0),
            Err(ChainError::InsufficientBalance { have: 0, need: 1_000 })
        );

        assert_eq!(f.token_count(), 0);
    }

    #[test]
    fn test_set_required_burn_amount_owner_only() {
        let mut f = factory(1_000);

        assert!(matches!(
            f.set_required_burn_amount(addr(1), 5),
            Err(ChainError::Unauthorized(_))
        ));

        f.set_required_burn_amount(addr(0xaa), 5).unwrap();
        assert_eq!(f.required_burn_amount, 5);
        assert_eq!(
            f.take_events(),
            vec![ChainEvent::BurnAmountChanged { old: 1_000, new: 5 }]
        );
    }

    #[test]
    fn test_registry_reads_are_creation_ordered() {
        let mut f = factory(0);
        for (i, sym) in ["A", "B", "C"].iter().enumerate() {
            f.create_token(
                addr(if i == 1 { 2 } else { 1 }),
                format!("Token {}", sym),
                sym.to_string(),
                1_000,
                i as Timestamp,
            )
            .unwrap();
        }

        assert_eq!(f.token_count(), 3);

        let page = f.records(1, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].symbol, "B");
        assert!(f.records(5, 10).is_empty());

        let mine = f.records_by_creator(&addr(1));
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].symbol, "A");
        assert_eq!(mine[1].symbol, "C");

        assert_eq!(f.get_by_index(2).unwrap().symbol, "C");
        assert!(f.get_by_index(3).is_none());
    }

    #[test]
    fn test_token_ids_are_unique_per_deployment() {
        let mut f = factory(0);
        let a = f
            .create_token(addr(1), "Same".to_string(), "SAME".to_string(), 10, 7)
            .unwrap();
        let b = f
            .create_token(addr(1), "Same".to_string(), "SAME".to_string(), 10, 7)
            .unwrap();
        assert_ne!(a, b);
    }
}
