//! Bounded-supply issuance token contract.
//!
//! Implements the per-token supply state machine:
//! Active → Exhausted (terminal)
//!
//! # Invariants
//! - `total_minted <= max_supply` at all times, across both mint paths
//! - The mint that would cross the cap is truncated to the remaining
//!   supply, never rejected while any supply remains
//! - The direct path enforces a per-caller cooldown; the batch path does
//!   not (aggregation already rate-limited the underlying actions)
//! - All amount arithmetic is checked integer math

use crate::errors::{ChainError, Result};
use crate::events::ChainEvent;
use lib_types::{Address, Amount, Timestamp, TokenId, AMOUNT_DECIMALS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum symbol length accepted at deployment
pub const MAX_SYMBOL_LEN: usize = 10;

/// Issuance lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuancePhase {
    /// Supply remains; minting allowed
    Active,
    /// `total_minted == max_supply`; terminal
    Exhausted,
}

/// Per-user issuance statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinterStats {
    /// Current token balance
    pub balance: Amount,
    /// Total ever minted to this user across both paths
    pub cumulative_minted: Amount,
    /// Last direct mint time (zero if never)
    pub last_mint_at: Timestamp,
}

/// Read-only token summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_id: TokenId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub max_supply: Amount,
    pub per_action_amount: Amount,
    pub cooldown_secs: u64,
    pub total_minted: Amount,
    pub phase: IssuancePhase,
}

/// Bounded-supply issuance token
///
/// The authoritative ledger for one token. All mutating entry points go
/// through the owning [`crate::ChainNode`], which linearizes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceToken {
    // === Identity ===
    /// Unique token identifier
    pub token_id: TokenId,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Fractional digits (fixed at 18)
    pub decimals: u8,

    // === Immutable issuance parameters ===
    /// Hard supply cap in atomic units
    pub max_supply: Amount,
    /// Amount minted per earn action
    pub per_action_amount: Amount,
    /// Seconds a caller must wait between direct mints
    pub cooldown_secs: u64,
    /// Only this address may call the batch entry point
    pub settlement_authority: Address,

    // === Mutable issuance state ===
    /// Lifecycle phase
    pub phase: IssuancePhase,
    /// Monotonic minted total, never exceeds `max_supply`
    pub total_minted: Amount,
    balances: HashMap<Address, Amount>,
    cumulative_minted: HashMap<Address, Amount>,
    last_mint_at: HashMap<Address, Timestamp>,

    // === Metadata ===
    /// Deploying address
    pub creator: Address,
    /// Deployment timestamp
    pub created_at: Timestamp,

    /// Events emitted since the last drain
    #[serde(skip)]
    events: Vec<ChainEvent>,
}

impl IssuanceToken {
    /// Deploy a new issuance token.
    ///
    /// Validates parameters; state starts Active with zero minted.
    #[allow(clippy::too_many_arguments)]
    pub fn deploy(
        token_id: TokenId,
        name: String,
        symbol: String,
        max_supply: Amount,
        per_action_amount: Amount,
        cooldown_secs: u64,
        settlement_authority: Address,
        creator: Address,
        created_at: Timestamp,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(ChainError::InvalidParameters(
                "name cannot be empty".to_string(),
            ));
        }
        if symbol.is_empty() {
            return Err(ChainError::InvalidParameters(
                "symbol cannot be empty".to_string(),
            ));
        }
        if symbol.len() > MAX_SYMBOL_LEN {
            return Err(ChainError::InvalidParameters(format!(
                "symbol too long (max {})",
                MAX_SYMBOL_LEN
            )));
        }
        if max_supply == 0 {
            return Err(ChainError::InvalidParameters(
                "max supply must be positive".to_string(),
            ));
        }
        if per_action_amount == 0 {
            return Err(ChainError::InvalidParameters(
                "per-action amount must be positive".to_string(),
            ));
        }

        Ok(Self {
            token_id,
            name,
            symbol,
            decimals: AMOUNT_DECIMALS,
            max_supply,
            per_action_amount,
            cooldown_secs,
            settlement_authority,
            phase: IssuancePhase::Active,
            total_minted: 0,
            balances: HashMap::new(),
            cumulative_minted: HashMap::new(),
            last_mint_at: HashMap::new(),
            creator,
            created_at,
            events: Vec::new(),
        })
    }

    // ========================================================================
    // MINT ENTRY POINTS
    // ========================================================================

    /// Direct mint path: one earn action settled immediately for the caller.
    ///
    /// Mints `min(per_action_amount, remaining_supply)`: the final mint is
    /// truncated to the remaining cap, never rejected while supply remains.
    ///
    /// # Errors
    /// - [`ChainError::ExhaustedSupply`] once the cap is reached
    /// - [`ChainError::CooldownActive`] within `cooldown_secs` of the
    ///   caller's previous direct mint
    pub fn mint_for_caller(&mut self, caller: Address, now: Timestamp) -> Result<Amount> {
        if self.phase == IssuancePhase::Exhausted {
            return Err(ChainError::ExhaustedSupply {
                total_minted: self.total_minted,
            });
        }

        if let Some(&last) = self.last_mint_at.get(&caller) {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.cooldown_secs {
                return Err(ChainError::CooldownActive {
                    remaining_secs: self.cooldown_secs - elapsed,
                });
            }
        }

        // Active phase guarantees remaining > 0, so credit is never zero.
        let credit = self.per_action_amount.min(self.remaining_supply());
        self.credit(caller, credit, now)?;
        self.last_mint_at.insert(caller, now);

        Ok(credit)
    }

    /// Batch mint path: settle aggregated off-chain actions.
    ///
    /// Restricted to the settlement authority. Pairs are credited in order
    /// with per-entry cap truncation; entries past exhaustion settle to
    /// zero rather than failing the call. No cooldown applies here.
    ///
    /// Returns the amount actually credited per entry.
    ///
    /// # Errors
    /// - [`ChainError::Unauthorized`] for any other caller
    /// - [`ChainError::MalformedBatch`] when the arrays differ in length
    pub fn process_batch(
        &mut self,
        caller: Address,
        users: &[Address],
        amounts: &[Amount],
        now: Timestamp,
    ) -> Result<Vec<Amount>> {
        if caller != self.settlement_authority {
            return Err(ChainError::Unauthorized(
                "caller is not the settlement authority".to_string(),
            ));
        }
        if users.len() != amounts.len() {
            return Err(ChainError::MalformedBatch {
                users: users.len(),
                amounts: amounts.len(),
            });
        }

        let mut credited = Vec::with_capacity(users.len());
        for (user, &amount) in users.iter().zip(amounts.iter()) {
            let credit = amount.min(self.remaining_supply());
            if credit > 0 {
                self.credit(*user, credit, now)?;
            }
            credited.push(credit);
        }

        Ok(credited)
    }

    /// Apply a credit and emit events; transitions to Exhausted at the cap.
    fn credit(&mut self, user: Address, amount: Amount, now: Timestamp) -> Result<()> {
        let balance = self.balances.entry(user).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(ChainError::Overflow)?;

        let cumulative = self.cumulative_minted.entry(user).or_insert(0);
        *cumulative = cumulative.checked_add(amount).ok_or(ChainError::Overflow)?;

        self.total_minted = self
            .total_minted
            .checked_add(amount)
            .ok_or(ChainError::Overflow)?;
        debug_assert!(self.total_minted <= self.max_supply);

        self.events.push(ChainEvent::ActionProcessed {
            user,
            amount,
            timestamp: now,
        });

        if self.total_minted == self.max_supply {
            self.phase = IssuancePhase::Exhausted;
            self.events.push(ChainEvent::SupplyExhausted {
                total_minted: self.total_minted,
                timestamp: now,
            });
        }

        Ok(())
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    /// Supply still mintable before the cap
    pub fn remaining_supply(&self) -> Amount {
        self.max_supply.saturating_sub(self.total_minted)
    }

    /// Current balance of a user
    pub fn balance_of(&self, user: &Address) -> Amount {
        self.balances.get(user).copied().unwrap_or(0)
    }

    /// Whether a direct mint by `user` would succeed right now
    pub fn can_mint(&self, user: &Address, now: Timestamp) -> bool {
        self.phase == IssuancePhase::Active && self.cooldown_remaining(user, now) == 0
    }

    /// Seconds until `user` may direct-mint again (zero when ready)
    pub fn cooldown_remaining(&self, user: &Address, now: Timestamp) -> u64 {
        match self.last_mint_at.get(user) {
            Some(&last) => self.cooldown_secs.saturating_sub(now.saturating_sub(last)),
            None => 0,
        }
    }

    /// Per-user issuance statistics
    pub fn minter_stats(&self, user: &Address) -> MinterStats {
        MinterStats {
            balance: self.balance_of(user),
            cumulative_minted: self.cumulative_minted.get(user).copied().unwrap_or(0),
            last_mint_at: self.last_mint_at.get(user).copied().unwrap_or(0),
        }
    }

    /// Read-only summary of the token
    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            token_id: self.token_id,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            max_supply: self.max_supply,
            per_action_amount: self.per_action_amount,
            cooldown_secs: self.cooldown_secs,
            total_minted: self.total_minted,
            phase: self.phase,
        }
    }

    /// Drain events emitted since the last call
    pub fn take_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn token(max_supply: Amount, per_action: Amount, cooldown: u64) -> IssuanceToken {
        IssuanceToken::deploy(
            TokenId::new([1; 32]),
            "Test Token".to_string(),
            "TST".to_string(),
            max_supply,
            per_action,
            cooldown,
            addr(0xee),
            addr(0xcc),
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn test_deploy_rejects_bad_parameters() {
        let deploy = |name: &str, symbol: &str, max: Amount, per: Amount| {
            IssuanceToken::deploy(
                TokenId::zero(),
                name.to_string(),
                symbol.to_string(),
                max,
                per,
                60,
                addr(0xee),
                addr(0xcc),
                0,
            )
        };

        assert!(matches!(
            deploy("", "TST", 100, 1),
            Err(ChainError::InvalidParameters(_))
        ));
        assert!(matches!(
            deploy("Test", "TOOLONGSYMBOL", 100, 1),
            Err(ChainError::InvalidParameters(_))
        ));
        assert!(matches!(
            deploy("Test", "TST", 0, 1),
            Err(ChainError::InvalidParameters(_))
        ));
        assert!(matches!(
            deploy("Test", "TST", 100, 0),
            Err(ChainError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_final_mint_truncates_to_cap() {
        // max 1001, per-action 1000: two mints fill the cap exactly.
        let mut t = token(1001, 1000, 0);

        assert_eq!(t.mint_for_caller(addr(1), 10).unwrap(), 1000);
        assert_eq!(t.mint_for_caller(addr(2), 20).unwrap(), 1);
        assert_eq!(t.balance_of(&addr(1)), 1000);
        assert_eq!(t.balance_of(&addr(2)), 1);
        assert_eq!(t.total_minted, 1001);
        assert_eq!(t.phase, IssuancePhase::Exhausted);

        assert_eq!(
            t.mint_for_caller(addr(3), 30),
            Err(ChainError::ExhaustedSupply { total_minted: 1001 })
        );
    }

    #[test]
    fn test_cooldown_blocks_until_elapsed() {
        let mut t = token(1_000_000, 10, 60);

        t.mint_for_caller(addr(1), 100).unwrap();
        assert_eq!(
            t.mint_for_caller(addr(1), 130),
            Err(ChainError::CooldownActive { remaining_secs: 30 })
        );
        assert_eq!(t.cooldown_remaining(&addr(1), 130), 30);
        assert!(!t.can_mint(&addr(1), 159));

        // Exactly one cooldown later the mint goes through.
        assert_eq!(t.mint_for_caller(addr(1), 160).unwrap(), 10);

        // Cooldown is per-caller: another user is unaffected.
        assert_eq!(t.mint_for_caller(addr(2), 130).unwrap(), 10);
    }

    #[test]
    fn test_batch_requires_authority_and_shape() {
        let mut t = token(1_000, 10, 0);

        assert!(matches!(
            t.process_batch(addr(9), &[addr(1)], &[10], 50),
            Err(ChainError::Unauthorized(_))
        ));
        assert_eq!(
            t.process_batch(addr(0xee), &[addr(1), addr(2)], &[10], 50),
            Err(ChainError::MalformedBatch {
                users: 2,
                amounts: 1
            })
        );
        // Failed calls left state untouched.
        assert_eq!(t.total_minted, 0);
    }

    #[test]
    fn test_batch_truncates_and_zero_settles_past_cap() {
        let mut t = token(100, 10, 0);

        let credited = t
            .process_batch(
                addr(0xee),
                &[addr(1), addr(2), addr(3)],
                &[60, 60, 60],
                50,
            )
            .unwrap();

        // Entry 2 is truncated to the remaining 40; entry 3 settles to zero.
        assert_eq!(credited, vec![60, 40, 0]);
        assert_eq!(t.total_minted, 100);
        assert_eq!(t.phase, IssuancePhase::Exhausted);
        assert_eq!(t.balance_of(&addr(3)), 0);

        // No cooldown on the batch path: same users again, all zero now.
        let again = t
            .process_batch(addr(0xee), &[addr(1)], &[10], 51)
            .unwrap();
        assert_eq!(again, vec![0]);
    }

    #[test]
    fn test_both_paths_share_the_cap() {
        let mut t = token(100, 30, 0);

        t.mint_for_caller(addr(1), 10).unwrap();
        t.process_batch(addr(0xee), &[addr(2)], &[50], 20).unwrap();
        assert_eq!(t.total_minted, 80);

        // Direct path truncates against what the batch path already minted.
        assert_eq!(t.mint_for_caller(addr(3), 30).unwrap(), 20);
        assert_eq!(t.total_minted, 100);
        assert_eq!(t.phase, IssuancePhase::Exhausted);
    }

    #[test]
    fn test_events_track_mints_and_exhaustion() {
        let mut t = token(15, 10, 0);

        t.mint_for_caller(addr(1), 5).unwrap();
        t.mint_for_caller(addr(2), 6).unwrap();

        let events = t.take_events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ChainEvent::ActionProcessed {
                user: addr(1),
                amount: 10,
                timestamp: 5
            }
        );
        assert_eq!(
            events[2],
            ChainEvent::SupplyExhausted {
                total_minted: 15,
                timestamp: 6
            }
        );
        assert!(t.take_events().is_empty());
    }

    #[test]
    fn test_minter_stats() {
        let mut t = token(1_000, 10, 60);
        t.mint_for_caller(addr(1), 100).unwrap();
        t.process_batch(addr(0xee), &[addr(1)], &[25], 110).unwrap();

        let stats = t.minter_stats(&addr(1));
        assert_eq!(stats.balance, 35);
        assert_eq!(stats.cumulative_minted, 35);
        // Batch credits do not touch the direct-mint cooldown clock.
        assert_eq!(stats.last_mint_at, 100);
    }
}
