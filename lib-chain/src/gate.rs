//! Burn-gate token ledger.
//!
//! Tracks balances and spender allowances of the token that gates factory
//! deployments. This is deliberately not a general transfer token: the only
//! movement is `burn_from`, which the factory uses to destroy the deposit.

use crate::errors::{ChainError, Result};
use lib_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balance and allowance ledger for the gating token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateToken {
    /// Token symbol, for logs and summaries
    pub symbol: String,
    /// Circulating supply
    pub total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<Address, HashMap<Address, Amount>>,
}

impl GateToken {
    /// Create an empty gate ledger
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Credit `to` with newly issued gate tokens
    pub fn mint(&mut self, to: Address, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(ChainError::Overflow)?;
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ChainError::Overflow)?;
        Ok(())
    }

    /// Current balance of an account
    pub fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Set `spender`'s allowance over `owner`'s balance
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);
    }

    /// Remaining allowance of `spender` over `owner`'s balance
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Destroy `amount` of `owner`'s balance on behalf of `spender`.
    ///
    /// Allowance is checked before balance, so an under-approved caller sees
    /// [`ChainError::InsufficientAllowance`] even with sufficient funds.
    pub fn burn_from(&mut self, spender: Address, owner: Address, amount: Amount) -> Result<()> {
        let allowed = self.allowance(&owner, &spender);
        if allowed < amount {
            return Err(ChainError::InsufficientAllowance {
                have: allowed,
                need: amount,
            });
        }

        let balance = self.balance_of(&owner);
        if balance < amount {
            return Err(ChainError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }

        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, allowed - amount);
        self.balances.insert(owner, balance - amount);
        self.total_supply = self.total_supply.saturating_sub(amount);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    #[test]
    fn test_burn_from_consumes_allowance_and_balance() {
        let mut gate = GateToken::new("GATE");
        gate.mint(addr(1), 100).unwrap();
        gate.approve(addr(1), addr(9), 60);

        gate.burn_from(addr(9), addr(1), 40).unwrap();
        assert_eq!(gate.balance_of(&addr(1)), 60);
        assert_eq!(gate.allowance(&addr(1), &addr(9)), 20);
        assert_eq!(gate.total_supply, 60);
    }

    #[test]
    fn test_allowance_checked_before_balance() {
        let mut gate = GateToken::new("GATE");
        gate.mint(addr(1), 100).unwrap();
        gate.approve(addr(1), addr(9), 10);

        // Balance would cover it; allowance does not.
        assert_eq!(
            gate.burn_from(addr(9), addr(1), 50),
            Err(ChainError::InsufficientAllowance { have: 10, need: 50 })
        );

        // Converse: allowance covers it, balance does not.
        gate.approve(addr(1), addr(9), 500);
        assert_eq!(
            gate.burn_from(addr(9), addr(1), 200),
            Err(ChainError::InsufficientBalance {
                have: 100,
                need: 200
            })
        );

        // Failed burns left everything untouched.
        assert_eq!(gate.balance_of(&addr(1)), 100);
        assert_eq!(gate.total_supply, 100);
    }
}
