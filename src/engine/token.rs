// ============================================================================
// Token Ledger - Fungible Token Interface & In-Process Book Ledger
// ============================================================================
//
// The settlement engine treats the token as an opaque ledger: stakes are
// pulled in through transfer_from (allowance-gated) and pools are paid out
// through transfer. Every movement is all-or-nothing; a failed transfer
// leaves both balances untouched.
//
// Amounts are token base units (e.g. 100_000_000 for 100 USDC at 6 decimals
// would be 100_000_000 micro-units).
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fungible token operations the settlement engine depends on.
pub trait TokenLedger: Send + Sync {
    /// Pull `amount` from `owner` into `to`, consuming the allowance `owner`
    /// granted to `to`.
    fn transfer_from(&mut self, owner: &str, to: &str, amount: u64) -> Result<(), TokenError>;

    /// Move `amount` out of `from`'s own balance into `to`.
    fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TokenError>;

    /// Current balance, zero for unknown accounts.
    fn balance_of(&self, account: &str) -> u64;
}

/// Rejection reasons from the token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TokenError {
    InsufficientBalance {
        account: String,
        have: u64,
        need: u64,
    },
    InsufficientAllowance {
        owner: String,
        spender: String,
        have: u64,
        need: u64,
    },
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::InsufficientBalance { account, have, need } => {
                write!(f, "insufficient balance: {} has {}, needs {}", account, have, need)
            }
            TokenError::InsufficientAllowance { owner, spender, have, need } => {
                write!(
                    f,
                    "insufficient allowance: {} may pull {} from {}, needs {}",
                    spender, have, owner, need
                )
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// In-process fungible token book with ERC-20 style allowances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookLedger {
    balances: HashMap<String, u64>,
    /// owner -> spender -> remaining allowance
    allowances: HashMap<String, HashMap<String, u64>>,
}

impl BookLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly minted tokens to an account, creating it if needed.
    pub fn mint(&mut self, account: &str, amount: u64) {
        *self.balances.entry(account.to_string()).or_insert(0) += amount;
    }

    /// Grant `spender` the right to pull up to `amount` from `owner`.
    /// Overwrites any previous grant.
    pub fn approve(&mut self, owner: &str, spender: &str, amount: u64) {
        self.allowances
            .entry(owner.to_string())
            .or_default()
            .insert(spender.to_string(), amount);
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|per_spender| per_spender.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn has_account(&self, account: &str) -> bool {
        self.balances.contains_key(account)
    }
}

impl TokenLedger for BookLedger {
    fn transfer_from(&mut self, owner: &str, to: &str, amount: u64) -> Result<(), TokenError> {
        let allowed = self.allowance(owner, to);
        if amount > allowed {
            return Err(TokenError::InsufficientAllowance {
                owner: owner.to_string(),
                spender: to.to_string(),
                have: allowed,
                need: amount,
            });
        }
        let have = self.balance_of(owner);
        if amount > have {
            return Err(TokenError::InsufficientBalance {
                account: owner.to_string(),
                have,
                need: amount,
            });
        }

        if let Some(per_spender) = self.allowances.get_mut(owner) {
            per_spender.insert(to.to_string(), allowed - amount);
        }
        *self.balances.entry(owner.to_string()).or_insert(0) -= amount;
        *self.balances.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }

    fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TokenError> {
        let have = self.balance_of(from);
        if amount > have {
            return Err(TokenError::InsufficientBalance {
                account: from.to_string(),
                have,
                need: amount,
            });
        }
        *self.balances.entry(from.to_string()).or_insert(0) -= amount;
        *self.balances.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }

    fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_balance() {
        let mut ledger = BookLedger::new();
        ledger.mint("alice", 500);
        ledger.mint("alice", 250);
        assert_eq!(ledger.balance_of("alice"), 750);
        assert_eq!(ledger.balance_of("nobody"), 0);
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut ledger = BookLedger::new();
        ledger.mint("alice", 1000);
        ledger.approve("alice", "escrow", 300);

        ledger.transfer_from("alice", "escrow", 200).unwrap();
        assert_eq!(ledger.balance_of("alice"), 800);
        assert_eq!(ledger.balance_of("escrow"), 200);
        assert_eq!(ledger.allowance("alice", "escrow"), 100);

        let err = ledger.transfer_from("alice", "escrow", 200).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { .. }));
        assert_eq!(ledger.balance_of("alice"), 800);
    }

    #[test]
    fn transfer_from_checks_balance_after_allowance() {
        let mut ledger = BookLedger::new();
        ledger.mint("alice", 50);
        ledger.approve("alice", "escrow", 100);

        let err = ledger.transfer_from("alice", "escrow", 80).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { .. }));
        // allowance untouched on failure
        assert_eq!(ledger.allowance("alice", "escrow"), 100);
    }

    #[test]
    fn direct_transfer() {
        let mut ledger = BookLedger::new();
        ledger.mint("escrow", 400);

        ledger.transfer("escrow", "bob", 400).unwrap();
        assert_eq!(ledger.balance_of("escrow"), 0);
        assert_eq!(ledger.balance_of("bob"), 400);

        let err = ledger.transfer("escrow", "bob", 1).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { .. }));
    }
}
