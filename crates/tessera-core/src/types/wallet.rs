//! Wallet - per-user token balance
//!
//! One wallet per user. Key characteristics:
//! - Balance in integer minor units, never negative
//! - Frozen flag for compliance holds
//! - Version field for optimistic concurrency
//!
//! A wallet is only ever mutated through the ledger's transfer path; these
//! methods are the building blocks that path uses.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::money::TokenAmount;

/// Wallet operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("Wallet {wallet_id} is frozen")]
    Frozen { wallet_id: Uuid },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Wallet {wallet_id} still holds a balance of {balance}")]
    NonZeroBalance {
        wallet_id: Uuid,
        balance: TokenAmount,
    },
}

/// Token wallet for a single user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning user id
    pub user_id: Uuid,

    /// Balance in minor units, `>= 0` always
    pub balance: TokenAmount,

    /// Compliance hold: a frozen wallet rejects all transfers
    pub frozen: bool,

    /// Version for optimistic concurrency control
    pub version: u64,

    /// Timestamp of creation (Unix milliseconds)
    pub created_at: i64,

    /// Timestamp of last modification
    pub updated_at: i64,
}

impl Wallet {
    /// Create a new empty wallet for a user
    pub fn new(user_id: Uuid) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id,
            balance: 0,
            frozen: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the wallet can cover `amount` right now
    #[inline]
    pub fn can_cover(&self, amount: TokenAmount) -> bool {
        !self.frozen && self.balance >= amount
    }

    /// Credit minor units to the wallet
    pub fn credit(&mut self, amount: TokenAmount) -> Result<(), WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        if self.frozen {
            return Err(WalletError::Frozen {
                wallet_id: self.user_id,
            });
        }

        self.balance += amount;
        self.touch();
        Ok(())
    }

    /// Debit minor units from the wallet
    pub fn debit(&mut self, amount: TokenAmount) -> Result<(), WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        if self.frozen {
            return Err(WalletError::Frozen {
                wallet_id: self.user_id,
            });
        }
        if self.balance < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        self.touch();
        Ok(())
    }

    /// Place a compliance hold on the wallet
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.touch();
    }

    /// Lift a compliance hold
    pub fn unfreeze(&mut self) {
        self.frozen = false;
        self.touch();
    }

    /// Check version for optimistic concurrency
    pub fn check_version(&self, expected: u64) -> Result<(), WalletError> {
        if self.version != expected {
            return Err(WalletError::VersionConflict {
                expected,
                found: self.version,
            });
        }
        Ok(())
    }

    /// Update version and timestamp
    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl std::fmt::Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Wallet(user={}, balance={}, frozen={})",
            self.user_id, self.balance, self.frozen
        )
    }
}
