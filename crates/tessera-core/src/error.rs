//! Error types for the Tessera billing engine
//!
//! Provides a unified error type and domain-specific error variants. All
//! expected outcomes (insufficient funds, frozen wallets, late ticks) are
//! typed results; nothing here is used for control flow via panics.

use thiserror::Error;
use uuid::Uuid;

use crate::types::participant::{SessionType, SubscriptionTier};
use crate::types::wallet::WalletError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    // Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // Session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // Escrow errors
    #[error("Escrow error: {0}")]
    Escrow(#[from] EscrowError),

    // Pricing errors
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wallet-ledger errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Wallet {wallet_id} not found")]
    WalletNotFound { wallet_id: Uuid },

    #[error("Transaction {transaction_id} already committed with different parameters")]
    IdempotencyConflict { transaction_id: String },

    #[error("Contention on wallet {wallet_id}: serialization attempt timed out")]
    ConcurrentModification { wallet_id: Uuid },
}

impl LedgerError {
    /// The payer cannot cover the requested amount
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, LedgerError::Wallet(WalletError::InsufficientFunds { .. }))
    }

    /// Safe to retry a bounded number of times
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::ConcurrentModification { .. })
    }
}

/// Billing-session errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {session_id} not found")]
    NotFound { session_id: Uuid },

    #[error("Session {session_id} is {state}, operation not allowed")]
    InvalidState { session_id: Uuid, state: String },

    #[error("Initiator {initiator} is not a participant of the session")]
    InitiatorNotParticipant { initiator: Uuid },
}

/// Escrow errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("Escrow {escrow_id} not found")]
    NotFound { escrow_id: Uuid },

    #[error("Escrow {escrow_id} already resolved as {status}")]
    AlreadyResolved { escrow_id: Uuid, status: String },

    #[error("Refund fraction {fraction} outside [0, 1]")]
    InvalidRefundFraction { fraction: String },
}

/// Pricing lookup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("No rate configured for {session_type:?} at tier {tier:?}")]
    RateNotConfigured {
        session_type: SessionType,
        tier: SubscriptionTier,
    },

    #[error("Pricing table rejected: {0}")]
    InvalidTable(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
