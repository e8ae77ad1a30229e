//! # Tessera Core
//!
//! Shared types, errors, and money primitives for the Tessera billing
//! engine.
//!
//! ## Core Types
//!
//! - [`TokenAmount`]: integer minor-unit amount, the only money type
//! - [`Wallet`]: per-user balance with optimistic-concurrency version
//! - [`ParticipantProfile`]: session-start snapshot of a participant
//! - [`RevenueSplit`]: exact earner/platform split of one charge
//!
//! ## Invariants carried by these types
//!
//! - Balances never go negative and are only mutated by the ledger
//! - Splits always sum exactly to the charged amount
//! - Participant flags are frozen into the session at start

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{EngineError, EscrowError, LedgerError, PricingError, Result, SessionError};
pub use types::{
    money::{fraction_floor, split_revenue, RevenueSplit, TokenAmount},
    participant::{
        AsymmetricPairing, CategoryId, ParticipantProfile, SessionType, SubscriptionTier,
        TieBreakPolicy,
    },
    wallet::{Wallet, WalletError},
};

/// Tessera version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Milliseconds per billable call minute
pub const MS_PER_MINUTE: i64 = 60_000;

/// Default idle window before a session is aborted (2 minutes)
pub const DEFAULT_IDLE_TIMEOUT_MS: i64 = 120_000;

/// Default bounded retry budget for transient ledger conflicts
pub const DEFAULT_MAX_TRANSFER_RETRIES: u32 = 3;
