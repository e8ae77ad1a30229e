//! Immutable ledger transaction records
//!
//! A record is written once and never updated or deleted; corrections are
//! new transactions. The `transaction_id` is the idempotency key: replaying
//! it must produce identical state, and replaying it with different
//! parameters is a caller bug.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_core::TokenAmount;

/// What a transaction paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Chat,
    Call,
    Booking,
    Refund,
    Fee,
    Deposit,
}

/// One committed value movement
///
/// `from_wallet = None` means minted (e.g. a deposit); `to_wallet = None`
/// means burned (e.g. the platform fee sink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Idempotency key, caller-supplied or session-derived
    pub transaction_id: String,
    /// Time-ordered record id assigned at commit
    pub record_id: Uuid,
    pub from_wallet: Option<Uuid>,
    pub to_wallet: Option<Uuid>,
    /// Minor units, always positive
    pub amount: TokenAmount,
    pub kind: TransferKind,
    /// Session or escrow this transaction settles
    pub related_session: Option<Uuid>,
    /// Commit timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl TransactionRecord {
    /// Whether a replayed submission carries the same parameters
    ///
    /// Everything except the commit-assigned fields must match.
    pub fn matches(
        &self,
        from_wallet: Option<Uuid>,
        to_wallet: Option<Uuid>,
        amount: TokenAmount,
        kind: TransferKind,
        related_session: Option<Uuid>,
    ) -> bool {
        self.from_wallet == from_wallet
            && self.to_wallet == to_wallet
            && self.amount == amount
            && self.kind == kind
            && self.related_session == related_session
    }
}

/// One credit leg of an atomic transfer
///
/// A billing tick is usually two legs sharing a `related_session`: the
/// earner share and the platform fee burn. All legs of a batch debit the
/// same payer and commit together or not at all.
#[derive(Debug, Clone)]
pub struct TransferLeg {
    /// Full idempotency key for this leg
    pub transaction_id: String,
    /// Credit target; `None` burns to the platform sink
    pub to_wallet: Option<Uuid>,
    pub amount: TokenAmount,
    pub kind: TransferKind,
}

impl TransferLeg {
    pub fn new(
        transaction_id: impl Into<String>,
        to_wallet: Option<Uuid>,
        amount: TokenAmount,
        kind: TransferKind,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            to_wallet,
            amount,
            kind,
        }
    }
}
