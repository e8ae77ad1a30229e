//! Billing session state
//!
//! One session per paid interaction. Roles and the unit price are
//! resolved once at creation and frozen; account-flag changes are picked
//! up by the next session, never retroactively.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_core::{SessionType, SubscriptionTier, TokenAmount};

use crate::metering::UsageMeter;

/// Session lifecycle: `PendingStart -> Active -> (tick)* -> Ended`, or
/// `Active -> Aborted` via the idle failsafe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    PendingStart,
    Active,
    Ended,
    Aborted,
}

impl SessionState {
    /// Terminal states accept no further billing
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::PendingStart => "pending_start",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a session reached a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Explicit close by the caller
    Completed,
    /// Payer could not cover the next unit
    BalanceExhausted,
    /// No activity within the idle window
    IdleTimeout,
}

/// One active paid interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSession {
    pub session_id: Uuid,
    pub session_type: SessionType,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    /// Frozen at creation
    pub payer: Uuid,
    /// Frozen at creation; `None` means the platform is sole earner
    pub earner: Option<Uuid>,
    pub payer_tier: SubscriptionTier,
    /// Minor units per billing unit (bucket or minute)
    pub price_per_unit: TokenAmount,
    pub meter: UsageMeter,
    pub state: SessionState,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub end_reason: Option<EndReason>,
    /// Running totals across all settled ticks
    pub amount_charged: TokenAmount,
    pub amount_to_earner: TokenAmount,
}

impl BillingSession {
    /// Idempotency-key base for the tick that brings the settled unit
    /// count up to `cumulative_units`
    ///
    /// Derived purely from session id and unit count, so a retried tick
    /// replays instead of double-billing.
    pub fn tick_key(&self, cumulative_units: u64) -> String {
        format!("{}:tick:{}", self.session_id, cumulative_units)
    }

    pub fn units_billed(&self) -> u64 {
        self.meter.units_billed()
    }

    /// Final settlement numbers handed back to the caller
    pub fn summary(&self) -> FinalBillingSummary {
        FinalBillingSummary {
            session_id: self.session_id,
            session_type: self.session_type,
            payer: self.payer,
            earner: self.earner,
            units_billed: self.units_billed(),
            amount_charged: self.amount_charged,
            earner_amount: self.amount_to_earner,
            platform_amount: self.amount_charged - self.amount_to_earner,
            state: self.state,
            end_reason: self.end_reason,
        }
    }
}

/// Returned by `start_session`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub payer: Uuid,
    pub earner: Option<Uuid>,
    pub price_per_unit: TokenAmount,
}

/// Returned by `end_session` and the idle sweeper
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FinalBillingSummary {
    pub session_id: Uuid,
    pub session_type: SessionType,
    pub payer: Uuid,
    pub earner: Option<Uuid>,
    pub units_billed: u64,
    pub amount_charged: TokenAmount,
    pub earner_amount: TokenAmount,
    pub platform_amount: TokenAmount,
    pub state: SessionState,
    pub end_reason: Option<EndReason>,
}
