//! # Tessera Billing
//!
//! Billing orchestration for the Tessera token engine: who pays, who
//! earns, how much, and when.
//!
//! ## Components
//!
//! - **Pricing**: per-tier price tables, pure lookup
//! - **Roles**: deterministic payer/earner resolution
//! - **Metering**: word buckets for chat, started minutes for calls
//! - **Orchestrator**: session state machine driving ledger ticks
//! - **Escrow**: held booking funds between payment and fulfillment
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BillingEngine                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────────────┐  ┌──────────────┐  │
//! │  │  Roles +  │  │ BillingOrchestrator  │  │EscrowManager │  │
//! │  │  Pricing  │──│ (sessions + meters)  │  │ (bookings)   │  │
//! │  └───────────┘  └──────────┬───────────┘  └──────┬───────┘  │
//! │                            │       Ledger        │          │
//! │                            └─────────┬───────────┘          │
//! └──────────────────────────────────────┼──────────────────────┘
//!                                        ▼
//!                            single writer path for balances
//! ```

pub mod config;
pub mod escrow;
pub mod metering;
pub mod orchestrator;
pub mod pricing;
pub mod roles;
pub mod session;

pub use config::EngineConfig;
pub use escrow::{BookingOutcome, EscrowManager, EscrowRecord, EscrowStatus};
pub use metering::{billable_word_count, UsageMeter};
pub use orchestrator::{BillingOrchestrator, UsageDelta, UsageOutcome};
pub use pricing::{CallPricing, ChatPricing, PricingRules};
pub use roles::{RoleAssignment, RoleResolver};
pub use session::{BillingSession, EndReason, FinalBillingSummary, SessionHandle, SessionState};

use std::sync::Arc;

use uuid::Uuid;

use tessera_core::{EngineError, ParticipantProfile, Result, SessionType, TokenAmount};
use tessera_ledger::Ledger;

/// The billing engine facade consumed by chat, call, and booking services
///
/// All five external operations plus wallet access go through here; the
/// hosting service owns user-facing messaging for every error this
/// returns.
pub struct BillingEngine {
    config: Arc<EngineConfig>,
    ledger: Arc<Ledger>,
    orchestrator: Arc<BillingOrchestrator>,
    escrow: Arc<EscrowManager>,
}

impl BillingEngine {
    /// Build an engine from configuration and a pricing table
    pub fn new(config: EngineConfig, rules: PricingRules) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        rules.validate()?;

        let config = Arc::new(config);
        let rules = Arc::new(rules);
        let ledger = Arc::new(Ledger::default());
        let orchestrator = Arc::new(BillingOrchestrator::new(
            ledger.clone(),
            rules.clone(),
            config.clone(),
        ));
        let escrow = Arc::new(EscrowManager::new(ledger.clone(), config.clone()));

        Ok(Self {
            config,
            ledger,
            orchestrator,
            escrow,
        })
    }

    /// Engine with default configuration and built-in pricing
    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default(), PricingRules::defaults())
    }

    // ------------------------------------------------------------------
    // External API
    // ------------------------------------------------------------------

    /// Start a paid session; fails before it becomes active when the
    /// payer cannot cover one billing unit
    pub async fn start_session(
        &self,
        session_type: SessionType,
        a: &ParticipantProfile,
        b: &ParticipantProfile,
        initiator: Uuid,
    ) -> Result<SessionHandle> {
        self.orchestrator
            .start_session(session_type, a, b, initiator)
    }

    /// Report usage; ticks internally when thresholds are met
    pub async fn record_usage(&self, session_id: Uuid, delta: UsageDelta) -> Result<UsageOutcome> {
        self.orchestrator.record_usage(session_id, delta)
    }

    /// Close a session and settle the final tick
    pub async fn end_session(&self, session_id: Uuid) -> Result<FinalBillingSummary> {
        self.orchestrator.end_session(session_id)
    }

    /// Capture a booking payment into escrow
    pub async fn create_booking(
        &self,
        payer: Uuid,
        earner: Uuid,
        amount: TokenAmount,
    ) -> Result<EscrowRecord> {
        self.escrow.hold(Uuid::new_v4(), payer, earner, amount)
    }

    /// Resolve a booking with a release or (partial) refund
    pub async fn resolve_booking(
        &self,
        escrow_id: Uuid,
        outcome: BookingOutcome,
    ) -> Result<EscrowRecord> {
        self.escrow.resolve(escrow_id, outcome)
    }

    /// Spawn the idle-timeout failsafe task
    pub fn start_idle_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.orchestrator.clone().start_idle_sweeper()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The wallet ledger (deposits, balances, history, audits)
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The session orchestrator
    pub fn orchestrator(&self) -> &Arc<BillingOrchestrator> {
        &self.orchestrator
    }

    /// The escrow manager
    pub fn escrow_manager(&self) -> &Arc<EscrowManager> {
        &self.escrow
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
