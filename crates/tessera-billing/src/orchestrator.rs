//! Billing orchestrator
//!
//! Coordinates role resolution, metering, pricing lookup, and the ledger
//! into one billing tick per session. Sessions are serialized on a
//! per-session mutex, which is what makes an idle-timeout abort race-free
//! against a concurrently arriving final tick: whoever loses the race
//! sees a terminal state and no-ops.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tessera_core::{
    split_revenue, LedgerError, ParticipantProfile, Result, SessionError, SessionType,
    WalletError,
};
use tessera_ledger::{Ledger, TransferKind, TransferLeg};

use crate::config::EngineConfig;
use crate::metering::UsageMeter;
use crate::pricing::PricingRules;
use crate::roles::RoleResolver;
use crate::session::{
    BillingSession, EndReason, FinalBillingSummary, SessionHandle, SessionState,
};

/// Usage reported by the hosting chat or call service
#[derive(Debug, Clone)]
pub enum UsageDelta {
    /// A transmitted chat message; the meter counts its billable words
    ChatMessage { text: String },
    /// Call liveness signal; resets the idle window and may trigger a tick
    CallHeartbeat,
}

/// What happened to a usage report or explicit tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    /// Accrued (and settled, if a tick was due)
    Accepted,
    /// The tick could not be fully covered; the session was terminated
    /// and the caller should tear down the interaction
    SessionEnded { reason: EndReason },
    /// The session was already terminal; nothing was billed
    LateTickIgnored,
}

/// Session coordinator over the wallet ledger
pub struct BillingOrchestrator {
    ledger: Arc<Ledger>,
    rules: Arc<PricingRules>,
    resolver: RoleResolver,
    config: Arc<EngineConfig>,
    sessions: DashMap<Uuid, Arc<Mutex<BillingSession>>>,
}

impl BillingOrchestrator {
    pub fn new(ledger: Arc<Ledger>, rules: Arc<PricingRules>, config: Arc<EngineConfig>) -> Self {
        let resolver = RoleResolver::new(config.pairings.clone(), config.tie_break);
        Self {
            ledger,
            rules,
            resolver,
            config,
            sessions: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a session between two participants
    pub fn start_session(
        &self,
        session_type: SessionType,
        a: &ParticipantProfile,
        b: &ParticipantProfile,
        initiator: Uuid,
    ) -> Result<SessionHandle> {
        let now = chrono::Utc::now().timestamp_millis();
        self.start_session_at(session_type, a, b, initiator, now)
    }

    /// Start a session with a caller-supplied clock
    #[instrument(skip(self, a, b))]
    pub fn start_session_at(
        &self,
        session_type: SessionType,
        a: &ParticipantProfile,
        b: &ParticipantProfile,
        initiator: Uuid,
        now_ms: i64,
    ) -> Result<SessionHandle> {
        let roles = self.resolver.resolve(a, b, initiator)?;
        let payer_profile = if roles.payer == a.user_id { a } else { b };
        let price = self.rules.unit_price(session_type, payer_profile.tier)?;

        let meter = match session_type {
            SessionType::Chat => UsageMeter::for_chat(
                self.rules.chat_pricing(payer_profile.tier)?.bucket_size_words,
                now_ms,
            ),
            _ => UsageMeter::for_call(session_type, now_ms),
        };

        let session_id = Uuid::new_v4();
        let mut session = BillingSession {
            session_id,
            session_type,
            participant_a: a.user_id,
            participant_b: b.user_id,
            payer: roles.payer,
            earner: roles.earner,
            payer_tier: payer_profile.tier,
            price_per_unit: price,
            meter,
            state: SessionState::PendingStart,
            started_at: now_ms,
            ended_at: None,
            end_reason: None,
            amount_charged: 0,
            amount_to_earner: 0,
        };

        // The payer must cover one billing unit before the session may
        // become active; otherwise it never does.
        let balance = self.ledger.balance_of(roles.payer)?;
        if balance < price {
            return Err(LedgerError::Wallet(WalletError::InsufficientFunds {
                required: price,
                available: balance,
            })
            .into());
        }
        session.state = SessionState::Active;

        info!(
            session = %session_id,
            ?session_type,
            payer = %roles.payer,
            earner = ?roles.earner,
            price,
            "session started"
        );
        self.sessions
            .insert(session_id, Arc::new(Mutex::new(session)));

        Ok(SessionHandle {
            session_id,
            payer: roles.payer,
            earner: roles.earner,
            price_per_unit: price,
        })
    }

    /// Accumulate usage; settles internally when a tick is due
    pub fn record_usage(&self, session_id: Uuid, delta: UsageDelta) -> Result<UsageOutcome> {
        let now = chrono::Utc::now().timestamp_millis();
        self.record_usage_at(session_id, delta, now)
    }

    /// Accumulate usage with a caller-supplied clock
    #[instrument(skip(self, delta))]
    pub fn record_usage_at(
        &self,
        session_id: Uuid,
        delta: UsageDelta,
        now_ms: i64,
    ) -> Result<UsageOutcome> {
        let arc = self.session_arc(session_id)?;
        let mut session = arc.lock();

        if session.state.is_terminal() {
            // Late ticks race legitimately against termination and are
            // benign; new usage on a closed session is a caller bug.
            return match delta {
                UsageDelta::CallHeartbeat => {
                    debug!(session = %session_id, "late heartbeat after terminal state, ignored");
                    Ok(UsageOutcome::LateTickIgnored)
                }
                UsageDelta::ChatMessage { .. } => Err(SessionError::InvalidState {
                    session_id,
                    state: session.state.to_string(),
                }
                .into()),
            };
        }

        match delta {
            UsageDelta::ChatMessage { text } => {
                session.meter.record_message(&text, now_ms);
            }
            UsageDelta::CallHeartbeat => session.meter.record_heartbeat(now_ms),
        }

        if session.meter.should_bill(now_ms) {
            self.settle_upto(&mut session, now_ms)
        } else {
            Ok(UsageOutcome::Accepted)
        }
    }

    /// Explicit billing tick (e.g. the call service's 60s cadence)
    pub fn tick(&self, session_id: Uuid) -> Result<UsageOutcome> {
        let now = chrono::Utc::now().timestamp_millis();
        self.tick_at(session_id, now)
    }

    /// Explicit billing tick with a caller-supplied clock
    pub fn tick_at(&self, session_id: Uuid, now_ms: i64) -> Result<UsageOutcome> {
        let arc = self.session_arc(session_id)?;
        let mut session = arc.lock();

        if session.state.is_terminal() {
            return Ok(UsageOutcome::LateTickIgnored);
        }
        self.settle_upto(&mut session, now_ms)
    }

    /// Close a session, settling any units accrued since the last tick
    pub fn end_session(&self, session_id: Uuid) -> Result<FinalBillingSummary> {
        let now = chrono::Utc::now().timestamp_millis();
        self.end_session_at(session_id, now)
    }

    /// Close a session with a caller-supplied clock
    #[instrument(skip(self))]
    pub fn end_session_at(&self, session_id: Uuid, now_ms: i64) -> Result<FinalBillingSummary> {
        let arc = self.session_arc(session_id)?;
        let mut session = arc.lock();

        // Closing an already-closed session returns the settled summary
        if session.state.is_terminal() {
            return Ok(session.summary());
        }

        self.settle_upto(&mut session, now_ms)?;
        if !session.state.is_terminal() {
            self.finish(&mut session, SessionState::Ended, EndReason::Completed, now_ms);
        }
        Ok(session.summary())
    }

    /// Abort every session idle past the configured window
    ///
    /// Billing stops at `last_activity_at`: the idle gap itself is never
    /// charged retroactively.
    pub fn abort_idle_sessions(&self, now_ms: i64) -> Vec<FinalBillingSummary> {
        let arcs: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut aborted = Vec::new();

        for arc in arcs {
            let mut session = arc.lock();
            if session.state.is_terminal() {
                continue;
            }
            let idle_for = now_ms - session.meter.last_activity_at();
            if idle_for < self.config.idle_timeout_ms {
                continue;
            }

            let cutoff = session.meter.last_activity_at();
            if let Err(err) = self.settle_upto(&mut session, cutoff) {
                warn!(session = %session.session_id, error = %err, "settlement during idle abort failed");
            }
            if !session.state.is_terminal() {
                self.finish(&mut session, SessionState::Aborted, EndReason::IdleTimeout, now_ms);
            }
            info!(session = %session.session_id, idle_ms = idle_for, "idle session aborted");
            aborted.push(session.summary());
        }
        aborted
    }

    /// Spawn the idle-timeout failsafe
    pub fn start_idle_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                self.config.sweep_interval_ms,
            ));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().timestamp_millis();
                let aborted = self.abort_idle_sessions(now);
                if !aborted.is_empty() {
                    info!(count = aborted.len(), "idle sweeper aborted sessions");
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current settlement numbers for a session
    pub fn session_summary(&self, session_id: Uuid) -> Result<FinalBillingSummary> {
        Ok(self.session_arc(session_id)?.lock().summary())
    }

    /// Current state of a session
    pub fn session_state(&self, session_id: Uuid) -> Result<SessionState> {
        Ok(self.session_arc(session_id)?.lock().state)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    fn session_arc(&self, session_id: Uuid) -> Result<Arc<Mutex<BillingSession>>> {
        self.sessions
            .get(&session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SessionError::NotFound { session_id }.into())
    }

    /// Settle everything accrued up to `upto_ms`
    ///
    /// On insufficient funds the last fully-coverable units are still
    /// billed in full, then the session ends; partial units are never
    /// charged or refunded.
    fn settle_upto(&self, session: &mut BillingSession, upto_ms: i64) -> Result<UsageOutcome> {
        let pending = session.meter.pending_units(upto_ms);
        if pending == 0 {
            return Ok(UsageOutcome::Accepted);
        }

        match self.bill_units(session, pending) {
            Ok(()) => Ok(UsageOutcome::Accepted),
            Err(err) if err.is_insufficient_funds() => {
                let available = self.ledger.balance_of(session.payer)?;
                let affordable = ((available / session.price_per_unit) as u64).min(pending);
                if affordable > 0 {
                    if let Err(second) = self.bill_units(session, affordable) {
                        warn!(
                            session = %session.session_id,
                            error = %second,
                            "could not settle final affordable units"
                        );
                    }
                }
                self.finish(
                    session,
                    SessionState::Ended,
                    EndReason::BalanceExhausted,
                    upto_ms,
                );
                Ok(UsageOutcome::SessionEnded {
                    reason: EndReason::BalanceExhausted,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Move value for `units` billing units through the ledger
    ///
    /// The idempotency keys derive from the cumulative unit count, so a
    /// retried tick replays its committed result instead of re-billing.
    fn bill_units(
        &self,
        session: &mut BillingSession,
        units: u64,
    ) -> std::result::Result<(), LedgerError> {
        let amount = session.price_per_unit * units as i64;
        let cumulative = session.meter.units_billed() + units;
        let base = session.tick_key(cumulative);
        let kind = if session.session_type.is_call() {
            TransferKind::Call
        } else {
            TransferKind::Chat
        };

        let mut legs = Vec::with_capacity(2);
        let mut earner_share = 0;
        match session.earner {
            Some(earner) => {
                let split = split_revenue(amount, self.config.earner_rate);
                earner_share = split.earner_share;
                if split.earner_share > 0 {
                    legs.push(TransferLeg::new(
                        format!("{base}:earner"),
                        Some(earner),
                        split.earner_share,
                        kind,
                    ));
                }
                if split.platform_share > 0 {
                    legs.push(TransferLeg::new(
                        format!("{base}:fee"),
                        None,
                        split.platform_share,
                        TransferKind::Fee,
                    ));
                }
            }
            None => legs.push(TransferLeg::new(
                format!("{base}:platform"),
                None,
                amount,
                kind,
            )),
        }

        let mut attempts = 0;
        loop {
            match self
                .ledger
                .transfer_batch(session.payer, &legs, Some(session.session_id))
            {
                Ok(_) => {
                    session.meter.mark_billed(units);
                    session.amount_charged += amount;
                    session.amount_to_earner += earner_share;
                    debug!(session = %session.session_id, units, amount, "tick settled");
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempts < self.config.max_transfer_retries => {
                    attempts += 1;
                    warn!(
                        session = %session.session_id,
                        attempt = attempts,
                        "transient ledger conflict, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn finish(
        &self,
        session: &mut BillingSession,
        state: SessionState,
        reason: EndReason,
        now_ms: i64,
    ) {
        session.state = state;
        session.end_reason = Some(reason);
        session.ended_at = Some(now_ms);
        info!(
            session = %session.session_id,
            %state,
            ?reason,
            units = session.units_billed(),
            charged = session.amount_charged,
            "session finished"
        );
    }
}
