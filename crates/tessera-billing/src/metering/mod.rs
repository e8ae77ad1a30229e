//! Usage metering
//!
//! Accumulates billable units for an active session and decides when a
//! billing tick is due:
//! - Chat: word buckets, ceiling per message ([`words`] does the counting)
//! - Calls: started minutes, ceiling on elapsed seconds
//!
//! The meter only counts; moving value is the orchestrator's job. The
//! `units_billed` counter is monotone, which is what makes a late or
//! repeated tick unable to double-count a unit.

pub mod words;

pub use words::billable_word_count;

use serde::{Deserialize, Serialize};

use tessera_core::{SessionType, MS_PER_MINUTE};

/// Ceiling division; `ceil_div(12, 11) == 2`
#[inline]
pub fn ceil_div(n: u64, d: u64) -> u64 {
    if d == 0 {
        return 0;
    }
    n.div_ceil(d)
}

/// Per-session usage accumulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMeter {
    session_type: SessionType,
    /// Words per bucket; unused for calls
    bucket_size_words: u32,
    started_at: i64,
    last_activity_at: i64,
    /// Chat buckets accrued from recorded messages
    buckets_accrued: u64,
    /// Units already settled by the ledger, monotone
    units_billed: u64,
}

impl UsageMeter {
    /// Meter for a chat session with the payer tier's bucket size
    pub fn for_chat(bucket_size_words: u32, now_ms: i64) -> Self {
        Self {
            session_type: SessionType::Chat,
            bucket_size_words,
            started_at: now_ms,
            last_activity_at: now_ms,
            buckets_accrued: 0,
            units_billed: 0,
        }
    }

    /// Meter for a voice or video call
    pub fn for_call(session_type: SessionType, now_ms: i64) -> Self {
        Self {
            session_type,
            bucket_size_words: 0,
            started_at: now_ms,
            last_activity_at: now_ms,
            buckets_accrued: 0,
            units_billed: 0,
        }
    }

    /// Record a chat message; returns the buckets it added
    ///
    /// Any started bucket bills in full: a 12-word message against an
    /// 11-word bucket adds 2 buckets.
    pub fn record_message(&mut self, text: &str, now_ms: i64) -> u64 {
        let word_count = billable_word_count(text);
        let buckets = ceil_div(word_count as u64, self.bucket_size_words as u64);
        self.buckets_accrued += buckets;
        self.last_activity_at = self.last_activity_at.max(now_ms);
        buckets
    }

    /// Record a call heartbeat, resetting the idle window
    pub fn record_heartbeat(&mut self, now_ms: i64) {
        self.last_activity_at = self.last_activity_at.max(now_ms);
    }

    /// Units accrued up to `now_ms`: chat buckets, or started call minutes
    pub fn accrued_units(&self, now_ms: i64) -> u64 {
        if self.session_type.is_call() {
            let elapsed_ms = (now_ms - self.started_at).max(0) as u64;
            ceil_div(elapsed_ms, MS_PER_MINUTE as u64)
        } else {
            self.buckets_accrued
        }
    }

    /// Units accrued but not yet settled
    pub fn pending_units(&self, now_ms: i64) -> u64 {
        self.accrued_units(now_ms).saturating_sub(self.units_billed)
    }

    /// Whether a billing tick is due
    pub fn should_bill(&self, now_ms: i64) -> bool {
        self.pending_units(now_ms) > 0
    }

    /// Mark units as settled; never rewinds
    pub fn mark_billed(&mut self, units: u64) {
        self.units_billed += units;
    }

    pub fn units_billed(&self) -> u64 {
        self.units_billed
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn last_activity_at(&self) -> i64 {
        self.last_activity_at
    }
}
