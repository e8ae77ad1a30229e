//! Engine configuration

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tessera_core::{
    AsymmetricPairing, TieBreakPolicy, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_TRANSFER_RETRIES,
};

/// Billing engine configuration
///
/// Revenue percentages are configuration, not engine logic; the engine
/// only guarantees that whatever rate is set splits exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Earner's share of a session charge, `0..=1`
    pub earner_rate: Decimal,
    /// Platform's cut of a booking, taken at hold time, `0..=1`
    pub booking_fee_rate: Decimal,
    /// Idle window before the failsafe aborts a session
    pub idle_timeout_ms: i64,
    /// How often the background sweeper scans for idle sessions
    pub sweep_interval_ms: u64,
    /// Bounded retries for transient ledger conflicts
    pub max_transfer_retries: u32,
    /// Who earns when both participants are earner-eligible
    pub tie_break: TieBreakPolicy,
    /// Category pairs where one side always pays
    pub pairings: Vec<AsymmetricPairing>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            earner_rate: Decimal::new(70, 2),
            booking_fee_rate: Decimal::new(20, 2),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            sweep_interval_ms: 30_000,
            max_transfer_retries: DEFAULT_MAX_TRANSFER_RETRIES,
            tie_break: TieBreakPolicy::default(),
            pairings: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment and `.env`
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("TESSERA_EARNER_RATE") {
            cfg.earner_rate = val.parse()?;
        }
        if let Ok(val) = std::env::var("TESSERA_BOOKING_FEE_RATE") {
            cfg.booking_fee_rate = val.parse()?;
        }
        if let Ok(val) = std::env::var("TESSERA_IDLE_TIMEOUT_MS") {
            cfg.idle_timeout_ms = val.parse()?;
        }
        if let Ok(val) = std::env::var("TESSERA_SWEEP_INTERVAL_MS") {
            cfg.sweep_interval_ms = val.parse()?;
        }
        if let Ok(val) = std::env::var("TESSERA_MAX_TRANSFER_RETRIES") {
            cfg.max_transfer_retries = val.parse()?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject rates outside `[0, 1]` and degenerate windows
    pub fn validate(&self) -> Result<()> {
        if self.earner_rate < Decimal::ZERO || self.earner_rate > Decimal::ONE {
            bail!("earner_rate must be within [0, 1], got {}", self.earner_rate);
        }
        if self.booking_fee_rate < Decimal::ZERO || self.booking_fee_rate > Decimal::ONE {
            bail!(
                "booking_fee_rate must be within [0, 1], got {}",
                self.booking_fee_rate
            );
        }
        if self.idle_timeout_ms <= 0 {
            bail!("idle_timeout_ms must be positive");
        }
        Ok(())
    }
}
