//! Escrow manager for calendar bookings
//!
//! Payment is captured in full at booking time: the platform fee is
//! burned immediately and is non-refundable from that point on, and the
//! remainder moves into a ledger-tracked holding wallet. Resolution
//! transfers the held remainder to the earner (release) or back to the
//! payer (refund), in any split the refund fraction dictates.
//!
//! An escrow record is never deleted, only transitioned:
//! `Held -> Released | Refunded | PartiallyRefunded`.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use tessera_core::{
    fraction_floor, split_revenue, EscrowError, Result, TokenAmount,
};
use tessera_ledger::{Ledger, TransferKind, TransferLeg};

use crate::config::EngineConfig;

/// Escrow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
    PartiallyRefunded,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::PartiallyRefunded => "partially_refunded",
        };
        f.write_str(s)
    }
}

/// How a booking was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOutcome {
    /// Fulfilled: the held remainder goes to the earner
    Release,
    /// Cancelled: `fraction` of the held remainder returns to the payer,
    /// the rest goes to the earner
    Refund { fraction: Decimal },
}

/// Funds held between booking payment and fulfillment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub escrow_id: Uuid,
    pub booking_id: Uuid,
    pub payer: Uuid,
    pub earner: Uuid,
    /// Full amount debited from the payer at hold time
    pub gross_amount: TokenAmount,
    /// Burned at hold time; never part of any refund
    pub platform_fee: TokenAmount,
    /// `gross_amount - platform_fee`, the portion escrow resolves over
    pub held_amount: TokenAmount,
    pub status: EscrowStatus,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    /// Filled in at resolution
    pub refunded_amount: TokenAmount,
    pub released_amount: TokenAmount,
}

/// Escrow coordinator over the wallet ledger
///
/// Held funds live in a dedicated holding wallet, so conservation and
/// non-negativity keep holding for escrowed value like for any other.
pub struct EscrowManager {
    ledger: Arc<Ledger>,
    config: Arc<EngineConfig>,
    holding_wallet: Uuid,
    records: DashMap<Uuid, Arc<Mutex<EscrowRecord>>>,
}

impl EscrowManager {
    pub fn new(ledger: Arc<Ledger>, config: Arc<EngineConfig>) -> Self {
        let holding_wallet = Uuid::new_v4();
        ledger.register_wallet(holding_wallet);
        Self {
            ledger,
            config,
            holding_wallet,
            records: DashMap::new(),
        }
    }

    /// The ledger wallet where held remainders live
    pub fn holding_wallet(&self) -> Uuid {
        self.holding_wallet
    }

    /// Capture a booking payment and hold the post-fee remainder
    #[instrument(skip(self))]
    pub fn hold(
        &self,
        booking_id: Uuid,
        payer: Uuid,
        earner: Uuid,
        amount: TokenAmount,
    ) -> Result<EscrowRecord> {
        let escrow_id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp_millis();

        // Remainder first, fee as the exact rest
        let split = split_revenue(amount, Decimal::ONE - self.config.booking_fee_rate);
        let held_amount = split.earner_share;
        let platform_fee = split.platform_share;

        let mut legs = Vec::with_capacity(2);
        if held_amount > 0 {
            legs.push(TransferLeg::new(
                format!("{escrow_id}:hold"),
                Some(self.holding_wallet),
                held_amount,
                TransferKind::Booking,
            ));
        }
        if platform_fee > 0 {
            legs.push(TransferLeg::new(
                format!("{escrow_id}:fee"),
                None,
                platform_fee,
                TransferKind::Fee,
            ));
        }
        // Full capture in one atomic batch; insufficient funds creates
        // no escrow at all
        self.ledger
            .transfer_batch(payer, &legs, Some(escrow_id))?;

        let record = EscrowRecord {
            escrow_id,
            booking_id,
            payer,
            earner,
            gross_amount: amount,
            platform_fee,
            held_amount,
            status: EscrowStatus::Held,
            created_at: now,
            resolved_at: None,
            refunded_amount: 0,
            released_amount: 0,
        };
        self.records
            .insert(escrow_id, Arc::new(Mutex::new(record.clone())));

        info!(
            escrow = %escrow_id,
            booking = %booking_id,
            gross = amount,
            fee = platform_fee,
            held = held_amount,
            "escrow held"
        );
        Ok(record)
    }

    /// Fulfillment: transfer the held remainder to the earner
    #[instrument(skip(self))]
    pub fn release(&self, escrow_id: Uuid) -> Result<EscrowRecord> {
        let arc = self.record_arc(escrow_id)?;
        let mut record = arc.lock();
        self.ensure_held(&record)?;

        if record.held_amount > 0 {
            self.ledger.transfer(
                &format!("{escrow_id}:release"),
                self.holding_wallet,
                Some(record.earner),
                record.held_amount,
                TransferKind::Booking,
                Some(escrow_id),
            )?;
        }

        record.status = EscrowStatus::Released;
        record.released_amount = record.held_amount;
        record.resolved_at = Some(chrono::Utc::now().timestamp_millis());
        info!(escrow = %escrow_id, amount = record.released_amount, "escrow released");
        Ok(record.clone())
    }

    /// Cancellation: return `fraction` of the held remainder to the
    /// payer; anything left goes to the earner
    ///
    /// The platform fee was burned at hold time and never enters this
    /// calculation.
    #[instrument(skip(self))]
    pub fn refund(&self, escrow_id: Uuid, fraction: Decimal) -> Result<EscrowRecord> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(EscrowError::InvalidRefundFraction {
                fraction: fraction.to_string(),
            }
            .into());
        }

        let arc = self.record_arc(escrow_id)?;
        let mut record = arc.lock();
        self.ensure_held(&record)?;

        let refund_amount = fraction_floor(record.held_amount, fraction);
        let payout_amount = record.held_amount - refund_amount;

        let mut legs = Vec::with_capacity(2);
        if refund_amount > 0 {
            legs.push(TransferLeg::new(
                format!("{escrow_id}:refund"),
                Some(record.payer),
                refund_amount,
                TransferKind::Refund,
            ));
        }
        if payout_amount > 0 {
            legs.push(TransferLeg::new(
                format!("{escrow_id}:payout"),
                Some(record.earner),
                payout_amount,
                TransferKind::Booking,
            ));
        }
        if !legs.is_empty() {
            self.ledger
                .transfer_batch(self.holding_wallet, &legs, Some(escrow_id))?;
        }

        record.status = if refund_amount == record.held_amount {
            EscrowStatus::Refunded
        } else if refund_amount == 0 {
            // A zero-fraction refund is a release in effect
            EscrowStatus::Released
        } else {
            EscrowStatus::PartiallyRefunded
        };
        record.refunded_amount = refund_amount;
        record.released_amount = payout_amount;
        record.resolved_at = Some(chrono::Utc::now().timestamp_millis());

        info!(
            escrow = %escrow_id,
            refunded = refund_amount,
            released = payout_amount,
            status = %record.status,
            "escrow refunded"
        );
        Ok(record.clone())
    }

    /// Resolve a booking either way
    pub fn resolve(&self, escrow_id: Uuid, outcome: BookingOutcome) -> Result<EscrowRecord> {
        match outcome {
            BookingOutcome::Release => self.release(escrow_id),
            BookingOutcome::Refund { fraction } => self.refund(escrow_id, fraction),
        }
    }

    /// Current record state
    pub fn get(&self, escrow_id: Uuid) -> Result<EscrowRecord> {
        Ok(self.record_arc(escrow_id)?.lock().clone())
    }

    fn record_arc(&self, escrow_id: Uuid) -> Result<Arc<Mutex<EscrowRecord>>> {
        self.records
            .get(&escrow_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EscrowError::NotFound { escrow_id }.into())
    }

    fn ensure_held(&self, record: &EscrowRecord) -> Result<()> {
        if record.status != EscrowStatus::Held {
            return Err(EscrowError::AlreadyResolved {
                escrow_id: record.escrow_id,
                status: record.status.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
