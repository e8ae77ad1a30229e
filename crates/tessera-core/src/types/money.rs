//! Token amounts and revenue-split arithmetic
//!
//! All balances and charges are integer minor units. Rates and fractions
//! (revenue split, refund fraction) are `Decimal`; every conversion back to
//! minor units uses an explicit `floor`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amount in minor token units. Never fractional.
pub type TokenAmount = i64;

/// Outcome of splitting one charge between an earner and the platform.
///
/// The platform share is always the remainder, so the two shares sum to the
/// charged amount exactly for every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    /// `floor(amount * earner_rate)`
    pub earner_share: TokenAmount,
    /// `amount - earner_share`
    pub platform_share: TokenAmount,
}

impl RevenueSplit {
    /// Total of both shares.
    #[inline]
    pub fn total(&self) -> TokenAmount {
        self.earner_share + self.platform_share
    }
}

/// Split `amount` into an earner share and a platform remainder.
///
/// `earner_rate` is clamped to `[0, 1]`; a negative amount splits to zero.
pub fn split_revenue(amount: TokenAmount, earner_rate: Decimal) -> RevenueSplit {
    if amount <= 0 {
        return RevenueSplit {
            earner_share: 0,
            platform_share: 0,
        };
    }

    let rate = earner_rate.clamp(Decimal::ZERO, Decimal::ONE);
    let earner_share = (Decimal::from(amount) * rate)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .clamp(0, amount);

    RevenueSplit {
        earner_share,
        platform_share: amount - earner_share,
    }
}

/// `floor(amount * fraction)` with the fraction clamped to `[0, 1]`.
///
/// Used for partial refunds, where the complement goes to the other party.
pub fn fraction_floor(amount: TokenAmount, fraction: Decimal) -> TokenAmount {
    split_revenue(amount, fraction).earner_share
}
