//! Pricing rule store
//!
//! Per-feature price tables keyed by the payer's subscription tier. Pure
//! lookup: nothing here mutates during a session, and the resolved unit
//! price is frozen into the session at start.
//!
//! Premium tiers get smaller chat buckets at better effective per-word
//! rates, so they are billed more finely but cheaper.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tessera_core::{EngineError, PricingError, Result, SessionType, SubscriptionTier, TokenAmount};

/// Chat pricing row: bucket size and the price of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPricing {
    /// Words per bucket; any started bucket bills in full
    pub bucket_size_words: u32,
    /// Minor units per bucket
    pub price_per_bucket: TokenAmount,
}

/// Call pricing row: price of one started minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPricing {
    /// Minor units per minute
    pub price_per_minute: TokenAmount,
}

/// The full pricing table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRules {
    pub chat: HashMap<SubscriptionTier, ChatPricing>,
    pub voice_call: HashMap<SubscriptionTier, CallPricing>,
    pub video_call: HashMap<SubscriptionTier, CallPricing>,
}

impl PricingRules {
    /// Built-in table used when no external file is supplied
    pub fn defaults() -> Self {
        let chat = HashMap::from([
            (
                SubscriptionTier::Free,
                ChatPricing {
                    bucket_size_words: 20,
                    price_per_bucket: 10,
                },
            ),
            (
                SubscriptionTier::Plus,
                ChatPricing {
                    bucket_size_words: 15,
                    price_per_bucket: 7,
                },
            ),
            (
                SubscriptionTier::Premium,
                ChatPricing {
                    bucket_size_words: 10,
                    price_per_bucket: 4,
                },
            ),
        ]);
        let voice_call = HashMap::from([
            (SubscriptionTier::Free, CallPricing { price_per_minute: 10 }),
            (SubscriptionTier::Plus, CallPricing { price_per_minute: 9 }),
            (SubscriptionTier::Premium, CallPricing { price_per_minute: 8 }),
        ]);
        let video_call = HashMap::from([
            (SubscriptionTier::Free, CallPricing { price_per_minute: 15 }),
            (SubscriptionTier::Plus, CallPricing { price_per_minute: 13 }),
            (SubscriptionTier::Premium, CallPricing { price_per_minute: 11 }),
        ]);
        Self {
            chat,
            voice_call,
            video_call,
        }
    }

    /// Load a table from a JSON file, validating it before use
    pub fn from_json_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read pricing file: {}", e)))?;
        let rules: PricingRules = serde_json::from_str(&content)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Reject tables with non-positive prices or empty buckets
    pub fn validate(&self) -> Result<()> {
        for (tier, row) in &self.chat {
            if row.bucket_size_words == 0 || row.price_per_bucket <= 0 {
                return Err(PricingError::InvalidTable(format!(
                    "chat row for {:?} has empty bucket or non-positive price",
                    tier
                ))
                .into());
            }
        }
        for (tier, row) in self.voice_call.iter().chain(self.video_call.iter()) {
            if row.price_per_minute <= 0 {
                return Err(PricingError::InvalidTable(format!(
                    "call row for {:?} has non-positive price",
                    tier
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Chat row for a payer tier
    pub fn chat_pricing(&self, tier: SubscriptionTier) -> Result<ChatPricing> {
        self.chat
            .get(&tier)
            .copied()
            .ok_or_else(|| {
                PricingError::RateNotConfigured {
                    session_type: SessionType::Chat,
                    tier,
                }
                .into()
            })
    }

    /// Price of one billing unit: a bucket for chat, a minute for calls
    pub fn unit_price(&self, session_type: SessionType, tier: SubscriptionTier) -> Result<TokenAmount> {
        let missing = || -> EngineError {
            PricingError::RateNotConfigured { session_type, tier }.into()
        };
        match session_type {
            SessionType::Chat => Ok(self.chat_pricing(tier)?.price_per_bucket),
            SessionType::VoiceCall => self
                .voice_call
                .get(&tier)
                .map(|r| r.price_per_minute)
                .ok_or_else(missing),
            SessionType::VideoCall => self
                .video_call
                .get(&tier)
                .map(|r| r.price_per_minute)
                .ok_or_else(missing),
        }
    }
}

impl Default for PricingRules {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        assert!(PricingRules::defaults().validate().is_ok());
    }

    #[test]
    fn test_premium_buckets_are_finer_and_cheaper_per_word() {
        let rules = PricingRules::defaults();
        let free = rules.chat_pricing(SubscriptionTier::Free).unwrap();
        let premium = rules.chat_pricing(SubscriptionTier::Premium).unwrap();

        assert!(premium.bucket_size_words < free.bucket_size_words);
        let free_per_word = free.price_per_bucket as f64 / free.bucket_size_words as f64;
        let premium_per_word = premium.price_per_bucket as f64 / premium.bucket_size_words as f64;
        assert!(premium_per_word < free_per_word);
    }

    #[test]
    fn test_unit_price_lookup() {
        let rules = PricingRules::defaults();
        assert_eq!(
            rules.unit_price(SessionType::VoiceCall, SubscriptionTier::Free).unwrap(),
            10
        );
        assert_eq!(
            rules.unit_price(SessionType::VideoCall, SubscriptionTier::Premium).unwrap(),
            11
        );
        assert_eq!(
            rules.unit_price(SessionType::Chat, SubscriptionTier::Plus).unwrap(),
            7
        );
    }

    #[test]
    fn test_missing_rate_is_an_error() {
        let mut rules = PricingRules::defaults();
        rules.voice_call.remove(&SubscriptionTier::Plus);

        let result = rules.unit_price(SessionType::VoiceCall, SubscriptionTier::Plus);
        assert!(matches!(
            result,
            Err(EngineError::Pricing(PricingError::RateNotConfigured { .. }))
        ));
    }

    #[test]
    fn test_invalid_table_rejected() {
        let mut rules = PricingRules::defaults();
        rules.chat.insert(
            SubscriptionTier::Free,
            ChatPricing {
                bucket_size_words: 0,
                price_per_bucket: 10,
            },
        );
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_round_trips_through_json() {
        let rules = PricingRules::defaults();
        let json = serde_json::to_string(&rules).unwrap();
        let parsed: PricingRules = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.chat_pricing(SubscriptionTier::Free).unwrap(),
            rules.chat_pricing(SubscriptionTier::Free).unwrap()
        );
    }
}
