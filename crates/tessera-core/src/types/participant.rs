//! Participant profiles and role policy types
//!
//! A billing session always involves two participants. The attributes here
//! are a snapshot taken at session start; flag changes on the account are
//! picked up by the next session, never retroactively.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paid interaction kinds the engine bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Chat,
    VoiceCall,
    VideoCall,
}

impl SessionType {
    /// Calls are metered in minutes, chat in word buckets
    #[inline]
    pub fn is_call(&self) -> bool {
        matches!(self, SessionType::VoiceCall | SessionType::VideoCall)
    }
}

/// Subscription tier of the payer, selects the pricing row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Plus,
    Premium,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        SubscriptionTier::Free
    }
}

/// User category, the unit the asymmetric-pairing policy is written against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A configured category pair where one side always pays
///
/// Matches regardless of which participant initiated the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsymmetricPairing {
    /// Category that always pays when paired with `earning`
    pub paying: CategoryId,
    /// Counterpart category
    pub earning: CategoryId,
}

impl AsymmetricPairing {
    pub fn new(paying: CategoryId, earning: CategoryId) -> Self {
        Self { paying, earning }
    }

    /// Whether this rule covers the unordered category pair `(a, b)`
    pub fn covers(&self, a: &CategoryId, b: &CategoryId) -> bool {
        (self.paying == *a && self.earning == *b) || (self.paying == *b && self.earning == *a)
    }
}

/// Who earns when both participants are earner-eligible under the
/// initiator-pays default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// The non-initiator earns
    ReceiverEarns,
    /// Neither earns; the full charge goes to the platform
    PlatformEarns,
}

impl Default for TieBreakPolicy {
    fn default() -> Self {
        TieBreakPolicy::ReceiverEarns
    }
}

/// Snapshot of one participant at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProfile {
    /// User id, also the wallet id
    pub user_id: Uuid,
    /// Policy category
    pub category: CategoryId,
    /// Subscription tier (affects pricing when this participant pays)
    pub tier: SubscriptionTier,
    /// Account is approved to earn
    pub earner_eligible: bool,
    /// Earning is currently switched on
    pub monetization_active: bool,
}

impl ParticipantProfile {
    pub fn new(user_id: Uuid, category: CategoryId) -> Self {
        Self {
            user_id,
            category,
            tier: SubscriptionTier::default(),
            earner_eligible: false,
            monetization_active: false,
        }
    }

    /// Set the subscription tier
    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.tier = tier;
        self
    }

    /// Mark the participant as an active earner
    pub fn with_earning(mut self, eligible: bool, active: bool) -> Self {
        self.earner_eligible = eligible;
        self.monetization_active = active;
        self
    }

    /// Eligible and currently monetizing
    #[inline]
    pub fn can_earn(&self) -> bool {
        self.earner_eligible && self.monetization_active
    }
}
