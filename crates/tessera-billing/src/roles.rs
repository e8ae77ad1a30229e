//! Role resolution - who pays, who earns
//!
//! Deterministic and side-effect-free; called exactly once per session,
//! and the result is frozen into the session for its whole lifetime.
//!
//! Priority order, first match wins:
//! 1. Earner override: exactly one participant can earn
//! 2. Asymmetric pairing: a configured category pair where one side
//!    always pays, regardless of who initiated
//! 3. Initiator pays; the tie-break policy decides the earner when both
//!    participants can earn

use tracing::debug;
use uuid::Uuid;

use tessera_core::{AsymmetricPairing, ParticipantProfile, SessionError, TieBreakPolicy};

/// Resolved roles for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    /// Wallet that gets debited
    pub payer: Uuid,
    /// Wallet that gets credited; `None` means the platform is sole earner
    pub earner: Option<Uuid>,
}

/// Role resolver configured with pairing rules and the tie-break policy
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    pairings: Vec<AsymmetricPairing>,
    tie_break: TieBreakPolicy,
}

impl RoleResolver {
    pub fn new(pairings: Vec<AsymmetricPairing>, tie_break: TieBreakPolicy) -> Self {
        Self {
            pairings,
            tie_break,
        }
    }

    /// Resolve payer and earner for a session between `a` and `b`
    pub fn resolve(
        &self,
        a: &ParticipantProfile,
        b: &ParticipantProfile,
        initiator: Uuid,
    ) -> Result<RoleAssignment, SessionError> {
        if initiator != a.user_id && initiator != b.user_id {
            return Err(SessionError::InitiatorNotParticipant { initiator });
        }

        // Rule 1: exactly one active earner wins outright. If both can
        // earn, the override does not apply and resolution falls through.
        match (a.can_earn(), b.can_earn()) {
            (true, false) => {
                return Ok(RoleAssignment {
                    payer: b.user_id,
                    earner: Some(a.user_id),
                });
            }
            (false, true) => {
                return Ok(RoleAssignment {
                    payer: a.user_id,
                    earner: Some(b.user_id),
                });
            }
            _ => {}
        }

        // Rule 2: a configured pairing pins the payer by category,
        // independent of who initiated.
        if let Some(rule) = self
            .pairings
            .iter()
            .find(|r| r.covers(&a.category, &b.category))
        {
            let (payer, counterpart) = if rule.paying == a.category {
                (a, b)
            } else {
                (b, a)
            };
            debug!(paying = %rule.paying, "asymmetric pairing matched");
            return Ok(RoleAssignment {
                payer: payer.user_id,
                earner: counterpart.can_earn().then_some(counterpart.user_id),
            });
        }

        // Rule 3: initiator pays.
        let (initiating, receiver) = if a.user_id == initiator { (a, b) } else { (b, a) };
        let earner = if receiver.can_earn() {
            if initiating.can_earn() {
                match self.tie_break {
                    TieBreakPolicy::ReceiverEarns => Some(receiver.user_id),
                    TieBreakPolicy::PlatformEarns => None,
                }
            } else {
                Some(receiver.user_id)
            }
        } else {
            None
        };

        Ok(RoleAssignment {
            payer: initiating.user_id,
            earner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::CategoryId;

    fn participant(category: &str, can_earn: bool) -> ParticipantProfile {
        ParticipantProfile::new(Uuid::new_v4(), CategoryId::new(category))
            .with_earning(can_earn, can_earn)
    }

    fn paired_resolver() -> RoleResolver {
        RoleResolver::new(
            vec![AsymmetricPairing::new(
                CategoryId::new("seeker"),
                CategoryId::new("host"),
            )],
            TieBreakPolicy::ReceiverEarns,
        )
    }

    #[test]
    fn test_earner_override_outranks_everything() {
        let resolver = paired_resolver();
        // The host would pay under the pairing rule, but the host is the
        // only active earner, so the override wins.
        let a = participant("host", true);
        let b = participant("seeker", false);

        let roles = resolver.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(roles.payer, b.user_id);
        assert_eq!(roles.earner, Some(a.user_id));
    }

    #[test]
    fn test_asymmetric_pairing_ignores_initiator() {
        let resolver = paired_resolver();
        let seeker = participant("seeker", false);
        let host = participant("host", false);

        // Neither can earn, so rule 1 does not apply; the pairing pins
        // the seeker as payer whichever side initiates.
        let initiated_by_seeker = resolver.resolve(&seeker, &host, seeker.user_id).unwrap();
        let initiated_by_host = resolver.resolve(&seeker, &host, host.user_id).unwrap();

        assert_eq!(initiated_by_seeker.payer, seeker.user_id);
        assert_eq!(initiated_by_host.payer, seeker.user_id);
        assert_eq!(initiated_by_host.earner, None);
    }

    #[test]
    fn test_asymmetric_scenario_receiver_initiates() {
        // Category X payer, category Y active earner, Y initiates the
        // call: X still pays, Y earns.
        let resolver = RoleResolver::new(
            vec![AsymmetricPairing::new(
                CategoryId::new("x"),
                CategoryId::new("y"),
            )],
            TieBreakPolicy::ReceiverEarns,
        );
        let a = participant("x", false);
        let b = participant("y", true);

        let roles = resolver.resolve(&a, &b, b.user_id).unwrap();
        assert_eq!(roles.payer, a.user_id);
        assert_eq!(roles.earner, Some(b.user_id));
    }

    #[test]
    fn test_initiator_pays_default() {
        let resolver = RoleResolver::default();
        let a = participant("standard", false);
        let b = participant("standard", false);

        let roles = resolver.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(roles.payer, a.user_id);
        // Neither can earn: platform is sole earner
        assert_eq!(roles.earner, None);
    }

    #[test]
    fn test_both_eligible_falls_through_to_tie_break() {
        let a = participant("standard", true);
        let b = participant("standard", true);

        let receiver_earns = RoleResolver::new(vec![], TieBreakPolicy::ReceiverEarns);
        let roles = receiver_earns.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(roles.payer, a.user_id);
        assert_eq!(roles.earner, Some(b.user_id));

        let platform_earns = RoleResolver::new(vec![], TieBreakPolicy::PlatformEarns);
        let roles = platform_earns.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(roles.payer, a.user_id);
        assert_eq!(roles.earner, None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = paired_resolver();
        let a = participant("seeker", false);
        let b = participant("host", true);

        let first = resolver.resolve(&a, &b, a.user_id).unwrap();
        let second = resolver.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_eligible_but_inactive_is_not_an_earner() {
        let resolver = RoleResolver::default();
        let a = participant("standard", false);
        let b = ParticipantProfile::new(Uuid::new_v4(), CategoryId::new("standard"))
            .with_earning(true, false);

        let roles = resolver.resolve(&a, &b, a.user_id).unwrap();
        assert_eq!(roles.earner, None);
    }

    #[test]
    fn test_foreign_initiator_rejected() {
        let resolver = RoleResolver::default();
        let a = participant("standard", false);
        let b = participant("standard", false);

        let result = resolver.resolve(&a, &b, Uuid::new_v4());
        assert!(matches!(
            result,
            Err(SessionError::InitiatorNotParticipant { .. })
        ));
    }
}
