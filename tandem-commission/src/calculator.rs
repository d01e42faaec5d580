//! Pure multi-level commission math.
//!
//! The calculator is handed the upline already resolved, nearest sponsor
//! first, so it can be exercised without any storage.

use serde::Serialize;
use uuid::Uuid;

use tandem_core::{CommissionDraft, PhaseLevel, Subscription};
use tandem_shared::money::apply_rate;
use tandem_shared::Cents;

use crate::CommissionError;

/// One ancestor in the sponsor chain. Index 0 of the chain is level 1.
#[derive(Debug, Clone)]
pub struct UplineMember {
    pub user_id: Uuid,
    pub subscription: Option<Subscription>,
    pub phase_level: Option<PhaseLevel>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InactiveSubscription,
    MissingPhaseLevel,
    BeyondPhaseDepth,
    ZeroAmount,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedUpline {
    pub user_id: Uuid,
    pub level: i32,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calculation {
    pub drafts: Vec<CommissionDraft>,
    pub skipped: Vec<SkippedUpline>,
}

impl Calculation {
    pub fn total_cents(&self) -> Cents {
        self.drafts.iter().map(|d| d.amount_cents).sum()
    }
}

pub struct CommissionCalculator;

impl CommissionCalculator {
    /// Commission drafts for an order of `base_cents` placed by `buyer_id`.
    ///
    /// Ineligible ancestors are skipped, not compressed: the next ancestor
    /// keeps its own depth.
    pub fn calculate(
        buyer_id: Uuid,
        base_cents: Cents,
        upline: &[UplineMember],
    ) -> Result<Calculation, CommissionError> {
        if base_cents < 0 {
            return Err(CommissionError::InvalidBase(base_cents));
        }

        let mut calc = Calculation::default();

        for (idx, member) in upline.iter().enumerate() {
            let level = idx as i32 + 1;
            let skip = |reason| SkippedUpline { user_id: member.user_id, level, reason };

            let subscription = match &member.subscription {
                Some(sub) if sub.is_active() => sub,
                _ => {
                    calc.skipped.push(skip(SkipReason::InactiveSubscription));
                    continue;
                }
            };

            let Some(phase) = &member.phase_level else {
                calc.skipped.push(skip(SkipReason::MissingPhaseLevel));
                continue;
            };

            let Some(rate_bps) = phase.rate_for_depth(level) else {
                calc.skipped.push(skip(SkipReason::BeyondPhaseDepth));
                continue;
            };

            let amount_cents = apply_rate(base_cents, rate_bps).ok_or(CommissionError::Overflow { level })?;
            if amount_cents == 0 {
                calc.skipped.push(skip(SkipReason::ZeroAmount));
                continue;
            }

            calc.drafts.push(CommissionDraft {
                beneficiary_id: member.user_id,
                source_user_id: buyer_id,
                level,
                phase: subscription.phase,
                rate_bps,
                base_cents,
                amount_cents,
            });
        }

        Ok(calc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::SubscriptionStatus;

    fn phase(phase: i32, direct: i32, network: i32, max_depth: i32) -> PhaseLevel {
        PhaseLevel {
            phase,
            name: format!("Phase {}", phase),
            direct_rate_bps: direct,
            network_rate_bps: network,
            max_depth,
            is_active: true,
        }
    }

    fn member(status: SubscriptionStatus, level: Option<PhaseLevel>) -> UplineMember {
        let user_id = Uuid::new_v4();
        let phase_no = level.as_ref().map(|p| p.phase).unwrap_or(0);
        UplineMember {
            user_id,
            subscription: Some(Subscription::new(user_id, status, phase_no)),
            phase_level: level,
        }
    }

    #[test]
    fn test_direct_and_network_rates() {
        let buyer = Uuid::new_v4();
        let upline = vec![
            member(SubscriptionStatus::Active, Some(phase(1, 1000, 200, 3))),
            member(SubscriptionStatus::Active, Some(phase(2, 1200, 300, 3))),
            member(SubscriptionStatus::Active, Some(phase(3, 1500, 500, 3))),
        ];

        let calc = CommissionCalculator::calculate(buyer, 10_000, &upline).unwrap();

        let amounts: Vec<_> = calc.drafts.iter().map(|d| (d.level, d.rate_bps, d.amount_cents)).collect();
        assert_eq!(amounts, vec![(1, 1000, 1000), (2, 300, 300), (3, 500, 500)]);
        assert!(calc.drafts.iter().all(|d| d.source_user_id == buyer && d.base_cents == 10_000));
        assert_eq!(calc.total_cents(), 1800);
    }

    #[test]
    fn test_inactive_upline_is_skipped_without_compression() {
        let upline = vec![
            member(SubscriptionStatus::Active, Some(phase(1, 1000, 200, 5))),
            member(SubscriptionStatus::Waitlisted, Some(phase(1, 1000, 200, 5))),
            member(SubscriptionStatus::Active, Some(phase(1, 1000, 200, 5))),
        ];

        let calc = CommissionCalculator::calculate(Uuid::new_v4(), 5_000, &upline).unwrap();

        assert_eq!(calc.drafts.len(), 2);
        assert_eq!(calc.drafts[1].level, 3);
        assert_eq!(calc.drafts[1].amount_cents, 100);
        assert_eq!(calc.skipped, vec![SkippedUpline {
            user_id: upline[1].user_id,
            level: 2,
            reason: SkipReason::InactiveSubscription,
        }]);
    }

    #[test]
    fn test_phase_depth_limits_payout() {
        let upline = vec![
            member(SubscriptionStatus::Active, Some(phase(0, 800, 0, 1))),
            member(SubscriptionStatus::Active, Some(phase(0, 800, 100, 1))),
        ];

        let calc = CommissionCalculator::calculate(Uuid::new_v4(), 10_000, &upline).unwrap();

        assert_eq!(calc.drafts.len(), 1);
        assert_eq!(calc.skipped[0].reason, SkipReason::BeyondPhaseDepth);
    }

    #[test]
    fn test_missing_phase_and_zero_amounts() {
        let no_sub = UplineMember { user_id: Uuid::new_v4(), subscription: None, phase_level: None };
        let upline = vec![
            member(SubscriptionStatus::Active, None),
            no_sub,
            member(SubscriptionStatus::Active, Some(phase(1, 1000, 1, 5))),
        ];

        // 3rd level earns 1 bps of 99 cents -> floors to zero
        let calc = CommissionCalculator::calculate(Uuid::new_v4(), 99, &upline).unwrap();

        assert!(calc.drafts.is_empty());
        let reasons: Vec<_> = calc.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![
            SkipReason::MissingPhaseLevel,
            SkipReason::InactiveSubscription,
            SkipReason::ZeroAmount,
        ]);
    }

    #[test]
    fn test_negative_base_is_rejected() {
        let result = CommissionCalculator::calculate(Uuid::new_v4(), -1, &[]);
        assert!(matches!(result, Err(CommissionError::InvalidBase(-1))));
    }
}
