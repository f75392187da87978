//! Tier decision table.
//!
//! Rules are evaluated in order and the first match wins. Only the generic
//! step-down rule reads the tier's own maintain threshold; the others use the
//! fixed program breakpoints below.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Below this a manager is flagged for removal from the tier system.
pub const DEMOTION_FLOOR: Decimal = Decimal::from_parts(1_200_000, 0, 0, false, 0);
/// Tier 3 holders below this drop to tier 2.
pub const TOP_TIER_RETENTION: Decimal = Decimal::from_parts(3_000_000, 0, 0, false, 0);
/// Sales at or above this promote tiers 1 and 2 to tier 3.
pub const TOP_TIER_ENTRY: Decimal = Decimal::from_parts(2_400_000, 0, 0, false, 0);
/// Sales at or above this promote tier 1 to tier 2.
pub const MIDDLE_TIER_ENTRY: Decimal = Decimal::from_parts(1_500_000, 0, 0, false, 0);

pub const TOP_TIER: u32 = 3;
pub const MIDDLE_TIER: u32 = 2;
pub const BASE_TIER: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Maintained,
    Promoted,
    SteppedDown,
    DemotionCandidate,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintained => "maintained",
            Self::Promoted => "promoted",
            Self::SteppedDown => "stepped_down",
            Self::DemotionCandidate => "demotion_candidate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "maintained" => Some(Self::Maintained),
            "promoted" => Some(Self::Promoted),
            "stepped_down" => Some(Self::SteppedDown),
            "demotion_candidate" => Some(Self::DemotionCandidate),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub is_demotion_candidate: bool,
    pub proposed_tier_number: u32,
    pub outcome: DecisionOutcome,
}

impl Decision {
    fn maintain(tier_number: u32) -> Self {
        Self {
            is_demotion_candidate: false,
            proposed_tier_number: tier_number,
            outcome: DecisionOutcome::Maintained,
        }
    }

    fn promote(tier_number: u32) -> Self {
        Self {
            is_demotion_candidate: false,
            proposed_tier_number: tier_number,
            outcome: DecisionOutcome::Promoted,
        }
    }

    fn step_down(tier_number: u32) -> Self {
        Self {
            is_demotion_candidate: false,
            proposed_tier_number: tier_number,
            outcome: DecisionOutcome::SteppedDown,
        }
    }
}

pub fn decide(
    current_tier_number: u32,
    current_maintain_threshold: Decimal,
    total_sales: Decimal,
) -> Decision {
    // Demotion is only ever proposed here; a human applies it.
    if total_sales < DEMOTION_FLOOR {
        return Decision {
            is_demotion_candidate: true,
            proposed_tier_number: current_tier_number,
            outcome: DecisionOutcome::DemotionCandidate,
        };
    }

    if current_tier_number == TOP_TIER && total_sales < TOP_TIER_RETENTION {
        return Decision::step_down(MIDDLE_TIER);
    }

    if total_sales >= TOP_TIER_ENTRY && current_tier_number < TOP_TIER {
        return Decision::promote(TOP_TIER);
    }

    if total_sales >= MIDDLE_TIER_ENTRY && current_tier_number < MIDDLE_TIER {
        return Decision::promote(MIDDLE_TIER);
    }

    if total_sales < current_maintain_threshold && current_tier_number > BASE_TIER {
        return Decision::step_down(current_tier_number - 1);
    }

    Decision::maintain(current_tier_number)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{decide, DecisionOutcome};

    fn yen(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn demotion_floor_is_exclusive() {
        let below = decide(1, yen(1_200_000), yen(1_199_999));
        assert!(below.is_demotion_candidate);
        assert_eq!(below.proposed_tier_number, 1);
        assert_eq!(below.outcome, DecisionOutcome::DemotionCandidate);

        let at = decide(1, yen(1_200_000), yen(1_200_000));
        assert!(!at.is_demotion_candidate);
        assert_eq!(at.proposed_tier_number, 1);
        assert_eq!(at.outcome, DecisionOutcome::Maintained);
    }

    #[test]
    fn demotion_candidate_wins_over_every_other_rule() {
        let decision = decide(3, yen(5_000_000), yen(0));
        assert!(decision.is_demotion_candidate);
        assert_eq!(decision.proposed_tier_number, 3);
    }

    #[test]
    fn base_tier_promotes_to_middle_then_top() {
        let middle = decide(1, yen(1_200_000), yen(1_500_001));
        assert_eq!(middle.proposed_tier_number, 2);
        assert_eq!(middle.outcome, DecisionOutcome::Promoted);

        let boundary = decide(1, yen(1_200_000), yen(1_500_000));
        assert_eq!(boundary.proposed_tier_number, 2);

        let below = decide(1, yen(1_200_000), yen(1_499_999));
        assert_eq!(below.outcome, DecisionOutcome::Maintained);

        let top = decide(1, yen(1_200_000), yen(2_400_000));
        assert_eq!(top.proposed_tier_number, 3);
    }

    #[test]
    fn middle_tier_promotes_at_top_entry() {
        let decision = decide(2, yen(1_500_000), yen(2_400_000));
        assert_eq!(decision.proposed_tier_number, 3);
        assert_eq!(decision.outcome, DecisionOutcome::Promoted);

        let short = decide(2, yen(1_500_000), yen(2_399_999));
        assert_eq!(short.proposed_tier_number, 2);
        assert_eq!(short.outcome, DecisionOutcome::Maintained);
    }

    #[test]
    fn top_tier_retention_uses_fixed_breakpoint() {
        let below = decide(3, yen(2_400_000), yen(2_999_999));
        assert_eq!(below.proposed_tier_number, 2);
        assert_eq!(below.outcome, DecisionOutcome::SteppedDown);
        assert!(!below.is_demotion_candidate);

        let at = decide(3, yen(2_400_000), yen(3_000_000));
        assert_eq!(at.proposed_tier_number, 3);
        assert_eq!(at.outcome, DecisionOutcome::Maintained);
    }

    #[test]
    fn tier_threshold_steps_down_one_tier() {
        let decision = decide(2, yen(1_500_000), yen(1_300_000));
        assert_eq!(decision.proposed_tier_number, 1);
        assert_eq!(decision.outcome, DecisionOutcome::SteppedDown);

        let higher_tier = decide(5, yen(4_000_000), yen(3_500_000));
        assert_eq!(higher_tier.proposed_tier_number, 4);
    }

    #[test]
    fn base_tier_never_steps_below_one() {
        let decision = decide(1, yen(1_400_000), yen(1_300_000));
        assert_eq!(decision.proposed_tier_number, 1);
        assert_eq!(decision.outcome, DecisionOutcome::Maintained);
    }

    #[test]
    fn outcome_round_trips_from_storage_encoding() {
        for outcome in [
            DecisionOutcome::Maintained,
            DecisionOutcome::Promoted,
            DecisionOutcome::SteppedDown,
            DecisionOutcome::DemotionCandidate,
        ] {
            assert_eq!(DecisionOutcome::parse(outcome.as_str()), Some(outcome));
        }
    }
}
