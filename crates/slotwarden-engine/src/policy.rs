//! Access policy evaluation.
//!
//! Rules run in a fixed order and the first match wins:
//!
//! 1. Slot disabled → [`AccessOutcome::DeniedDisabled`]
//! 2. Schedule present and the event outside it → [`AccessOutcome::DeniedExpired`]
//! 3. Usage limit consumed → [`AccessOutcome::DeniedLimitReached`]
//! 4. Otherwise → [`AccessOutcome::Granted`], and the usage count goes up
//!
//! Every outcome records the attempt as the slot's last access. Denials are
//! outcomes, not errors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwarden_core::{Slot, SlotId};
use slotwarden_device::AccessEvent;
use tracing::info;

use crate::config::LimitPolicy;
use crate::ledger;

/// Classified result of an access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    DeniedDisabled,
    DeniedExpired,
    DeniedLimitReached,
}

impl AccessOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::DeniedDisabled => "denied_disabled",
            Self::DeniedExpired => "denied_expired",
            Self::DeniedLimitReached => "denied_limit_reached",
        }
    }

    /// Wording used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::DeniedDisabled => "denied (slot disabled)",
            Self::DeniedExpired => "denied (outside schedule)",
            Self::DeniedLimitReached => "denied (usage limit reached)",
        }
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an evaluation decided about one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub slot: SlotId,
    pub outcome: AccessOutcome,
    /// The grant consumed the last allowed use.
    pub limit_just_reached: bool,
    /// The slot was disabled because the limit was reached.
    pub disabled_on_limit: bool,
    pub usage_count: u32,
}

/// Stateless policy evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator {
    limit_policy: LimitPolicy,
}

impl PolicyEvaluator {
    pub fn new(limit_policy: LimitPolicy) -> Self {
        Self { limit_policy }
    }

    /// Classify an attempt at `at` without touching the slot.
    pub fn classify(&self, slot: &Slot, at: DateTime<Utc>) -> AccessOutcome {
        if !slot.enabled {
            AccessOutcome::DeniedDisabled
        } else if slot.schedule.is_some_and(|s| !s.contains(at)) {
            AccessOutcome::DeniedExpired
        } else if slot.limit_reached() {
            AccessOutcome::DeniedLimitReached
        } else {
            AccessOutcome::Granted
        }
    }

    /// Classify an attempt and record it against the slot.
    pub fn apply(&self, slot: &mut Slot, event: &AccessEvent) -> Evaluation {
        let outcome = self.classify(slot, event.timestamp);
        let usage_count = ledger::record(slot, event, outcome.is_granted());

        let limit_just_reached = outcome.is_granted() && slot.usage_limit == Some(usage_count);

        let disabled_on_limit =
            limit_just_reached && self.limit_policy == LimitPolicy::DisableOnLimit;
        if disabled_on_limit {
            slot.enabled = false;
            slot.mark_dirty();
            info!("Slot {} disabled after reaching its usage limit", slot.id);
        }

        Evaluation {
            slot: slot.id,
            outcome,
            limit_just_reached,
            disabled_on_limit,
            usage_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use slotwarden_core::{AccessMethod, Schedule};

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap()
    }

    fn slot_with(enabled: bool, window: Option<(u32, u32)>, limit: Option<u32>, used: u32) -> Slot {
        let mut slot = Slot::unassigned(SlotId::new(3));
        slot.enabled = enabled;
        slot.schedule = window.map(|(start, end)| {
            Schedule::new(t(start).fixed_offset(), t(end).fixed_offset()).unwrap()
        });
        slot.usage_limit = limit;
        slot.usage_count = used;
        slot
    }

    fn access_at(at: DateTime<Utc>) -> AccessEvent {
        AccessEvent::new(SlotId::new(3), AccessMethod::Pin, at)
    }

    #[rstest]
    #[case::granted(true, None, None, 0, AccessOutcome::Granted)]
    #[case::disabled_wins_over_everything(false, Some((1, 2)), Some(1), 5, AccessOutcome::DeniedDisabled)]
    #[case::outside_schedule(true, Some((1, 2)), None, 0, AccessOutcome::DeniedExpired)]
    #[case::expired_wins_over_limit(true, Some((1, 2)), Some(1), 1, AccessOutcome::DeniedExpired)]
    #[case::limit_reached(true, Some((8, 17)), Some(2), 2, AccessOutcome::DeniedLimitReached)]
    #[case::under_limit(true, Some((8, 17)), Some(2), 1, AccessOutcome::Granted)]
    fn test_rule_order(
        #[case] enabled: bool,
        #[case] window: Option<(u32, u32)>,
        #[case] limit: Option<u32>,
        #[case] used: u32,
        #[case] expected: AccessOutcome,
    ) {
        let slot = slot_with(enabled, window, limit, used);
        assert_eq!(PolicyEvaluator::default().classify(&slot, t(12)), expected);
    }

    #[test]
    fn test_schedule_bounds_are_inclusive() {
        let slot = slot_with(true, Some((8, 17)), None, 0);
        let evaluator = PolicyEvaluator::default();

        assert_eq!(evaluator.classify(&slot, t(8)), AccessOutcome::Granted);
        assert_eq!(evaluator.classify(&slot, t(17)), AccessOutcome::Granted);
        assert_eq!(
            evaluator.classify(&slot, t(8) - Duration::seconds(1)),
            AccessOutcome::DeniedExpired
        );
        assert_eq!(
            evaluator.classify(&slot, t(17) + Duration::seconds(1)),
            AccessOutcome::DeniedExpired
        );
    }

    #[test]
    fn test_limit_sequence_lazy_deny() {
        let mut slot = slot_with(true, None, Some(2), 0);
        let evaluator = PolicyEvaluator::new(LimitPolicy::LazyDeny);

        let first = evaluator.apply(&mut slot, &access_at(t(9)));
        assert_eq!(first.outcome, AccessOutcome::Granted);
        assert!(!first.limit_just_reached);

        let second = evaluator.apply(&mut slot, &access_at(t(10)));
        assert_eq!(second.outcome, AccessOutcome::Granted);
        assert!(second.limit_just_reached);
        assert!(!second.disabled_on_limit);
        assert!(slot.enabled);

        let third = evaluator.apply(&mut slot, &access_at(t(11)));
        assert_eq!(third.outcome, AccessOutcome::DeniedLimitReached);
        assert_eq!(slot.usage_count, 2);
        assert_eq!(slot.last_access.unwrap().timestamp, t(11));
    }

    #[test]
    fn test_limit_sequence_disable_on_limit() {
        let mut slot = slot_with(true, None, Some(1), 0);
        let evaluator = PolicyEvaluator::new(LimitPolicy::DisableOnLimit);

        let first = evaluator.apply(&mut slot, &access_at(t(9)));
        assert!(first.limit_just_reached);
        assert!(first.disabled_on_limit);
        assert!(!slot.enabled);

        let second = evaluator.apply(&mut slot, &access_at(t(10)));
        assert_eq!(second.outcome, AccessOutcome::DeniedDisabled);
        assert_eq!(slot.usage_count, 1);
    }

    #[test]
    fn test_denials_record_last_access_without_counting() {
        let mut slot = slot_with(false, None, None, 4);
        let event = AccessEvent::new(SlotId::new(3), AccessMethod::Fob, t(6));

        let evaluation = PolicyEvaluator::default().apply(&mut slot, &event);

        assert_eq!(evaluation.outcome, AccessOutcome::DeniedDisabled);
        assert_eq!(slot.usage_count, 4);
        let last = slot.last_access.unwrap();
        assert_eq!((last.timestamp, last.method), (t(6), AccessMethod::Fob));
    }
}
