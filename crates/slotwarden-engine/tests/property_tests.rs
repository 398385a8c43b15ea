//! Property-based tests for access policy.
//!
//! These drive the evaluator with generated access sequences and check
//! the usage-accounting and schedule invariants hold for all of them.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use slotwarden_core::{AccessMethod, Schedule, Slot, SlotId};
use slotwarden_device::AccessEvent;
use slotwarden_engine::{AccessOutcome, LimitPolicy, PolicyEvaluator};

/// One step applied to a slot between accesses.
#[derive(Debug, Clone)]
enum Step {
    Access(i64),
    Toggle,
    Reset,
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid base time")
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (-600i64..600).prop_map(Step::Access),
        1 => Just(Step::Toggle),
        1 => Just(Step::Reset),
    ]
}

fn limit_policy() -> impl Strategy<Value = LimitPolicy> {
    prop_oneof![Just(LimitPolicy::LazyDeny), Just(LimitPolicy::DisableOnLimit)]
}

fn event(offset_minutes: i64) -> AccessEvent {
    AccessEvent::new(
        SlotId::new(1),
        AccessMethod::Pin,
        base_time() + Duration::minutes(offset_minutes),
    )
}

proptest! {
    /// Property: usage_count equals the number of grants since the last reset.
    #[test]
    fn prop_usage_count_matches_grants(
        steps in prop::collection::vec(step(), 0..60),
        usage_limit in prop::option::of(1u32..8),
        windowed in any::<bool>(),
        policy in limit_policy(),
    ) {
        let evaluator = PolicyEvaluator::new(policy);
        let mut slot = Slot::unassigned(SlotId::new(1));
        slot.usage_limit = usage_limit;
        if windowed {
            let start = base_time() - Duration::minutes(120);
            let end = base_time() + Duration::minutes(120);
            slot.schedule = Some(Schedule::new(start.fixed_offset(), end.fixed_offset()).unwrap());
        }

        let mut grants = 0u32;
        for step in steps {
            match step {
                Step::Access(offset) => {
                    let evaluation = evaluator.apply(&mut slot, &event(offset));
                    if evaluation.outcome.is_granted() {
                        grants += 1;
                    }
                    prop_assert_eq!(evaluation.usage_count, slot.usage_count);
                }
                Step::Toggle => slot.enabled = !slot.enabled,
                Step::Reset => {
                    slot.usage_count = 0;
                    grants = 0;
                }
            }
            prop_assert_eq!(slot.usage_count, grants);
            if let Some(limit) = slot.usage_limit {
                prop_assert!(slot.usage_count <= limit);
            }
        }
    }

    /// Property: an access outside the window is always DeniedExpired,
    /// whatever the usage count.
    #[test]
    fn prop_outside_window_is_expired(
        minutes_outside in 1i64..10_000,
        before in any::<bool>(),
        usage_count in 0u32..100,
        usage_limit in prop::option::of(1u32..100),
    ) {
        let start = base_time();
        let end = base_time() + Duration::hours(8);
        let mut slot = Slot::unassigned(SlotId::new(1));
        slot.schedule = Some(Schedule::new(start.fixed_offset(), end.fixed_offset()).unwrap());
        slot.usage_count = usage_count;
        slot.usage_limit = usage_limit;

        let at = if before {
            start - Duration::minutes(minutes_outside)
        } else {
            end + Duration::minutes(minutes_outside)
        };

        let evaluator = PolicyEvaluator::default();
        prop_assert_eq!(evaluator.classify(&slot, at), AccessOutcome::DeniedExpired);

        let attempt = AccessEvent::new(slot.id, AccessMethod::Pin, at);
        let evaluation = evaluator.apply(&mut slot, &attempt);
        prop_assert_eq!(evaluation.outcome, AccessOutcome::DeniedExpired);
        prop_assert_eq!(slot.usage_count, usage_count);
    }
}
