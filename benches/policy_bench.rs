//! Benchmarks for access-policy evaluation.
//!
//! Every access event the lock reports goes through `PolicyEvaluator::apply`
//! and a `SlotStore` upsert, serialized by the event pump. These benchmarks
//! track the cost of that hot path.
//!
//! # Run Benchmarks
//!
//! ```sh
//! # Run all policy benchmarks
//! cargo bench --bench policy_bench
//!
//! # Run one group
//! cargo bench --bench policy_bench -- classify
//!
//! # Compare against a saved baseline
//! cargo bench --bench policy_bench -- --save-baseline main
//! cargo bench --bench policy_bench -- --baseline main
//! ```

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use slotwarden_core::{AccessMethod, Schedule, Slot, SlotId};
use slotwarden_device::AccessEvent;
use slotwarden_engine::{LimitPolicy, PolicyEvaluator, SlotStore};
use std::hint::black_box;

fn scheduled_slot() -> Slot {
    let start = Utc
        .with_ymd_and_hms(2025, 6, 1, 8, 0, 0)
        .single()
        .expect("valid start");
    let mut slot = Slot::unassigned(SlotId::new(1));
    slot.schedule = Some(
        Schedule::new(start.fixed_offset(), (start + Duration::hours(10)).fixed_offset())
            .expect("valid schedule"),
    );
    slot.usage_limit = Some(u32::MAX);
    slot
}

/// Classification alone, for each branch of the precedence chain.
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    let evaluator = PolicyEvaluator::default();
    let inside = Utc
        .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid time");
    let outside = inside + Duration::days(2);

    let mut disabled = scheduled_slot();
    disabled.enabled = false;
    let mut exhausted = scheduled_slot();
    exhausted.usage_limit = Some(1);
    exhausted.usage_count = 1;

    let cases = vec![
        ("granted", scheduled_slot(), inside),
        ("denied_disabled", disabled, inside),
        ("denied_expired", scheduled_slot(), outside),
        ("denied_limit", exhausted, inside),
    ];

    for (name, slot, at) in cases {
        group.bench_with_input(BenchmarkId::new("outcome", name), &slot, |b, slot| {
            b.iter(|| black_box(evaluator.classify(black_box(slot), black_box(at))));
        });
    }

    group.finish();
}

/// Evaluate and record one access against a slot.
fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    group.throughput(Throughput::Elements(1));

    let event = AccessEvent::new(
        SlotId::new(1),
        AccessMethod::Pin,
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid time"),
    );

    for policy in [LimitPolicy::LazyDeny, LimitPolicy::DisableOnLimit] {
        let evaluator = PolicyEvaluator::new(policy);
        group.bench_function(format!("{policy:?}"), |b| {
            let mut slot = scheduled_slot();
            b.iter(|| black_box(evaluator.apply(&mut slot, black_box(&event))));
        });
    }

    group.finish();
}

/// The full per-event path through the slot store, across table sizes.
fn bench_store_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_upsert");
    let evaluator = PolicyEvaluator::default();

    for slot_count in [4u16, 20, 250] {
        group.throughput(Throughput::Elements(u64::from(slot_count)));
        let store = SlotStore::new(slot_count);
        let events: Vec<AccessEvent> = (1..=slot_count)
            .map(|id| AccessEvent::new(SlotId::new(id), AccessMethod::Pin, Utc::now()))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("every_slot", slot_count),
            &events,
            |b, events| {
                b.iter(|| {
                    for event in events {
                        let evaluation = store
                            .upsert_with(event.slot, |slot| Ok(evaluator.apply(slot, event)))
                            .expect("slot in range");
                        black_box(evaluation);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_apply, bench_store_upsert);
criterion_main!(benches);
