// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

/// Benchmark the matching algorithms on a loaded switch.
use clap::ValueEnum;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::switch::{Switch, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_schedulers::registry::SchedulerKind;
use xbar_schedulers::test_helpers::TestSwitch;
use xbar_track::entity::toplevel;
use xbar_track::tracker::dev_null_tracker;

const PORTS: usize = 16;

fn loaded_switch(kind: SchedulerKind) -> (Switch, Box<dyn Schedule>) {
    // Avoid the tracker system opening files for logging
    let tracker = dev_null_tracker();
    let top = toplevel(&tracker, "top");
    let config = SwitchConfig::new(PORTS, PORTS, 2, 1).unwrap();
    let scheduler = kind.init(&top, &config, &[], 1).unwrap();

    let mut test = TestSwitch::with_top(top, config);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
    for _ in 0..8 {
        if kind.is_multicast() {
            test.fill_multicast(&mut rng, 0.5);
        } else {
            test.fill_unicast(&mut rng, 0.5);
        }
    }
    (test.switch, scheduler)
}

fn run_schedule((switch, mut scheduler): (Switch, Box<dyn Schedule>)) -> usize {
    let mut admission = AdmissionMatrix::new(switch.config());
    for _ in 0..100 {
        admission.clear();
        scheduler.exec(switch.queues(), &mut admission);
    }
    admission.num_admitted()
}

fn bench_schedulers(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedulers");
    for kind in SchedulerKind::value_variants() {
        group.bench_function(kind.name(), |b| {
            b.iter_batched(|| loaded_switch(*kind), run_schedule, BatchSize::SmallInput);
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_schedulers
}
criterion_main!(benches);
