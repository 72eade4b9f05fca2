// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use approx::assert_relative_eq;
use xbar_engine::cell::Destination;
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::{Arrival, Generate};
use xbar_models::traffic::{TrafficConfig, TrafficPattern, create_generators};
use xbar_track::entity::toplevel;
use xbar_track::test_helpers::create_tracker;

fn generators(
    switch_config: &SwitchConfig,
    config: &TrafficConfig,
    seed: u64,
) -> Vec<Box<dyn Generate>> {
    let top = toplevel(&create_tracker(file!()), "top");
    create_generators(&top, switch_config, config, seed).unwrap()
}

fn arrivals(generator: &mut dyn Generate, ticks: u64) -> Vec<Option<Arrival>> {
    (0..ticks).map(|tick| generator.generate(tick)).collect()
}

fn rate(arrivals: &[Option<Arrival>]) -> f64 {
    arrivals.iter().flatten().count() as f64 / arrivals.len() as f64
}

#[test]
fn bernoulli_rate_matches_load() {
    let switch_config = SwitchConfig::new(4, 4, 2, 1).unwrap();
    let config = TrafficConfig {
        load: 0.3,
        ..TrafficConfig::default()
    };
    for mut generator in generators(&switch_config, &config, 3) {
        let arrivals = arrivals(generator.as_mut(), 20_000);
        assert_relative_eq!(rate(&arrivals), 0.3, epsilon = 0.02);
        for arrival in arrivals.iter().flatten() {
            assert!(arrival.priority < 2);
            assert!(matches!(arrival.destination, Destination::Unicast(o) if o < 4));
        }
    }
}

#[test]
fn bursty_rate_matches_load() {
    let switch_config = SwitchConfig::new(2, 8, 1, 1).unwrap();
    let config = TrafficConfig {
        pattern: TrafficPattern::Bursty,
        load: 0.4,
        burst_length: 8.0,
        ..TrafficConfig::default()
    };
    for mut generator in generators(&switch_config, &config, 5) {
        let arrivals = arrivals(generator.as_mut(), 200_000);
        assert_relative_eq!(rate(&arrivals), 0.4, epsilon = 0.03);

        // Back to back cells to the same output form runs about as long as a
        // burst.
        let mut runs = 0u32;
        let mut cells = 0u32;
        let mut previous = None;
        for arrival in &arrivals {
            let output = arrival.as_ref().map(|a| a.destination.clone());
            if output.is_some() {
                cells += 1;
                if output != previous {
                    runs += 1;
                }
            }
            previous = output;
        }
        let mean_run = f64::from(cells) / f64::from(runs);
        assert!(mean_run > 4.0, "mean run {mean_run}");
    }
}

#[test]
fn full_load_bursts_never_idle() {
    let switch_config = SwitchConfig::new(1, 4, 1, 1).unwrap();
    let config = TrafficConfig {
        pattern: TrafficPattern::Bursty,
        load: 1.0,
        burst_length: 4.0,
        ..TrafficConfig::default()
    };
    let mut generator = generators(&switch_config, &config, 1).remove(0);
    assert!(arrivals(generator.as_mut(), 1000).iter().all(Option::is_some));
}

#[test]
fn hotspot_output_gets_its_share() {
    let switch_config = SwitchConfig::new(2, 8, 1, 1).unwrap();
    let config = TrafficConfig {
        pattern: TrafficPattern::Hotspot,
        load: 1.0,
        hotspot_output: 5,
        hotspot_fraction: 0.5,
        ..TrafficConfig::default()
    };
    for mut generator in generators(&switch_config, &config, 9) {
        let arrivals = arrivals(generator.as_mut(), 20_000);
        let hot = arrivals
            .iter()
            .flatten()
            .filter(|a| a.destination == Destination::Unicast(5))
            .count();
        // Half the cells go to the hot output and an eighth of the rest too
        assert_relative_eq!(hot as f64 / 20_000.0, 0.5625, epsilon = 0.02);
    }
}

#[test]
fn multicast_cells_have_destinations() {
    let switch_config = SwitchConfig::new(4, 4, 1, 1).unwrap();
    let config = TrafficConfig {
        pattern: TrafficPattern::Multicast,
        load: 0.8,
        multicast_fraction: 0.5,
        fanout_probability: 0.1,
        ..TrafficConfig::default()
    };
    for mut generator in generators(&switch_config, &config, 17) {
        let arrivals = arrivals(generator.as_mut(), 10_000);
        let mut multicast = 0u32;
        for arrival in arrivals.iter().flatten() {
            if let Destination::Multicast(outputs) = &arrival.destination {
                multicast += 1;
                assert!(!outputs.is_empty());
                assert!(outputs.iter().all(|o| o < 4));
            }
        }
        let total = arrivals.iter().flatten().count();
        assert_relative_eq!(f64::from(multicast) / total as f64, 0.5, epsilon = 0.03);
    }
}

#[test]
fn same_seed_same_traffic() {
    let switch_config = SwitchConfig::new(3, 3, 2, 1).unwrap();
    let config = TrafficConfig::default();
    let run = |seed| -> Vec<Vec<Option<Arrival>>> {
        generators(&switch_config, &config, seed)
            .iter_mut()
            .map(|g| arrivals(g.as_mut(), 500))
            .collect()
    };
    let first = run(42);
    assert_eq!(first, run(42));
    assert_ne!(first, run(43));

    // Inputs draw from their own streams
    assert_ne!(first[0], first[1]);
}

#[test]
fn invalid_traffic_is_rejected() {
    let switch_config = SwitchConfig::new(4, 4, 1, 1).unwrap();
    let top = toplevel(&create_tracker(file!()), "top");
    let overload = TrafficConfig {
        load: 1.5,
        ..TrafficConfig::default()
    };
    assert!(create_generators(&top, &switch_config, &overload, 0).is_err());

    let missing_hotspot = TrafficConfig {
        pattern: TrafficPattern::Hotspot,
        hotspot_output: 4,
        ..TrafficConfig::default()
    };
    assert!(create_generators(&top, &switch_config, &missing_hotspot, 0).is_err());
}
