// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::env;
use std::io::Write;

use clap::Parser;
use serial_test::serial;
use xbar_engine::engine::ConvergenceConfig;
use xbar_models::overflow::BufferScope;
use xbar_models::traffic::TrafficPattern;
use xbar_schedulers::registry::SchedulerKind;
use xbar_sim::config::Config;

fn cli(args: &[&str]) -> Config {
    Config::try_parse_from(std::iter::once("xbar-sim").chain(args.iter().copied())).unwrap()
}

fn conf_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn defaults_without_other_sources() {
    let config = Config::load(cli(&[])).unwrap();
    assert_eq!(config, Config::default());

    let sim_config = config.to_sim_config().unwrap();
    assert_eq!(sim_config.switch.num_inputs, 16);
    assert_eq!(sim_config.scheduler, SchedulerKind::Islip);
    assert!(sim_config.scheduler_options.is_empty());
    assert_eq!(sim_config.engine.convergence, None);
    assert_eq!(sim_config.engine.max_cells, None);
    assert_eq!(sim_config.buffer_size, None);
}

#[test]
#[serial]
fn command_line_overrides_file() {
    let file = conf_file(
        r#"
        inputs = 8
        outputs = 8
        scheduler = "max-weight"
        scheduler_options = "-w ocf"
        load = 0.7
        traffic = "bursty"
        buffer_scope = "queue"
        "#,
    );
    let path = file.path().to_str().unwrap();
    let config = Config::load(cli(&["--conf-file", path, "--inputs", "6", "--seed", "9"])).unwrap();

    assert_eq!(config.inputs, Some(6));
    assert_eq!(config.outputs, Some(8));
    assert_eq!(config.seed, Some(9));
    assert_eq!(config.scheduler, Some(SchedulerKind::MaxWeight));
    assert_eq!(config.load, Some(0.7));
    assert_eq!(config.traffic, Some(TrafficPattern::Bursty));
    assert_eq!(config.buffer_scope, Some(BufferScope::Queue));

    let sim_config = config.to_sim_config().unwrap();
    assert_eq!(sim_config.scheduler_options, vec!["-w", "ocf"]);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let file = conf_file("load = 0.7\nrun_ticks = 500\n");
    let path = file.path().to_str().unwrap();

    // SAFETY: the tests touching the environment run serially
    unsafe {
        env::set_var("XBAR_LOAD", "0.2");
        env::set_var("XBAR_SCHEDULER", "lqf");
    }
    let config = Config::load(cli(&["--conf-file", path]));
    let overridden = Config::load(cli(&["--conf-file", path, "--load", "0.3"]));
    unsafe {
        env::remove_var("XBAR_LOAD");
        env::remove_var("XBAR_SCHEDULER");
    }

    let config = config.unwrap();
    assert_eq!(config.load, Some(0.2));
    assert_eq!(config.run_ticks, Some(500));
    assert_eq!(config.scheduler, Some(SchedulerKind::Lqf));
    assert_eq!(overridden.unwrap().load, Some(0.3));
}

#[test]
#[serial]
fn flags_without_values() {
    let config = Config::load(cli(&["--progress", "--stdout", "--scheduler-usage"])).unwrap();
    assert_eq!(config.progress, Some(true));
    assert_eq!(config.stdout, Some(true));
    assert_eq!(config.scheduler_usage, Some(true));

    let config = Config::load(cli(&["--stdout", "false"])).unwrap();
    assert_eq!(config.stdout, Some(false));
}

#[test]
#[serial]
fn zero_periods_disable_features() {
    let config = Config::load(cli(&[
        "--convergence-period",
        "500",
        "--max-cells",
        "1000",
        "--buffer-size",
        "4",
        "--report-period",
        "0",
    ]))
    .unwrap();
    let sim_config = config.to_sim_config().unwrap();
    assert_eq!(
        sim_config.engine.convergence,
        Some(ConvergenceConfig {
            period: 500,
            threshold: 0.01,
            required: 3,
        })
    );
    assert_eq!(sim_config.engine.max_cells, Some(1000));
    assert_eq!(sim_config.engine.report_period, None);
    assert_eq!(sim_config.buffer_size, Some(4));
}

#[test]
#[serial]
fn invalid_values_are_rejected() {
    let bad_load = Config::load(cli(&["--load", "1.5"])).unwrap();
    assert!(bad_load.to_sim_config().is_err());

    let no_inputs = Config::load(cli(&["--inputs", "0"])).unwrap();
    assert!(no_inputs.to_sim_config().is_err());

    let no_egress = Config::load(cli(&["--egress-rate", "0"])).unwrap();
    assert!(no_egress.to_sim_config().is_err());

    let zero_period = Config::load(cli(&["--fabric-period", "0"])).unwrap();
    assert!(zero_period.to_sim_config().is_err());
}

#[test]
#[serial]
fn bad_files_are_reported() {
    let missing = Config::load(cli(&["--conf-file", "no/such/file.toml"]));
    assert!(missing.is_err());

    let file = conf_file("inputs = \"many\"\n");
    let path = file.path().to_str().unwrap();
    let err = Config::load(cli(&["--conf-file", path])).unwrap_err();
    assert!(err.0.contains("Invalid configuration"), "{err}");
}

#[test]
fn unknown_scheduler_is_a_parse_error() {
    assert!(Config::try_parse_from(["xbar-sim", "--scheduler", "nope"]).is_err());
}

#[test]
#[serial]
fn scheduler_must_serve_the_traffic() {
    let config = Config::load(cli(&["--scheduler", "tatra"])).unwrap();
    let err = config.to_sim_config().unwrap_err();
    assert!(err.0.contains("scheduler tatra only serves multicast cells"), "{err}");
    assert!(err.0.contains("--depth"), "{err}");

    let config = Config::load(cli(&["--scheduler", "tatra", "--traffic", "multicast"])).unwrap();
    assert!(config.to_sim_config().is_ok());

    let config = Config::load(cli(&[
        "--scheduler",
        "wba",
        "--traffic",
        "multicast",
        "--multicast-fraction",
        "0.5",
    ]))
    .unwrap();
    assert!(config.to_sim_config().is_err());

    let config = Config::load(cli(&["--traffic", "multicast"])).unwrap();
    let err = config.to_sim_config().unwrap_err();
    assert!(err.0.contains("scheduler islip only serves unicast cells"), "{err}");

    let config = Config::load(cli(&[
        "--traffic",
        "multicast",
        "--multicast-fraction",
        "0",
    ]))
    .unwrap();
    assert!(config.to_sim_config().is_ok());
}
