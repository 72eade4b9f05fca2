// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate an input-queued crossbar switch.
//!
//! See `lib.rs` for details.

use std::process::ExitCode;

use indicatif::{ProgressBar, ProgressStyle};
use xbar_engine::types::SimError;
use xbar_sim::config::Config;
use xbar_sim::{build_engine, setup_tracker};
use xbar_track::info;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SimError> {
    let config = Config::parse_all_sources()?;

    if config.scheduler_usage.unwrap_or(false) {
        println!("{}", config.scheduler.unwrap_or_default().usage());
        return Ok(());
    }

    let sim_config = config.to_sim_config()?;
    let tracker = setup_tracker(&config)?;
    let mut engine = build_engine(&tracker, &sim_config)?;
    let top = engine.top().clone();

    let progress_bar = config
        .progress
        .unwrap_or(false)
        .then(|| progress_bar(sim_config.engine.run_ticks));
    if let Some(bar) = &progress_bar {
        let bar = bar.clone();
        engine.on_progress(config.progress_ticks.unwrap_or(1000), move |tick| {
            bar.set_position(tick);
        });
    }

    let result = engine.run();
    if let Some(bar) = progress_bar {
        bar.finish_and_clear();
    }

    match result {
        Ok(summary) => {
            info!(top ; "Pass: {} ticks simulated", summary.ticks);
            tracker.shutdown();
            println!("{summary}");
            Ok(())
        }
        Err(e) => {
            tracker.shutdown();
            Err(e)
        }
    }
}

fn progress_bar(run_ticks: u64) -> ProgressBar {
    let bar = ProgressBar::new(run_ticks);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} ticks [{elapsed}]") {
        bar.set_style(style);
    }
    bar
}
