// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Build the console and trace file trackers selected by the user.

use std::fs;
use std::io::{self, BufWriter};
use std::rc::Rc;

use crate::tracker::{EntityManager, MultiTracker, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// One text output.
pub struct TrackerConfig<'a> {
    /// Write this output.
    pub enable: bool,

    /// Level applied to the entities selected by `filter_regex`, or to every
    /// entity when there is no filter.
    pub level: log::Level,

    /// Empty to select every entity.
    pub filter_regex: &'a str,

    /// Path of the trace file. Ignored for the console.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

/// The console and trace file outputs.
pub struct TrackersConfig<'a> {
    /// Console output.
    pub stdout: TrackerConfig<'a>,

    /// Trace file output.
    pub file: TrackerConfig<'a>,
}

/// Entities outside the filter only report errors.
fn entity_manager(config: &TrackerConfig) -> Result<EntityManager, TrackConfigError> {
    if config.filter_regex.is_empty() {
        return Ok(EntityManager::new(config.level));
    }
    let mut manager = EntityManager::new(log::Level::Error);
    manager.add_entity_level_filter(config.filter_regex, config.level)?;
    Ok(manager)
}

fn text_tracker(config: &TrackerConfig, writer: Writer) -> Result<Tracker, TrackConfigError> {
    Ok(Rc::new(TextTracker::new(entity_manager(config)?, writer)))
}

fn stdout_tracker(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    text_tracker(config, Box::new(BufWriter::new(io::stdout())))
}

fn file_tracker(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    let path = config
        .file
        .ok_or_else(|| TrackConfigError("No trace file given".to_string()))?;
    let file = fs::File::create(path)
        .map_err(|e| TrackConfigError(format!("Cannot create trace file {path}: {e}")))?;
    text_tracker(config, Box::new(BufWriter::new(file)))
}

/// Combine the enabled outputs into one [`Tracker`]. With neither enabled,
/// warnings and errors still reach the console.
pub fn setup_trackers(config: &TrackersConfig) -> Result<Tracker, TrackConfigError> {
    match (config.stdout.enable, config.file.enable) {
        (true, true) => {
            let mut tracker = MultiTracker::default();
            tracker.add_tracker(stdout_tracker(&config.stdout)?);
            tracker.add_tracker(file_tracker(&config.file)?);
            Ok(Rc::new(tracker))
        }
        (true, false) => stdout_tracker(&config.stdout),
        (false, true) => file_tracker(&config.file),
        (false, false) => stdout_tracker(&TrackerConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn trace_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let path = path.to_str().unwrap();
        let config = TrackersConfig {
            stdout: TrackerConfig {
                enable: false,
                ..TrackerConfig::default()
            },
            file: TrackerConfig {
                file: Some(path),
                ..TrackerConfig::default()
            },
        };
        let tracker = setup_trackers(&config).unwrap();
        tracker.shutdown();
        assert!(std::path::Path::new(path).is_file());
    }

    #[test]
    fn bad_filter_is_rejected() {
        let config = TrackerConfig {
            filter_regex: "switch(",
            ..TrackerConfig::default()
        };
        assert!(entity_manager(&config).is_err());
    }
}
