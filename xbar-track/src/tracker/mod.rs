// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The [`Track`] interface and its implementations.
//!
//! A tracker receives every event of a run: entities coming and going, cells
//! entering and leaving them, sampled values and log messages. Each tracker
//! decides, per entity, which levels it wants to see.

/// Discards events.
pub mod dev_null;
/// Fans events out to several trackers.
pub mod multi_tracker;
/// Writes events as text lines.
pub mod text;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use dev_null::DevNullTracker;
pub use multi_tracker::MultiTracker;
use regex::Regex;
pub use text::TextTracker;

use crate::{Id, ROOT};

/// A tracker could not be built from its configuration.
#[derive(Debug)]
pub struct TrackConfigError(pub String);

impl fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track config error: {}", self.0)
    }
}

impl std::error::Error for TrackConfigError {}

/// Receiver of simulation events.
///
/// Methods take `&self` because a tracker is shared by every entity of a run.
pub trait Track {
    /// A fresh id, never returned before by this tracker.
    fn unique_id(&self) -> Id;

    /// Whether events at `level` from entity `id` are wanted.
    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool;

    /// Register the full name of entity `id`.
    fn add_entity(&self, id: Id, entity_name: &str);

    /// Cell `enter_obj` was queued in entity `enter_into`.
    fn enter(&self, enter_into: Id, enter_obj: Id);

    /// Cell `exit_obj` left entity `exit_from`.
    fn exit(&self, exit_from: Id, exit_obj: Id);

    /// Entity `id` sampled `value`.
    fn value(&self, id: Id, value: f64);

    /// Entity `created_obj` named `name` was created below `created_by`.
    fn create(&self, created_by: Id, created_obj: Id, name: &str);

    /// Entity `destroyed_obj` was dropped.
    fn destroy(&self, destroyed_by: Id, destroyed_obj: Id);

    /// A message from entity `msg_by`.
    fn log(&self, msg_by: Id, level: log::Level, msg: fmt::Arguments);

    /// The run has reached `tick`.
    fn tick(&self, set_by: Id, tick: u64);

    /// Flush any buffered output.
    fn shutdown(&self);
}

/// A [`Track`] shared by every entity of a run.
pub type Tracker = Rc<dyn Track>;

/// A [`Tracker`] that discards every event.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    Rc::new(DevNullTracker::default())
}

/// Entities whose full name matches `pattern` are tracked at `level`.
struct LevelFilter {
    pattern: Regex,
    level: log::Level,
}

/// Bookkeeping shared by the trackers that produce output.
///
/// Resolves the level of each entity when it is registered, hands out ids
/// and remembers the current tick so that output lines can carry it.
pub struct EntityManager {
    default_level: log::Level,

    /// Tried in the order they were added.
    filters: Vec<LevelFilter>,

    /// Only entities whose level differs from `default_level`.
    levels: RefCell<HashMap<Id, log::Level>>,

    next_id: Cell<u64>,
    now: Cell<u64>,
}

impl EntityManager {
    /// Track every entity at `default_level` until filters are added.
    #[must_use]
    pub fn new(default_level: log::Level) -> Self {
        Self {
            default_level,
            filters: Vec::new(),
            levels: RefCell::new(HashMap::new()),
            next_id: Cell::new(ROOT.0 + 1),
            now: Cell::new(0),
        }
    }

    /// Track the entities whose full name matches `regex_str` at `level`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use xbar_track::log::Level;
    /// use xbar_track::tracker::EntityManager;
    ///
    /// let mut manager = EntityManager::new(Level::Warn);
    /// manager.add_entity_level_filter("::sched", Level::Trace).unwrap();
    /// assert!(manager.add_entity_level_filter("(", Level::Trace).is_err());
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex_str: &str,
        level: log::Level,
    ) -> Result<(), TrackConfigError> {
        let pattern = Regex::new(regex_str).map_err(|e| {
            TrackConfigError(format!("Invalid entity filter {regex_str:?}: {e}"))
        })?;
        self.filters.push(LevelFilter { pattern, level });
        Ok(())
    }

    fn level_of(&self, entity_name: &str) -> log::Level {
        self.filters
            .iter()
            .find(|filter| filter.pattern.is_match(entity_name))
            .map_or(self.default_level, |filter| filter.level)
    }

    fn unique_id(&self) -> Id {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Id(id)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        let level = self.level_of(entity_name);
        if level == self.default_level {
            return;
        }
        let previous = self.levels.borrow_mut().insert(id, level);
        assert!(previous.is_none(), "{entity_name}: id {id} registered twice");
    }

    fn is_log_enabled_at_level(&self, id: Id, level: log::Level) -> bool {
        let limit = self
            .levels
            .borrow()
            .get(&id)
            .copied()
            .unwrap_or(self.default_level);
        level <= limit
    }

    fn tick(&self) -> u64 {
        self.now.get()
    }

    /// Ticks only move forwards within a run. Consecutive runs sharing a
    /// tracker each start again from zero.
    fn set_tick(&self, tick: u64) {
        debug_assert!(tick == 0 || tick >= self.now.get(), "Time moving backwards");
        self.now.set(tick);
    }
}
