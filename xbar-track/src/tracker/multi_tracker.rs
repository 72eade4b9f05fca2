// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::fmt;

use crate::Id;
use crate::tracker::{EntityManager, Track, Tracker};

/// Forwards every event to a set of [`Tracker`]s, for example the console
/// and a trace file.
///
/// Ids are allocated here so that all trackers see the same id for an
/// entity.
pub struct MultiTracker {
    ids: EntityManager,
    trackers: Vec<Tracker>,
}

impl MultiTracker {
    /// Forward events to `tracker` too.
    pub fn add_tracker(&mut self, tracker: Tracker) {
        self.trackers.push(tracker);
    }

    /// The trackers that want events of `level` from entity `id`.
    fn enabled(&self, id: Id, level: log::Level) -> impl Iterator<Item = &Tracker> {
        self.trackers
            .iter()
            .filter(move |tracker| tracker.is_entity_enabled(id, level))
    }
}

impl Default for MultiTracker {
    fn default() -> Self {
        Self {
            ids: EntityManager::new(log::Level::Error),
            trackers: Vec::new(),
        }
    }
}

impl Track for MultiTracker {
    fn unique_id(&self) -> Id {
        self.ids.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.enabled(id, level).next().is_some()
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.trackers
            .iter()
            .for_each(|tracker| tracker.add_entity(id, entity_name));
    }

    fn enter(&self, id: Id, object: Id) {
        self.enabled(id, log::Level::Trace)
            .for_each(|tracker| tracker.enter(id, object));
    }

    fn exit(&self, id: Id, object: Id) {
        self.enabled(id, log::Level::Trace)
            .for_each(|tracker| tracker.exit(id, object));
    }

    fn value(&self, id: Id, value: f64) {
        self.enabled(id, log::Level::Trace)
            .for_each(|tracker| tracker.value(id, value));
    }

    fn create(&self, created_by: Id, id: Id, name: &str) {
        self.enabled(id, log::Level::Trace)
            .for_each(|tracker| tracker.create(created_by, id, name));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.enabled(id, log::Level::Trace)
            .for_each(|tracker| tracker.destroy(destroyed_by, id));
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.enabled(id, level)
            .for_each(|tracker| tracker.log(id, level, msg));
    }

    fn tick(&self, set_by: Id, tick: u64) {
        self.trackers
            .iter()
            .for_each(|tracker| tracker.tick(set_by, tick));
    }

    fn shutdown(&self) {
        self.trackers.iter().for_each(|tracker| tracker.shutdown());
    }
}
