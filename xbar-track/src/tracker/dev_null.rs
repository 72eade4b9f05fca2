// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::fmt;

use crate::tracker::Track;
use crate::{Id, ROOT};

/// A tracker that emits nothing.
///
/// Ids are still unique so that cells created while benchmarking can be told
/// apart.
pub struct DevNullTracker {
    next_id: Cell<u64>,
}

impl Default for DevNullTracker {
    fn default() -> Self {
        Self {
            next_id: Cell::new(ROOT.0 + 1),
        }
    }
}

impl Track for DevNullTracker {
    fn unique_id(&self) -> Id {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Id(id)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        false
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {}
    fn enter(&self, _id: Id, _obj: Id) {}
    fn exit(&self, _id: Id, _obj: Id) {}
    fn value(&self, _id: Id, _value: f64) {}
    fn create(&self, _id: Id, _obj: Id, _name: &str) {}
    fn destroy(&self, _id: Id, _obj: Id) {}
    fn log(&self, _id: Id, _level: log::Level, _msg: fmt::Arguments) {}
    fn tick(&self, _set_by: Id, _tick: u64) {}
    fn shutdown(&self) {}
}
