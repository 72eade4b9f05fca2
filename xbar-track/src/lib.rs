// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

//! Logging and event tracing for the switch simulator.
//!
//! Models report through macros that take their [`Entity`](crate::entity::Entity)
//! first, for example `info!(self.entity ; "{} cells queued", n)`. Log macros
//! (`trace!` to `error!`) carry text; event macros (`enter!`, `exit!`,
//! `value!`) record cells moving through the switch and sampled values, and
//! are emitted at `Trace` level.
//!
//! Every part of the switch model owns an [`Entity`](crate::entity::Entity)
//! which shares a [`Tracker`]. The tracker decides, per entity, which events
//! are emitted.

#![warn(missing_docs)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use log;

pub mod builder;
pub mod entity;
pub mod test_helpers;

pub mod tracker;
pub use tracker::{Track, Tracker};

/// Destination of a text tracker.
pub type Writer = Box<dyn std::io::Write>;
type SharedWriter = Rc<RefCell<Writer>>;

/// Unique identifier given to every tracked entity and cell.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id(pub u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stands in for the missing parent of the top-level entity.
pub const NO_ID: Id = Id(0);

/// Reserved. Allocated ids start after it.
pub const ROOT: Id = Id(1);

/// Run `$body` only when `$entity` is tracked at `Trace`, the level of all
/// modelling events.
#[doc(hidden)]
#[macro_export]
macro_rules! if_tracing {
    ($entity:expr => $body:expr) => {
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $body;
        }
    };
}

/// A cell was queued in `$entity`.
#[macro_export]
macro_rules! enter {
    ($entity:expr ; $cell:expr) => {
        $crate::if_tracing!($entity => $entity.tracker.enter($entity.id, $cell))
    };
}

/// A cell left `$entity`.
#[macro_export]
macro_rules! exit {
    ($entity:expr ; $cell:expr) => {
        $crate::if_tracing!($entity => $entity.tracker.exit($entity.id, $cell))
    };
}

/// Sample a value owned by `$entity`, such as a queue length.
#[macro_export]
macro_rules! value {
    ($entity:expr ; $value:expr) => {
        $crate::if_tracing!($entity => $entity.tracker.value($entity.id, $value))
    };
}

/// A fresh [`Id`] for a cell.
#[macro_export]
macro_rules! create_id {
    ($entity:expr) => {
        $entity.tracker.unique_id()
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! create {
    ($entity:expr) => {
        $crate::if_tracing!($entity => $entity.tracker.create(
            $entity.parent_id(),
            $entity.id,
            $entity.full_name(),
        ))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! destroy {
    ($entity:expr) => {
        $crate::if_tracing!($entity => $entity.tracker.destroy($entity.parent_id(), $entity.id))
    };
}

/// Tell the tracker the run has reached `$tick`.
#[macro_export]
macro_rules! set_tick {
    ($entity:expr ; $tick:expr) => {
        $entity.tracker.tick($entity.id, $tick)
    };
}

/// Log a message from `$entity` at `$level` if the entity is tracked at that
/// level. The message is only formatted when it is written.
#[macro_export]
macro_rules! log_at {
    ($entity:expr ; $level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $entity.tracker.is_entity_enabled($entity.id, level) {
            $entity.tracker.log($entity.id, level, format_args!($($arg)+));
        }
    }};
}

/// Log at [`Level::Trace`](log::Level::Trace).
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => {
        $crate::log_at!($entity ; $crate::log::Level::Trace, $($arg)+)
    };
}

/// Log at [`Level::Debug`](log::Level::Debug).
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => {
        $crate::log_at!($entity ; $crate::log::Level::Debug, $($arg)+)
    };
}

/// Log at [`Level::Info`](log::Level::Info).
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => {
        $crate::log_at!($entity ; $crate::log::Level::Info, $($arg)+)
    };
}

/// Log at [`Level::Warn`](log::Level::Warn).
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => {
        $crate::log_at!($entity ; $crate::log::Level::Warn, $($arg)+)
    };
}

/// Log at [`Level::Error`](log::Level::Error).
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => {
        $crate::log_at!($entity ; $crate::log::Level::Error, $($arg)+)
    };
}
