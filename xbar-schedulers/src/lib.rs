// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! Crossbar scheduling algorithms.
//!
//! Every scheduler implements [`Schedule`](xbar_engine::traits::Schedule)
//! and is created through the [`registry`]:
//!
//! ```rust
//! use xbar_engine::admission::AdmissionMatrix;
//! use xbar_engine::cell::{Cell, Destination};
//! use xbar_engine::switch::{Switch, SwitchConfig};
//! use xbar_schedulers::registry::SchedulerKind;
//! use xbar_track::Id;
//! use xbar_track::entity::toplevel;
//! use xbar_track::tracker::dev_null_tracker;
//!
//! let tracker = dev_null_tracker();
//! let top = toplevel(&tracker, "top");
//! let config = SwitchConfig::new(2, 2, 1, 1).unwrap();
//! let mut switch = Switch::new(&top, "switch", config);
//! switch
//!     .enqueue(Cell::new(Id(1), 0, Destination::Unicast(1), 0, 0))
//!     .unwrap();
//!
//! let args = vec!["--iterations".to_string(), "2".to_string()];
//! let mut islip = SchedulerKind::Islip.init(&top, &config, &args, 0).unwrap();
//! let mut admission = AdmissionMatrix::new(&config);
//! islip.exec(switch.queues(), &mut admission);
//! assert_eq!(admission.pairs(), vec![(0, 1)]);
//! ```
//!
//! Unicast schedulers:
//!  - [`iterative`]: iSLIP, PIM and iterative longest queue first.
//!  - [`max_size`]: maximum size matching.
//!  - [`max_weight`]: maximum weight matching solved by the
//!    [`assignment`] solver.
//!  - [`wavefront`]: the wavefront arbiter.
//!  - [`stable`]: stable matching.
//!  - [`hopfield`]: a Hopfield network.
//!  - [`fifo`]: single FIFO inputs, for comparison.
//!
//! The [`multicast`] schedulers serve the multicast queues.

pub mod assignment;
pub mod fifo;
pub mod hopfield;
pub mod iterative;
pub mod max_size;
pub mod max_weight;
pub mod multicast;
pub mod options;
pub mod registry;
pub mod requests;
pub mod stable;
pub mod stats;
pub mod test_helpers;
pub mod wavefront;
