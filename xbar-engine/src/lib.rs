// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `XBAR` engine
//!
//! This library provides the model of an input-queued crossbar switch and the
//! [engine](crate::engine) which advances it one tick at a time.
//!
//! The switch holds cells in per-(input, output, priority) virtual output
//! queues and per-(input, priority) multicast queues. Every fabric tick a
//! [scheduler](crate::traits::Schedule) reads the queues and fills the
//! [admission matrix](crate::admission::AdmissionMatrix); the switch then
//! moves the admitted cells to its output queues.
//!
//! The scheduling algorithms live in `xbar-schedulers`, the traffic generators
//! and queueing policies in `xbar-models`.

pub mod admission;
pub mod cell;
pub mod engine;
pub mod queue;
pub mod rng;
pub mod stats;
pub mod switch;
pub mod test_helpers;
pub mod traits;
pub mod types;
