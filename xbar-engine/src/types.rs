// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Time, errors and results shared by the simulator crates.

use std::error::Error;
use std::fmt;

use xbar_track::tracker::TrackConfigError;

/// Simulation time is counted in whole ticks of the base clock.
pub type Tick = u64;

/// Return `Err(SimError)` built from anything with `to_string`.
#[macro_export]
macro_rules! sim_error {
    ($msg:expr) => {
        Err($crate::types::SimError($msg.to_string()))
    };
}

/// A failure that ends the run: a bad configuration, a broken invariant or an
/// exhausted resource. The message is shown to the user as is.
#[derive(Debug, PartialEq)]
pub struct SimError(pub String);

impl SimError {
    /// Prefix the message with where the error was found.
    #[must_use]
    pub fn context(self, location: impl fmt::Display) -> Self {
        Self(format!("{location}: {}", self.0))
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}

impl Error for SimError {}

impl From<TrackConfigError> for SimError {
    fn from(e: TrackConfigError) -> Self {
        Self(e.0)
    }
}

pub type SimResult = Result<(), SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err = SimError("queue full".to_string()).context("top::switch");
        assert_eq!(err.to_string(), "Error: top::switch: queue full");
    }

    #[test]
    fn tracker_errors_convert() {
        let err: SimError = TrackConfigError("bad regex".to_string()).into();
        assert_eq!(err, SimError("bad regex".to_string()));
    }
}
