// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The table of available schedulers.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::Schedule;
use xbar_engine::sim_error;
use xbar_engine::types::{SimError, SimResult};
use xbar_track::entity::Entity;

use crate::fifo::Fifo;
use crate::hopfield::{Hopfield, HopfieldOptions};
use crate::iterative::{Iterative, IterativeOptions, SelectPolicy};
use crate::max_size::MaxSize;
use crate::max_weight::{MaxWeight, MaxWeightOptions, WeightPolicy};
use crate::multicast::residue::{Residue, ResidueOptions};
use crate::multicast::tatra::{Tatra, TatraOptions};
use crate::multicast::wba::{Wba, WbaOptions};
use crate::options::{self, NoOptions};
use crate::stable::{Stable, StableOptions};
use crate::wavefront::Wavefront;

/// Every scheduler that can be selected by name.
#[derive(
    clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    /// iSLIP: iterative round-robin grant and accept.
    #[default]
    Islip,

    /// Parallel iterative matching: random grant and accept.
    Pim,

    /// Iterative longest queue first.
    Ilqf,

    /// iSLIP run once per priority level.
    PrioIslip,

    /// Maximum size matching.
    MaxSize,

    /// Maximum size matching with random relabelling.
    MaxSizeRandom,

    /// Maximum weight matching on queue length.
    Lqf,

    /// Maximum weight matching on cell age.
    Ocf,

    /// Maximum weight matching on port occupancy.
    Lpf,

    /// Maximum weight matching with a configurable weight.
    MaxWeight,

    /// Maximum weight matching per priority level.
    PrioMaxWeight,

    /// Wavefront arbiter.
    Wfa,

    /// Residue based multicast allocation.
    McastResidue,

    /// Weight based multicast arbitration.
    Wba,

    /// TATRA multicast scheduler.
    Tatra,

    /// Stable matching.
    Stable,

    /// Hopfield network.
    Hopfield,

    /// First-in first-out inputs.
    Fifo,
}

impl SchedulerKind {
    /// The name the scheduler is selected by.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerKind::Islip => "islip",
            SchedulerKind::Pim => "pim",
            SchedulerKind::Ilqf => "ilqf",
            SchedulerKind::PrioIslip => "prio-islip",
            SchedulerKind::MaxSize => "max-size",
            SchedulerKind::MaxSizeRandom => "max-size-random",
            SchedulerKind::Lqf => "lqf",
            SchedulerKind::Ocf => "ocf",
            SchedulerKind::Lpf => "lpf",
            SchedulerKind::MaxWeight => "max-weight",
            SchedulerKind::PrioMaxWeight => "prio-max-weight",
            SchedulerKind::Wfa => "wfa",
            SchedulerKind::McastResidue => "mcast-residue",
            SchedulerKind::Wba => "wba",
            SchedulerKind::Tatra => "tatra",
            SchedulerKind::Stable => "stable",
            SchedulerKind::Hopfield => "hopfield",
            SchedulerKind::Fifo => "fifo",
        }
    }

    /// The help text of the scheduler's options.
    #[must_use]
    pub fn usage(&self) -> String {
        let name = self.name();
        match self {
            SchedulerKind::Islip
            | SchedulerKind::Pim
            | SchedulerKind::Ilqf
            | SchedulerKind::PrioIslip => options::usage::<IterativeOptions>(name),
            SchedulerKind::MaxWeight | SchedulerKind::PrioMaxWeight => {
                options::usage::<MaxWeightOptions>(name)
            }
            SchedulerKind::McastResidue => options::usage::<ResidueOptions>(name),
            SchedulerKind::Wba => options::usage::<WbaOptions>(name),
            SchedulerKind::Tatra => options::usage::<TatraOptions>(name),
            SchedulerKind::Stable => options::usage::<StableOptions>(name),
            SchedulerKind::Hopfield => options::usage::<HopfieldOptions>(name),
            SchedulerKind::MaxSize
            | SchedulerKind::MaxSizeRandom
            | SchedulerKind::Lqf
            | SchedulerKind::Ocf
            | SchedulerKind::Lpf
            | SchedulerKind::Wfa
            | SchedulerKind::Fifo => options::usage::<NoOptions>(name),
        }
    }

    /// Create a scheduler as a child of `parent`, configured by the option
    /// arguments `args`.
    pub fn init(
        &self,
        parent: &Rc<Entity>,
        config: &SwitchConfig,
        args: &[String],
        seed: u64,
    ) -> Result<Box<dyn Schedule>, SimError> {
        use SelectPolicy::{LongestQueue, Random, RoundRobin};

        let name = self.name();
        let iterative = |grant, accept, stratified| {
            Iterative::new(parent, name, config, args, seed, grant, accept, stratified)
        };
        let scheduler: Box<dyn Schedule> = match self {
            SchedulerKind::Islip => Box::new(iterative(RoundRobin, RoundRobin, false)?),
            SchedulerKind::Pim => Box::new(iterative(Random, Random, false)?),
            SchedulerKind::Ilqf => Box::new(iterative(LongestQueue, LongestQueue, false)?),
            SchedulerKind::PrioIslip => Box::new(iterative(RoundRobin, RoundRobin, true)?),
            SchedulerKind::MaxSize => {
                Box::new(MaxSize::new(parent, name, config, args, seed, false)?)
            }
            SchedulerKind::MaxSizeRandom => {
                Box::new(MaxSize::new(parent, name, config, args, seed, true)?)
            }
            SchedulerKind::Lqf => Box::new(MaxWeight::preset(
                parent,
                name,
                config,
                args,
                WeightPolicy::Lqf,
            )?),
            SchedulerKind::Ocf => Box::new(MaxWeight::preset(
                parent,
                name,
                config,
                args,
                WeightPolicy::Ocf,
            )?),
            SchedulerKind::Lpf => Box::new(MaxWeight::preset(
                parent,
                name,
                config,
                args,
                WeightPolicy::Lpf,
            )?),
            SchedulerKind::MaxWeight => {
                Box::new(MaxWeight::new(parent, name, config, args, false)?)
            }
            SchedulerKind::PrioMaxWeight => {
                Box::new(MaxWeight::new(parent, name, config, args, true)?)
            }
            SchedulerKind::Wfa => Box::new(Wavefront::new(parent, name, config, args)?),
            SchedulerKind::McastResidue => {
                Box::new(Residue::new(parent, name, config, args, seed)?)
            }
            SchedulerKind::Wba => Box::new(Wba::new(parent, name, config, args)?),
            SchedulerKind::Tatra => Box::new(Tatra::new(parent, name, config, args)?),
            SchedulerKind::Stable => Box::new(Stable::new(parent, name, config, args)?),
            SchedulerKind::Hopfield => Box::new(Hopfield::new(parent, name, config, args, seed)?),
            SchedulerKind::Fifo => Box::new(Fifo::new(parent, name, config, args)?),
        };
        Ok(scheduler)
    }

    /// Whether the scheduler only serves multicast queues.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        matches!(
            self,
            SchedulerKind::McastResidue | SchedulerKind::Wba | SchedulerKind::Tatra
        )
    }
}

impl SchedulerKind {
    /// Check that the scheduler serves every cell of traffic in which a
    /// `multicast_share` of the cells are multicast. Multicast schedulers
    /// leave unicast queues alone and the others leave multicast queues
    /// alone, so mixed traffic is rejected by both.
    pub fn check_traffic(&self, multicast_share: f64) -> SimResult {
        let (served, stranded, share) = if self.is_multicast() {
            ("multicast", "unicast", 1.0 - multicast_share)
        } else {
            ("unicast", "multicast", multicast_share)
        };
        if share <= 0.0 {
            return Ok(());
        }
        sim_error!(format!(
            "scheduler {self} only serves {served} cells but {:.0}% of the traffic is {stranded}\n{}",
            share * 100.0,
            self.usage()
        ))
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Split an option string the way a shell would split plain words.
#[must_use]
pub fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn names_match_value_enum() {
        for kind in SchedulerKind::value_variants() {
            let value = kind.to_possible_value().unwrap();
            assert_eq!(value.get_name(), kind.name());
            assert_eq!(SchedulerKind::from_str(kind.name(), false).unwrap(), *kind);
        }
    }

    #[test]
    fn traffic_must_match_queues_served() {
        assert!(SchedulerKind::Islip.check_traffic(0.0).is_ok());
        assert!(SchedulerKind::Tatra.check_traffic(1.0).is_ok());

        let err = SchedulerKind::Tatra.check_traffic(0.0).unwrap_err();
        assert!(err.0.contains("100% of the traffic is unicast"), "{err}");
        assert!(err.0.contains("--depth"), "{err}");

        let err = SchedulerKind::Wba.check_traffic(0.75).unwrap_err();
        assert!(err.0.contains("25% of the traffic is unicast"), "{err}");

        let err = SchedulerKind::Hopfield.check_traffic(0.5).unwrap_err();
        assert!(err.0.contains("50% of the traffic is multicast"), "{err}");
    }
}
