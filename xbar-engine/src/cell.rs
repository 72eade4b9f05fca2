// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The unit of traffic moved through the switch.
//!
//! A [`Cell`] is either unicast (one destination output) or multicast (a set
//! of destination outputs held in an [`OutputSet`]). A multicast cell that is
//! only partially served stays at the head of its queue with the served
//! destinations cleared; each served copy leaves as a unicast cell.

use std::fmt;

use xbar_track::Id;

use crate::types::Tick;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-capacity set of output indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OutputSet {
    words: Vec<u64>,
}

impl OutputSet {
    /// Create an empty set able to hold outputs `0..num_outputs`.
    #[must_use]
    pub fn new(num_outputs: usize) -> Self {
        Self {
            words: vec![0; num_outputs.div_ceil(WORD_BITS)],
        }
    }

    /// Create a set from a list of outputs.
    #[must_use]
    pub fn from_outputs(num_outputs: usize, outputs: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(num_outputs);
        for output in outputs {
            set.insert(output);
        }
        set
    }

    /// Add an output to the set.
    ///
    /// Panics if the output is beyond the capacity given at creation.
    pub fn insert(&mut self, output: usize) {
        self.words[output / WORD_BITS] |= 1 << (output % WORD_BITS);
    }

    /// Remove an output from the set. Returns whether it was present.
    pub fn remove(&mut self, output: usize) -> bool {
        let present = self.contains(output);
        if let Some(word) = self.words.get_mut(output / WORD_BITS) {
            *word &= !(1 << (output % WORD_BITS));
        }
        present
    }

    #[must_use]
    pub fn contains(&self, output: usize) -> bool {
        self.words
            .get(output / WORD_BITS)
            .is_some_and(|word| word & (1 << (output % WORD_BITS)) != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of outputs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the outputs in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, word)| {
            let mut bits = *word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    None
                } else {
                    let bit = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(w * WORD_BITS + bit)
                }
            })
        })
    }
}

impl fmt::Display for OutputSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, output) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{output}")?;
        }
        write!(f, "}}")
    }
}

/// Where a cell is going.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Unicast(usize),
    Multicast(OutputSet),
}

impl Destination {
    /// Whether the given output is (still) a destination.
    #[must_use]
    pub fn includes(&self, output: usize) -> bool {
        match self {
            Destination::Unicast(o) => *o == output,
            Destination::Multicast(set) => set.contains(output),
        }
    }

    /// Number of outputs still to be served.
    #[must_use]
    pub fn fanout(&self) -> usize {
        match self {
            Destination::Unicast(_) => 1,
            Destination::Multicast(set) => set.len(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Unicast(o) => write!(f, "{o}"),
            Destination::Multicast(set) => write!(f, "{set}"),
        }
    }
}

/// The ticks at which a cell passed each point of the switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created: Tick,
    pub queue_arrival: Tick,
    pub hol_arrival: Tick,
    pub granted: Tick,
    pub accepted: Tick,
    pub fabric_arrival: Tick,
    pub output_arrival: Tick,
}

#[derive(Clone, Debug)]
pub struct Cell {
    /// Tracking identifier. Copies of a multicast cell share it.
    pub id: Id,

    /// Input port at which the cell arrived.
    pub source: usize,

    pub destination: Destination,

    /// Priority level, 0 being the highest.
    pub priority: usize,

    pub stamps: Timestamps,
}

impl Cell {
    #[must_use]
    pub fn new(
        id: Id,
        source: usize,
        destination: Destination,
        priority: usize,
        created: Tick,
    ) -> Self {
        Self {
            id,
            source,
            destination,
            priority,
            stamps: Timestamps {
                created,
                ..Timestamps::default()
            },
        }
    }

    #[must_use]
    pub fn is_multicast(&self) -> bool {
        matches!(self.destination, Destination::Multicast(_))
    }

    /// Build the unicast copy of this cell that is delivered to `output`.
    #[must_use]
    pub fn copy_for(&self, output: usize) -> Cell {
        Cell {
            id: self.id,
            source: self.source,
            destination: Destination::Unicast(output),
            priority: self.priority,
            stamps: self.stamps,
        }
    }

    /// Age of the cell relative to `now`, measured from its arrival in the
    /// input queue.
    #[must_use]
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.stamps.queue_arrival)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cell {} {}->{} p{}",
            self.id, self.source, self.destination, self.priority
        )
    }
}
