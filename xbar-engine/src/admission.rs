// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The per-tick crossbar configuration chosen by a scheduler.
//!
//! Every output has `lines_per_output` fabric lines; line `l` feeds output
//! `l / lines_per_output`. A scheduler fills the lines with [`Grant`]s during
//! its `exec` and the switch then performs the transfer.

use std::fmt;

use crate::sim_error;
use crate::switch::SwitchConfig;
use crate::types::SimResult;

/// Which input queue a grant serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Unicast,
    Multicast,
}

/// The decision made for one fabric line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub input: usize,
    pub kind: QueueKind,
    pub priority: usize,
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            QueueKind::Unicast => "u",
            QueueKind::Multicast => "m",
        };
        write!(f, "{}{kind}p{}", self.input, self.priority)
    }
}

pub struct AdmissionMatrix {
    num_inputs: usize,
    num_outputs: usize,
    num_priorities: usize,
    lines_per_output: usize,
    lines: Vec<Option<Grant>>,
}

impl AdmissionMatrix {
    #[must_use]
    pub fn new(config: &SwitchConfig) -> Self {
        Self {
            num_inputs: config.num_inputs,
            num_outputs: config.num_outputs,
            num_priorities: config.num_priorities,
            lines_per_output: config.lines_per_output,
            lines: vec![None; config.num_lines()],
        }
    }

    pub fn clear(&mut self) {
        self.lines.fill(None);
    }

    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn lines_per_output(&self) -> usize {
        self.lines_per_output
    }

    #[must_use]
    pub fn output_of_line(&self, line: usize) -> usize {
        line / self.lines_per_output
    }

    #[must_use]
    pub fn line(&self, line: usize) -> Option<Grant> {
        self.lines[line]
    }

    /// The first free line of an output.
    #[must_use]
    pub fn free_line(&self, output: usize) -> Option<usize> {
        let first = output * self.lines_per_output;
        (first..first + self.lines_per_output).find(|l| self.lines[*l].is_none())
    }

    /// Number of lines of an output still without a grant.
    #[must_use]
    pub fn free_lines(&self, output: usize) -> usize {
        let first = output * self.lines_per_output;
        self.lines[first..first + self.lines_per_output]
            .iter()
            .filter(|g| g.is_none())
            .count()
    }

    /// Place a grant on a specific line. Returns false if it is taken.
    pub fn admit_on_line(&mut self, line: usize, grant: Grant) -> bool {
        if self.lines[line].is_some() {
            return false;
        }
        self.lines[line] = Some(grant);
        true
    }

    fn admit(&mut self, output: usize, grant: Grant) -> bool {
        match self.free_line(output) {
            Some(line) => self.admit_on_line(line, grant),
            None => false,
        }
    }

    /// Admit the head unicast cell of VOQ (input, output, priority) on the
    /// first free line of `output`.
    pub fn admit_unicast(&mut self, input: usize, output: usize, priority: usize) -> bool {
        self.admit(
            output,
            Grant {
                input,
                kind: QueueKind::Unicast,
                priority,
            },
        )
    }

    /// Admit one destination of the head multicast cell of `input`.
    pub fn admit_multicast(&mut self, input: usize, output: usize, priority: usize) -> bool {
        self.admit(
            output,
            Grant {
                input,
                kind: QueueKind::Multicast,
                priority,
            },
        )
    }

    /// Whether an input already holds a grant on any line.
    #[must_use]
    pub fn is_input_matched(&self, input: usize) -> bool {
        self.lines.iter().flatten().any(|g| g.input == input)
    }

    /// All (line, grant) pairs.
    pub fn grants(&self) -> impl Iterator<Item = (usize, Grant)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(l, g)| g.map(|g| (l, g)))
    }

    /// All admitted (input, output) pairs.
    #[must_use]
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.grants()
            .map(|(l, g)| (g.input, self.output_of_line(l)))
            .collect()
    }

    #[must_use]
    pub fn num_admitted(&self) -> usize {
        self.lines.iter().flatten().count()
    }

    /// Check the structural rules of a crossbar configuration.
    ///
    /// An input sending a unicast cell holds exactly one line. An input
    /// sending a multicast cell may hold several lines, but only for one
    /// priority and at most once per output.
    pub fn validate(&self) -> SimResult {
        let mut per_input: Vec<Vec<(usize, Grant)>> = vec![Vec::new(); self.num_inputs];
        for (line, grant) in self.grants() {
            if grant.input >= self.num_inputs {
                return sim_error!(format!("line {line}: invalid input in grant {grant}"));
            }
            if grant.priority >= self.num_priorities {
                return sim_error!(format!("line {line}: invalid priority in grant {grant}"));
            }
            per_input[grant.input].push((line, grant));
        }

        for (input, grants) in per_input.iter().enumerate() {
            let Some((_, first)) = grants.first() else {
                continue;
            };
            if grants.iter().any(|(_, g)| g.kind == QueueKind::Unicast) {
                if grants.len() > 1 {
                    return sim_error!(format!(
                        "input {input} admitted on {} lines with a unicast grant",
                        grants.len()
                    ));
                }
                continue;
            }
            if grants.iter().any(|(_, g)| g.priority != first.priority) {
                return sim_error!(format!(
                    "input {input} admitted multicast cells of different priorities"
                ));
            }
            let mut seen = vec![false; self.num_outputs];
            for (line, _) in grants {
                let output = self.output_of_line(*line);
                if seen[output] {
                    return sim_error!(format!(
                        "input {input} admitted twice to output {output}"
                    ));
                }
                seen[output] = true;
            }
        }
        Ok(())
    }
}

impl fmt::Display for AdmissionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, grant) in self.lines.iter().enumerate() {
            if line > 0 {
                write!(f, " ")?;
            }
            match grant {
                Some(g) => write!(f, "{g}")?,
                None => write!(f, "-")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(i: usize, o: usize, l: usize) -> AdmissionMatrix {
        AdmissionMatrix::new(&SwitchConfig::new(i, o, 2, l).unwrap())
    }

    #[test]
    fn lines_fill_in_order() {
        let mut m = matrix(3, 2, 2);
        assert_eq!(m.free_lines(1), 2);
        assert!(m.admit_unicast(0, 1, 0));
        assert!(m.admit_unicast(2, 1, 0));
        assert!(!m.admit_unicast(1, 1, 0));
        assert_eq!(m.free_lines(1), 0);
        assert_eq!(m.pairs(), vec![(0, 1), (2, 1)]);
        assert!(m.is_input_matched(2));
        assert!(!m.is_input_matched(1));
        assert!(m.validate().is_ok());
        assert_eq!(format!("{m}"), "- - 0up0 2up0");

        m.clear();
        assert_eq!(m.num_admitted(), 0);
    }

    #[test]
    fn unicast_input_twice_is_invalid() {
        let mut m = matrix(2, 2, 1);
        m.admit_unicast(0, 0, 0);
        m.admit_unicast(0, 1, 0);
        assert!(m.validate().is_err());
    }

    #[test]
    fn multicast_fanout_is_valid() {
        let mut m = matrix(2, 3, 2);
        m.admit_multicast(0, 0, 1);
        m.admit_multicast(0, 2, 1);
        m.admit_unicast(1, 0, 0);
        assert!(m.validate().is_ok());

        // Same output twice from one multicast input
        m.admit_multicast(0, 2, 1);
        assert!(m.validate().is_err());
    }

    #[test]
    fn multicast_mixed_priorities_is_invalid() {
        let mut m = matrix(2, 3, 1);
        m.admit_multicast(0, 0, 0);
        m.admit_multicast(0, 1, 1);
        assert!(m.validate().is_err());
    }
}
