// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Parsing of the free-form option arguments given to a scheduler.

use clap::{CommandFactory, Parser};
use xbar_engine::types::SimError;

/// Render the help of a scheduler's options.
#[must_use]
pub fn usage<T: CommandFactory>(name: &str) -> String {
    T::command().bin_name(name).render_help().to_string()
}

/// Parse the option arguments of scheduler `name`.
///
/// Any problem is returned as an error that includes the usage.
pub fn parse<T: Parser>(name: &str, args: &[String]) -> Result<T, SimError> {
    let argv = std::iter::once(name.to_string()).chain(args.iter().cloned());
    T::command()
        .bin_name(name)
        .try_get_matches_from(argv)
        .and_then(|matches| T::from_arg_matches(&matches))
        .map_err(|e| {
            SimError(format!(
                "invalid options for scheduler {name}: {e}\n{}",
                usage::<T>(name)
            ))
        })
}

/// Options of schedulers that take none.
#[derive(Parser, Debug)]
#[command(about = "This scheduler takes no options")]
pub struct NoOptions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct Opts {
        /// Number of rounds.
        #[arg(short, long, default_value_t = 1)]
        rounds: usize,
    }

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn defaults_and_values() {
        assert_eq!(parse::<Opts>("x", &[]).unwrap().rounds, 1);
        assert_eq!(parse::<Opts>("x", &args("-r 4")).unwrap().rounds, 4);
        assert_eq!(parse::<Opts>("x", &args("--rounds=2")).unwrap().rounds, 2);
    }

    #[test]
    fn errors_include_usage() {
        let err = parse::<Opts>("sched", &args("--bogus")).unwrap_err();
        assert!(err.0.contains("invalid options for scheduler sched"));
        assert!(err.0.contains("--rounds"));
        assert!(parse::<Opts>("sched", &args("-r notanumber")).is_err());
        assert!(parse::<NoOptions>("sched", &args("-r 1")).is_err());
    }
}
