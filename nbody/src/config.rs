use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::logging::LogLevel;
use crate::vector::Real;

/// The command line surface, recognised on the root rank.
#[derive(Debug, Parser)]
#[command(name = "nbody", about = "distributed Barnes-Hut n-body simulation")]
pub struct Cli {
    /// number of bodies (mutually exclusive with --input)
    #[arg(short = 'n', long)]
    pub number: Option<usize>,

    /// simulate steps
    #[arg(short = 's', long, default_value_t = 100)]
    pub steps: usize,

    /// emit a position sample every this many steps
    #[arg(short = 'k', long, default_value_t = 1)]
    pub sample_interval: usize,

    /// time of every single step (s)
    #[arg(short = 't', long, default_value_t = 1.0)]
    pub time: f64,

    /// the gravitational constant (m^3 kg^-1 s^-2)
    #[arg(short = 'G', long, default_value_t = 6.674_08e-11)]
    pub gravitational_constant: f64,

    /// Barnes-Hut approximation parameter
    #[arg(short = 'p', long, default_value_t = 0.5)]
    pub theta: f64,

    /// force softening length
    #[arg(long, default_value_t = 0.0)]
    pub soften_length: f64,

    /// output directory
    #[arg(short = 'o', long, default_value = "n-body-output")]
    pub output: PathBuf,

    /// body input file (mutually exclusive with --number)
    #[arg(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// minimum log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub min_log_level: LogLevel,
}

/// Resolved run parameters, identical on every rank after [`configure`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration<T> {
    pub number: Option<usize>,
    pub steps: usize,
    pub sample_interval: usize,
    pub time: T,
    pub gravitational_constant: T,
    pub theta: T,
    pub soften_length: T,
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub min_log_level: LogLevel,
}

/// What the root tells the group after looking at the command line.
#[derive(Clone, Serialize, Deserialize)]
enum Verdict<T> {
    Run(Configuration<T>),
    Help,
    Invalid(String),
    Indivisible { number: usize, size: usize },
}

fn cast<T: Real>(value: f64, option: &str) -> Result<T> {
    T::from(value).ok_or_else(|| Error::Config(format!("{option} does not fit the scalar type")))
}

impl<T: Real> Configuration<T> {
    fn from_cli<C: Communicator>(cli: Cli, comm: &C) -> Verdict<T> {
        match (&cli.input, cli.number) {
            (Some(_), Some(_)) => {
                return Verdict::Invalid(
                    "--input and --number are mutually exclusive".to_string(),
                )
            }
            (None, None) => {
                return Verdict::Invalid("one of --input and --number is required".to_string())
            }
            (None, Some(number)) => {
                if number == 0 {
                    return Verdict::Invalid("--number must be positive".to_string());
                }
                if number % comm.size() != 0 {
                    return Verdict::Indivisible {
                        number,
                        size: comm.size(),
                    };
                }
            }
            (Some(_), None) => {}
        }
        if cli.sample_interval == 0 {
            return Verdict::Invalid("--sample-interval must be positive".to_string());
        }
        if cli.theta < 0.0 {
            return Verdict::Invalid("--theta must not be negative".to_string());
        }

        let convert = || -> Result<Configuration<T>> {
            Ok(Configuration {
                number: cli.number,
                steps: cli.steps,
                sample_interval: cli.sample_interval,
                time: cast(cli.time, "--time")?,
                gravitational_constant: cast(
                    cli.gravitational_constant,
                    "--gravitational-constant",
                )?,
                theta: cast(cli.theta, "--theta")?,
                soften_length: cast(cli.soften_length, "--soften-length")?,
                input: cli.input,
                output: cli.output,
                min_log_level: cli.min_log_level,
            })
        };
        match convert() {
            Ok(config) => Verdict::Run(config),
            Err(err) => Verdict::Invalid(err.to_string()),
        }
    }
}

/// Collective configuration: the root parses and validates the command line,
/// then broadcasts the verdict. `Ok(None)` means the group was asked for
/// usage and should exit cleanly.
pub fn configure<C, T, A, S>(comm: &C, root: usize, args: A) -> Result<Option<Configuration<T>>>
where
    C: Communicator,
    T: Real,
    A: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let mut verdict: Verdict<T> = Verdict::Help;
    if comm.rank() == root {
        verdict = match Cli::try_parse_from(args) {
            Ok(cli) => Configuration::from_cli(cli, comm),
            Err(err) if err.use_stderr() => Verdict::Invalid(err.to_string()),
            Err(err) => {
                // --help and --version land here.
                let _ = err.print();
                Verdict::Help
            }
        };
    }
    comm.broadcast(&mut verdict, root);

    match verdict {
        Verdict::Run(config) => {
            if comm.rank() == root {
                log_provenance(&config);
            }
            Ok(Some(config))
        }
        Verdict::Help => Ok(None),
        Verdict::Invalid(reason) => Err(Error::Config(reason)),
        Verdict::Indivisible { number, size } => Err(Error::Divisibility { number, size }),
    }
}

fn log_provenance<T: Real>(config: &Configuration<T>) {
    if let Some(number) = config.number {
        info!("set number of bodies to {number}");
    }
    if let Some(input) = &config.input {
        info!("set body input file to {}", input.display());
    }
    info!("set simulate steps to {}", config.steps);
    info!("set sample interval to {}", config.sample_interval);
    info!("set time of every single step to {}", config.time);
    info!(
        "set gravitational constant to {}",
        config.gravitational_constant
    );
    info!("set approximation parameter to {}", config.theta);
    info!("set soften length to {}", config.soften_length);
    info!("set output directory to {}", config.output.display());
    info!("set minimum log level to {}", config.min_log_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalGroup;

    fn args(tail: &[&str]) -> Vec<String> {
        let mut args = vec!["nbody".to_string()];
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }

    #[test]
    fn test_number_run_is_broadcast_to_all_ranks() {
        let results = LocalGroup::run(2, |comm| {
            configure::<_, f64, _, _>(&comm, 0, args(&["--number", "8", "--theta", "0.7"]))
        });
        for result in results {
            let config = result.unwrap().unwrap();
            assert_eq!(config.number, Some(8));
            assert_eq!(config.theta, 0.7);
            assert_eq!(config.steps, 100);
        }
    }

    #[test]
    fn test_number_and_input_conflict() {
        let results = LocalGroup::run(1, |comm| {
            configure::<_, f64, _, _>(&comm, 0, args(&["--number", "8", "--input", "bodies.xml"]))
        });
        assert!(matches!(results[0], Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let results =
            LocalGroup::run(1, |comm| configure::<_, f64, _, _>(&comm, 0, args(&[])));
        assert!(matches!(results[0], Err(Error::Config(_))));
    }

    #[test]
    fn test_indivisible_number_is_rejected_group_wide() {
        let results = LocalGroup::run(2, |comm| {
            configure::<_, f64, _, _>(&comm, 0, args(&["--number", "7"]))
        });
        for result in results {
            assert!(matches!(
                result,
                Err(Error::Divisibility { number: 7, size: 2 })
            ));
        }
    }

    #[test]
    fn test_help_exits_cleanly_everywhere() {
        let results = LocalGroup::run(2, |comm| {
            configure::<_, f64, _, _>(&comm, 0, args(&["--help"]))
        });
        for result in results {
            assert!(result.unwrap().is_none());
        }
    }
}
