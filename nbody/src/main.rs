use clap::Parser;
use tracing::error;

use nbody::body::Bodies;
use nbody::comm::{Communicator, ROOT};
use nbody::config::{configure, Cli};
use nbody::engine::Engine;
use nbody::error::{Error, Result};
use nbody::generate::{normal_cluster, random_bodies};
use nbody::input::read_bodies;
use nbody::logging::{self, LogLevel};
use nbody::random::ParallelMinStd;

type Number = f64;
const DIMENSION: usize = 3;

/// One rank's whole run: configure, agree on the population, then drive the
/// engine. Every collective below happens in the same order on all ranks.
fn drive<C: Communicator>(comm: &C) -> Result<()> {
    let Some(config) = configure::<_, Number, _, _>(comm, ROOT, std::env::args())? else {
        return Ok(());
    };

    let bodies: Bodies<Number, DIMENSION> = match &config.input {
        Some(path) => {
            let mut bodies = if comm.rank() == ROOT {
                read_bodies(path)?
            } else {
                Bodies::new()
            };
            comm.broadcast(&mut bodies, ROOT);
            bodies
        }
        None => {
            let number = config
                .number
                .ok_or_else(|| Error::Config("no body source configured".to_string()))?;
            let rng = ParallelMinStd::new(comm, ROOT);
            random_bodies(comm, normal_cluster(rng), number)?
        }
    };

    let mut engine = Engine::new(comm, config, bodies)?;
    engine.run()?;
    engine.finalise()
}

fn abort_on_error<C: Communicator>(comm: &C) {
    if let Err(err) = drive(comm) {
        error!(rank = comm.rank(), %err, "aborting process group");
        comm.abort(err.exit_code());
    }
}

#[cfg(not(feature = "mpi"))]
fn run_group() {
    // Group size from the environment, one rank per thread.
    let nprocs: usize = std::env::var("NPROCS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1);
    nbody::local::LocalGroup::run(nprocs, |comm| abort_on_error(&comm));
}

#[cfg(feature = "mpi")]
fn run_group() {
    let universe = ::mpi::initialize().expect("mpi initialisation failed");
    let comm = nbody::mpi::WorldComm::new(&universe);
    abort_on_error(&comm);
}

fn main() {
    // The subscriber must exist before the configuration broadcast, so every
    // process derives the level from its own argv; the authoritative
    // configuration is still parsed on the root and broadcast.
    let level = Cli::try_parse()
        .map(|cli| cli.min_log_level)
        .unwrap_or(LogLevel::Info);
    logging::init(level);

    run_group();
}
