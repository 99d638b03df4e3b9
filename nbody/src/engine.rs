use std::time::Instant;

use tracing::{debug, info};

use crate::body::Bodies;
use crate::comm::{Communicator, ROOT};
use crate::config::Configuration;
use crate::error::Result;
use crate::output::OutputWriter;
use crate::physics;
use crate::space::{root_space, Space};
use crate::tree::build_tree;
use crate::vector::{Real, Vector};

/// The driver owning the communicator and the population. All collectives of
/// a run flow through here in one program order; there are no rank-specific
/// branches around them. Output handles exist on the root rank only.
pub struct Engine<C, T, const D: usize> {
    comm: C,
    config: Configuration<T>,
    bodies: Bodies<T, D>,
    output: Option<OutputWriter>,
    bounds: Option<(Vector<T, D>, Vector<T, D>)>,
}

impl<C, T, const D: usize> Engine<C, T, D>
where
    C: Communicator,
    T: Real,
{
    /// Initialise a run over an already agreed population. The root opens
    /// the output directory and records configuration and the initial
    /// bodies.
    pub fn new(comm: C, config: Configuration<T>, bodies: Bodies<T, D>) -> Result<Self> {
        let output = if comm.rank() == ROOT {
            let writer = OutputWriter::create(&config.output)?;
            writer.write_configuration(&config)?;
            writer.write_metadata(&config)?;
            writer.write_bodies("_bodies.xml", &bodies)?;
            Some(writer)
        } else {
            None
        };

        Ok(Self {
            comm,
            config,
            bodies,
            output,
            bounds: None,
        })
    }

    pub fn bodies(&self) -> &Bodies<T, D> {
        &self.bodies
    }

    /// Advance the configured number of steps: agree on bounds, build the
    /// shared tree, integrate, and sample positions on the root every
    /// `sample_interval` steps. The initial positions are sample 0.
    pub fn run(&mut self) -> Result<()> {
        if let Some(output) = &mut self.output {
            output.write_sample(&self.bodies)?;
        }

        for step in 1..=self.config.steps {
            let started = Instant::now();
            let space = root_space(&self.comm, &self.bodies)?;
            self.track_bounds(&space);

            let tree = build_tree(&self.comm, &space, &self.bodies)?;
            let built = Instant::now();
            physics::step(&self.comm, &self.config, &mut self.bodies, &tree)?;
            debug!(
                rank = self.comm.rank(),
                step,
                nodes = tree.len(),
                build = ?built.duration_since(started),
                integrate = ?built.elapsed(),
                "step finished"
            );

            if step % self.config.sample_interval == 0 {
                if let Some(output) = &mut self.output {
                    output.write_sample(&self.bodies)?;
                }
            }
        }
        Ok(())
    }

    /// Record the final bodies and the bounds the run moved through, then
    /// release the output handles.
    pub fn finalise(self) -> Result<()> {
        if let Some(output) = &self.output {
            output.write_bodies("_bodies_finished.xml", &self.bodies)?;
            if let Some((min, max)) = &self.bounds {
                output.write_bounds(min, max)?;
            }
        }
        info!(rank = self.comm.rank(), "finished");
        Ok(())
    }

    fn track_bounds(&mut self, space: &Space<T, D>) {
        self.bounds = Some(match self.bounds.take() {
            None => (space.min, space.max),
            Some((min, max)) => (
                Vector::from_fn(|d| min[d].min(space.min[d])),
                Vector::from_fn(|d| max[d].max(space.max[d])),
            ),
        });
    }
}
