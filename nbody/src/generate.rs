use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal, StandardNormal};

use crate::body::{Bodies, Body};
use crate::comm::{Communicator, Division};
use crate::error::Result;
use crate::vector::{Real, Vector};

/// Fill the population from a generator of bodies by global index. Each rank
/// calls the generator for its own slice in index order and the group
/// all-gathers the slices, so every rank returns the full population.
///
/// A generator owning rank-local random state stays deterministic under this
/// scheme: the draws of rank `r` depend only on its substream and its slice.
pub fn random_bodies<C, T, const D: usize, G>(
    comm: &C,
    mut generator: G,
    number: usize,
) -> Result<Bodies<T, D>>
where
    C: Communicator,
    T: Real,
    G: FnMut(usize) -> Body<T, D>,
{
    let division = Division::new(comm, number)?;
    let mut local = Vec::with_capacity(division.count);
    for index in division.begin..division.end {
        local.push(generator(index));
    }
    Ok(comm.all_gather(&local))
}

/// The standard random cluster: position and velocity components from a unit
/// normal, mass log-normally distributed around exp(-1). Per body the draw
/// order is position components, velocity components, then mass.
pub fn normal_cluster<T, const D: usize, R>(mut rng: R) -> impl FnMut(usize) -> Body<T, D>
where
    T: Real,
    R: Rng,
    StandardNormal: Distribution<T>,
{
    let coordinate = Normal::new(T::zero(), T::one()).expect("unit deviation is a valid normal");
    let mass = LogNormal::new(-T::one(), T::one()).expect("unit deviation is a valid log-normal");
    move |_| {
        let position = Vector::from_fn(|_| coordinate.sample(&mut rng));
        let velocity = Vector::from_fn(|_| coordinate.sample(&mut rng));
        Body::new(position, velocity, mass.sample(&mut rng))
    }
}

/// The figure-eight three-body choreography at t = 0: three unit masses on a
/// planar eight-shaped orbit with zero total momentum.
pub fn figure_eight() -> Bodies<f64, 2> {
    vec![
        Body::new(
            Vector([-0.97000436, 0.24308753]),
            Vector([0.466_203_685_0, 0.432_365_730_0]),
            1.0,
        ),
        Body::new(
            Vector([0.0, 0.0]),
            Vector([-0.93240737, -0.86473146]),
            1.0,
        ),
        Body::new(
            Vector([0.97000436, -0.24308753]),
            Vector([0.466_203_685_0, 0.432_365_730_0]),
            1.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ROOT;
    use crate::local::LocalGroup;
    use crate::random::ParallelMinStd;

    #[test]
    fn test_generator_is_called_in_slice_order() {
        let populations = LocalGroup::run(2, |comm| {
            let generator = |index: usize| {
                Body::new(
                    Vector([index as f64, 0.0]),
                    Vector::zero(),
                    1.0 + index as f64,
                )
            };
            random_bodies(&comm, generator, 8).unwrap()
        });
        for bodies in populations {
            assert_eq!(bodies.len(), 8);
            for (index, body) in bodies.iter().enumerate() {
                assert_eq!(body.position[0], index as f64);
            }
        }
    }

    #[test]
    fn test_cluster_masses_are_positive() {
        let mut populations = LocalGroup::run(2, |comm| {
            let rng = ParallelMinStd::from_seed(&comm, ROOT, 4_242);
            random_bodies::<_, f64, 3, _>(&comm, normal_cluster(rng), 16).unwrap()
        });
        let bodies = populations.remove(0);
        assert_eq!(bodies.len(), 16);
        assert!(bodies.iter().all(|b| b.mass > 0.0));
    }

    #[test]
    fn test_figure_eight_has_no_net_momentum() {
        let bodies = figure_eight();
        let momentum = bodies
            .iter()
            .fold(Vector::zero(), |acc: Vector<f64, 2>, b| {
                acc + b.velocity * b.mass
            });
        assert!(momentum.norm() < 1e-9);
    }
}
