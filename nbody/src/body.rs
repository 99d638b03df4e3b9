use serde::{Deserialize, Serialize};

use crate::vector::{Real, Vector};

/// A point mass. Created at initialisation, mutated only by the integrator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body<T, const D: usize> {
    pub position: Vector<T, D>,
    pub velocity: Vector<T, D>,
    pub mass: T,
}

/// The full population, in global index order on every rank. Rank `r` owns
/// the contiguous slice `[r * N / P, (r + 1) * N / P)`.
pub type Bodies<T, const D: usize> = Vec<Body<T, D>>;

impl<T: Real, const D: usize> Body<T, D> {
    pub fn new(position: Vector<T, D>, velocity: Vector<T, D>, mass: T) -> Self {
        Self {
            position,
            velocity,
            mass,
        }
    }
}

/// Total mass of a population.
pub fn total_mass<T: Real, const D: usize>(bodies: &Bodies<T, D>) -> T {
    bodies.iter().fold(T::zero(), |acc, b| acc + b.mass)
}

/// Mass-weighted centre of the population.
pub fn centre_of_mass<T: Real, const D: usize>(bodies: &Bodies<T, D>) -> Vector<T, D> {
    let mut centre = Vector::zero();
    let mut mass = T::zero();
    for body in bodies {
        crate::vector::accumulate_centroid_into(&mut centre, &mut mass, body.position, body.mass);
    }
    centre
}
