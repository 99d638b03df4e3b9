use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::Bodies;
use crate::comm::{Communicator, Division};
use crate::error::{Error, Result};
use crate::vector::{Real, Vector};

/// An axis-aligned box. The centre is redundant but cached; it is the split
/// point for part indexing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Space<T, const D: usize> {
    pub min: Vector<T, D>,
    pub max: Vector<T, D>,
    pub center: Vector<T, D>,
}

impl<T: Real, const D: usize> Space<T, D> {
    /// Number of parts a space splits into.
    pub const PARTS: usize = 1 << D;

    pub fn new(min: Vector<T, D>, max: Vector<T, D>) -> Self {
        let two = T::one() + T::one();
        Self {
            min,
            max,
            center: (min + max) / two,
        }
    }

    /// Side length used by the acceptance criterion; only component 0
    /// defines it.
    pub fn size(&self) -> T {
        self.max[0] - self.min[0]
    }

    pub fn contains(&self, position: &Vector<T, D>) -> bool {
        (0..D).all(|d| self.min[d] <= position[d] && position[d] <= self.max[d])
    }

    /// Part index of `position`: bit `d` is set iff the coordinate lies on
    /// the negative side of the centre. A coordinate equal to the centre
    /// belongs to the non-negative (bit clear) side.
    pub fn part_of(&self, position: &Vector<T, D>) -> usize {
        let mut part = 0;
        for d in 0..D {
            if position[d] < self.center[d] {
                part |= 1 << d;
            }
        }
        part
    }

    /// The sub-box spanning the corner selected by `part`.
    pub fn subspace(&self, part: usize) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for d in 0..D {
            if part & (1 << d) != 0 {
                max[d] = self.center[d];
            } else {
                min[d] = self.center[d];
            }
        }
        Self::new(min, max)
    }
}

/// The global bounding box of the population: every rank scans its own slice
/// and the group reduces the extremes element-wise, so all ranks return the
/// identical space.
pub fn root_space<C, T, const D: usize>(comm: &C, bodies: &Bodies<T, D>) -> Result<Space<T, D>>
where
    C: Communicator,
    T: Real,
{
    let division = Division::new(comm, bodies.len())?;

    let mut min = Vector::from_fn(|_| T::max_value());
    let mut max = Vector::from_fn(|_| T::min_value());
    for body in &bodies[division.begin..division.end] {
        for d in 0..D {
            min[d] = min[d].min(body.position[d]);
            max[d] = max[d].max(body.position[d]);
        }
    }
    trace!(rank = comm.rank(), ?min, ?max, "local bounds");

    let min = comm.all_reduce(min, |a, b| Vector::from_fn(|d| a[d].min(b[d])));
    let max = comm.all_reduce(max, |a, b| Vector::from_fn(|d| a[d].max(b[d])));

    for d in 0..D {
        if !min[d].is_finite() || !max[d].is_finite() {
            return Err(Error::FloatingPoint(format!(
                "non-finite bounds in dimension {d}"
            )));
        }
    }

    Ok(Space::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::local::LocalGroup;

    fn unit_square() -> Space<f64, 2> {
        Space::new(Vector([-1.0, -1.0]), Vector([1.0, 1.0]))
    }

    #[test]
    fn test_center_and_size() {
        let space = Space::new(Vector([0.0, 2.0]), Vector([4.0, 6.0]));
        assert_eq!(space.center, Vector([2.0, 4.0]));
        assert_eq!(space.size(), 4.0);
    }

    #[test]
    fn test_part_of_quadrants() {
        let space = unit_square();
        assert_eq!(space.part_of(&Vector([0.5, 0.5])), 0);
        assert_eq!(space.part_of(&Vector([-0.5, 0.5])), 1);
        assert_eq!(space.part_of(&Vector([0.5, -0.5])), 2);
        assert_eq!(space.part_of(&Vector([-0.5, -0.5])), 3);
    }

    #[test]
    fn test_center_ties_to_non_negative_side() {
        let space = unit_square();
        assert_eq!(space.part_of(&Vector([0.0, 0.0])), 0);
        assert_eq!(space.part_of(&Vector([0.0, -0.5])), 2);
    }

    #[test]
    fn test_subspace_corners() {
        let space = unit_square();
        let part = space.part_of(&Vector([-0.5, -0.5]));
        let sub = space.subspace(part);
        assert_eq!(sub.min, Vector([-1.0, -1.0]));
        assert_eq!(sub.max, Vector([0.0, 0.0]));
        assert_eq!(sub.center, Vector([-0.5, -0.5]));

        let sub = space.subspace(0);
        assert_eq!(sub.min, Vector([0.0, 0.0]));
        assert_eq!(sub.max, Vector([1.0, 1.0]));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let space = unit_square();
        assert!(space.contains(&Vector([1.0, -1.0])));
        assert!(space.contains(&Vector([0.0, 0.0])));
        assert!(!space.contains(&Vector([1.1, 0.0])));
    }

    #[test]
    fn test_root_space_reduces_over_ranks() {
        let spaces = LocalGroup::run(4, |comm| {
            let bodies: Bodies<f64, 2> = (0..8)
                .map(|i| {
                    Body::new(
                        Vector([i as f64 - 3.0, 2.0 * (i as f64)]),
                        Vector::zero(),
                        1.0,
                    )
                })
                .collect();
            root_space(&comm, &bodies).unwrap()
        });
        for space in spaces {
            assert_eq!(space.min, Vector([-3.0, 0.0]));
            assert_eq!(space.max, Vector([4.0, 14.0]));
            assert_eq!(space.center, Vector([0.5, 7.0]));
        }
    }
}
