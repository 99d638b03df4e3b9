use rayon::prelude::*;

use crate::body::Bodies;
use crate::comm::{Communicator, Division};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::tree::{BodyTree, NodeKind};
use crate::vector::{Real, Vector};

/// Acceleration felt by a unit mass at `position` from the mass distribution
/// described by `tree`.
///
/// An inner node whose box does not contain the target and subtends less
/// than theta (strictly, size over distance) stands in for its subtree as a
/// point mass at its centroid; otherwise its children are summed in part
/// order. The containment guard keeps a body from being summarised by a cell
/// it sits inside, which would pull it towards its own cell's centroid.
pub fn gravity_per_unit_mass<T, const D: usize>(
    config: &Configuration<T>,
    tree: &BodyTree<T, D>,
    position: &Vector<T, D>,
) -> Vector<T, D>
where
    T: Real,
{
    if tree.is_empty() {
        return Vector::zero();
    }
    gravity_from_node(config, tree, 0, position)
}

fn gravity_from_node<T, const D: usize>(
    config: &Configuration<T>,
    tree: &BodyTree<T, D>,
    root: usize,
    position: &Vector<T, D>,
) -> Vector<T, D>
where
    T: Real,
{
    let node = tree.node(root);
    match &node.kind {
        NodeKind::Leaf { .. } => {
            point_mass_kernel(config, &node.center_of_mass, node.mass, position)
        }
        NodeKind::Inner { children } => {
            let size = node.space.size();
            let distance = (node.center_of_mass - *position).norm();
            if !node.space.contains(position) && size / distance < config.theta {
                point_mass_kernel(config, &node.center_of_mass, node.mass, position)
            } else {
                let mut sum = Vector::zero();
                for child in children.iter().flatten() {
                    sum += gravity_from_node(config, tree, *child, position);
                }
                sum
            }
        }
    }
}

/// Softened gravitational kernel of a point mass, directed from `position`
/// towards `other_position`. Coincident points contribute nothing.
fn point_mass_kernel<T, const D: usize>(
    config: &Configuration<T>,
    other_position: &Vector<T, D>,
    other_mass: T,
    position: &Vector<T, D>,
) -> Vector<T, D>
where
    T: Real,
{
    let dp = *other_position - *position;
    let r = dp.norm();
    if r == T::zero() {
        return Vector::zero();
    }
    let eps = config.soften_length;
    let denominator = (eps * eps + r * r).sqrt().powi(3);
    dp * (config.gravitational_constant * other_mass / denominator)
}

/// Advance every body by one time step. Each rank integrates its own slice
/// against the shared tree and the group all-gathers the slices back into
/// the full population, so every rank leaves with identical bodies.
///
/// The slice is processed in parallel; per-body traversals are independent
/// and children are always summed serially in part order, so the result is
/// bitwise identical to the serial loop.
pub fn step<C, T, const D: usize>(
    comm: &C,
    config: &Configuration<T>,
    bodies: &mut Bodies<T, D>,
    tree: &BodyTree<T, D>,
) -> Result<()>
where
    C: Communicator,
    T: Real,
{
    let division = Division::new(comm, bodies.len())?;
    let mut local: Bodies<T, D> = bodies[division.begin..division.end].to_vec();

    let time = config.time;
    let half = T::one() / (T::one() + T::one());
    local.par_iter_mut().enumerate().try_for_each(|(i, body)| {
        let acceleration = gravity_per_unit_mass(config, tree, &body.position);
        if !acceleration.norm().is_finite() {
            return Err(Error::FloatingPoint(format!(
                "non-finite acceleration on body {}",
                division.begin + i
            )));
        }
        let new_velocity = body.velocity + acceleration * time;
        body.position += (body.velocity + new_velocity) * (time * half);
        body.velocity = new_velocity;
        Ok(())
    })?;

    *bodies = comm.all_gather(&local);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::space::Space;

    fn config(theta: f64, soften_length: f64) -> Configuration<f64> {
        Configuration {
            number: None,
            steps: 1,
            sample_interval: 1,
            time: 0.1,
            gravitational_constant: 1.0,
            theta,
            soften_length,
            input: None,
            output: "n-body-output".into(),
            min_log_level: crate::logging::LogLevel::Info,
        }
    }

    fn body(mass: f64, x: f64, y: f64) -> Body<f64, 2> {
        Body::new(Vector([x, y]), Vector::zero(), mass)
    }

    #[test]
    fn test_empty_tree_exerts_no_force() {
        let tree: BodyTree<f64, 2> = BodyTree::new();
        let acceleration = gravity_per_unit_mass(&config(0.5, 0.0), &tree, &Vector([1.0, 2.0]));
        assert_eq!(acceleration, Vector::zero());
    }

    #[test]
    fn test_single_body_matches_kernel() {
        let bodies = vec![body(3.0, 1.0, 0.0)];
        let space = Space::new(Vector([-2.0, -2.0]), Vector([2.0, 2.0]));
        let mut tree = BodyTree::new();
        tree.push(&bodies, &space, 0).unwrap();

        let cfg = config(0.5, 0.0);
        let target = Vector([-1.0, 0.0]);
        let acceleration = gravity_per_unit_mass(&cfg, &tree, &target);

        // Unit mass at distance 2 from a mass of 3: magnitude 3 / 4,
        // pointing towards the source.
        assert!((acceleration[0] - 0.75).abs() < 1e-12);
        assert!(acceleration[1].abs() < 1e-12);
    }

    #[test]
    fn test_coincident_point_contributes_nothing() {
        let bodies = vec![body(3.0, 1.0, 0.0)];
        let space = Space::new(Vector([-2.0, -2.0]), Vector([2.0, 2.0]));
        let mut tree = BodyTree::new();
        tree.push(&bodies, &space, 0).unwrap();

        let acceleration =
            gravity_per_unit_mass(&config(0.5, 0.0), &tree, &Vector([1.0, 0.0]));
        assert_eq!(acceleration, Vector::zero());
    }

    fn direct_sum(
        cfg: &Configuration<f64>,
        bodies: &Bodies<f64, 2>,
        position: &Vector<f64, 2>,
    ) -> Vector<f64, 2> {
        let mut sum = Vector::zero();
        for body in bodies {
            sum += point_mass_kernel(cfg, &body.position, body.mass, position);
        }
        sum
    }

    #[test]
    fn test_zero_theta_equals_direct_sum() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(16);
        let bodies: Bodies<f64, 2> = (0..16)
            .map(|_| {
                body(
                    rng.gen_range(0.5..4.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                )
            })
            .collect();
        let space = Space::new(Vector([-10.0, -10.0]), Vector([10.0, 10.0]));
        let mut tree = BodyTree::new();
        for i in 0..bodies.len() {
            tree.push(&bodies, &space, i).unwrap();
        }

        let cfg = config(0.0, 0.0);
        for target in &bodies {
            let approximate = gravity_per_unit_mass(&cfg, &tree, &target.position);
            let exact = direct_sum(&cfg, &bodies, &target.position);
            let scale = exact.norm().max(1.0);
            assert!(
                (approximate - exact).norm() / scale < 1e-12,
                "approximate {approximate:?} vs exact {exact:?}"
            );
        }
    }

    #[test]
    fn test_softening_keeps_accelerations_finite() {
        // Two bodies almost on top of each other.
        let bodies = vec![body(1.0, 0.0, 0.0), body(1.0, 1e-300, 0.0)];
        let space = Space::new(Vector([-1.0, -1.0]), Vector([1.0, 1.0]));
        let mut tree = BodyTree::new();
        for i in 0..bodies.len() {
            tree.push(&bodies, &space, i).unwrap();
        }

        let cfg = config(0.5, 1e-3);
        for target in &bodies {
            let acceleration = gravity_per_unit_mass(&cfg, &tree, &target.position);
            assert!(acceleration.norm().is_finite());
        }
    }
}
