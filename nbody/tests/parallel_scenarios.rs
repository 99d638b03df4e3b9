//! Multi-rank scenarios exercised over the in-process communicator group.

use nbody::body::{Bodies, Body};
use nbody::comm::{Division, ROOT};
use nbody::config::Configuration;
use nbody::error::Error;
use nbody::generate::{normal_cluster, random_bodies};
use nbody::local::LocalGroup;
use nbody::logging::LogLevel;
use nbody::physics;
use nbody::random::ParallelMinStd;
use nbody::space::root_space;
use nbody::tree::build_tree;
use nbody::vector::Vector;

fn scattered_bodies(count: usize) -> Bodies<f64, 2> {
    (0..count)
        .map(|i| {
            let angle = 0.7 * i as f64;
            Body::new(
                Vector([3.0 * angle.cos() + 0.1 * i as f64, 2.0 * angle.sin()]),
                Vector([0.01 * i as f64, -0.02 * i as f64]),
                1.0 + (i % 5) as f64,
            )
        })
        .collect()
}

fn test_config() -> Configuration<f64> {
    Configuration {
        number: None,
        steps: 1,
        sample_interval: 1,
        time: 0.05,
        gravitational_constant: 1.0,
        theta: 0.5,
        soften_length: 0.0,
        input: None,
        output: "n-body-output".into(),
        min_log_level: LogLevel::Info,
    }
}

#[test]
fn test_every_rank_builds_the_identical_tree() {
    for size in [1, 2, 4] {
        let encodings = LocalGroup::run(size, |comm| {
            let bodies = scattered_bodies(16);
            let space = root_space(&comm, &bodies).unwrap();
            let tree = build_tree(&comm, &space, &bodies).unwrap();
            tree.to_bytes().unwrap()
        });
        for encoding in &encodings {
            assert_eq!(
                encoding, &encodings[0],
                "tree encodings diverge across ranks at size {size}"
            );
        }
    }
}

#[test]
fn test_every_rank_holds_identical_bodies_after_a_step() {
    for size in [1, 2, 4] {
        let populations = LocalGroup::run(size, |comm| {
            let mut bodies = scattered_bodies(16);
            let config = test_config();
            let space = root_space(&comm, &bodies).unwrap();
            let tree = build_tree(&comm, &space, &bodies).unwrap();
            physics::step(&comm, &config, &mut bodies, &tree).unwrap();
            bincode::serialize(&bodies).unwrap()
        });
        for population in &populations {
            assert_eq!(population, &populations[0]);
        }
    }
}

#[test]
fn test_fixed_seed_yields_identical_bodies_on_every_rank() {
    for size in [1, 2, 4] {
        let first = LocalGroup::run(size, |comm| {
            let rng = ParallelMinStd::from_seed(&comm, ROOT, 20_240_601);
            random_bodies::<_, f64, 3, _>(&comm, normal_cluster(rng), 8).unwrap()
        });
        for population in &first {
            assert_eq!(population, &first[0]);
        }

        // The same seed reproduces the same population run over run.
        let second = LocalGroup::run(size, |comm| {
            let rng = ParallelMinStd::from_seed(&comm, ROOT, 20_240_601);
            random_bodies::<_, f64, 3, _>(&comm, normal_cluster(rng), 8).unwrap()
        });
        assert_eq!(first[0], second[0]);
    }
}

#[test]
fn test_indivisible_population_is_rejected() {
    let results = LocalGroup::run(2, |comm| Division::new(&comm, 7));
    for result in results {
        assert!(matches!(
            result,
            Err(Error::Divisibility { number: 7, size: 2 })
        ));
    }

    let results = LocalGroup::run(2, |comm| {
        let rng = ParallelMinStd::from_seed(&comm, ROOT, 1);
        random_bodies::<_, f64, 3, _>(&comm, normal_cluster(rng), 7)
    });
    for result in results {
        assert!(matches!(result, Err(Error::Divisibility { .. })));
    }
}

#[test]
fn test_coincident_bodies_fail_the_collective_build() {
    let results = LocalGroup::run(2, |comm| {
        let mut bodies = scattered_bodies(8);
        bodies[5].position = bodies[2].position;
        let space = root_space(&comm, &bodies).unwrap();
        build_tree(&comm, &space, &bodies)
    });
    for result in results {
        assert!(matches!(result, Err(Error::CoincidentBodies { .. })));
    }
}
