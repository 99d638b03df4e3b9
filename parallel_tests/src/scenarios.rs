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

const GROUP_SIZES: [usize; 3] = [1, 2, 4];

fn configuration() -> Configuration<f64> {
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

fn ring(count: usize) -> Bodies<f64, 2> {
    (0..count)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / count as f64;
            Body::new(
                Vector([(2.0 + 0.1 * i as f64) * angle.cos(), 2.0 * angle.sin()]),
                Vector([-angle.sin(), angle.cos()]),
                1.0 + (i % 3) as f64,
            )
        })
        .collect()
}

/// A fixed seed produces the identical population on every rank, for every
/// group size.
pub fn test_seeded_population_agreement() {
    for size in GROUP_SIZES {
        println!("Test seeded population agreement across {size} ranks");
        let populations = LocalGroup::run(size, |comm| {
            let rng = ParallelMinStd::from_seed(&comm, ROOT, 8_191);
            random_bodies::<_, f64, 3, _>(&comm, normal_cluster(rng), 16).unwrap()
        });
        for population in &populations {
            assert_eq!(population, &populations[0]);
        }
    }
}

/// The merge reduction leaves every rank with a byte-identical tree.
pub fn test_tree_agreement() {
    for size in GROUP_SIZES {
        println!("Test tree agreement across {size} ranks");
        let encodings = LocalGroup::run(size, |comm| {
            let bodies = ring(16);
            let space = root_space(&comm, &bodies).unwrap();
            let tree = build_tree(&comm, &space, &bodies).unwrap();
            tree.to_bytes().unwrap()
        });
        for encoding in &encodings {
            assert_eq!(encoding, &encodings[0]);
        }
    }
}

/// After a step's all-gather every rank holds the identical population.
pub fn test_step_agreement() {
    for size in GROUP_SIZES {
        println!("Test step agreement across {size} ranks");
        let populations = LocalGroup::run(size, |comm| {
            let config = configuration();
            let mut bodies = ring(16);
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

/// A population that does not divide across the group is rejected on every
/// rank.
pub fn test_divisibility_rejection() {
    println!("Test divisibility rejection");
    let results = LocalGroup::run(2, |comm| Division::new(&comm, 7));
    for result in results {
        assert!(matches!(
            result,
            Err(Error::Divisibility { number: 7, size: 2 })
        ));
    }
}
