use parallel_tests::scenarios::*;

fn main() {
    println!("Test parallel n-body engine: ");

    // 1. Deterministic seeding across group sizes
    test_seeded_population_agreement();

    // 2. Identical trees and bodies on every rank
    test_tree_agreement();
    test_step_agreement();

    // 3. Group-wide rejection of bad configurations
    test_divisibility_rejection();

    println!("all scenarios passed");
}
