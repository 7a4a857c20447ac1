//! Property-based tests for region decomposition.
//!
//! Weights and biases are multiples of 1/4 so every prototype coefficient is
//! exact at the six-digit fraction precision.

use luka_core::Network;
use luka_formula::Formula;
use luka_lp::SimplexOracle;
use luka_pwl::{LatticeAssembler, RegionDecomposer};
use proptest::prelude::*;

/// Slack for region membership and piece values.
const TOLERANCE: f64 = 1e-7;

/// First stand-in variable of the lattice tests; piece `i` is `BASE + i`.
const BASE: u32 = 100;

fn quarter() -> impl Strategy<Value = f64> {
    (-4i32..=4).prop_map(|q| f64::from(q) / 4.0)
}

/// `[bias, w1, ..., w_inputs]` rows for one layer.
fn layer(inputs: usize, nodes: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(quarter(), inputs + 1), nodes)
}

/// Two inputs, one or two hidden layers, two outputs.
fn network() -> impl Strategy<Value = Network> {
    (1usize..=3, 1usize..=2, any::<bool>())
        .prop_flat_map(|(first, second, deep)| {
            let hidden = if deep {
                vec![layer(2, first).boxed(), layer(first, second).boxed()]
            } else {
                vec![layer(2, first).boxed()]
            };
            let last = if deep { second } else { first };
            (hidden, layer(last, 2))
        })
        .prop_map(|(mut rows, output)| {
            rows.push(output);
            Network::from_rows(rows).unwrap()
        })
}

fn samples() -> Vec<[f64; 2]> {
    let steps = [0.0, 0.2, 0.45, 0.5, 0.8, 1.0];
    steps
        .iter()
        .flat_map(|&a| steps.iter().map(move |&b| [a, b]))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every sample point lies in some piece, and every piece containing it
    /// takes the clamped network value there.
    #[test]
    fn pieces_cover_and_reproduce(network in network()) {
        let oracle = SimplexOracle::default();
        let decomposer = RegionDecomposer::new(&network, &oracle, &[]).unwrap();
        let decomposition = decomposer.decompose().unwrap();

        for point in samples() {
            let expected = network.evaluate(&point).unwrap();
            for (slot, &output) in decomposition.outputs.iter().enumerate() {
                let truth = expected[output].clamp(0.0, 1.0);
                let mut covered = false;
                for piece in &decomposition.pieces[slot] {
                    if piece.contains(&decomposition.prototypes, &point, TOLERANCE) {
                        covered = true;
                        let value = piece.evaluate(&point);
                        prop_assert!(
                            (value - truth).abs() < 1e-6,
                            "output {} at {:?}: piece {} vs network {}",
                            output, point, value, truth
                        );
                    }
                }
                prop_assert!(covered, "output {} at {:?} not covered", output, point);
            }
        }
    }

    /// Open regions of distinct pieces of one output are disjoint.
    #[test]
    fn open_regions_do_not_overlap(network in network()) {
        let oracle = SimplexOracle::default();
        let decomposer = RegionDecomposer::new(&network, &oracle, &[]).unwrap();
        let decomposition = decomposer.decompose().unwrap();

        for point in samples() {
            for pieces in &decomposition.pieces {
                let interior = pieces
                    .iter()
                    .filter(|p| p.contains(&decomposition.prototypes, &point, -TOLERANCE))
                    .count();
                prop_assert!(interior <= 1, "{} open regions contain {:?}", interior, point);
            }
        }
    }

    /// The max-min join of the pieces is the clamped network.
    #[test]
    fn lattice_join_reproduces_network(network in network()) {
        let oracle = SimplexOracle::default();
        let decomposer = RegionDecomposer::new(&network, &oracle, &[]).unwrap();
        let decomposition = decomposer.decompose().unwrap();

        for (slot, &output) in decomposition.outputs.iter().enumerate() {
            let pieces = &decomposition.pieces[slot];
            let assembler =
                LatticeAssembler::new(&decomposition.prototypes, pieces, &oracle, 1e-5);
            prop_assert!(assembler.has_lattice_property(2).unwrap());

            let formulas: Vec<Formula> =
                (0..pieces.len()).map(|i| Formula::variable(BASE + i as u32)).collect();
            let lattice = assembler.assemble(&formulas, 2).unwrap();

            for point in samples() {
                let truth = network.evaluate(&point).unwrap()[output].clamp(0.0, 1.0);
                let value = lattice
                    .evaluate(|v| pieces[(v - BASE) as usize].evaluate(&point).clamp(0.0, 1.0))
                    .unwrap();
                prop_assert!(
                    (value - truth).abs() < 1e-6,
                    "output {} at {:?}: lattice {} vs network {}",
                    output, point, value, truth
                );
            }
        }
    }

    /// Partitioned search merges back to the sequential result.
    #[test]
    fn parallel_matches_sequential(network in network(), threads in 2usize..=8) {
        let oracle = SimplexOracle::default();
        let decomposer = RegionDecomposer::new(&network, &oracle, &[]).unwrap();
        let sequential = decomposer.decompose().unwrap();
        let parallel = decomposer.decompose_parallel(threads).unwrap();
        prop_assert_eq!(parallel, sequential);
    }

    /// Requesting a subset of outputs shares the prototype walk.
    #[test]
    fn single_output_request(network in network()) {
        let oracle = SimplexOracle::default();
        let all = RegionDecomposer::new(&network, &oracle, &[]).unwrap().decompose().unwrap();
        let second = RegionDecomposer::new(&network, &oracle, &[1]).unwrap().decompose().unwrap();
        prop_assert_eq!(second.outputs.clone(), vec![1]);
        prop_assert_eq!(
            second.pieces_for(1).unwrap().len(),
            all.pieces_for(1).unwrap().len()
        );
    }
}
