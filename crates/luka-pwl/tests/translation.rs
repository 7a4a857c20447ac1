//! End-to-end translation of small networks.
//!
//! The valuations below assign every auxiliary variable the value its
//! defining formulas force, so the main and lattice formulas can be checked
//! against the network pointwise.

use luka_core::{Network, TranslationConfig};
use luka_formula::Variable;
use luka_pwl::format::{parse_instance, pwl_string};
use luka_pwl::{Instance, Translator};
use std::collections::HashMap;

const TOLERANCE: f64 = 1e-12;

fn valuation(values: &HashMap<Variable, f64>) -> impl Fn(Variable) -> f64 + '_ {
    move |v| values.get(&v).copied().unwrap_or(0.0)
}

fn grid(steps: usize) -> impl Iterator<Item = f64> {
    (0..=steps).map(move |i| i as f64 / steps as f64)
}

/// `y = relu(x1 + x2 - 1) - 0.25`
fn single_relu() -> Network {
    Network::from_rows(vec![vec![vec![-1.0, 1.0, 1.0]], vec![vec![-0.25, 1.0]]]).unwrap()
}

#[test]
fn identity_network_end_to_end() {
    let network = Network::from_rows(vec![vec![vec![0.0, 1.0]]]).unwrap();
    let mut translator = Translator::new(1, TranslationConfig::default().with_max_threads(2));
    let translation = translator.translate(&network, &[0]).unwrap();
    let output = translation.output(0).unwrap();

    for x in grid(8) {
        // 2: zero, 3: the constant 1, 4: aux bound to x.
        let values = HashMap::from([(1, x), (2, 0.0), (3, 1.0), (4, x)]);
        for modsat in &output.modsats {
            assert!(modsat.defined_by(valuation(&values), TOLERANCE));
        }
        let value = output.lattice.evaluate(valuation(&values)).unwrap();
        assert!((value - x).abs() < TOLERANCE, "x = {x}: {value}");
    }
}

#[test]
fn single_relu_end_to_end() {
    let network = single_relu();
    let mut translator = Translator::new(2, TranslationConfig::sequential());
    let translation = translator.translate(&network, &[]).unwrap();
    assert_eq!(translation.decomposition.piece_count(), 3);
    assert_eq!(translation.max_variable, 16);
    let output = translation.output(0).unwrap();

    for x1 in grid(6) {
        for x2 in grid(6) {
            let difference = ((x1 + x2) / 2.0 - 0.625).max(0.0);
            let values = HashMap::from([
                (1, x1),
                (2, x2),
                (3, 0.0),
                (4, 0.5),
                (5, x1 / 2.0),
                (6, x1 / 2.0),
                (7, x1),
                (8, x2 / 2.0),
                (9, x2 / 2.0),
                (10, x2),
                (11, 0.125),
                (12, 0.125),
                (13, 0.25),
                (14, 0.5),
                (15, difference),
                (16, (2.0 * difference).min(1.0)),
            ]);
            for modsat in &output.modsats {
                assert!(modsat.defined_by(valuation(&values), TOLERANCE));
            }
            let expected = network.evaluate(&[x1, x2]).unwrap()[0].clamp(0.0, 1.0);
            let value = output.lattice.evaluate(valuation(&values)).unwrap();
            assert!(
                (value - expected).abs() < TOLERANCE,
                "({x1}, {x2}): {value} != {expected}"
            );
        }
    }
}

#[test]
fn region_dump_translates_like_the_network() {
    let network = single_relu();
    let mut direct = Translator::new(2, TranslationConfig::sequential());
    let translation = direct.translate(&network, &[]).unwrap();
    let decomposition = &translation.decomposition;

    let text = pwl_string(&decomposition.prototypes, decomposition.pieces_for(0).unwrap());
    let Instance::Pwl(instance) = parse_instance(&text).unwrap() else {
        panic!("expected a pwl instance");
    };
    assert_eq!(instance.prototypes, decomposition.prototypes);

    let mut from_dump = Translator::new(2, TranslationConfig::sequential());
    let output = from_dump.translate_pwl(&instance).unwrap();
    assert_eq!(&output, translation.output(0).unwrap());
    assert_eq!(from_dump.allocator().current(), translation.max_variable);
}

#[test]
fn truncated_linear_instance_encodes_directly() {
    let Instance::TruncatedLinear(coefficients) = parse_instance("tl -1 4 1 2\n").unwrap() else {
        panic!("expected a tl instance");
    };
    let mut translator = Translator::new(1, TranslationConfig::sequential());
    let modsat = translator.encode_piece(&coefficients).unwrap();
    assert_eq!(translator.allocator().current(), 8);
    assert_eq!(modsat.defining.len(), 8);
}

#[test]
fn lattice_check_can_be_disabled() {
    // A jump from 0 to 1 has no max-min form.
    let text = "pwl\n\nb -0.5 1\n\np 0 1 0 1\nl 1\n\np 1 1 0 1\ng 1\n";
    let Instance::Pwl(instance) = parse_instance(text).unwrap() else {
        panic!("expected a pwl instance");
    };

    let mut strict = Translator::new(1, TranslationConfig::sequential());
    let err = strict.translate_pwl(&instance).unwrap_err();
    assert_eq!(err.stage(), luka_core::Stage::Assembly);
    assert_eq!(strict.allocator().current(), 1);

    let mut lenient =
        Translator::new(1, TranslationConfig::sequential().with_lattice_check(false));
    let output = lenient.translate_pwl(&instance).unwrap();
    assert_eq!(output.modsats.len(), 2);
}
