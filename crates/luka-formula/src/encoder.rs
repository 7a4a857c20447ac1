//! Encoding of exact rational affine pieces into Łukasiewicz Modsats.
//!
//! The value `f(x) = c_0 + Σ c_i x_i` is split by coefficient sign into
//! `P(x) - N(x)` with both groups non-negative. With `β = ⌈max(ΣP, ΣN)⌉` both
//! `P/β` and `N/β` fit in `[0,1]`, so each is a strong disjunction of
//! fractions `α_i / (β d_i)` of inputs or of the unit constant. The piece is
//! then `β · ¬(P/β → N/β) = β · max(0, (P - N)/β)`, truncated at 1.
//!
//! Multiplication by a natural number uses a doubling chain of fresh
//! variables (one per bit), and unit fractions `1/d` are defined once per
//! denominator and shared through the [`VariableAllocator`].

use crate::allocator::{Denominator, VariableAllocator};
use crate::formula::{Connective, Formula, Literal, Modsat, Variable};
use luka_core::{Coefficient, LukaError, Result};
use num_rational::Ratio;
use num_traits::{CheckedAdd, CheckedSub, Signed, Zero};
use std::cmp::Ordering;
use tracing::debug;

/// Position of the highest set bit (`n >= 1`).
#[inline]
fn ilogb(n: u64) -> u32 {
    63 - n.leading_zeros()
}

fn set_bits(n: u64) -> impl Iterator<Item = u32> {
    (0..64u32).filter(move |i| (n >> i) & 1 == 1)
}

fn equivalent(left: &Formula, right: &Formula) -> Formula {
    Formula::binary(left, right, Connective::Equivalence)
}

/// Encodes rational pieces, drawing variables from a borrowed allocator.
pub struct RationalEncoder<'a> {
    allocator: &'a mut VariableAllocator,
}

impl<'a> RationalEncoder<'a> {
    pub fn new(allocator: &'a mut VariableAllocator) -> Self {
        Self { allocator }
    }

    /// `¬(¬z ⊕ z)`: the constant 0.
    pub fn zero_formula(&mut self) -> Formula {
        let zero = Literal::from(self.allocator.zero_variable());
        Formula::negation(&Formula::clause(vec![-zero, zero]))
    }

    /// `n · term` through a doubling chain.
    ///
    /// For `n >= 2` the chain variables `v_0, v_1, …` are allocated
    /// consecutively with `v_0 ≡ term` and `v_{i+1} ≡ v_i ⊕ v_i`; the main
    /// formula disjoins the `v_i` for the bits set in `n`.
    pub fn binary_modsat(&mut self, n: u64, term: &Formula) -> Modsat {
        match n {
            0 => Modsat::new(self.zero_formula()),
            1 => Modsat::new(term.clone()),
            _ => {
                let mut modsat = Modsat::default();
                let mut literals = Vec::new();

                let mut previous = self.allocator.fresh();
                modsat
                    .defining
                    .push(equivalent(&Formula::variable(previous), term));
                if n & 1 == 1 {
                    literals.push(Literal::from(previous));
                }

                for bit in 1..=ilogb(n) {
                    let next = self.allocator.fresh();
                    let doubled = Formula::clause(vec![Literal::from(previous); 2]);
                    modsat
                        .defining
                        .push(equivalent(&Formula::variable(next), &doubled));
                    if (n >> bit) & 1 == 1 {
                        literals.push(Literal::from(next));
                    }
                    previous = next;
                }

                modsat.phi = Formula::clause(literals);
                modsat
            }
        }
    }

    /// Allocate `1/denominator` and return its defining formulas.
    ///
    /// The constant `c` is bound by `c ≡ ¬((d-1) · c)`, whose only solution is
    /// `1/d`. Its doubling chain follows it: `c + i + 1` carries `2^i / d`.
    pub fn define_constant(&mut self, denominator: Denominator) -> Result<Vec<Formula>> {
        if denominator == 0 {
            return Err(LukaError::Encoding("constant with zero denominator".into()));
        }
        let constant = Formula::variable(self.allocator.new_constant(denominator));
        let mut modsat = self.binary_modsat(denominator - 1, &constant);
        let binding = equivalent(&constant, &Formula::negation(&modsat.phi));
        modsat.defining.push(binding);
        Ok(modsat.defining)
    }

    /// Get or define `1/denominator`.
    ///
    /// The returned formulas are empty when the constant already exists.
    pub fn constant(&mut self, denominator: Denominator) -> Result<(Variable, Vec<Formula>)> {
        if let Some(variable) = self.allocator.constant(denominator) {
            return Ok((variable, Vec::new()));
        }
        let defining = self.define_constant(denominator)?;
        let variable = self.allocator.constant(denominator).ok_or_else(|| {
            LukaError::Encoding(format!("constant 1/{denominator} vanished after definition"))
        })?;
        Ok((variable, defining))
    }

    /// `numerator / denominator` from an already defined constant.
    ///
    /// Requires `numerator <= denominator`.
    pub fn multiply_constant(
        &mut self,
        numerator: u64,
        denominator: Denominator,
    ) -> Result<Modsat> {
        let constant = self.allocator.constant(denominator).ok_or_else(|| {
            LukaError::Encoding(format!("constant 1/{denominator} used before definition"))
        })?;

        if denominator <= 2 {
            return Ok(self.binary_modsat(numerator, &Formula::variable(constant)));
        }
        if numerator == 0 {
            return Ok(Modsat::new(self.zero_formula()));
        }

        if ilogb(numerator) <= ilogb(denominator - 1) {
            let literals = set_bits(numerator)
                .map(|i| Literal::from(constant) + Literal::from(i) + 1)
                .collect();
            Ok(Modsat::new(Formula::clause(literals)))
        } else if numerator == denominator {
            // Only reachable for powers of two: the top chain variable doubled.
            let top = Literal::from(constant) + Literal::from(ilogb(numerator));
            let allocation = self.allocator.aux_multiplier(denominator);
            let aux = Formula::variable(allocation.variable());
            let mut modsat = Modsat::new(aux.clone());
            if allocation.is_fresh() {
                modsat
                    .defining
                    .push(equivalent(&aux, &Formula::clause(vec![top, top])));
            }
            Ok(modsat)
        } else {
            Err(LukaError::Encoding(format!(
                "fraction {numerator}/{denominator} exceeds one"
            )))
        }
    }

    /// `n · var` for a variable whose doubling chain already exists.
    pub fn second_multiplication(&mut self, n: u64, variable: Variable) -> Formula {
        match n {
            0 => self.zero_formula(),
            1 => Formula::variable(variable),
            _ => Formula::clause(
                set_bits(n)
                    .map(|i| Literal::from(variable) + Literal::from(i) + 1)
                    .collect(),
            ),
        }
    }

    /// Encode the truncation into `[0,1]` of `c_0 + Σ c_i x_i`.
    pub fn encode(&mut self, coefficients: &[Coefficient]) -> Result<Modsat> {
        if coefficients.iter().all(Zero::is_zero) {
            return Ok(Modsat::new(self.zero_formula()));
        }

        let mut positive = Ratio::<i128>::zero();
        let mut negative = Ratio::<i128>::zero();
        for c in coefficients {
            if *c.denom() == 0 {
                return Err(LukaError::Encoding("coefficient with zero denominator".into()));
            }
            let wide = Ratio::new(i128::from(*c.numer()), i128::from(*c.denom()));
            let overflow =
                || LukaError::Encoding("coefficient sum overflows the scale computation".into());
            if wide.is_negative() {
                negative = negative.checked_sub(&wide).ok_or_else(overflow)?;
            } else {
                positive = positive.checked_add(&wide).ok_or_else(overflow)?;
            }
        }
        let larger = positive.max(negative);
        let bound = if larger.is_integer() {
            larger.to_integer()
        } else {
            larger.to_integer() + 1
        };
        let beta = u64::try_from(bound)
            .map_err(|_| LukaError::Encoding(format!("scale {bound} out of range")))?;

        let mut alphas = Vec::with_capacity(coefficients.len());
        let mut betas = Vec::with_capacity(coefficients.len());
        for c in coefficients {
            let reduced = c.reduced();
            alphas.push(reduced.numer().unsigned_abs());
            let denominator = reduced.denom().unsigned_abs();
            betas.push(denominator.checked_mul(beta).ok_or_else(|| {
                LukaError::Encoding(format!("scaled denominator {denominator}·{beta} overflows"))
            })?);
        }

        let (positive_indices, negative_indices): (Vec<usize>, Vec<usize>) =
            (0..coefficients.len()).partition(|&i| !coefficients[i].is_negative());
        debug!(
            beta,
            positive = positive_indices.len(),
            negative = negative_indices.len(),
            "encoding piece"
        );

        let positive = self.encode_group(&positive_indices, &alphas, &betas)?;
        let negative = self.encode_group(&negative_indices, &alphas, &betas)?;

        let difference = Formula::negation(&Formula::binary(
            &positive.phi,
            &negative.phi,
            Connective::Implication,
        ));
        let scaled = self.binary_modsat(beta, &difference);

        let mut defining = positive.defining;
        defining.extend(negative.defining);
        defining.extend(scaled.defining);
        Ok(Modsat {
            phi: scaled.phi,
            defining,
        })
    }

    /// Strong disjunction of `α_i / β_i` times input `i` (index 0: the unit).
    fn encode_group(&mut self, indices: &[usize], alphas: &[u64], betas: &[u64]) -> Result<Modsat> {
        if indices.iter().all(|&i| alphas[i] == 0) {
            return Ok(Modsat::new(self.zero_formula()));
        }

        let mut group = Modsat::default();
        for &i in indices {
            let (alpha, denominator) = (alphas[i], betas[i]);
            if alpha == 0 {
                continue;
            }

            let (constant, definition) = self.constant(denominator)?;
            group.defining.extend(definition);

            if i == 0 {
                let product = self.multiply_constant(alpha, denominator)?;
                group.phi.strong_disjoin(&product.phi);
                group.defining.extend(product.defining);
                continue;
            }

            let input = Variable::try_from(i)
                .map(Formula::variable)
                .map_err(|_| LukaError::Encoding(format!("input {i} out of variable range")))?;

            // aux carries x_i / max(α, β); the chain of its larger multiple
            // lets the smaller one be read off without new variables.
            let aux = self.allocator.fresh();
            let multiple = self.binary_modsat(alpha.max(denominator), &Formula::variable(aux));
            group.defining.extend(multiple.defining);

            let (term, binding) = match alpha.cmp(&denominator) {
                Ordering::Equal => (multiple.phi.clone(), multiple.phi),
                Ordering::Less => (self.second_multiplication(alpha, aux), multiple.phi),
                Ordering::Greater => {
                    let binding = self.second_multiplication(denominator, aux);
                    (multiple.phi, binding)
                }
            };
            group.phi.strong_disjoin(&term);
            group.defining.push(equivalent(&binding, &input));
            group.defining.push(Formula::binary(
                &Formula::variable(aux),
                &Formula::variable(constant),
                Connective::Implication,
            ));
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ratio(n: i64, d: i64) -> Coefficient {
        Ratio::new(n, d)
    }

    fn valuation(values: &HashMap<Variable, f64>) -> impl Fn(Variable) -> f64 + '_ {
        move |v| values.get(&v).copied().unwrap_or(0.0)
    }

    #[test]
    fn test_zero_formula_is_false() {
        let mut alloc = VariableAllocator::new(2);
        let mut encoder = RationalEncoder::new(&mut alloc);
        let zero = encoder.zero_formula();
        for z in [0.0, 0.3, 1.0] {
            assert_eq!(zero.evaluate(|_| z), Some(0.0));
        }
        assert_eq!(alloc.zero_variable(), 3);
    }

    #[test]
    fn test_binary_gadget_represents_n() {
        let t = 1.0 / 128.0;
        for n in 0..=64u64 {
            let mut alloc = VariableAllocator::new(1);
            let start = alloc.current() + 1;
            let modsat = RationalEncoder::new(&mut alloc).binary_modsat(n, &Formula::variable(1));

            let mut values = HashMap::from([(1, t)]);
            for (i, v) in (start..=alloc.current()).enumerate() {
                values.insert(v, ((1u64 << i) as f64 * t).min(1.0));
            }
            if n == 0 {
                // Only the zero variable was allocated; its value is irrelevant.
                values.insert(start, 0.5);
            }

            assert!(modsat.defined_by(valuation(&values), 1e-12), "n = {n}");
            let value = modsat.phi.evaluate(valuation(&values)).unwrap();
            assert!((value - n as f64 * t).abs() < 1e-12, "n = {n}: {value}");
            assert_eq!(modsat.defining.len(), if n >= 2 { ilogb(n) as usize + 1 } else { 0 });

            if n >= 2 {
                for v in start..=alloc.current() {
                    let mut wrong = values.clone();
                    *wrong.get_mut(&v).unwrap() += 1.0 / 256.0;
                    assert!(
                        !modsat.defined_by(valuation(&wrong), 1e-12),
                        "n = {n}: perturbing {v} kept the gadget satisfied"
                    );
                }
            }
        }
    }

    #[test]
    fn test_constant_definition_forces_unit_fraction() {
        for d in 1..=20u64 {
            let mut alloc = VariableAllocator::new(1);
            let (c, defining) = RationalEncoder::new(&mut alloc).constant(d).unwrap();
            let modsat = Modsat {
                phi: Formula::variable(c),
                defining,
            };

            let mut values = HashMap::new();
            values.insert(c, 1.0 / d as f64);
            for v in c + 1..=alloc.current() {
                let i = v - c - 1;
                values.insert(v, ((1u64 << i) as f64 / d as f64).min(1.0));
            }
            if d == 1 {
                let zero = alloc.zero_variable();
                values.insert(zero, 0.0);
            }
            assert!(modsat.defined_by(valuation(&values), 1e-12), "d = {d}");

            if d > 1 {
                let mut wrong = values.clone();
                wrong.insert(c, 1.0 / (d as f64 + 1.0));
                assert!(!modsat.defined_by(valuation(&wrong), 1e-12), "d = {d}");
            }
        }
    }

    #[test]
    fn test_constant_is_memoized() {
        let mut alloc = VariableAllocator::new(2);
        let mut encoder = RationalEncoder::new(&mut alloc);
        let (first, defining) = encoder.constant(7).unwrap();
        assert!(!defining.is_empty());
        let (second, defining) = encoder.constant(7).unwrap();
        assert_eq!(first, second);
        assert!(defining.is_empty());
    }

    #[test]
    fn test_shared_denominator_adds_no_definitions() {
        let mut alloc = VariableAllocator::new(1);
        let mut encoder = RationalEncoder::new(&mut alloc);
        let identity = [ratio(0, 1), ratio(1, 1)];
        let first = encoder.encode(&identity).unwrap();
        let second = encoder.encode(&identity).unwrap();
        assert_eq!(first.defining.len(), 3);
        assert_eq!(second.defining.len(), 2);
    }

    #[test]
    fn test_all_zero_piece() {
        let mut alloc = VariableAllocator::new(2);
        let modsat = RationalEncoder::new(&mut alloc)
            .encode(&[ratio(0, 1), ratio(0, 1), ratio(0, 1)])
            .unwrap();
        assert!(modsat.defining.is_empty());
        assert_eq!(modsat.phi.evaluate(|_| 0.7), Some(0.0));
    }

    #[test]
    fn test_encode_half_x_minus_quarter() {
        let mut alloc = VariableAllocator::new(1);
        let modsat = RationalEncoder::new(&mut alloc)
            .encode(&[ratio(-1, 4), ratio(1, 2)])
            .unwrap();
        // x, 1/2, aux = x/2 with its chain, 1/4 with its chain.
        assert_eq!(alloc.current(), 8);
        assert_eq!(modsat.defining.len(), 8);

        for x in [0.0f64, 0.25, 0.5, 0.75, 1.0] {
            let values = HashMap::from([
                (1, x),
                (2, 0.5),
                (3, x / 2.0),
                (4, x / 2.0),
                (5, x),
                (6, 0.25),
                (7, 0.25),
                (8, 0.5),
            ]);
            assert!(modsat.defined_by(valuation(&values), 1e-12), "x = {x}");
            let value = modsat.phi.evaluate(valuation(&values)).unwrap();
            let expected = (x / 2.0 - 0.25).clamp(0.0, 1.0);
            assert!((value - expected).abs() < 1e-12, "x = {x}: {value}");
        }
    }

    #[test]
    fn test_encode_scaled_slope_truncates_at_one() {
        let mut alloc = VariableAllocator::new(1);
        let modsat = RationalEncoder::new(&mut alloc)
            .encode(&[ratio(0, 1), ratio(3, 2)])
            .unwrap();
        assert_eq!(alloc.current(), 11);

        for x in [0.0f64, 0.25, 0.5, 0.8, 1.0] {
            let values = HashMap::from([
                (1, x),
                (2, 0.25),
                (3, 0.25),
                (4, 0.5),
                (5, x / 4.0),
                (6, x / 4.0),
                (7, x / 2.0),
                (8, x),
                (9, 0.0),
                (10, 0.75 * x),
                (11, (1.5 * x).min(1.0)),
            ]);
            assert!(modsat.defined_by(valuation(&values), 1e-12), "x = {x}");
            let value = modsat.phi.evaluate(valuation(&values)).unwrap();
            assert!((value - (1.5 * x).min(1.0)).abs() < 1e-12, "x = {x}: {value}");
        }
    }

    #[test]
    fn test_huge_coprime_denominators_are_an_error() {
        let mut alloc = VariableAllocator::new(3);
        let result = RationalEncoder::new(&mut alloc).encode(&[
            ratio(1, 999_999_999_989),
            ratio(1, 999_999_999_961),
            ratio(1, 999_999_999_959),
            ratio(1, 999_999_999_937),
        ]);
        assert!(matches!(result, Err(LukaError::Encoding(_))));
    }

    #[test]
    fn test_scale_is_ceiling_of_larger_group() {
        let mut alloc = VariableAllocator::new(1);
        // ΣP = 5/2 gives β = 3: the final chain multiplies by 0b11.
        let modsat = RationalEncoder::new(&mut alloc)
            .encode(&[ratio(1, 2), ratio(2, 1)])
            .unwrap();
        let top = Literal::from(alloc.current());
        assert_eq!(modsat.phi, Formula::clause(vec![top - 1, top]));
    }

    #[test]
    fn test_multiply_constant() {
        let mut alloc = VariableAllocator::new(1);
        let mut encoder = RationalEncoder::new(&mut alloc);
        assert!(matches!(
            encoder.multiply_constant(1, 4),
            Err(LukaError::Encoding(_))
        ));

        let (c, _) = encoder.constant(4).unwrap();
        let three = encoder.multiply_constant(3, 4).unwrap();
        assert_eq!(
            three.phi,
            Formula::clause(vec![Literal::from(c) + 1, Literal::from(c) + 2])
        );

        let whole = encoder.multiply_constant(4, 4).unwrap();
        assert_eq!(whole.defining.len(), 1);
        let again = encoder.multiply_constant(4, 4).unwrap();
        assert!(again.defining.is_empty());
        assert_eq!(whole.phi, again.phi);

        let aux = whole.phi.max_variable().unwrap();
        let values = HashMap::from([(c, 0.25), (c + 1, 0.25), (c + 2, 0.5), (aux, 1.0)]);
        assert!(whole.defined_by(valuation(&values), 1e-12));
        assert_eq!(three.phi.evaluate(valuation(&values)), Some(0.75));

        assert!(matches!(
            encoder.multiply_constant(5, 4),
            Err(LukaError::Encoding(_))
        ));
    }

    #[test]
    fn test_second_multiplication_reads_chain() {
        let mut alloc = VariableAllocator::new(1);
        let mut encoder = RationalEncoder::new(&mut alloc);
        assert_eq!(encoder.second_multiplication(1, 5), Formula::variable(5));
        assert_eq!(
            encoder.second_multiplication(5, 5),
            Formula::clause(vec![6, 8])
        );
    }
}
