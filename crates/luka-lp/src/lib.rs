//! Linear feasibility oracle.
//!
//! Every question the translation asks about geometry reduces to one linear
//! program over the unit input box `[0,1]^n`, restricted by a conjunction of
//! sign constraints on affine functionals:
//!
//! - is a region non-empty ([`LinearOracle::is_feasible`])
//! - is a functional non-negative, non-positive or cut by a region
//!   ([`LinearOracle::position`])
//! - how large can an affine objective get on a region
//!   ([`LinearOracle::maximize`])
//!
//! The oracle holds no state between calls, so independent workers may share
//! one instance.

mod simplex;

pub use simplex::SimplexOracle;

use luka_core::{Boundary, LukaError, Prototype, Result, Sign};

/// One affine inequality: `functional(x) ≥ 0` or `functional(x) ≤ 0`.
///
/// `functional[0]` is the constant term, `functional[i]` multiplies input `i`.
#[derive(Debug, Clone, Copy)]
pub struct Constraint<'a> {
    pub functional: &'a [f64],
    pub sign: Sign,
}

impl<'a> Constraint<'a> {
    pub fn new(functional: &'a [f64], sign: Sign) -> Self {
        Self { functional, sign }
    }
}

/// Result of an optimization request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LpOutcome {
    /// The region is non-empty; the optimum objective value.
    Optimal(f64),
    /// The constraints admit no point of the input box.
    Infeasible,
}

impl LpOutcome {
    pub fn value(self) -> Option<f64> {
        match self {
            LpOutcome::Optimal(v) => Some(v),
            LpOutcome::Infeasible => None,
        }
    }
}

/// Where a functional lies relative to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    /// Non-positive everywhere on the region: the ReLU gate is closed.
    Under,
    /// Changes sign inside the region: both gate states must be explored.
    Cutting,
    /// Non-negative everywhere on the region: the ReLU gate is open.
    Over,
}

/// A linear programming oracle over the unit input box.
pub trait LinearOracle: Send + Sync {
    /// Maximize the affine `objective` subject to `constraints`.
    ///
    /// All functionals must have the same length as `objective`.
    fn maximize(&self, objective: &[f64], constraints: &[Constraint<'_>]) -> Result<LpOutcome>;

    /// Slack used when comparing optima against zero.
    fn tolerance(&self) -> f64;

    /// Minimize the affine `objective` subject to `constraints`.
    fn minimize(&self, objective: &[f64], constraints: &[Constraint<'_>]) -> Result<LpOutcome> {
        let negated: Vec<f64> = objective.iter().map(|c| -c).collect();
        Ok(match self.maximize(&negated, constraints)? {
            LpOutcome::Optimal(v) => LpOutcome::Optimal(-v),
            LpOutcome::Infeasible => LpOutcome::Infeasible,
        })
    }

    /// Whether the conjunction of `constraints` has a point in `[0,1]^dim`.
    fn is_feasible(&self, dim: usize, constraints: &[Constraint<'_>]) -> Result<bool> {
        let objective = vec![0.0; dim + 1];
        Ok(matches!(
            self.maximize(&objective, constraints)?,
            LpOutcome::Optimal(_)
        ))
    }

    /// Classify `functional` against the region given by `constraints`.
    ///
    /// Fails if the region itself is empty: positions are only asked for
    /// regions the search has already proven feasible.
    fn position(&self, functional: &[f64], constraints: &[Constraint<'_>]) -> Result<Position> {
        let tolerance = self.tolerance();
        let (min, max) = match (
            self.minimize(functional, constraints)?,
            self.maximize(functional, constraints)?,
        ) {
            (LpOutcome::Optimal(min), LpOutcome::Optimal(max)) => (min, max),
            _ => {
                return Err(LukaError::InfeasibleSearch(
                    "gate classified against an empty region".into(),
                ))
            }
        };

        if min >= -tolerance {
            Ok(Position::Over)
        } else if max <= tolerance {
            Ok(Position::Under)
        } else {
            Ok(Position::Cutting)
        }
    }
}

/// Resolve a region's boundary references into oracle constraints.
pub fn region_constraints<'p>(
    prototypes: &'p [Prototype],
    region: &[Boundary],
) -> Result<Vec<Constraint<'p>>> {
    region
        .iter()
        .map(|boundary| {
            prototypes
                .get(boundary.index)
                .map(|p| Constraint::new(p.coefficients(), boundary.sign))
                .ok_or(LukaError::InvalidBoundary {
                    index: boundary.index,
                    len: prototypes.len(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_constraints_resolve_indices() {
        let prototypes = vec![
            Prototype::new(vec![0.0, 1.0]),
            Prototype::new(vec![-1.0, 1.0]),
        ];
        let region = vec![Boundary::geq(1), Boundary::leq(0)];
        let constraints = region_constraints(&prototypes, &region).unwrap();
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].functional, &[-1.0, 1.0]);
        assert_eq!(constraints[1].sign, Sign::LeqZero);
    }

    #[test]
    fn test_region_constraints_reject_dangling_reference() {
        let prototypes = vec![Prototype::new(vec![0.0, 1.0])];
        let err = region_constraints(&prototypes, &[Boundary::geq(5)]).unwrap_err();
        assert!(matches!(err, LukaError::InvalidBoundary { index: 5, len: 1 }));
    }

    #[test]
    fn test_positions() {
        let oracle = SimplexOracle::default();
        // x - 0.5 changes sign on [0,1].
        assert_eq!(
            oracle.position(&[-0.5, 1.0], &[]).unwrap(),
            Position::Cutting
        );
        // x + 0.1 is positive on [0,1].
        assert_eq!(oracle.position(&[0.1, 1.0], &[]).unwrap(), Position::Over);
        // -x is non-positive on [0,1].
        assert_eq!(oracle.position(&[0.0, -1.0], &[]).unwrap(), Position::Under);

        // Restricted to x ≥ 0.5, x - 0.5 no longer cuts.
        let restriction = [-0.5, 1.0];
        let constraints = [Constraint::new(&restriction, Sign::GeqZero)];
        assert_eq!(
            oracle.position(&[-0.5, 1.0], &constraints).unwrap(),
            Position::Over
        );
    }

    #[test]
    fn test_identically_zero_is_open() {
        let oracle = SimplexOracle::default();
        assert_eq!(oracle.position(&[0.0, 0.0], &[]).unwrap(), Position::Over);
    }

    #[test]
    fn test_position_of_empty_region_fails() {
        let oracle = SimplexOracle::default();
        let impossible = [-2.0, 1.0];
        let constraints = [Constraint::new(&impossible, Sign::GeqZero)];
        assert!(matches!(
            oracle.position(&[0.0, 1.0], &constraints),
            Err(LukaError::InfeasibleSearch(_))
        ));
    }
}
