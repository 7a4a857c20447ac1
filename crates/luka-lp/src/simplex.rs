//! Dense two-phase primal simplex over the unit box.
//!
//! Each sign constraint becomes one `≤` row over the structural variables
//! `x_1..x_n`; the box adds `x_j ≤ 1` rows and non-negativity is implicit in
//! the standard form. Rows with a negative right-hand side get an artificial
//! variable and phase one drives the artificials out. Bland's rule is used
//! for both entering and leaving variables, so the method terminates on
//! degenerate problems.

use crate::{Constraint, LinearOracle, LpOutcome};
use luka_core::{LukaError, Result, Sign};
use tracing::trace;

/// Simplex-based [`LinearOracle`] over `[0,1]^n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexOracle {
    tolerance: f64,
    max_pivots: usize,
}

impl Default for SimplexOracle {
    fn default() -> Self {
        Self::new(1e-9)
    }
}

impl SimplexOracle {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_pivots: 50_000,
        }
    }

    pub fn with_max_pivots(mut self, max_pivots: usize) -> Self {
        self.max_pivots = max_pivots;
        self
    }
}

impl LinearOracle for SimplexOracle {
    fn maximize(&self, objective: &[f64], constraints: &[Constraint<'_>]) -> Result<LpOutcome> {
        let Some(dim) = objective.len().checked_sub(1) else {
            return Err(LukaError::Solver("objective without constant term".into()));
        };
        if let Some(bad) = constraints.iter().find(|c| c.functional.len() != dim + 1) {
            return Err(LukaError::Solver(format!(
                "constraint over {} coefficients, objective over {}",
                bad.functional.len(),
                dim + 1
            )));
        }

        let mut tableau = Tableau::build(dim, constraints);
        let pivot_budget = self.max_pivots;

        if tableau.artificials > 0 {
            let phase_one = tableau.phase_one_costs();
            let allowed = tableau.cols;
            let value = tableau.optimize(&phase_one, allowed, self.tolerance, pivot_budget)?;
            if value < -self.tolerance {
                trace!(dim, rows = tableau.rows.len(), "infeasible region");
                return Ok(LpOutcome::Infeasible);
            }
            tableau.evict_artificials(self.tolerance);
        }

        let mut costs = vec![0.0; tableau.cols];
        costs[..dim].copy_from_slice(&objective[1..]);
        let allowed = tableau.structural + tableau.slacks;
        let optimum = tableau.optimize(&costs, allowed, self.tolerance, pivot_budget)?;

        trace!(dim, rows = tableau.rows.len(), optimum, "lp solved");
        Ok(LpOutcome::Optimal(objective[0] + optimum))
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

/// Row-major tableau; the last entry of every row is its right-hand side.
struct Tableau {
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    structural: usize,
    slacks: usize,
    artificials: usize,
    cols: usize,
}

impl Tableau {
    fn build(dim: usize, constraints: &[Constraint<'_>]) -> Self {
        // (coefficients, rhs) with `coefficients · x ≤ rhs`.
        let mut inequalities: Vec<(Vec<f64>, f64)> =
            Vec::with_capacity(constraints.len() + dim);
        for constraint in constraints {
            let (constant, linear) = (constraint.functional[0], &constraint.functional[1..]);
            match constraint.sign {
                Sign::GeqZero => {
                    inequalities.push((linear.iter().map(|a| -a).collect(), constant))
                }
                Sign::LeqZero => inequalities.push((linear.to_vec(), -constant)),
            }
        }
        for j in 0..dim {
            let mut unit = vec![0.0; dim];
            unit[j] = 1.0;
            inequalities.push((unit, 1.0));
        }

        let slacks = inequalities.len();
        let artificials = inequalities.iter().filter(|(_, rhs)| *rhs < 0.0).count();
        let cols = dim + slacks + artificials;

        let mut rows = Vec::with_capacity(slacks);
        let mut basis = Vec::with_capacity(slacks);
        let mut next_artificial = dim + slacks;
        for (i, (coefficients, rhs)) in inequalities.into_iter().enumerate() {
            let mut row = vec![0.0; cols + 1];
            row[..dim].copy_from_slice(&coefficients);
            row[dim + i] = 1.0;
            row[cols] = rhs;
            if rhs < 0.0 {
                for entry in row.iter_mut() {
                    *entry = -*entry;
                }
                row[next_artificial] = 1.0;
                basis.push(next_artificial);
                next_artificial += 1;
            } else {
                basis.push(dim + i);
            }
            rows.push(row);
        }

        Self {
            rows,
            basis,
            structural: dim,
            slacks,
            artificials,
            cols,
        }
    }

    fn phase_one_costs(&self) -> Vec<f64> {
        let mut costs = vec![0.0; self.cols];
        for cost in &mut costs[self.structural + self.slacks..] {
            *cost = -1.0;
        }
        costs
    }

    /// Maximize `costs · x` letting only columns below `allowed` enter.
    fn optimize(
        &mut self,
        costs: &[f64],
        allowed: usize,
        tolerance: f64,
        max_pivots: usize,
    ) -> Result<f64> {
        for _ in 0..max_pivots {
            let Some(entering) = (0..allowed).find(|&j| self.reduced_cost(costs, j) > tolerance)
            else {
                return Ok(self.objective_value(costs));
            };

            let mut leaving: Option<(usize, f64)> = None;
            for (r, row) in self.rows.iter().enumerate() {
                let a = row[entering];
                if a <= tolerance {
                    continue;
                }
                let ratio = row[self.cols] / a;
                leaving = match leaving {
                    None => Some((r, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - tolerance
                            || (ratio <= best_ratio + tolerance
                                && self.basis[r] < self.basis[best])
                        {
                            Some((r, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }

            // Every structural variable is boxed, so an unbounded ray means
            // the tableau has lost its box rows.
            let Some((row, _)) = leaving else {
                return Err(LukaError::Solver("unbounded objective over the unit box".into()));
            };
            self.pivot(row, entering);
        }
        Err(LukaError::Solver(format!(
            "no optimum after {max_pivots} pivots"
        )))
    }

    fn reduced_cost(&self, costs: &[f64], column: usize) -> f64 {
        if self.basis.contains(&column) {
            return 0.0;
        }
        costs[column]
            - self
                .rows
                .iter()
                .zip(&self.basis)
                .map(|(row, &b)| costs[b] * row[column])
                .sum::<f64>()
    }

    fn objective_value(&self, costs: &[f64]) -> f64 {
        self.rows
            .iter()
            .zip(&self.basis)
            .map(|(row, &b)| costs[b] * row[self.cols])
            .sum()
    }

    fn pivot(&mut self, row: usize, column: usize) {
        let divisor = self.rows[row][column];
        for entry in self.rows[row].iter_mut() {
            *entry /= divisor;
        }
        let pivot_row = self.rows[row].clone();
        for (r, other) in self.rows.iter_mut().enumerate() {
            if r == row {
                continue;
            }
            let factor = other[column];
            if factor == 0.0 {
                continue;
            }
            for (entry, p) in other.iter_mut().zip(&pivot_row) {
                *entry -= factor * p;
            }
        }
        self.basis[row] = column;
    }

    /// Pivot zero-valued artificials out of the basis after phase one.
    ///
    /// A row whose artificial cannot leave is redundant; its artificial stays
    /// basic at zero and never re-enters since phase two excludes the column.
    fn evict_artificials(&mut self, tolerance: f64) {
        let first_artificial = self.structural + self.slacks;
        for r in 0..self.rows.len() {
            if self.basis[r] < first_artificial {
                continue;
            }
            if let Some(column) =
                (0..first_artificial).find(|&j| self.rows[r][j].abs() > tolerance)
            {
                self.pivot(r, column);
            }
        }
    }
}
