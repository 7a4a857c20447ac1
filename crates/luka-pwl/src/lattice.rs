//! Lattice covering check and max-min assembly of piece formulas.
//!
//! For pieces `f_1..f_m` on regions `R_1..R_m`, the network value is
//! `max_i min { f_k : f_k ≥ f_i on R_i }` provided that for every ordered
//! pair `(i, j)` some piece `k` satisfies `f_k ≤ f_i on R_i` and
//! `f_k ≥ f_j on R_j`. Each comparison is one LP over a piece's region.

use crate::with_workers;
use luka_core::{LukaError, Prototype, RegionalPiece, Result};
use luka_formula::Formula;
use luka_lp::{region_constraints, LinearOracle, LpOutcome};
use rayon::prelude::*;
use tracing::{debug, info};

/// Pairwise comparisons of every piece against every other on its own region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominationTable {
    /// `above[i][k]`: `f_k ≥ f_i` everywhere on `R_i`.
    above: Vec<Vec<bool>>,
    /// `below[i][k]`: `f_k ≤ f_i` everywhere on `R_i`.
    below: Vec<Vec<bool>>,
}

impl DominationTable {
    pub fn len(&self) -> usize {
        self.above.len()
    }

    pub fn is_empty(&self) -> bool {
        self.above.is_empty()
    }

    pub fn is_above(&self, i: usize, k: usize) -> bool {
        self.above[i][k]
    }

    pub fn is_below(&self, i: usize, k: usize) -> bool {
        self.below[i][k]
    }

    /// A piece separating `i` from `j`, if any.
    pub fn covering_witness(&self, i: usize, j: usize) -> Option<usize> {
        (0..self.len()).find(|&k| self.is_below(i, k) && self.is_above(j, k))
    }

    /// Ordered pairs `(i, j)`, `i != j`, without a covering witness.
    pub fn violations(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.len();
        (0..n)
            .flat_map(move |i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && self.covering_witness(i, j).is_none())
    }
}

/// Checks lattice covering and builds the join formula of one output.
pub struct LatticeAssembler<'a, O: LinearOracle> {
    prototypes: &'a [Prototype],
    pieces: &'a [RegionalPiece],
    oracle: &'a O,
    tolerance: f64,
}

impl<'a, O: LinearOracle> LatticeAssembler<'a, O> {
    pub fn new(
        prototypes: &'a [Prototype],
        pieces: &'a [RegionalPiece],
        oracle: &'a O,
        tolerance: f64,
    ) -> Self {
        Self {
            prototypes,
            pieces,
            oracle,
            tolerance,
        }
    }

    /// Largest value of `f_minuend - f_subtrahend` on the region of `piece`.
    fn max_difference(&self, piece: usize, minuend: usize, subtrahend: usize) -> Result<f64> {
        let objective: Vec<f64> = self.pieces[minuend]
            .to_f64()
            .into_iter()
            .zip(self.pieces[subtrahend].to_f64())
            .map(|(a, b)| a - b)
            .collect();
        let constraints = region_constraints(self.prototypes, &self.pieces[piece].region)?;
        match self.oracle.maximize(&objective, &constraints)? {
            LpOutcome::Optimal(value) => Ok(value),
            LpOutcome::Infeasible => Err(LukaError::InfeasibleSearch(format!(
                "piece {piece} has an empty region"
            ))),
        }
    }

    /// `f_k ≥ f_i` on `R_i`.
    pub fn is_above(&self, i: usize, k: usize) -> Result<bool> {
        if i == k {
            return Ok(true);
        }
        Ok(self.max_difference(i, i, k)? <= self.tolerance)
    }

    /// `f_k ≤ f_i` on `R_i`.
    pub fn is_below(&self, i: usize, k: usize) -> Result<bool> {
        if i == k {
            return Ok(true);
        }
        Ok(self.max_difference(i, k, i)? <= self.tolerance)
    }

    fn above_row(&self, i: usize) -> Result<Vec<bool>> {
        (0..self.pieces.len()).map(|k| self.is_above(i, k)).collect()
    }

    fn below_row(&self, i: usize) -> Result<Vec<bool>> {
        (0..self.pieces.len()).map(|k| self.is_below(i, k)).collect()
    }

    /// Compare all pieces pairwise, one row per worker task.
    pub fn domination_table(&self, threads: usize) -> Result<DominationTable> {
        let rows = with_workers(threads, || {
            (0..self.pieces.len())
                .into_par_iter()
                .map(|i| Ok((self.above_row(i)?, self.below_row(i)?)))
                .collect::<Result<Vec<_>>>()
        })??;
        let (above, below) = rows.into_iter().unzip();
        Ok(DominationTable { above, below })
    }

    pub fn has_lattice_property(&self, threads: usize) -> Result<bool> {
        Ok(self.domination_table(threads)?.violations().next().is_none())
    }

    /// Number of ordered pairs without a covering witness.
    pub fn lattice_violation_count(&self, threads: usize) -> Result<u64> {
        let count = self.domination_table(threads)?.violations().count() as u64;
        debug!(pieces = self.pieces.len(), violations = count, "lattice violations counted");
        Ok(count)
    }

    /// Fail with the first ordered pair that has no covering witness.
    pub fn check_lattice_property(&self, threads: usize) -> Result<DominationTable> {
        let table = self.domination_table(threads)?;
        if let Some((first, second)) = table.violations().next() {
            return Err(LukaError::LatticeViolation { first, second });
        }
        Ok(table)
    }

    /// Join formula, computing the domination rows on the fly.
    pub fn assemble(&self, formulas: &[Formula], threads: usize) -> Result<Formula> {
        self.assemble_by(formulas, threads, |i| self.above_row(i))
    }

    /// Join formula from an already computed table.
    pub fn assemble_with_table(
        &self,
        table: &DominationTable,
        formulas: &[Formula],
        threads: usize,
    ) -> Result<Formula> {
        if table.len() != self.pieces.len() {
            return Err(LukaError::Encoding(format!(
                "domination table covers {} pieces, expected {}",
                table.len(),
                self.pieces.len()
            )));
        }
        self.assemble_by(formulas, threads, |i| Ok(table.above[i].clone()))
    }

    /// `max_i min(φ_i, φ_k for every k above i)`, chunked over workers.
    fn assemble_by<F>(&self, formulas: &[Formula], threads: usize, above: F) -> Result<Formula>
    where
        F: Fn(usize) -> Result<Vec<bool>> + Sync,
    {
        let n = self.pieces.len();
        if formulas.len() != n {
            return Err(LukaError::Encoding(format!(
                "{} formulas for {n} pieces",
                formulas.len()
            )));
        }
        if n == 0 {
            return Ok(Formula::empty());
        }

        let chunk = n.div_ceil(threads.max(1));
        let chunks = n.div_ceil(chunk);
        info!(pieces = n, chunks, "assembling lattice formula");

        let partials = with_workers(threads, || {
            (0..chunks)
                .into_par_iter()
                .map(|c| {
                    let mut partial = Formula::empty();
                    for i in c * chunk..((c + 1) * chunk).min(n) {
                        let mut contribution = formulas[i].clone();
                        for (k, is_above) in above(i)?.into_iter().enumerate() {
                            if is_above && k != i {
                                contribution.minimum(&formulas[k]);
                            }
                        }
                        partial.maximum(&contribution);
                    }
                    Ok(partial)
                })
                .collect::<Result<Vec<_>>>()
        })??;

        let mut lattice = Formula::empty();
        for partial in &partials {
            lattice.maximum(partial);
        }
        Ok(lattice)
    }
}
