//! Append-only formula arena.
//!
//! A [`Formula`] is a sequence of [`Unit`]s in topological order: every unit
//! refers only to units with a strictly smaller index, and the last unit is
//! the root. Combining two formulas appends the right operand's units shifted
//! by the left operand's length, then one binary unit joining both roots.

use luka_core::{LukaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Propositional variable. Inputs of an n-dimensional network are `1..=n`.
pub type Variable = u32;

/// Signed variable: `-v` stands for the negation `1 - v`.
pub type Literal = i64;

/// Position of a unit inside its formula (0-based).
pub type UnitIndex = usize;

/// Binary connectives of Łukasiewicz logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connective {
    /// `min(1, a + b)`
    StrongDisjunction,
    /// `max(0, a + b - 1)`
    StrongConjunction,
    /// `1 - |a - b|`
    Equivalence,
    /// `min(1, 1 - a + b)`
    Implication,
    Maximum,
    Minimum,
}

impl Connective {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Connective::StrongDisjunction => (a + b).min(1.0),
            Connective::StrongConjunction => (a + b - 1.0).max(0.0),
            Connective::Equivalence => 1.0 - (a - b).abs(),
            Connective::Implication => (1.0 - a + b).min(1.0),
            Connective::Maximum => a.max(b),
            Connective::Minimum => a.min(b),
        }
    }

    /// Kind tag used by the textual dump.
    pub fn label(self) -> &'static str {
        match self {
            Connective::StrongDisjunction => "Disjunction",
            Connective::StrongConjunction => "Conjunction",
            Connective::Equivalence => "Equivalence",
            Connective::Implication => "Implication",
            Connective::Maximum => "Maximum",
            Connective::Minimum => "Minimum",
        }
    }
}

/// One instruction of the arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Strong disjunction of literals.
    Clause(Vec<Literal>),
    Negation(UnitIndex),
    Binary {
        connective: Connective,
        left: UnitIndex,
        right: UnitIndex,
    },
}

impl Unit {
    fn shifted(&self, offset: usize) -> Unit {
        match self {
            Unit::Clause(literals) => Unit::Clause(literals.clone()),
            Unit::Negation(operand) => Unit::Negation(operand + offset),
            Unit::Binary {
                connective,
                left,
                right,
            } => Unit::Binary {
                connective: *connective,
                left: left + offset,
                right: right + offset,
            },
        }
    }
}

/// A Łukasiewicz formula stored as an arena of units.
///
/// The empty formula has no units. It acts as the identity of strong
/// disjunction, maximum and minimum when it is the left operand, and makes
/// every other combination a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    units: Vec<Unit>,
}

impl Formula {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn clause(literals: Vec<Literal>) -> Self {
        Self {
            units: vec![Unit::Clause(literals)],
        }
    }

    pub fn literal(literal: Literal) -> Self {
        Self::clause(vec![literal])
    }

    pub fn variable(variable: Variable) -> Self {
        Self::literal(Literal::from(variable))
    }

    /// `¬form`
    pub fn negation(form: &Formula) -> Self {
        let mut negated = form.clone();
        negated.negate();
        negated
    }

    /// `left <connective> right`
    pub fn binary(left: &Formula, right: &Formula, connective: Connective) -> Self {
        let mut combined = left.clone();
        combined.push(connective, right);
        combined
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn root(&self) -> Option<UnitIndex> {
        self.units.len().checked_sub(1)
    }

    /// Replace the formula by its negation.
    pub fn negate(&mut self) {
        if let Some(root) = self.root() {
            self.units.push(Unit::Negation(root));
        }
    }

    /// Replace the formula by `self <connective> other`.
    pub fn push(&mut self, connective: Connective, other: &Formula) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            if matches!(
                connective,
                Connective::StrongDisjunction | Connective::Maximum | Connective::Minimum
            ) {
                self.units = other.units.clone();
            }
            return;
        }

        // Two single clauses disjoin into one longer clause.
        if connective == Connective::StrongDisjunction && self.len() == 1 && other.len() == 1 {
            if let (Unit::Clause(mine), Unit::Clause(theirs)) =
                (&mut self.units[0], &other.units[0])
            {
                mine.extend_from_slice(theirs);
                return;
            }
        }

        let offset = self.len();
        let left = offset - 1;
        self.units.extend(other.units.iter().map(|u| u.shifted(offset)));
        let right = self.len() - 1;
        self.units.push(Unit::Binary {
            connective,
            left,
            right,
        });
    }

    pub fn strong_disjoin(&mut self, other: &Formula) {
        self.push(Connective::StrongDisjunction, other);
    }

    pub fn maximum(&mut self, other: &Formula) {
        self.push(Connective::Maximum, other);
    }

    pub fn minimum(&mut self, other: &Formula) {
        self.push(Connective::Minimum, other);
    }

    pub fn equivalence(&mut self, other: &Formula) {
        self.push(Connective::Equivalence, other);
    }

    /// Largest variable mentioned by any clause.
    pub fn max_variable(&self) -> Option<Variable> {
        self.units
            .iter()
            .filter_map(|unit| match unit {
                Unit::Clause(literals) => literals.iter().map(|l| l.unsigned_abs()).max(),
                _ => None,
            })
            .max()
            .and_then(|v| Variable::try_from(v).ok())
    }

    /// Truth degree of the formula under `valuation`.
    ///
    /// Returns `None` for the empty formula.
    pub fn evaluate<F>(&self, valuation: F) -> Option<f64>
    where
        F: Fn(Variable) -> f64,
    {
        let mut values: Vec<f64> = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            let value = match unit {
                Unit::Clause(literals) => literals
                    .iter()
                    .map(|&l| {
                        let v = valuation(l.unsigned_abs() as Variable);
                        if l < 0 {
                            1.0 - v
                        } else {
                            v
                        }
                    })
                    .sum::<f64>()
                    .min(1.0),
                Unit::Negation(operand) => 1.0 - values[*operand],
                Unit::Binary {
                    connective,
                    left,
                    right,
                } => connective.apply(values[*left], values[*right]),
            };
            values.push(value);
        }
        values.last().copied()
    }

    /// Rename variables: input `i` (for `1 <= i <= new_inputs.len()`) becomes
    /// `new_inputs[i - 1]`, every other variable `v` becomes `v + by`.
    ///
    /// Returns the largest renamed non-input variable, or 0 if there is none.
    /// Fails, leaving the formula untouched, if a renamed variable leaves the
    /// variable range.
    pub fn shift_variables(&mut self, new_inputs: &[Variable], by: Variable) -> Result<Variable> {
        let mut units = self.units.clone();
        let mut maximum = 0;
        for unit in &mut units {
            let Unit::Clause(literals) = unit else {
                continue;
            };
            for literal in literals.iter_mut() {
                let old = literal.unsigned_abs();
                let renamed = match usize::try_from(old) {
                    Ok(i) if i >= 1 && i <= new_inputs.len() => new_inputs[i - 1],
                    _ => {
                        let shifted = Variable::try_from(old)
                            .ok()
                            .and_then(|v| v.checked_add(by))
                            .ok_or_else(|| {
                                LukaError::Allocator(format!(
                                    "variable {old} shifted by {by} leaves the variable range"
                                ))
                            })?;
                        maximum = maximum.max(shifted);
                        shifted
                    }
                };
                *literal = if *literal < 0 {
                    -Literal::from(renamed)
                } else {
                    Literal::from(renamed)
                };
            }
        }
        self.units = units;
        Ok(maximum)
    }
}

/// One `Unit i :: Kind :: operands` line per unit, 1-based.
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, unit) in self.units.iter().enumerate() {
            write!(f, "Unit {} :: ", i + 1)?;
            match unit {
                Unit::Clause(literals) => {
                    write!(f, "{:<11} :: ", "Clause")?;
                    for literal in literals {
                        write!(f, "{literal} ")?;
                    }
                    writeln!(f)?;
                }
                Unit::Negation(operand) => {
                    writeln!(f, "{:<11} :: {}", "Negation", operand + 1)?;
                }
                Unit::Binary {
                    connective,
                    left,
                    right,
                } => {
                    writeln!(f, "{:<11} :: {} {}", connective.label(), left + 1, right + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// A formula together with the formulas that must hold for it to carry its
/// intended value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modsat {
    pub phi: Formula,
    pub defining: Vec<Formula>,
}

impl Modsat {
    pub fn new(phi: Formula) -> Self {
        Self {
            phi,
            defining: Vec::new(),
        }
    }

    /// Whether every defining formula evaluates to 1 (within `tolerance`).
    pub fn defined_by<F>(&self, valuation: F, tolerance: f64) -> bool
    where
        F: Fn(Variable) -> f64,
    {
        self.defining
            .iter()
            .all(|f| f.evaluate(&valuation).is_some_and(|v| v >= 1.0 - tolerance))
    }

    /// Write the defining set as `Formula k:` blocks.
    pub fn write_defining(&self, out: &mut impl fmt::Write) -> fmt::Result {
        for (k, formula) in self.defining.iter().enumerate() {
            writeln!(out, "Formula {}:", k + 1)?;
            write!(out, "{formula}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Modsat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-= Formula phi =-")?;
        writeln!(f)?;
        write!(f, "{}", self.phi)?;
        writeln!(f)?;
        writeln!(f, "-= MODSAT Set Phi =-")?;
        writeln!(f)?;
        self.write_defining(f)
    }
}
