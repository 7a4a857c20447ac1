//! Propositional variable allocation for one translation run.

use crate::formula::Variable;
use luka_core::{LukaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Denominator of a unit-fraction constant `1/d`.
pub type Denominator = u64;

/// Outcome of a get-or-create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Fresh(Variable),
    Existing(Variable),
}

impl Allocation {
    pub fn variable(self) -> Variable {
        match self {
            Allocation::Fresh(v) | Allocation::Existing(v) => v,
        }
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, Allocation::Fresh(_))
    }
}

/// Monotonic variable counter with per-denominator memoization.
///
/// Variables `1..=dim` are the network inputs; everything the encoder needs
/// is allocated above them. The allocator only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAllocator {
    counter: Variable,
    zero: Option<Variable>,
    constants: BTreeMap<Denominator, Variable>,
    aux_multipliers: BTreeMap<Denominator, Variable>,
}

impl VariableAllocator {
    /// Allocator whose first fresh variable is `dim + 1`.
    ///
    /// A `dim` beyond the variable range saturates the counter at
    /// `Variable::MAX`; a network that wide cannot be encoded anyway.
    pub fn new(dim: usize) -> Self {
        Self {
            counter: Variable::try_from(dim).unwrap_or(Variable::MAX),
            zero: None,
            constants: BTreeMap::new(),
            aux_multipliers: BTreeMap::new(),
        }
    }

    /// Most recently allocated variable.
    pub fn current(&self) -> Variable {
        self.counter
    }

    pub fn fresh(&mut self) -> Variable {
        self.counter += 1;
        self.counter
    }

    /// The variable used by the canonical zero formula.
    pub fn zero_variable(&mut self) -> Variable {
        match self.zero {
            Some(zero) => zero,
            None => {
                let zero = self.fresh();
                self.zero = Some(zero);
                zero
            }
        }
    }

    pub fn constant(&self, denominator: Denominator) -> Option<Variable> {
        self.constants.get(&denominator).copied()
    }

    pub fn has_constant(&self, denominator: Denominator) -> bool {
        self.constants.contains_key(&denominator)
    }

    /// Allocate the variable standing for `1/denominator`.
    ///
    /// The encoder allocates the doubling chain of the constant right after
    /// it, so `constant + i + 1` carries `2^i / denominator`.
    pub fn new_constant(&mut self, denominator: Denominator) -> Variable {
        let variable = self.fresh();
        self.constants.insert(denominator, variable);
        variable
    }

    /// Get or create the auxiliary variable carrying `denominator · 1/denominator`.
    pub fn aux_multiplier(&mut self, denominator: Denominator) -> Allocation {
        if let Some(&variable) = self.aux_multipliers.get(&denominator) {
            return Allocation::Existing(variable);
        }
        let variable = self.fresh();
        self.aux_multipliers.insert(denominator, variable);
        Allocation::Fresh(variable)
    }

    /// Move the counter forward so that the next fresh variable is `to + 1`.
    pub fn jump_to(&mut self, to: Variable) -> Result<()> {
        if to < self.counter {
            return Err(LukaError::Allocator(format!(
                "cannot jump back from variable {} to {to}",
                self.counter
            )));
        }
        self.counter = to;
        Ok(())
    }
}
