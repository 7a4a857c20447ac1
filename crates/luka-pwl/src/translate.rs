//! End-to-end translation driver.
//!
//! A [`Translator`] owns the configuration, the LP oracle and the single
//! [`VariableAllocator`] of a run. Decomposition and lattice assembly may use
//! worker threads; encoding is sequential because every piece draws from the
//! same allocator.

use crate::decompose::{Decomposition, RegionDecomposer};
use crate::format::{write_limodsat, PwlInstance};
use crate::lattice::LatticeAssembler;
use luka_core::{
    Coefficient, LukaError, Network, Prototype, RegionalPiece, Result, TranslationConfig,
};
use luka_formula::{Formula, Modsat, RationalEncoder, Variable, VariableAllocator};
use luka_lp::{LinearOracle, SimplexOracle};
use std::fmt;
use tracing::{debug, info};

/// The encoded pieces and the joined formula of one network output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTranslation {
    pub output: usize,
    /// One Modsat per piece, in piece order.
    pub modsats: Vec<Modsat>,
    /// `max`/`min` join of the pieces' main formulas.
    pub lattice: Formula,
}

impl OutputTranslation {
    /// The lattice formula bound to `variable` by an equivalence.
    pub fn equivalent_to(&self, variable: Variable) -> Formula {
        let mut bound = self.lattice.clone();
        bound.equivalence(&Formula::variable(variable));
        bound
    }

    pub fn write_limodsat(&self, out: &mut impl fmt::Write, max_variable: Variable) -> fmt::Result {
        write_limodsat(out, &self.lattice, max_variable, &self.modsats)
    }

    /// All defining formulas of every piece, in piece order.
    pub fn defining(&self) -> impl Iterator<Item = &Formula> + '_ {
        self.modsats.iter().flat_map(|m| m.defining.iter())
    }
}

/// Result of translating a network.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub decomposition: Decomposition,
    pub outputs: Vec<OutputTranslation>,
    /// Largest variable allocated once every output was encoded.
    pub max_variable: Variable,
}

impl Translation {
    pub fn output(&self, output: usize) -> Option<&OutputTranslation> {
        self.outputs.iter().find(|t| t.output == output)
    }

    /// `limodsat` text of one output.
    pub fn limodsat_string(&self, output: usize) -> Option<String> {
        let translation = self.output(output)?;
        let mut out = String::new();
        translation.write_limodsat(&mut out, self.max_variable).ok()?;
        Some(out)
    }
}

/// Runs decomposition, encoding and assembly with one shared allocator.
pub struct Translator<O: LinearOracle = SimplexOracle> {
    config: TranslationConfig,
    oracle: O,
    dim: usize,
    allocator: VariableAllocator,
}

impl Translator<SimplexOracle> {
    /// Translator over `dim` inputs using the built-in simplex oracle.
    pub fn new(dim: usize, config: TranslationConfig) -> Self {
        let oracle = SimplexOracle::new(config.feasibility_tolerance);
        Self::with_oracle(dim, config, oracle)
    }
}

impl<O: LinearOracle> Translator<O> {
    pub fn with_oracle(dim: usize, config: TranslationConfig, oracle: O) -> Self {
        Self {
            config,
            oracle,
            dim,
            allocator: VariableAllocator::new(dim),
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn allocator(&self) -> &VariableAllocator {
        &self.allocator
    }

    /// Mutable access, e.g. to reserve variables with `jump_to` before encoding.
    pub fn allocator_mut(&mut self) -> &mut VariableAllocator {
        &mut self.allocator
    }

    fn check_dim(&self, dim: usize) -> Result<()> {
        if dim != self.dim {
            return Err(LukaError::MalformedNetwork(format!(
                "translator expects {} inputs, got {dim}",
                self.dim
            )));
        }
        Ok(())
    }

    /// Region decomposition of the requested outputs (all if empty).
    pub fn decompose(&self, network: &Network, outputs: &[usize]) -> Result<Decomposition> {
        self.check_dim(network.input_dim())?;
        let decomposer = RegionDecomposer::new(network, &self.oracle, outputs)?;
        let threads = self.config.thread_budget();
        if self.config.multithreading && threads > 1 {
            decomposer.decompose_parallel(threads)
        } else {
            decomposer.decompose()
        }
    }

    /// Encode one truncated affine piece.
    pub fn encode_piece(&mut self, coefficients: &[Coefficient]) -> Result<Modsat> {
        if coefficients.len() != self.dim + 1 {
            return Err(LukaError::Encoding(format!(
                "piece has {} coefficients, expected {}",
                coefficients.len(),
                self.dim + 1
            )));
        }
        RationalEncoder::new(&mut self.allocator).encode(coefficients)
    }

    pub fn encode_pieces(&mut self, pieces: &[RegionalPiece]) -> Result<Vec<Modsat>> {
        pieces
            .iter()
            .map(|piece| self.encode_piece(&piece.coefficients))
            .collect()
    }

    /// Encode and join the pieces of one output.
    ///
    /// With lattice checking enabled a covering violation aborts before any
    /// variable is allocated.
    fn translate_pieces(
        &mut self,
        output: usize,
        prototypes: &[Prototype],
        pieces: &[RegionalPiece],
    ) -> Result<OutputTranslation> {
        let threads = self.config.thread_budget();
        let table = if self.config.check_lattice {
            let assembler = LatticeAssembler::new(
                prototypes,
                pieces,
                &self.oracle,
                self.config.lattice_tolerance,
            );
            Some(assembler.check_lattice_property(threads)?)
        } else {
            None
        };

        let modsats = self.encode_pieces(pieces)?;
        debug!(output, pieces = pieces.len(), variables = self.allocator.current(), "pieces encoded");

        let assembler =
            LatticeAssembler::new(prototypes, pieces, &self.oracle, self.config.lattice_tolerance);
        let phis: Vec<Formula> = modsats.iter().map(|m| m.phi.clone()).collect();
        let lattice = match &table {
            Some(table) => assembler.assemble_with_table(table, &phis, threads)?,
            None => assembler.assemble(&phis, threads)?,
        };
        Ok(OutputTranslation {
            output,
            modsats,
            lattice,
        })
    }

    /// Translate a parsed region dump.
    pub fn translate_pwl(&mut self, instance: &PwlInstance) -> Result<OutputTranslation> {
        if let Some(dim) = instance.dim() {
            self.check_dim(dim)?;
        }
        info!(
            prototypes = instance.prototypes.len(),
            pieces = instance.pieces.len(),
            "translating region dump"
        );
        self.translate_pieces(0, &instance.prototypes, &instance.pieces)
    }

    /// Decompose `network` and translate each requested output (all if empty).
    pub fn translate(&mut self, network: &Network, outputs: &[usize]) -> Result<Translation> {
        let decomposition = self.decompose(network, outputs)?;

        let mut translations = Vec::with_capacity(decomposition.outputs.len());
        for (&output, pieces) in decomposition.outputs.iter().zip(&decomposition.pieces) {
            info!(output, pieces = pieces.len(), "translating output");
            translations.push(self.translate_pieces(output, &decomposition.prototypes, pieces)?);
        }

        let max_variable = self.allocator.current();
        info!(outputs = translations.len(), max_variable, "translation finished");
        Ok(Translation {
            decomposition,
            outputs: translations,
            max_variable,
        })
    }
}
