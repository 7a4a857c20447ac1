//! Error types for the translation pipeline

use thiserror::Error;

/// Result type alias for translation operations
pub type Result<T> = std::result::Result<T, LukaError>;

/// Stage of the pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Network or instance validation, before any search.
    Input,
    /// Region decomposition.
    Decomposition,
    /// Rational logic encoding.
    Encoding,
    /// Lattice check and join-formula assembly.
    Assembly,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Input => write!(f, "input"),
            Stage::Decomposition => write!(f, "decomposition"),
            Stage::Encoding => write!(f, "encoding"),
            Stage::Assembly => write!(f, "assembly"),
        }
    }
}

/// Errors that can occur while translating a network
#[derive(Debug, Error)]
pub enum LukaError {
    /// Inconsistent layer/node dimensions or an empty network
    #[error("malformed network: {0}")]
    MalformedNetwork(String),

    /// Requested output index does not exist in the final layer
    #[error("output index {index} not available (network has {available} outputs)")]
    UnknownOutput { index: usize, available: usize },

    /// The search reached a region the oracle reports as empty
    #[error("region decomposition reached an infeasible state: {0}")]
    InfeasibleSearch(String),

    /// A sign constraint refers to a prototype that does not exist
    #[error("boundary reference {index} out of range ({len} prototypes)")]
    InvalidBoundary { index: usize, len: usize },

    /// The linear programming oracle could not answer
    #[error("linear program failed: {0}")]
    Solver(String),

    /// The pieces are not summarizable as a maximum of minima
    #[error("lattice covering fails for pieces {first} and {second}")]
    LatticeViolation { first: usize, second: usize },

    /// A coefficient cannot be represented by the encoding
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Misuse of the variable allocator
    #[error("variable allocator: {0}")]
    Allocator(String),

    /// Malformed region or truncated-linear dump
    #[error("pwl format error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The worker pool could not be started
    #[error("worker pool: {0}")]
    Workers(String),
}

impl LukaError {
    /// The pipeline stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            LukaError::MalformedNetwork(_)
            | LukaError::UnknownOutput { .. }
            | LukaError::Parse { .. }
            | LukaError::Workers(_) => Stage::Input,
            LukaError::InfeasibleSearch(_)
            | LukaError::InvalidBoundary { .. }
            | LukaError::Solver(_) => Stage::Decomposition,
            LukaError::Encoding(_) | LukaError::Allocator(_) => Stage::Encoding,
            LukaError::LatticeViolation { .. } => Stage::Assembly,
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        LukaError::Parse {
            line,
            message: message.into(),
        }
    }
}
