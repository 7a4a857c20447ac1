//! Łukasiewicz formulas and the rational piece encoder.
//!
//! - [`Formula`]: append-only arena of clause, negation and binary units
//! - [`Modsat`]: a formula plus the defining formulas that pin its auxiliaries
//! - [`VariableAllocator`]: the single variable counter of a translation run
//! - [`RationalEncoder`]: exact encoding of a truncated affine piece

pub mod allocator;
pub mod encoder;
pub mod formula;

pub use allocator::{Allocation, Denominator, VariableAllocator};
pub use encoder::RationalEncoder;
pub use formula::{Connective, Formula, Literal, Modsat, Unit, UnitIndex, Variable};
