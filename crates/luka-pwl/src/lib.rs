//! ReLU network to Łukasiewicz MODSAT translation.
//!
//! The pipeline has three stages:
//!
//! 1. [`RegionDecomposer`] splits `[0,1]^n` into convex regions on which one
//!    network output is affine, and records each region with its exact
//!    rational piece, truncated to `[0,1]`.
//! 2. [`luka_formula::RationalEncoder`] turns every piece into a [`Modsat`]
//!    whose formula takes the piece's value.
//! 3. [`LatticeAssembler`] checks lattice covering and joins the piece
//!    formulas into a single `max`/`min` formula.
//!
//! [`Translator`] runs the whole pipeline with one shared variable allocator.
//! The [`format`] module reads and writes the plain-text region dump and
//! writes the final `.limodsat` text.
//!
//! [`Modsat`]: luka_formula::Modsat

pub mod decompose;
pub mod format;
pub mod lattice;
pub mod translate;

pub use decompose::{merge_partitions, Decomposition, Partition, RegionDecomposer};
pub use format::{Instance, PwlInstance};
pub use lattice::{DominationTable, LatticeAssembler};
pub use translate::{OutputTranslation, Translation, Translator};

use luka_core::{LukaError, Result};

/// Run `op` on a dedicated pool of `threads` workers.
pub(crate) fn with_workers<T, F>(threads: usize, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| LukaError::Workers(format!("failed to create thread pool: {e}")))?;
    Ok(pool.install(op))
}
