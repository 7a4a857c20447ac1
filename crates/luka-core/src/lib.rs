//! Core types for translating ReLU networks into Łukasiewicz logic.
//!
//! This crate holds the data model shared by every stage of the translation:
//!
//! - [`Network`]: layers of affine nodes, ReLU-gated between layers
//! - [`Prototype`]: an affine functional over the network's original inputs
//! - [`Boundary`] / [`Sign`]: a sign constraint on a prototype
//! - [`RegionalPiece`]: an exact rational affine value valid on a region
//! - [`decimal_to_fraction`]: the fixed-precision float to rational conversion
//! - [`LukaError`]: the error type of every stage
//! - [`TranslationConfig`]: knobs for parallelism and numeric tolerances

pub mod config;
pub mod error;
pub mod network;
pub mod rational;
pub mod region;

pub use config::TranslationConfig;
pub use error::{LukaError, Result, Stage};
pub use network::{Layer, Network, Node};
pub use rational::{decimal_to_fraction, to_f64, Coefficient, PRECISION};
pub use region::{Boundary, Prototype, RegionalPiece, Sign};
