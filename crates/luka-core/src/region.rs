//! Boundary prototypes, sign constraints and regional pieces.

use crate::rational::{to_f64, Coefficient};
use num_rational::Ratio;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// An affine functional over the network's original inputs.
///
/// Coefficient 0 is the constant term; coefficient `i > 0` multiplies input
/// `i`. Prototypes are stored in a flat append-only collection and referred to
/// by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prototype(pub Vec<f64>);

impl Prototype {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self(coefficients)
    }

    /// The identically-zero functional over `dim` inputs.
    pub fn zero(dim: usize) -> Self {
        Self(vec![0.0; dim + 1])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.0
    }

    pub fn constant(&self) -> f64 {
        self.0[0]
    }

    pub fn linear(&self) -> &[f64] {
        &self.0[1..]
    }

    /// Number of inputs the functional ranges over.
    pub fn dim(&self) -> usize {
        self.0.len() - 1
    }

    /// The same functional shifted down by one (upper clamp boundary).
    pub fn minus_one(&self) -> Self {
        let mut shifted = self.0.clone();
        shifted[0] -= 1.0;
        Self(shifted)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| *c == 0.0)
    }

    #[inline]
    pub fn evaluate(&self, input: &[f64]) -> f64 {
        self.0[0]
            + self.0[1..]
                .iter()
                .zip(input)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

/// Side of a boundary: the functional is constrained `≥ 0` or `≤ 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sign {
    GeqZero,
    LeqZero,
}

impl Sign {
    /// Whether `value` satisfies this side, up to `tolerance`.
    #[inline]
    pub fn admits(self, value: f64, tolerance: f64) -> bool {
        match self {
            Sign::GeqZero => value >= -tolerance,
            Sign::LeqZero => value <= tolerance,
        }
    }
}

/// A sign constraint on the prototype at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Boundary {
    pub index: usize,
    pub sign: Sign,
}

impl Boundary {
    pub fn new(index: usize, sign: Sign) -> Self {
        Self { index, sign }
    }

    pub fn geq(index: usize) -> Self {
        Self::new(index, Sign::GeqZero)
    }

    pub fn leq(index: usize) -> Self {
        Self::new(index, Sign::LeqZero)
    }
}

/// An exact affine value together with the region on which it is the
/// network's clamped output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalPiece {
    /// Constant term followed by one coefficient per input.
    pub coefficients: Vec<Coefficient>,
    /// Conjunction of sign constraints defining the region.
    pub region: Vec<Boundary>,
}

impl RegionalPiece {
    pub fn new(coefficients: Vec<Coefficient>, region: Vec<Boundary>) -> Self {
        Self {
            coefficients,
            region,
        }
    }

    /// The constant-zero piece over `dim` inputs.
    pub fn zero(dim: usize, region: Vec<Boundary>) -> Self {
        Self::new(vec![Ratio::zero(); dim + 1], region)
    }

    /// The constant-one piece over `dim` inputs.
    pub fn one(dim: usize, region: Vec<Boundary>) -> Self {
        let mut coefficients = vec![Ratio::zero(); dim + 1];
        coefficients[0] = Ratio::from_integer(1);
        Self::new(coefficients, region)
    }

    pub fn dim(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(Zero::is_zero)
    }

    /// Float image of the coefficients, usable as an LP objective.
    pub fn to_f64(&self) -> Vec<f64> {
        self.coefficients.iter().map(to_f64).collect()
    }

    /// Value of the affine piece at `input`.
    pub fn evaluate(&self, input: &[f64]) -> f64 {
        let values = self.to_f64();
        values[0]
            + values[1..]
                .iter()
                .zip(input)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    /// Whether `input` satisfies every constraint of the region.
    pub fn contains(&self, prototypes: &[Prototype], input: &[f64], tolerance: f64) -> bool {
        self.region.iter().all(|boundary| {
            prototypes
                .get(boundary.index)
                .is_some_and(|p| boundary.sign.admits(p.evaluate(input), tolerance))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_minus_one() {
        let p = Prototype::new(vec![0.5, 1.0, -2.0]);
        let q = p.minus_one();
        assert_eq!(q.coefficients(), &[-0.5, 1.0, -2.0]);
        assert_eq!(p.dim(), 2);
        assert!((p.evaluate(&[1.0, 0.25]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sign_admits() {
        assert!(Sign::GeqZero.admits(0.0, 0.0));
        assert!(Sign::GeqZero.admits(-1e-10, 1e-9));
        assert!(!Sign::GeqZero.admits(-1e-3, 1e-9));
        assert!(Sign::LeqZero.admits(-3.0, 0.0));
    }

    #[test]
    fn test_canonical_pieces() {
        let zero = RegionalPiece::zero(2, vec![]);
        assert!(zero.is_zero());
        assert_eq!(zero.evaluate(&[0.3, 0.9]), 0.0);

        let one = RegionalPiece::one(2, vec![]);
        assert!(!one.is_zero());
        assert_eq!(one.evaluate(&[0.3, 0.9]), 1.0);
        assert_eq!(one.dim(), 2);
    }

    #[test]
    fn test_piece_contains() {
        let prototypes = vec![Prototype::new(vec![-0.5, 1.0])];
        let piece = RegionalPiece::new(
            vec![Ratio::new(-1, 2), Ratio::from_integer(1)],
            vec![Boundary::geq(0)],
        );
        assert!(piece.contains(&prototypes, &[0.75], 0.0));
        assert!(!piece.contains(&prototypes, &[0.25], 0.0));
        assert!((piece.evaluate(&[0.75]) - 0.25).abs() < 1e-12);

        let dangling = RegionalPiece::new(piece.coefficients.clone(), vec![Boundary::leq(3)]);
        assert!(!dangling.contains(&prototypes, &[0.75], 0.0));
    }
}
