//! Plain-text formats.
//!
//! - `pwl`: prototypes and regional pieces of one output
//! - `tl`: a single truncated affine piece without region
//! - `limodsat`: the joined formula and the defining formulas of every piece
//!
//! Region references are 1-based on disk and 0-based in memory.

use luka_core::{Boundary, Coefficient, LukaError, Prototype, RegionalPiece, Result, Sign};
use luka_formula::{Formula, Modsat, Variable};
use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// A region dump: shared prototypes plus the pieces of one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwlInstance {
    pub prototypes: Vec<Prototype>,
    pub pieces: Vec<RegionalPiece>,
}

impl PwlInstance {
    /// Number of inputs, or `None` for a dump with neither prototypes nor pieces.
    pub fn dim(&self) -> Option<usize> {
        self.prototypes
            .first()
            .map(Prototype::dim)
            .or_else(|| self.pieces.first().map(RegionalPiece::dim))
    }
}

/// A parsed input file.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    /// `tl n0 d0 n1 d1 ...`
    TruncatedLinear(Vec<Coefficient>),
    Pwl(PwlInstance),
}

/// Write prototypes and pieces in `pwl` format.
pub fn write_pwl(
    out: &mut impl Write,
    prototypes: &[Prototype],
    pieces: &[RegionalPiece],
) -> fmt::Result {
    writeln!(out, "pwl")?;
    writeln!(out)?;
    for prototype in prototypes {
        write!(out, "b")?;
        for c in prototype.coefficients() {
            write!(out, " {c}")?;
        }
        writeln!(out)?;
    }
    for piece in pieces {
        writeln!(out)?;
        write!(out, "p")?;
        for c in &piece.coefficients {
            write!(out, " {} {}", c.numer(), c.denom())?;
        }
        writeln!(out)?;
        for boundary in &piece.region {
            let tag = match boundary.sign {
                Sign::GeqZero => 'g',
                Sign::LeqZero => 'l',
            };
            writeln!(out, "{tag} {}", boundary.index + 1)?;
        }
    }
    Ok(())
}

pub fn pwl_string(prototypes: &[Prototype], pieces: &[RegionalPiece]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_pwl(&mut out, prototypes, pieces);
    out
}

/// Write a whole translation of one output in `limodsat` format.
pub fn write_limodsat(
    out: &mut impl Write,
    lattice: &Formula,
    max_variable: Variable,
    modsats: &[Modsat],
) -> fmt::Result {
    writeln!(out, "-= Formula phi =- MAXVAR {max_variable}")?;
    writeln!(out)?;
    write!(out, "{lattice}")?;
    writeln!(out)?;
    writeln!(out, "-= MODSAT Set Phi =-")?;
    for (i, modsat) in modsats.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "-= Linear Piece {} =-", i + 1)?;
        modsat.write_defining(out)?;
    }
    Ok(())
}

/// Parse a `tl` or `pwl` file.
///
/// Lines starting with `c` and empty lines are skipped everywhere.
pub fn parse_instance(text: &str) -> Result<Instance> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('c'));

    let (number, header) = lines
        .next()
        .ok_or_else(|| LukaError::parse(0, "empty input"))?;
    if let Some(rest) = header.strip_prefix("tl ") {
        let coefficients = parse_coefficients(number, rest)?;
        if let Some((extra, _)) = lines.next() {
            return Err(LukaError::parse(extra, "unexpected line after tl instance"));
        }
        return Ok(Instance::TruncatedLinear(coefficients));
    }
    if !header.starts_with("pwl") {
        return Err(LukaError::parse(number, "expected `tl` or `pwl` header"));
    }

    let mut instance = PwlInstance {
        prototypes: Vec::new(),
        pieces: Vec::new(),
    };
    for (number, line) in lines {
        let (tag, rest) = line
            .split_once(' ')
            .ok_or_else(|| LukaError::parse(number, format!("unrecognized line `{line}`")))?;
        match tag {
            "b" => {
                let coefficients = rest
                    .split_whitespace()
                    .map(|token| {
                        token.parse::<f64>().map_err(|_| {
                            LukaError::parse(number, format!("invalid coefficient `{token}`"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if coefficients.is_empty() {
                    return Err(LukaError::parse(number, "empty boundary prototype"));
                }
                instance.prototypes.push(Prototype::new(coefficients));
            }
            "p" => {
                let coefficients = parse_coefficients(number, rest)?;
                instance.pieces.push(RegionalPiece::new(coefficients, Vec::new()));
            }
            "g" | "l" => {
                let reference: usize = rest.trim().parse().map_err(|_| {
                    LukaError::parse(number, format!("invalid prototype reference `{rest}`"))
                })?;
                if reference == 0 || reference > instance.prototypes.len() {
                    return Err(LukaError::parse(
                        number,
                        format!("nonexistent boundary prototype {reference}"),
                    ));
                }
                let sign = if tag == "g" { Sign::GeqZero } else { Sign::LeqZero };
                let piece = instance
                    .pieces
                    .last_mut()
                    .ok_or_else(|| LukaError::parse(number, "constraint before any piece"))?;
                piece.region.push(Boundary::new(reference - 1, sign));
            }
            _ => {
                return Err(LukaError::parse(number, format!("unrecognized line `{line}`")));
            }
        }
    }

    check_dimensions(&instance)?;
    Ok(Instance::Pwl(instance))
}

/// `n0 d0 n1 d1 ...` pairs, denominators positive.
fn parse_coefficients(line: usize, text: &str) -> Result<Vec<Coefficient>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(LukaError::parse(
            line,
            "expected numerator/denominator pairs",
        ));
    }
    let integer = |token: &str| {
        token
            .parse::<i64>()
            .map_err(|_| LukaError::parse(line, format!("invalid integer `{token}`")))
    };
    tokens
        .chunks(2)
        .map(|pair| {
            let numerator = integer(pair[0])?;
            let denominator = integer(pair[1])?;
            if denominator < 1 {
                return Err(LukaError::parse(line, "fraction denominator must be positive"));
            }
            Ok(Ratio::new(numerator, denominator))
        })
        .collect()
}

fn check_dimensions(instance: &PwlInstance) -> Result<()> {
    let Some(dim) = instance.dim() else {
        return Ok(());
    };
    if instance.prototypes.iter().any(|p| p.dim() != dim) {
        return Err(LukaError::MalformedNetwork(
            "boundary prototypes disagree on dimension".to_string(),
        ));
    }
    if instance.pieces.iter().any(|p| p.dim() != dim) {
        return Err(LukaError::MalformedNetwork(
            "linear pieces disagree with the prototype dimension".to_string(),
        ));
    }
    Ok(())
}
