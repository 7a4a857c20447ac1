//! Region decomposition of a ReLU network.
//!
//! The search walks the layers depth first. Every node of a layer gets a
//! prototype (its pre-activation as an affine form of the original inputs,
//! with the gates resolved so far substituted in). Nodes whose sign is fixed
//! on the current region need no branching; each node cut by the region is
//! split into its `≥ 0` and `≤ 0` halves, and only halves the oracle finds
//! feasible are explored. At the last layer every requested output splits
//! the region into its zero, affine and one pieces.
//!
//! The parallel variant fixes the signs of the first few cutting nodes of
//! the first layer, searches each sign assignment independently, and merges
//! the partial results with [`merge_partitions`].

use crate::with_workers;
use luka_core::{
    decimal_to_fraction, Boundary, LukaError, Network, Prototype, RegionalPiece, Result, Sign,
};
use luka_lp::{region_constraints, LinearOracle, Position};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// Prototypes and pieces of a finished decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Append-only collection referenced by every piece's region.
    pub prototypes: Vec<Prototype>,
    /// Requested output indices, in request order.
    pub outputs: Vec<usize>,
    /// One piece collection per requested output.
    pub pieces: Vec<Vec<RegionalPiece>>,
}

impl Decomposition {
    /// Pieces of the given network output, if it was requested.
    pub fn pieces_for(&self, output: usize) -> Option<&[RegionalPiece]> {
        self.outputs
            .iter()
            .position(|&o| o == output)
            .map(|slot| self.pieces[slot].as_slice())
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.iter().map(Vec::len).sum()
    }
}

/// Thread-local result of one search (or of one parallel partition).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub prototypes: Vec<Prototype>,
    pub pieces: Vec<Vec<RegionalPiece>>,
}

impl Partition {
    fn new(prototypes: Vec<Prototype>, outputs: usize) -> Self {
        Self {
            prototypes,
            pieces: vec![Vec::new(); outputs],
        }
    }
}

/// Merge partitions that all started from the same `base` prototypes.
///
/// Each partition's prototypes begin with a copy of `base`. Prototypes past
/// the base are appended in partition order, and every boundary index past
/// the base is shifted by the number of prototypes earlier partitions
/// appended. References into the base are left alone.
pub fn merge_partitions(
    base: Vec<Prototype>,
    partitions: Vec<Partition>,
    outputs: Vec<usize>,
) -> Decomposition {
    let base_len = base.len();
    let mut prototypes = base;
    let mut pieces: Vec<Vec<RegionalPiece>> = vec![Vec::new(); outputs.len()];

    for partition in partitions {
        let offset = prototypes.len() - base_len;
        prototypes.extend(partition.prototypes.into_iter().skip(base_len));
        for (slot, local) in partition.pieces.into_iter().enumerate() {
            for mut piece in local {
                for boundary in &mut piece.region {
                    if boundary.index >= base_len {
                        boundary.index += offset;
                    }
                }
                pieces[slot].push(piece);
            }
        }
    }

    Decomposition {
        prototypes,
        outputs,
        pieces,
    }
}

/// Classified prototypes of one layer, shared by all branches below it.
struct LayerFrame {
    layer: usize,
    /// Index of the layer's first prototype in the collection.
    first: usize,
    forms: Vec<Prototype>,
    positions: Vec<Position>,
    cutting: Vec<usize>,
}

impl LayerFrame {
    /// Post-activation values under the chosen signs of the cutting nodes.
    fn effective_values(&self, signs: &[Sign]) -> Vec<Prototype> {
        self.forms
            .iter()
            .zip(&self.positions)
            .zip(signs)
            .map(|((form, position), sign)| match (position, sign) {
                (Position::Over, _) | (Position::Cutting, Sign::GeqZero) => form.clone(),
                _ => Prototype::zero(form.dim()),
            })
            .collect()
    }
}

/// Depth-first region search over one network.
pub struct RegionDecomposer<'a, O: LinearOracle> {
    network: &'a Network,
    oracle: &'a O,
    outputs: Vec<usize>,
}

impl<'a, O: LinearOracle> RegionDecomposer<'a, O> {
    /// Prepare a search for the given outputs (all outputs if empty).
    pub fn new(network: &'a Network, oracle: &'a O, outputs: &[usize]) -> Result<Self> {
        let available = network.output_dim();
        if let Some(&index) = outputs.iter().find(|&&o| o >= available) {
            return Err(LukaError::UnknownOutput { index, available });
        }
        let outputs = if outputs.is_empty() {
            (0..available).collect()
        } else {
            outputs.to_vec()
        };
        Ok(Self {
            network,
            oracle,
            outputs,
        })
    }

    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Single-threaded decomposition.
    pub fn decompose(&self) -> Result<Decomposition> {
        info!(
            layers = self.network.num_layers(),
            inputs = self.network.input_dim(),
            outputs = self.outputs.len(),
            "decomposing network"
        );
        self.ensure_root_feasible()?;

        let mut state = Partition::new(Vec::new(), self.outputs.len());
        let mut region = Vec::new();
        self.descend(&mut state, self.first_layer_forms(), &mut region, 0)?;

        let decomposition = Decomposition {
            prototypes: state.prototypes,
            outputs: self.outputs.clone(),
            pieces: state.pieces,
        };
        info!(
            prototypes = decomposition.prototypes.len(),
            pieces = decomposition.piece_count(),
            "decomposition finished"
        );
        Ok(decomposition)
    }

    /// Decomposition split across up to `threads` independent partitions.
    ///
    /// Uses `2^f` partitions where `f = min(⌊log2 threads⌋, c)` and `c` is the
    /// number of first-layer nodes cut by the input box. The first cutting
    /// node takes the most significant bit of the partition number, so the
    /// merged result lists prototypes and pieces in the same order as
    /// [`RegionDecomposer::decompose`].
    pub fn decompose_parallel(&self, threads: usize) -> Result<Decomposition> {
        if threads < 2 || self.network.num_layers() < 2 {
            return self.decompose();
        }
        self.ensure_root_feasible()?;

        let base = self.first_layer_forms();
        let frame = self.classify(&base, base.clone(), &[], 0, 0)?;
        let max_fixed = (usize::BITS - 1 - threads.leading_zeros()) as usize;
        let fixed = max_fixed.min(frame.cutting.len());
        let count = 1usize << fixed;
        info!(
            layers = self.network.num_layers(),
            inputs = self.network.input_dim(),
            outputs = self.outputs.len(),
            partitions = count,
            "decomposing network in parallel"
        );

        let partitions = with_workers(threads, || {
            (0..count)
                .into_par_iter()
                .map(|partition| self.search_partition(&base, &frame, fixed, partition))
                .collect::<Result<Vec<_>>>()
        })??;

        let decomposition = merge_partitions(base, partitions, self.outputs.clone());
        info!(
            prototypes = decomposition.prototypes.len(),
            pieces = decomposition.piece_count(),
            "decomposition finished"
        );
        Ok(decomposition)
    }

    fn search_partition(
        &self,
        base: &[Prototype],
        frame: &LayerFrame,
        fixed: usize,
        partition: usize,
    ) -> Result<Partition> {
        let mut state = Partition::new(base.to_vec(), self.outputs.len());
        let mut signs = vec![Sign::GeqZero; frame.forms.len()];
        let mut region = Vec::with_capacity(fixed);
        for (position, &node) in frame.cutting[..fixed].iter().enumerate() {
            let bit = fixed - 1 - position;
            let sign = if (partition >> bit) & 1 == 0 {
                Sign::GeqZero
            } else {
                Sign::LeqZero
            };
            signs[node] = sign;
            region.push(Boundary::new(frame.first + node, sign));
        }

        if !self.is_feasible(&state.prototypes, &region)? {
            debug!(partition, "partition prefix infeasible");
            return Ok(state);
        }
        self.branch(&mut state, frame, &mut signs, &mut region, fixed)?;
        debug!(
            partition,
            prototypes = state.prototypes.len(),
            pieces = state.pieces.iter().map(Vec::len).sum::<usize>(),
            "partition finished"
        );
        Ok(state)
    }

    fn ensure_root_feasible(&self) -> Result<()> {
        if self.oracle.is_feasible(self.network.input_dim(), &[])? {
            Ok(())
        } else {
            Err(LukaError::InfeasibleSearch(
                "the unconstrained input box is empty".into(),
            ))
        }
    }

    fn is_feasible(&self, prototypes: &[Prototype], region: &[Boundary]) -> Result<bool> {
        let constraints = region_constraints(prototypes, region)?;
        self.oracle
            .is_feasible(self.network.input_dim(), &constraints)
    }

    fn first_layer_forms(&self) -> Vec<Prototype> {
        self.network
            .layer(0)
            .nodes
            .iter()
            .map(|node| {
                let mut coefficients = Vec::with_capacity(node.weights.len() + 1);
                coefficients.push(node.bias);
                coefficients.extend_from_slice(&node.weights);
                Prototype::new(coefficients)
            })
            .collect()
    }

    /// Substitute the previous layer's effective values into `layer`.
    fn compose(&self, inputs: &[Prototype], layer: usize) -> Vec<Prototype> {
        let width = self.network.input_dim() + 1;
        self.network
            .layer(layer)
            .nodes
            .iter()
            .map(|node| {
                let mut coefficients = vec![0.0; width];
                coefficients[0] = node.bias;
                for (input, weight) in inputs.iter().zip(&node.weights) {
                    for (c, value) in coefficients.iter_mut().zip(input.coefficients()) {
                        *c += value * weight;
                    }
                }
                Prototype::new(coefficients)
            })
            .collect()
    }

    fn classify(
        &self,
        prototypes: &[Prototype],
        forms: Vec<Prototype>,
        region: &[Boundary],
        first: usize,
        layer: usize,
    ) -> Result<LayerFrame> {
        let constraints = region_constraints(prototypes, region)?;
        let positions = forms
            .iter()
            .map(|form| self.oracle.position(form.coefficients(), &constraints))
            .collect::<Result<Vec<_>>>()?;
        let cutting = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Position::Cutting)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        trace!(layer, nodes = forms.len(), cutting = cutting.len(), "layer classified");
        Ok(LayerFrame {
            layer,
            first,
            forms,
            positions,
            cutting,
        })
    }

    fn descend(
        &self,
        state: &mut Partition,
        forms: Vec<Prototype>,
        region: &mut Vec<Boundary>,
        layer: usize,
    ) -> Result<()> {
        let first = state.prototypes.len();
        state.prototypes.extend(forms.iter().cloned());

        if layer + 1 == self.network.num_layers() {
            for (slot, &output) in self.outputs.iter().enumerate() {
                let raw = first + output;
                state.prototypes.push(forms[output].minus_one());
                let upper = state.prototypes.len() - 1;
                self.emit_pieces(state, slot, &forms[output], region, raw, upper)?;
            }
            return Ok(());
        }

        let frame = self.classify(&state.prototypes, forms, region, first, layer)?;
        let mut signs = vec![Sign::GeqZero; frame.forms.len()];
        self.branch(state, &frame, &mut signs, region, 0)
    }

    /// Enumerate the signs of `frame.cutting[next..]`, pruning infeasible
    /// prefixes, and descend once all of them are fixed.
    fn branch(
        &self,
        state: &mut Partition,
        frame: &LayerFrame,
        signs: &mut [Sign],
        region: &mut Vec<Boundary>,
        next: usize,
    ) -> Result<()> {
        let Some(&node) = frame.cutting.get(next) else {
            let effective = frame.effective_values(signs);
            let forms = self.compose(&effective, frame.layer + 1);
            return self.descend(state, forms, region, frame.layer + 1);
        };

        for sign in [Sign::GeqZero, Sign::LeqZero] {
            signs[node] = sign;
            region.push(Boundary::new(frame.first + node, sign));
            if self.is_feasible(&state.prototypes, region)? {
                self.branch(state, frame, signs, region, next + 1)?;
            }
            region.pop();
        }
        signs[node] = Sign::GeqZero;
        Ok(())
    }

    /// The zero, affine and one pieces of an output on the current region.
    fn emit_pieces(
        &self,
        state: &mut Partition,
        slot: usize,
        form: &Prototype,
        region: &[Boundary],
        raw: usize,
        upper: usize,
    ) -> Result<()> {
        let dim = self.network.input_dim();
        let affine = form
            .coefficients()
            .iter()
            .map(|c| decimal_to_fraction(*c))
            .collect::<Vec<_>>();

        let candidates = [
            (vec![Boundary::leq(raw)], RegionalPiece::zero(dim, Vec::new())),
            (
                vec![Boundary::geq(raw), Boundary::leq(upper)],
                RegionalPiece::new(affine, Vec::new()),
            ),
            (vec![Boundary::geq(upper)], RegionalPiece::one(dim, Vec::new())),
        ];

        for (extra, mut piece) in candidates {
            let mut bounds = region.to_vec();
            bounds.extend(extra);
            if self.is_feasible(&state.prototypes, &bounds)? {
                piece.region = bounds;
                state.pieces[slot].push(piece);
            }
        }
        Ok(())
    }
}
