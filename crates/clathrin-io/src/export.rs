//! Backbone PDB export.
//!
//! [`to_pdb_string`] rebuilds N, CA, C and O coordinates from a frame stack
//! and renders them in fixed-column PDB format, one MODEL block per call.

use candle_core::Tensor;
use clathrin_core::backbone::compute_atomic_positions;
use clathrin_core::residue::{atom37_names, int_to_aa3, NUM_ATOM_TYPES, NUM_RESTYPES, PDB_CHAIN_IDS};
use clathrin_core::{to_host_array, FeatureError, FeatureMap};
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid residue type {aatype} at position {position}")]
    InvalidResidueType { aatype: i64, position: usize },
    #[error("chain index {chain_index} exceeds the {max} available chain tags")]
    InvalidChainIndex { chain_index: i64, max: usize },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Host-side atomic representation of one structure, ready for rendering.
#[derive(Debug, Clone)]
pub struct Protein {
    /// `(L, 37, 3)` coordinates.
    pub atom_positions: ArrayD<f32>,
    /// `(L,)` residue-type indices.
    pub aatype: ArrayD<i64>,
    /// `(L, 37)` per-atom validity.
    pub atom_mask: ArrayD<f32>,
    /// `(L,)` author residue numbers.
    pub residue_index: ArrayD<i64>,
    /// `(L,)` zero-based chain indices.
    pub chain_index: ArrayD<i64>,
    /// `(L, 37)` values for the B-factor column.
    pub b_factors: ArrayD<f32>,
}

impl Protein {
    /// Builds a [`Protein`] from loaded atom-level features. `has_batch_dim`
    /// squeezes a leading batch dimension of size one; without a `chain_id`
    /// feature everything lands on chain 0. B-factors default to the atom
    /// mask.
    pub fn from_features(features: &FeatureMap, has_batch_dim: bool) -> Result<Self, ExportError> {
        let atom_mask = to_host_array(features.get("all_atom_mask")?, has_batch_dim)?.into_f32();
        let chain_index = match features.try_get("chain_id") {
            Some(c) => to_host_array(c, has_batch_dim)?.into_i64().mapv(|c| c - 1),
            None => ArrayD::zeros(IxDyn(&[atom_mask.shape()[0]])),
        };
        Ok(Self {
            aatype: to_host_array(features.get("aatype")?, has_batch_dim)?.into_i64(),
            atom_positions: to_host_array(features.get("all_atom_positions")?, has_batch_dim)?
                .into_f32(),
            residue_index: to_host_array(features.get("residue_index")?, has_batch_dim)?
                .into_i64(),
            b_factors: atom_mask.clone(),
            atom_mask,
            chain_index,
        })
    }

    /// Builds a [`Protein`] from input features plus a prediction map
    /// carrying `final_atom_positions`, `final_atom_mask` and per-residue
    /// `plddt`. The plddt column is tiled across the 37 atom slots as
    /// B-factors.
    pub fn from_prediction(
        features: &FeatureMap,
        prediction: &FeatureMap,
        has_batch_dim: bool,
    ) -> Result<Self, ExportError> {
        let atom_mask =
            to_host_array(prediction.get("final_atom_mask")?, has_batch_dim)?.into_f32();
        let plddt = to_host_array(prediction.get("plddt")?, has_batch_dim)?.into_f32();
        let b_factors = ArrayD::from_shape_fn(
            IxDyn(&[plddt.shape()[0], NUM_ATOM_TYPES]),
            |idx| plddt[[idx[0]]],
        );
        let chain_index = match features.try_get("chain_id") {
            Some(c) => to_host_array(c, has_batch_dim)?.into_i64().mapv(|c| c - 1),
            None => ArrayD::zeros(IxDyn(&[atom_mask.shape()[0]])),
        };
        Ok(Self {
            aatype: to_host_array(features.get("aatype")?, has_batch_dim)?.into_i64(),
            atom_positions: to_host_array(
                prediction.get("final_atom_positions")?,
                has_batch_dim,
            )?
            .into_f32(),
            residue_index: to_host_array(features.get("residue_index")?, has_batch_dim)?
                .into_i64(),
            atom_mask,
            chain_index,
            b_factors,
        })
    }
}

/// Assembles the exportable [`Protein`] for a batch. With a prediction the
/// predicted atoms are used and plddt becomes the B-factor column; without
/// one the ground-truth atoms are exported as they are.
pub fn make_output(
    features: &FeatureMap,
    prediction: Option<&FeatureMap>,
    has_batch_dim: bool,
) -> Result<Protein, ExportError> {
    match prediction {
        Some(prediction) => Protein::from_prediction(features, prediction, has_batch_dim),
        None => Protein::from_features(features, has_batch_dim),
    }
}

fn validate(prot: &Protein) -> Result<usize, ExportError> {
    let seq_len = prot.aatype.shape()[0];
    let checks: [(&[usize], &[usize]); 5] = [
        (prot.atom_positions.shape(), &[seq_len, 37, 3]),
        (prot.atom_mask.shape(), &[seq_len, 37]),
        (prot.residue_index.shape(), &[seq_len]),
        (prot.chain_index.shape(), &[seq_len]),
        (prot.b_factors.shape(), &[seq_len, 37]),
    ];
    for (got, expected) in checks {
        if got != expected {
            return Err(FeatureError::ShapeMismatch {
                expected: expected.to_vec(),
                got: got.to_vec(),
            }
            .into());
        }
    }
    Ok(seq_len)
}

fn chain_tag(chain_index: i64) -> Result<char, ExportError> {
    PDB_CHAIN_IDS
        .chars()
        .nth(chain_index as usize)
        .ok_or(ExportError::InvalidChainIndex {
            chain_index,
            max: PDB_CHAIN_IDS.len(),
        })
}

fn chain_end(atom_index: usize, res_name: &str, chain_tag: char, residue_index: i64) -> String {
    format!(
        "{:<6}{:>5}      {:>3} {:>1}{:>4}",
        "TER", atom_index, res_name, chain_tag, residue_index
    )
}

/// Renders a [`Protein`] as one PDB MODEL block. Atoms with mask below 0.5
/// are skipped and a TER record closes every chain.
pub fn to_pdb(prot: &Protein, model_id: usize) -> Result<String, ExportError> {
    let seq_len = validate(prot)?;
    let atom_names: Vec<String> = atom37_names().collect();

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("MODEL     {model_id}"));
    let mut atom_index = 1usize;
    let mut last_chain = prot.chain_index[[0]];

    for i in 0..seq_len {
        let aa = prot.aatype[[i]];
        if aa > NUM_RESTYPES as i64 {
            return Err(ExportError::InvalidResidueType {
                aatype: aa,
                position: i,
            });
        }
        if prot.chain_index[[i]] != last_chain {
            lines.push(chain_end(
                atom_index,
                int_to_aa3(prot.aatype[[i - 1]]),
                chain_tag(last_chain)?,
                prot.residue_index[[i - 1]],
            ));
            last_chain = prot.chain_index[[i]];
            atom_index += 1;
        }

        let res_name = int_to_aa3(aa);
        let tag = chain_tag(prot.chain_index[[i]])?;
        for (slot, atom_name) in atom_names.iter().enumerate() {
            if prot.atom_mask[[i, slot]] < 0.5 {
                continue;
            }
            let name = if atom_name.len() == 4 {
                atom_name.clone()
            } else {
                format!(" {atom_name}")
            };
            let element: String = atom_name.chars().take(1).collect();
            lines.push(format!(
                "{:<6}{:>5} {:<4}{:>1}{:>3} {:>1}{:>4}{:>1}   \
                 {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}{:>2}",
                "ATOM",
                atom_index,
                name,
                "",
                res_name,
                tag,
                prot.residue_index[[i]],
                "",
                prot.atom_positions[[i, slot, 0]],
                prot.atom_positions[[i, slot, 1]],
                prot.atom_positions[[i, slot, 2]],
                1.0f32,
                prot.b_factors[[i, slot]],
                element,
                "",
            ));
            atom_index += 1;
        }
    }

    let last = seq_len - 1;
    lines.push(chain_end(
        atom_index,
        int_to_aa3(prot.aatype[[last]]),
        chain_tag(prot.chain_index[[last]])?,
        prot.residue_index[[last]],
    ));
    lines.push("ENDMDL".to_string());
    lines.push("END".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&format!("{line:<80}\n"));
    }
    Ok(out)
}

/// Renders a backbone-only PDB from packed frames `(..., L, 4, 4)`.
///
/// B-factors default to the atom mask; when given they must match its shape.
/// `has_batch_dim` squeezes a leading batch dimension of size one; the
/// function renders exactly one structure per call.
#[allow(clippy::too_many_arguments)]
pub fn to_pdb_string(
    aatype: &Tensor,
    frames: &Tensor,
    seq_mask: &Tensor,
    residue_index: &Tensor,
    chain_id: &Tensor,
    b_factor: Option<&Tensor>,
    model_id: usize,
    has_batch_dim: bool,
) -> Result<String, ExportError> {
    let (atom_pos, atom_mask) =
        compute_atomic_positions(frames, seq_mask, residue_index, chain_id)?;
    let b_factor = match b_factor {
        Some(b) => {
            if b.dims() != atom_mask.dims() {
                return Err(FeatureError::ShapeMismatch {
                    expected: atom_mask.dims().to_vec(),
                    got: b.dims().to_vec(),
                }
                .into());
            }
            b.clone()
        }
        None => atom_mask.clone(),
    };

    let prot = Protein {
        atom_positions: to_host_array(&atom_pos, has_batch_dim)?.into_f32(),
        aatype: to_host_array(aatype, has_batch_dim)?.into_i64(),
        atom_mask: to_host_array(&atom_mask, has_batch_dim)?.into_f32(),
        residue_index: to_host_array(residue_index, has_batch_dim)?.into_i64(),
        chain_index: to_host_array(chain_id, has_batch_dim)?
            .into_i64()
            .mapv(|c| c - 1),
        b_factors: to_host_array(&b_factor, has_batch_dim)?.into_f32(),
    };
    to_pdb(&prot, model_id)
}

/// Renders and writes a backbone-only PDB file.
#[allow(clippy::too_many_arguments)]
pub fn save_pdb(
    path: impl AsRef<Path>,
    aatype: &Tensor,
    frames: &Tensor,
    seq_mask: &Tensor,
    residue_index: &Tensor,
    chain_id: &Tensor,
    b_factor: Option<&Tensor>,
    model_id: usize,
    has_batch_dim: bool,
) -> Result<(), ExportError> {
    let pdb_string = to_pdb_string(
        aatype,
        frames,
        seq_mask,
        residue_index,
        chain_id,
        b_factor,
        model_id,
        has_batch_dim,
    )?;
    std::fs::write(path, pdb_string)?;
    Ok(())
}
