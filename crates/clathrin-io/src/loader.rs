//! Residue-level features from PDB and mmCIF files.
//!
//! Loading walks chains in file order, keeps polymer residues that carry a
//! CA atom and scatters their heavy atoms into the 37-slot layout. The
//! resulting tensors cover the whole structure; [`chain_feature_map`] splits
//! them back into per-chain maps.

use candle_core::{DType, Tensor};
use clathrin_core::residue::{aa1to_int, aa3to1, Atom37, NUM_ATOM_TYPES};
use clathrin_core::{FeatureError, FeatureMap};
use itertools::Itertools;
use log::{debug, warn};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to parse {path}: {details}")]
    Parse { path: String, details: String },
    #[error("{path} contains no polymer residues with a CA atom")]
    EmptyStructure { path: String },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

/// Bookkeeping for one loaded residue: its chain id, author residue number
/// and zero-based position within its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbIndex {
    pub chain: String,
    pub residue: i64,
    pub index: usize,
}

/// A loaded structure: feature tensors over the full residue stack plus the
/// per-residue bookkeeping used to split it back into chains.
#[derive(Debug, Clone)]
pub struct LoadedStructure {
    pub features: FeatureMap,
    pub pdb_idx: Vec<PdbIndex>,
}

/// Loads features from a structure file. The format is picked from the file
/// extension, so both `.pdb` and `.cif` (optionally gzipped) work.
pub fn load_structure_features(path: impl AsRef<Path>) -> Result<LoadedStructure, LoaderError> {
    let path = path.as_ref().to_string_lossy().into_owned();
    let (pdb, discarded) = pdbtbx::open(&path).map_err(|errors| LoaderError::Parse {
        details: errors.iter().map(|e| e.to_string()).join("; "),
        path: path.clone(),
    })?;
    if !discarded.is_empty() {
        warn!("{path}: ignoring {} parser reports", discarded.len());
    }
    structure_to_features(&pdb, &path)
}

/// Loads features from a PDB file.
pub fn load_pdb_features(path: impl AsRef<Path>) -> Result<LoadedStructure, LoaderError> {
    load_structure_features(path)
}

/// Loads features from an mmCIF file.
pub fn load_cif_features(path: impl AsRef<Path>) -> Result<LoadedStructure, LoaderError> {
    load_structure_features(path)
}

fn structure_to_features(pdb: &pdbtbx::PDB, path: &str) -> Result<LoadedStructure, LoaderError> {
    let device = candle_core::Device::Cpu;
    let mut aatype: Vec<i64> = Vec::new();
    let mut residue_index: Vec<i64> = Vec::new();
    let mut chain_index: Vec<i64> = Vec::new();
    let mut positions: Vec<f32> = Vec::new();
    let mut mask: Vec<f32> = Vec::new();
    let mut pdb_idx: Vec<PdbIndex> = Vec::new();

    for (chain_i, chain) in pdb.chains().enumerate() {
        let chain_id = chain.id().to_string();
        let mut within = 0usize;
        for residue in chain.residues() {
            let (res_number, _insertion_code) = residue.id();
            let res_number = res_number as i64;
            let res_name = residue.name().unwrap_or_default().to_string();
            // Waters and ligands arrive as hetero atoms; a polymer residue
            // additionally needs a CA to be representable at all.
            let is_polymer = residue.atoms().any(|a| !a.hetero());
            let has_ca = residue.atoms().any(|a| a.name() == "CA");
            if !is_polymer || !has_ca {
                continue;
            }

            let mut pos37 = [[0.0f32; 3]; NUM_ATOM_TYPES];
            let mut mask37 = [0.0f32; NUM_ATOM_TYPES];
            for atom in residue.atoms() {
                if let Ok(slot) = Atom37::from_str(atom.name()) {
                    let (x, y, z) = atom.pos();
                    pos37[slot.to_index()] = [x as f32, y as f32, z as f32];
                    mask37[slot.to_index()] = 1.0;
                }
            }

            aatype.push(aa1to_int(aa3to1(&res_name)));
            residue_index.push(res_number);
            chain_index.push(chain_i as i64 + 1);
            for p in pos37 {
                positions.extend_from_slice(&p);
            }
            mask.extend_from_slice(&mask37);
            pdb_idx.push(PdbIndex {
                chain: chain_id.clone(),
                residue: res_number,
                index: within,
            });
            within += 1;
        }
    }

    let seq_len = aatype.len();
    if seq_len == 0 {
        return Err(LoaderError::EmptyStructure {
            path: path.to_string(),
        });
    }
    debug!("loaded {seq_len} residues from {path}");

    let mut features = FeatureMap::new();
    features.insert("aatype", Tensor::from_vec(aatype, (seq_len,), &device)?);
    features.insert(
        "residue_index",
        Tensor::from_vec(residue_index, (seq_len,), &device)?,
    );
    features.insert("chain_id", Tensor::from_vec(chain_index, (seq_len,), &device)?);
    features.insert(
        "all_atom_positions",
        Tensor::from_vec(positions, (seq_len, NUM_ATOM_TYPES, 3), &device)?,
    );
    features.insert(
        "all_atom_mask",
        Tensor::from_vec(mask, (seq_len, NUM_ATOM_TYPES), &device)?,
    );
    features.insert("seq_mask", Tensor::ones((seq_len,), DType::F32, &device)?);

    Ok(LoadedStructure { features, pdb_idx })
}

/// Splits full-structure features into per-chain maps, keyed by chain id in
/// first-appearance order.
pub fn chain_feature_map(
    loaded: &LoadedStructure,
) -> Result<Vec<(String, FeatureMap)>, LoaderError> {
    let chains: Vec<&str> = loaded
        .pdb_idx
        .iter()
        .map(|p| p.chain.as_str())
        .unique()
        .collect();

    let device = loaded.features.get("aatype")?.device().clone();
    let mut out = Vec::with_capacity(chains.len());
    let mut global_index = 0u32;
    for chain in chains {
        let idx: Vec<u32> = loaded
            .pdb_idx
            .iter()
            .filter(|p| p.chain == chain)
            .map(|p| p.index as u32 + global_index)
            .collect();
        let n = idx.len() as u32;
        let idx = Tensor::from_vec(idx, (n as usize,), &device)?;

        let mut chain_feats = FeatureMap::new();
        for (key, value) in loaded.features.iter() {
            chain_feats.insert(key.clone(), value.contiguous()?.index_select(&idx, 0)?);
        }
        out.push((chain.to_string(), chain_feats));
        global_index += n;
    }
    Ok(out)
}
