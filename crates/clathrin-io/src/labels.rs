//! Per-chain label records and the stores that hold them.
//!
//! A label record carries the ground-truth arrays a training pipeline needs
//! for one chain. Records serialize as gzipped pickle dictionaries, arrays
//! flattened next to their shape, and live in a directory store keyed by
//! sequence id.

use candle_core::{Device, Tensor};
use clathrin_core::residue::NUM_ATOM_TYPES;
use clathrin_core::{to_host_array, FeatureError, FeatureMap};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LABEL_SUFFIX: &str = ".label.pkl.gz";

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("no label record for `{id}`")]
    MissingRecord { id: String },
    #[error("no id-map entry for `{id}`")]
    MissingEntry { id: String },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
    #[error(transparent)]
    Pickle(#[from] serde_pickle::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A flat array next to its shape, the pickle-friendly form of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelArrayF32 {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelArrayI64 {
    pub shape: Vec<usize>,
    pub data: Vec<i64>,
}

/// Ground-truth arrays for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLabel {
    pub aatype: LabelArrayI64,
    pub all_atom_positions: LabelArrayF32,
    pub all_atom_mask: LabelArrayF32,
    pub resolution: Vec<f64>,
}

impl ChainLabel {
    /// Extracts the label arrays from per-chain features. Resolution defaults
    /// to zero, marking the record as synthetic rather than experimental.
    pub fn from_features(features: &FeatureMap) -> Result<Self, LabelError> {
        let aatype = to_host_array(features.get("aatype")?, false)?.into_i64();
        let positions = to_host_array(features.get("all_atom_positions")?, false)?.into_f32();
        let mask = to_host_array(features.get("all_atom_mask")?, false)?.into_f32();
        Ok(Self {
            aatype: LabelArrayI64 {
                shape: aatype.shape().to_vec(),
                data: aatype.iter().copied().collect(),
            },
            all_atom_positions: LabelArrayF32 {
                shape: positions.shape().to_vec(),
                data: positions.iter().copied().collect(),
            },
            all_atom_mask: LabelArrayF32 {
                shape: mask.shape().to_vec(),
                data: mask.iter().copied().collect(),
            },
            resolution: vec![0.0],
        })
    }

    /// Rebuilds the label tensors on the given device.
    pub fn to_features(&self, device: &Device) -> Result<FeatureMap, LabelError> {
        let mut features = FeatureMap::new();
        features.insert(
            "aatype",
            Tensor::from_vec(
                self.aatype.data.clone(),
                self.aatype.shape.clone(),
                device,
            )?,
        );
        features.insert(
            "all_atom_positions",
            Tensor::from_vec(
                self.all_atom_positions.data.clone(),
                self.all_atom_positions.shape.clone(),
                device,
            )?,
        );
        features.insert(
            "all_atom_mask",
            Tensor::from_vec(
                self.all_atom_mask.data.clone(),
                self.all_atom_mask.shape.clone(),
                device,
            )?,
        );
        Ok(features)
    }

    pub fn seq_len(&self) -> usize {
        self.aatype.shape.first().copied().unwrap_or(0)
    }
}

/// Storage for label records keyed by sequence id.
pub trait RecordStore {
    fn put(&self, id: &str, label: &ChainLabel) -> Result<(), LabelError>;
    fn get(&self, id: &str) -> Result<ChainLabel, LabelError>;
    fn ids(&self) -> Result<Vec<String>, LabelError>;
}

/// Keeps each record as `<id>.label.pkl.gz` under one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LabelError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{LABEL_SUFFIX}"))
    }
}

impl RecordStore for DirectoryStore {
    fn put(&self, id: &str, label: &ChainLabel) -> Result<(), LabelError> {
        let pickled = serde_pickle::to_vec(label, serde_pickle::SerOptions::new())?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&pickled)?;
        let bytes = encoder.finish()?;
        let path = self.record_path(id);
        fs::write(&path, bytes)?;
        debug!("wrote label record {}", path.display());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<ChainLabel, LabelError> {
        let path = self.record_path(id);
        let file = fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LabelError::MissingRecord { id: id.to_string() }
            } else {
                LabelError::Io(e)
            }
        })?;
        let decoder = GzDecoder::new(file);
        let label = serde_pickle::from_reader(decoder, serde_pickle::DeOptions::new())?;
        Ok(label)
    }

    fn ids(&self) -> Result<Vec<String>, LabelError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(LABEL_SUFFIX) {
                ids.push(id.to_string());
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Maps record ids to sequence ids, loaded from a flat JSON object.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    inner: HashMap<String, String>,
}

impl IdMap {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let text = fs::read_to_string(path)?;
        let inner: HashMap<String, String> = serde_json::from_str(&text)?;
        Ok(Self { inner })
    }

    pub fn sequence_id(&self, id: &str) -> Result<&str, LabelError> {
        self.inner
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| LabelError::MissingEntry { id: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Writes one label record per chain, keyed `<entry>_<chain>` in sorted chain
/// order, and returns the ids written.
pub fn save_chain_labels(
    store: &impl RecordStore,
    entry_id: &str,
    chains: &[(String, FeatureMap)],
) -> Result<Vec<String>, LabelError> {
    let mut sorted: Vec<&(String, FeatureMap)> = chains.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ids = Vec::with_capacity(sorted.len());
    for (chain, features) in sorted {
        let id = format!("{entry_id}_{chain}");
        store.put(&id, &ChainLabel::from_features(features)?)?;
        ids.push(id);
    }
    Ok(ids)
}

/// Quick shape sanity for a label record against the expected atom layout.
pub fn validate_label(label: &ChainLabel) -> Result<(), LabelError> {
    let seq_len = label.seq_len();
    let expected = vec![seq_len, NUM_ATOM_TYPES, 3];
    if label.all_atom_positions.shape != expected {
        return Err(FeatureError::ShapeMismatch {
            expected,
            got: label.all_atom_positions.shape.clone(),
        }
        .into());
    }
    let expected = vec![seq_len, NUM_ATOM_TYPES];
    if label.all_atom_mask.shape != expected {
        return Err(FeatureError::ShapeMismatch {
            expected,
            got: label.all_atom_mask.shape.clone(),
        }
        .into());
    }
    Ok(())
}
