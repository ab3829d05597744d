//! String-keyed tensor features exchanged between structure loading, the
//! diffusion pipeline and structure export.

use candle_core::{DType, Tensor};
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("feature map has no entry `{key}`")]
    MissingKey { key: String },
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("unsupported dtype {dtype:?} for host conversion")]
    UnsupportedDtype { dtype: DType },
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

pub type FeatureResult<T> = std::result::Result<T, FeatureError>;

/// A flat mapping from feature names to tensors. All tensors describing the
/// same structure share their leading sequence (and optional batch)
/// dimensions.
#[derive(Debug, Clone, Default)]
pub struct FeatureMap {
    inner: HashMap<String, Tensor>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Tensor) {
        self.inner.insert(key.into(), value);
    }

    /// Looks a feature up, failing with the offending key name.
    pub fn get(&self, key: &str) -> FeatureResult<&Tensor> {
        self.inner.get(key).ok_or_else(|| FeatureError::MissingKey {
            key: key.to_string(),
        })
    }

    pub fn try_get(&self, key: &str) -> Option<&Tensor> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Tensor> {
        self.inner.remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.inner.iter()
    }

    /// One `name: shape dtype` line per feature, sorted by name.
    pub fn summary(&self) -> String {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        let mut out = String::new();
        for key in keys {
            if let Some(t) = self.try_get(key) {
                out.push_str(&format!("{key}: {:?} {:?}\n", t.dims(), t.dtype()));
            }
        }
        out
    }
}

impl FromIterator<(String, Tensor)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Tensor)> for FeatureMap {
    fn extend<I: IntoIterator<Item = (String, Tensor)>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl IntoIterator for FeatureMap {
    type Item = (String, Tensor);
    type IntoIter = std::collections::hash_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

/// A tensor copied to the host, with the dtype collapsed to the two families
/// the export and label paths understand.
#[derive(Debug, Clone)]
pub enum HostArray {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
}

impl HostArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            HostArray::F32(a) => a.shape(),
            HostArray::I64(a) => a.shape(),
        }
    }

    pub fn into_f32(self) -> ArrayD<f32> {
        match self {
            HostArray::F32(a) => a,
            HostArray::I64(a) => a.mapv(|v| v as f32),
        }
    }

    pub fn into_i64(self) -> ArrayD<i64> {
        match self {
            HostArray::F32(a) => a.mapv(|v| v as i64),
            HostArray::I64(a) => a,
        }
    }
}

/// Copies a tensor to host memory. Float dtypes widen to f32, integer dtypes
/// to i64, anything else is rejected. With `reduce_batch_dim` the leading
/// batch dimension of size one is squeezed away first.
pub fn to_host_array(x: &Tensor, reduce_batch_dim: bool) -> FeatureResult<HostArray> {
    let x = if reduce_batch_dim {
        x.squeeze(0)?
    } else {
        x.clone()
    };
    let dims = x.dims().to_vec();
    match x.dtype() {
        DType::F32 | DType::F16 | DType::BF16 => {
            let data = x
                .to_dtype(DType::F32)?
                .contiguous()?
                .flatten_all()?
                .to_vec1::<f32>()?;
            let got = vec![data.len()];
            let arr = ArrayD::from_shape_vec(IxDyn(&dims), data)
                .map_err(|_| FeatureError::ShapeMismatch {
                    expected: dims,
                    got,
                })?;
            Ok(HostArray::F32(arr))
        }
        DType::I64 | DType::U32 => {
            let data = x
                .to_dtype(DType::I64)?
                .contiguous()?
                .flatten_all()?
                .to_vec1::<i64>()?;
            let got = vec![data.len()];
            let arr = ArrayD::from_shape_vec(IxDyn(&dims), data)
                .map_err(|_| FeatureError::ShapeMismatch {
                    expected: dims,
                    got,
                })?;
            Ok(HostArray::I64(arr))
        }
        dtype => Err(FeatureError::UnsupportedDtype { dtype }),
    }
}
