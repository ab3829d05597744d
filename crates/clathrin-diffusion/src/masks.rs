//! Generation-region mask strings.
//!
//! `"+s:e;s:e"` marks the listed half-open index ranges as generated and
//! everything else as fixed; `"-s:e;s:e"` fixes the listed ranges and
//! generates the rest. Ranges past the end of the sequence are clipped.

use candle_core::{Device, Tensor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("region string must start with '+' or '-', got `{region}`")]
    MissingPrefix { region: String },
    #[error("bad range `{range}`, expected `start:end`")]
    BadRange { range: String },
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

fn bad_range(range: &str) -> MaskError {
    MaskError::BadRange {
        range: range.to_string(),
    }
}

/// Parses a generation-region string into a per-residue 0/1 mask.
pub fn make_mask(seq_len: usize, gen_region: &str) -> Result<Vec<f32>, MaskError> {
    let (base, fill, body) = match gen_region.strip_prefix('+') {
        Some(rest) => (0.0, 1.0, rest),
        None => match gen_region.strip_prefix('-') {
            Some(rest) => (1.0, 0.0, rest),
            None => {
                return Err(MaskError::MissingPrefix {
                    region: gen_region.to_string(),
                })
            }
        },
    };

    let mut mask = vec![base; seq_len];
    for range in body.trim().split(';') {
        let range = range.trim();
        let (start, end) = range.split_once(':').ok_or_else(|| bad_range(range))?;
        let start: usize = start.trim().parse().map_err(|_| bad_range(range))?;
        let end: usize = end.trim().parse().map_err(|_| bad_range(range))?;
        let end = end.min(seq_len);
        for slot in mask.iter_mut().take(end).skip(start.min(end)) {
            *slot = fill;
        }
    }
    Ok(mask)
}

/// `make_mask` as an `(L,)` tensor on the given device.
pub fn gen_region_mask(
    seq_len: usize,
    gen_region: &str,
    device: &Device,
) -> Result<Tensor, MaskError> {
    let mask = make_mask(seq_len, gen_region)?;
    Ok(Tensor::from_vec(mask, seq_len, device)?)
}
