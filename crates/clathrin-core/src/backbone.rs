//! Per-residue backbone frames from atom coordinates and back.
//!
//! A residue frame is anchored at CA with C along the local x axis and N in
//! the xy plane. Rebuilding atoms places idealized N, CA, C offsets into each
//! frame and derives the carbonyl oxygen from a virtual frame spanned by CA,
//! C and the next residue's N.

use crate::geometry::rigid::{Frame, DEFAULT_FRAME_EPS};
use crate::residue::{N_CA_C_IDEAL, OXYGEN_OFFSET};
use crate::{FeatureMap, FeatureResult};
use candle_core::{Result, Tensor, D};

/// Builds backbone frames from atom37 coordinates.
///
/// `all_atom_positions` is `(..., L, 37, 3)` and `all_atom_mask` is
/// `(..., L, 37)`. Returns packed frames `(..., L, 4, 4)` and a frame mask
/// `(..., L)` that is 1 only where N, CA and C are all observed.
pub fn backbone_frames(
    all_atom_positions: &Tensor,
    all_atom_mask: &Tensor,
    eps: f64,
) -> Result<(Tensor, Tensor)> {
    let n = all_atom_positions.narrow(D::Minus2, 0, 1)?.squeeze(D::Minus2)?;
    let ca = all_atom_positions.narrow(D::Minus2, 1, 1)?.squeeze(D::Minus2)?;
    let c = all_atom_positions.narrow(D::Minus2, 2, 1)?.squeeze(D::Minus2)?;

    let frames = Frame::from_3_points(&c, &ca, &n, eps)?;
    // Flip x and z so the idealized residue lands on the identity frame.
    let flip = Tensor::new(
        &[[-1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],
        all_atom_positions.device(),
    )?
    .to_dtype(all_atom_positions.dtype())?;
    let frames = frames.compose_rotation(&flip)?;

    let frame_mask = all_atom_mask.narrow(D::Minus1, 0, 3)?.min(D::Minus1)?;
    Ok((frames.to_tensor_4x4()?, frame_mask))
}

/// Derives backbone frames for a whole feature map, merging `backb_frames`
/// and `backb_frame_mask` into a copy. A map without atom coordinates passes
/// through unchanged.
pub fn atom37_to_backbone_frames(
    features: &FeatureMap,
    eps: f64,
) -> FeatureResult<FeatureMap> {
    let positions = match features.try_get("all_atom_positions") {
        Some(positions) => positions,
        None => return Ok(features.clone()),
    };
    let mask = features.get("all_atom_mask")?;
    let (frames, frame_mask) = backbone_frames(positions, mask, eps)?;
    let mut out = features.clone();
    out.insert("backb_frames", frames);
    out.insert("backb_frame_mask", frame_mask);
    Ok(out)
}

/// Signed sequence separation `res_id[i] - res_id[j]` clamped to
/// `[-cutoff, cutoff]`, with pairs from different chains collapsed to the
/// sentinel `-(cutoff + 1)`. Inputs are `(..., L)` I64 tensors.
pub fn compute_relative_positions(
    res_id: &Tensor,
    chain_id: &Tensor,
    cutoff: i64,
) -> Result<Tensor> {
    let relpos = res_id
        .unsqueeze(D::Minus1)?
        .broadcast_sub(&res_id.unsqueeze(D::Minus2)?)?;
    let relpos = relpos.clamp(-cutoff, cutoff)?;

    let shape = relpos.dims();
    let a = chain_id
        .unsqueeze(D::Minus1)?
        .broadcast_as(shape)?
        .contiguous()?;
    let b = chain_id
        .unsqueeze(D::Minus2)?
        .broadcast_as(shape)?
        .contiguous()?;
    let same_chain = a.eq(&b)?;
    let sentinel = Tensor::full(-(cutoff + 1), shape, relpos.device())?;
    same_chain.where_cond(&relpos, &sentinel)
}

/// Rebuilds atom37 coordinates from packed frames `(..., L, 4, 4)`.
///
/// Slots 0, 1, 2 and 4 (N, CA, C, O) are populated, slot 3 stays zero and the
/// remaining 32 slots are zero padding. The oxygen for a residue without a
/// same-chain successor comes out of a degenerate virtual frame; it is still
/// reported with the sequence mask, so callers gate on positional validity
/// themselves.
pub fn compute_atomic_positions(
    frames: &Tensor,
    seq_mask: &Tensor,
    residue_index: &Tensor,
    chain_id: &Tensor,
) -> Result<(Tensor, Tensor)> {
    let frames = Frame::from_tensor_4x4(frames)?;
    let device = frames.device();
    let dtype = frames.dtype();

    let ideal = Tensor::new(&N_CA_C_IDEAL, device)?.to_dtype(dtype)?;
    let rank = frames.rots().rank();
    let rots = frames.rots().unsqueeze(rank - 2)?;
    let n_ca_c = rots
        .broadcast_matmul(&ideal.unsqueeze(D::Minus1)?)?
        .squeeze(D::Minus1)?
        .broadcast_add(&frames.trans().unsqueeze(D::Minus2)?)?;

    // The same-chain successor of residue i is the j with relpos[i, j] == -1.
    let relpos = compute_relative_positions(residue_index, chain_id, 2)?;
    let is_next = relpos.eq(-1i64)?.to_dtype(dtype)?;
    let flat = n_ca_c.flatten_from(D::Minus2)?.contiguous()?;
    let next_n_ca_c = is_next.broadcast_matmul(&flat)?.reshape(n_ca_c.dims())?;

    let oxygen_frames = Frame::from_3_points(
        &n_ca_c.narrow(D::Minus2, 1, 1)?.squeeze(D::Minus2)?,
        &n_ca_c.narrow(D::Minus2, 2, 1)?.squeeze(D::Minus2)?,
        &next_n_ca_c.narrow(D::Minus2, 0, 1)?.squeeze(D::Minus2)?,
        DEFAULT_FRAME_EPS,
    )?;
    let offset = Tensor::new(&OXYGEN_OFFSET, device)?.to_dtype(dtype)?;
    let oxygen = oxygen_frames.apply(&offset)?.unsqueeze(D::Minus2)?;

    let n_ca_c_o = Tensor::cat(&[&n_ca_c, &oxygen.zeros_like()?, &oxygen], D::Minus2)?;
    let atom_pos = n_ca_c_o.pad_with_zeros(D::Minus2, 0, 32)?;

    let zero_mask = seq_mask.zeros_like()?;
    let atom_mask = Tensor::stack(
        &[seq_mask, seq_mask, seq_mask, &zero_mask, seq_mask],
        D::Minus1,
    )?;
    let atom_mask = atom_mask.pad_with_zeros(D::Minus1, 0, 32)?;

    Ok((atom_pos, atom_mask))
}
