//! Batched rigid transforms over candle tensors.
//!
//! A [`Frame`] pairs a stack of rotation matrices `(..., 3, 3)` with a stack
//! of translations `(..., 3)`. Frames move between this split form and the
//! packed homogeneous form `(..., 4, 4)` used in feature maps.

use candle_core::{DType, Device, Result, Tensor, D};
use thiserror::Error;

/// Numerical floor added inside the square root when normalizing frame basis
/// vectors, so degenerate triples yield finite frames instead of NaN.
pub const DEFAULT_FRAME_EPS: f64 = 1e-8;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid frame shape {0:?}")]
    InvalidShape(Vec<usize>),
    #[error("rotation batch {rots:?} does not match translation batch {trans:?}")]
    ShapeMismatch { rots: Vec<usize>, trans: Vec<usize> },
}

/// A batch of rigid transforms.
#[derive(Debug, Clone)]
pub struct Frame {
    rots: Tensor,
    trans: Tensor,
}

impl Frame {
    /// Builds a frame stack from rotations `(..., 3, 3)` and translations
    /// `(..., 3)` with matching batch dimensions.
    pub fn new(rots: Tensor, trans: Tensor) -> Result<Self> {
        let rdims = rots.dims();
        let rrank = rdims.len();
        if rrank < 2 || rdims[rrank - 1] != 3 || rdims[rrank - 2] != 3 {
            return Err(candle_core::Error::wrap(FrameError::InvalidShape(
                rdims.to_vec(),
            )));
        }
        let tdims = trans.dims();
        let trank = tdims.len();
        if trank < 1 || tdims[trank - 1] != 3 || rdims[..rrank - 2] != tdims[..trank - 1] {
            return Err(candle_core::Error::wrap(FrameError::ShapeMismatch {
                rots: rdims.to_vec(),
                trans: tdims.to_vec(),
            }));
        }
        Ok(Self { rots, trans })
    }

    /// Identity transform broadcast over the given batch dimensions.
    pub fn identity(batch_dims: &[usize], dtype: DType, device: &Device) -> Result<Self> {
        let mut rot_dims = batch_dims.to_vec();
        rot_dims.extend([3, 3]);
        let rots = Tensor::eye(3, dtype, device)?
            .broadcast_as(rot_dims)?
            .contiguous()?;
        let mut trans_dims = batch_dims.to_vec();
        trans_dims.push(3);
        let trans = Tensor::zeros(trans_dims, dtype, device)?;
        Ok(Self { rots, trans })
    }

    /// Gram-Schmidt frame construction from three point stacks of shape
    /// `(..., 3)`.
    ///
    /// The x axis points from `p_neg_x_axis` through `origin`, `p_xy_plane`
    /// fixes the half of the xy plane with positive y, and z completes the
    /// right-handed basis. `eps` sits inside the normalization square roots.
    pub fn from_3_points(
        p_neg_x_axis: &Tensor,
        origin: &Tensor,
        p_xy_plane: &Tensor,
        eps: f64,
    ) -> Result<Self> {
        let e0 = (origin - p_neg_x_axis)?;
        let e1 = (p_xy_plane - origin)?;
        let denom = ((e0.sqr()?.sum_keepdim(D::Minus1)? + eps)?).sqrt()?;
        let e0 = e0.broadcast_div(&denom)?;
        let dot = (&e0 * &e1)?.sum_keepdim(D::Minus1)?;
        let e1 = (e1 - e0.broadcast_mul(&dot)?)?;
        let denom = ((e1.sqr()?.sum_keepdim(D::Minus1)? + eps)?).sqrt()?;
        let e1 = e1.broadcast_div(&denom)?;
        let e2 = cross(&e0, &e1)?;
        // Stacking on the trailing axis makes e0, e1, e2 the matrix columns.
        let rots = Tensor::stack(&[&e0, &e1, &e2], D::Minus1)?;
        Ok(Self {
            rots,
            trans: origin.clone(),
        })
    }

    /// Splits a packed homogeneous stack `(..., 4, 4)` into a frame.
    pub fn from_tensor_4x4(t: &Tensor) -> Result<Self> {
        let dims = t.dims();
        let rank = dims.len();
        if rank < 2 || dims[rank - 1] != 4 || dims[rank - 2] != 4 {
            return Err(candle_core::Error::wrap(FrameError::InvalidShape(
                dims.to_vec(),
            )));
        }
        let rots = t.narrow(D::Minus2, 0, 3)?.narrow(D::Minus1, 0, 3)?.contiguous()?;
        let trans = t
            .narrow(D::Minus2, 0, 3)?
            .narrow(D::Minus1, 3, 1)?
            .squeeze(D::Minus1)?
            .contiguous()?;
        Ok(Self { rots, trans })
    }

    /// Packs the frame into homogeneous form `(..., 4, 4)`.
    pub fn to_tensor_4x4(&self) -> Result<Tensor> {
        let trans = self.trans.unsqueeze(D::Minus1)?;
        let top = Tensor::cat(&[&self.rots, &trans], D::Minus1)?;
        let mut dims = top.dims().to_vec();
        let rank = dims.len();
        dims[rank - 2] = 1;
        let bottom = Tensor::new(&[0f32, 0., 0., 1.], top.device())?
            .to_dtype(top.dtype())?
            .broadcast_as(dims)?
            .contiguous()?;
        Tensor::cat(&[&top, &bottom], D::Minus2)
    }

    pub fn rots(&self) -> &Tensor {
        &self.rots
    }

    pub fn trans(&self) -> &Tensor {
        &self.trans
    }

    pub fn dtype(&self) -> DType {
        self.trans.dtype()
    }

    pub fn device(&self) -> &Device {
        self.trans.device()
    }

    /// Applies the transform to points of shape `(..., 3)`.
    pub fn apply(&self, points: &Tensor) -> Result<Tensor> {
        let p = points.unsqueeze(D::Minus1)?.contiguous()?;
        let rotated = self.rots.broadcast_matmul(&p)?.squeeze(D::Minus1)?;
        rotated.broadcast_add(&self.trans)
    }

    /// Composition `self * other`, applying `other` first.
    pub fn compose(&self, other: &Self) -> Result<Self> {
        let rots = self.rots.broadcast_matmul(&other.rots)?;
        let trans = self.apply(&other.trans)?;
        Ok(Self { rots, trans })
    }

    /// Composes with a bare rotation stack on the right.
    pub fn compose_rotation(&self, rots: &Tensor) -> Result<Self> {
        let rots = self.rots.broadcast_matmul(rots)?;
        Self::new(rots, self.trans.clone())
    }

    /// Inverse transform, relying on the rotations being orthonormal.
    pub fn invert(&self) -> Result<Self> {
        let inv_rots = self.rots.transpose(D::Minus2, D::Minus1)?;
        let inv_trans = inv_rots
            .broadcast_matmul(&self.trans.unsqueeze(D::Minus1)?.contiguous()?)?
            .squeeze(D::Minus1)?
            .neg()?;
        Ok(Self {
            rots: inv_rots,
            trans: inv_trans,
        })
    }
}

fn cross(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let ax = a.narrow(D::Minus1, 0, 1)?;
    let ay = a.narrow(D::Minus1, 1, 1)?;
    let az = a.narrow(D::Minus1, 2, 1)?;
    let bx = b.narrow(D::Minus1, 0, 1)?;
    let by = b.narrow(D::Minus1, 1, 1)?;
    let bz = b.narrow(D::Minus1, 2, 1)?;
    let cx = ((&ay * &bz)? - (&az * &by)?)?;
    let cy = ((&az * &bx)? - (&ax * &bz)?)?;
    let cz = ((&ax * &by)? - (&ay * &bx)?)?;
    Tensor::cat(&[&cx, &cy, &cz], D::Minus1)
}

/// Subtracts the mask-weighted mean translation from each frame stack in
/// `frames`, leaving rotations untouched. Frames are `(..., L, 4, 4)` packed
/// stacks sharing the `(..., L)` mask.
pub fn remove_center(frames: &[&Tensor], seq_mask: &Tensor, eps: f64) -> Result<Vec<Tensor>> {
    let mask = seq_mask.unsqueeze(D::Minus1)?;
    let denom = (mask.sum(D::Minus2)? + eps)?;
    frames
        .iter()
        .map(|f| {
            let f = Frame::from_tensor_4x4(f)?;
            let center = f
                .trans()
                .broadcast_mul(&mask)?
                .sum(D::Minus2)?
                .broadcast_div(&denom)?;
            let trans = f.trans().broadcast_sub(&center.unsqueeze(D::Minus2)?)?;
            Frame::new(f.rots().clone(), trans)?.to_tensor_4x4()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_from_3_points_idealized_backbone() -> Result<()> {
        let device = Device::Cpu;
        // Idealized residue: CA at the origin, C on the x axis, N in the xy
        // plane. Taking C as the negative-x point yields diag(-1, 1, -1).
        let n = Tensor::new(&[-0.5250f32, 1.3630, 0.0], &device)?;
        let ca = Tensor::new(&[0.0f32, 0.0, 0.0], &device)?;
        let c = Tensor::new(&[1.5260f32, 0.0, 0.0], &device)?;
        let frame = Frame::from_3_points(&c, &ca, &n, DEFAULT_FRAME_EPS)?;
        let rots = frame.rots().flatten_all()?.to_vec1::<f32>()?;
        assert_close(
            &rots,
            &[-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            1e-4,
        );
        let trans = frame.trans().to_vec1::<f32>()?;
        assert_close(&trans, &[0.0, 0.0, 0.0], 1e-6);
        Ok(())
    }

    #[test]
    fn test_from_3_points_translation_invariant_rotation() -> Result<()> {
        let device = Device::Cpu;
        let shift = [10.0f32, -2.0, 5.0];
        let n = Tensor::new(&[-0.5250f32 + shift[0], 1.3630 + shift[1], shift[2]], &device)?;
        let ca = Tensor::new(&shift, &device)?;
        let c = Tensor::new(&[1.5260f32 + shift[0], shift[1], shift[2]], &device)?;
        let frame = Frame::from_3_points(&c, &ca, &n, DEFAULT_FRAME_EPS)?;
        let rots = frame.rots().flatten_all()?.to_vec1::<f32>()?;
        assert_close(
            &rots,
            &[-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            1e-4,
        );
        let trans = frame.trans().to_vec1::<f32>()?;
        assert_close(&trans, &shift, 1e-6);
        Ok(())
    }

    #[test]
    fn test_apply_rotates_then_translates() -> Result<()> {
        let device = Device::Cpu;
        // 90 degree rotation about z plus a shift along x.
        let rots = Tensor::new(&[[0.0f32, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], &device)?;
        let trans = Tensor::new(&[5.0f32, 0.0, 0.0], &device)?;
        let frame = Frame::new(rots, trans)?;
        let p = Tensor::new(&[1.0f32, 0.0, 0.0], &device)?;
        let out = frame.apply(&p)?.to_vec1::<f32>()?;
        assert_close(&out, &[5.0, 1.0, 0.0], 1e-5);
        Ok(())
    }

    #[test]
    fn test_invert_round_trip() -> Result<()> {
        let device = Device::Cpu;
        let rots = Tensor::new(&[[0.0f32, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], &device)?;
        let trans = Tensor::new(&[1.0f32, 2.0, 3.0], &device)?;
        let frame = Frame::new(rots, trans)?;
        let ident = frame.compose(&frame.invert()?)?;
        let rots = ident.rots().flatten_all()?.to_vec1::<f32>()?;
        assert_close(&rots, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], 1e-5);
        let trans = ident.trans().to_vec1::<f32>()?;
        assert_close(&trans, &[0.0, 0.0, 0.0], 1e-5);
        Ok(())
    }

    #[test]
    fn test_tensor_4x4_round_trip() -> Result<()> {
        let device = Device::Cpu;
        let rots = Tensor::new(&[[0.0f32, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], &device)?;
        let trans = Tensor::new(&[1.0f32, 2.0, 3.0], &device)?;
        let packed = Frame::new(rots, trans)?.to_tensor_4x4()?;
        assert_eq!(packed.dims(), &[4, 4]);
        let rows = packed.to_vec2::<f32>()?;
        assert_close(&rows[0], &[0.0, -1.0, 0.0, 1.0], 1e-6);
        assert_close(&rows[3], &[0.0, 0.0, 0.0, 1.0], 1e-6);
        let frame = Frame::from_tensor_4x4(&packed)?;
        let trans = frame.trans().to_vec1::<f32>()?;
        assert_close(&trans, &[1.0, 2.0, 3.0], 1e-6);
        Ok(())
    }

    #[test]
    fn test_identity_batched() -> Result<()> {
        let device = Device::Cpu;
        let frame = Frame::identity(&[2, 5], DType::F32, &device)?;
        assert_eq!(frame.rots().dims(), &[2, 5, 3, 3]);
        assert_eq!(frame.trans().dims(), &[2, 5, 3]);
        let p = Tensor::new(&[1.0f32, 2.0, 3.0], &device)?
            .broadcast_as((2, 5, 3))?
            .contiguous()?;
        let out = frame.apply(&p)?;
        let got = out.i((1, 4))?.to_vec1::<f32>()?;
        assert_close(&got, &[1.0, 2.0, 3.0], 1e-6);
        Ok(())
    }

    #[test]
    fn test_new_rejects_mismatched_batches() {
        let device = Device::Cpu;
        let rots = Tensor::zeros((4, 3, 3), DType::F32, &device).unwrap();
        let trans = Tensor::zeros((5, 3), DType::F32, &device).unwrap();
        assert!(Frame::new(rots, trans).is_err());
    }

    #[test]
    fn test_remove_center_masked_mean() -> Result<()> {
        let device = Device::Cpu;
        let f0 = Frame::identity(&[2], DType::F32, &device)?;
        let trans = Tensor::new(&[[1.0f32, 0.0, 0.0], [3.0, 0.0, 0.0]], &device)?;
        let packed = Frame::new(f0.rots().clone(), trans)?.to_tensor_4x4()?;

        let mask = Tensor::new(&[1.0f32, 1.0], &device)?;
        let centered = remove_center(&[&packed], &mask, 1e-12)?;
        let t = Frame::from_tensor_4x4(&centered[0])?.trans().to_vec2::<f32>()?;
        assert_close(&t[0], &[-1.0, 0.0, 0.0], 1e-5);
        assert_close(&t[1], &[1.0, 0.0, 0.0], 1e-5);

        // With only the first residue observed, it becomes the center.
        let mask = Tensor::new(&[1.0f32, 0.0], &device)?;
        let centered = remove_center(&[&packed], &mask, 1e-12)?;
        let t = Frame::from_tensor_4x4(&centered[0])?.trans().to_vec2::<f32>()?;
        assert_close(&t[0], &[0.0, 0.0, 0.0], 1e-5);
        assert_close(&t[1], &[2.0, 0.0, 0.0], 1e-5);
        Ok(())
    }
}
