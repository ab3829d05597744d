//! Exponential and logarithm maps on SO(3), plus geodesic interpolation
//! between rotation stacks.
//!
//! Rotations are `(..., 3, 3)` tensors; scaled-axis vectors are `(..., 3)`
//! tensors whose norm is the rotation angle. The maps round-trip through
//! nalgebra on the host, so they stay exact at the branch cut near pi where
//! a skew-part readout would degenerate.

use candle_core::{DType, Device, Result, Tensor, D};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

fn host_f32(x: &Tensor) -> Result<Vec<f32>> {
    x.to_dtype(DType::F32)?
        .to_device(&Device::Cpu)?
        .contiguous()?
        .flatten_all()?
        .to_vec1::<f32>()
}

/// Logarithm map: rotation matrices `(..., 3, 3)` to scaled-axis vectors
/// `(..., 3)`.
pub fn log(rots: &Tensor) -> Result<Tensor> {
    let dims = rots.dims().to_vec();
    let rank = dims.len();
    if rank < 2 || dims[rank - 1] != 3 || dims[rank - 2] != 3 {
        candle_core::bail!("log expects (..., 3, 3) rotations, got {dims:?}")
    }
    let flat = host_f32(rots)?;
    let mut out = Vec::with_capacity(flat.len() / 3);
    for m in flat.chunks_exact(9) {
        #[rustfmt::skip]
        let mat = Matrix3::new(
            m[0], m[1], m[2],
            m[3], m[4], m[5],
            m[6], m[7], m[8],
        );
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(mat));
        let v = q.scaled_axis();
        out.extend_from_slice(&[v.x, v.y, v.z]);
    }
    let mut shape = dims;
    shape.pop();
    Tensor::from_vec(out, shape, rots.device())
}

/// Exponential map: scaled-axis vectors `(..., 3)` to rotation matrices
/// `(..., 3, 3)`.
pub fn exp(omega: &Tensor) -> Result<Tensor> {
    let dims = omega.dims().to_vec();
    let rank = dims.len();
    if rank < 1 || dims[rank - 1] != 3 {
        candle_core::bail!("exp expects (..., 3) scaled-axis vectors, got {dims:?}")
    }
    let flat = host_f32(omega)?;
    let mut out = Vec::with_capacity(flat.len() * 3);
    for v in flat.chunks_exact(3) {
        let rot = Rotation3::from_scaled_axis(Vector3::new(v[0], v[1], v[2]));
        let m = rot.matrix();
        for r in 0..3 {
            for c in 0..3 {
                out.push(m[(r, c)]);
            }
        }
    }
    let mut shape = dims;
    shape.push(3);
    Tensor::from_vec(out, shape, omega.device())
}

/// Splits scaled-axis vectors into angles `(...,)` and unit axes `(..., 3)`.
pub fn theta_and_axis(omega: &Tensor) -> Result<(Tensor, Tensor)> {
    let theta = omega.sqr()?.sum(D::Minus1)?.sqrt()?;
    let axis = omega.broadcast_div(&(theta.unsqueeze(D::Minus1)? + 1e-12)?)?;
    Ok((theta, axis))
}

/// Geodesic interpolation from `rot1` toward `rot2` by `fraction` in [0, 1].
pub fn interpolate_rotations(rot1: &Tensor, rot2: &Tensor, fraction: f64) -> Result<Tensor> {
    let rel = rot1
        .transpose(D::Minus2, D::Minus1)?
        .contiguous()?
        .broadcast_matmul(rot2)?;
    let step = exp(&(log(&rel)? * fraction)?)?;
    rot1.broadcast_matmul(&step)
}
