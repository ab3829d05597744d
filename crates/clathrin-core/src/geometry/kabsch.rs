//! Kabsch alignment between paired point sets.

use candle_core::{DType, Device, Result, Tensor};
use nalgebra::Matrix3;

fn to_points(x: &Tensor) -> Result<Vec<[f64; 3]>> {
    let dims = x.dims();
    if dims.len() != 2 || dims[1] != 3 {
        candle_core::bail!("expected an (N, 3) point set, got {dims:?}")
    }
    let rows = x
        .to_dtype(DType::F32)?
        .to_device(&Device::Cpu)?
        .to_vec2::<f32>()?;
    Ok(rows
        .iter()
        .map(|r| [r[0] as f64, r[1] as f64, r[2] as f64])
        .collect())
}

/// Optimal rotation carrying the point set `p` onto `q` in the least-squares
/// sense. Both sets are `(N, 3)`, assumed centered, and points map as row
/// vectors: the aligned set is `p @ R`.
///
/// The reflection case is resolved by flipping the last left singular vector,
/// so the result is always a proper rotation.
pub fn kabsch(p: &Tensor, q: &Tensor) -> Result<Tensor> {
    let ps = to_points(p)?;
    let qs = to_points(q)?;
    if ps.len() != qs.len() {
        candle_core::bail!("point sets differ in length: {} vs {}", ps.len(), qs.len())
    }
    // Covariance C = P^T Q, accumulated in f64.
    let mut c = Matrix3::<f64>::zeros();
    for (pi, qi) in ps.iter().zip(&qs) {
        for a in 0..3 {
            for b in 0..3 {
                c[(a, b)] += pi[a] * qi[b];
            }
        }
    }
    let svd = c.svd(true, true);
    let (Some(mut v), Some(w)) = (svd.u, svd.v_t) else {
        candle_core::bail!("singular value decomposition of the covariance failed")
    };
    if v.determinant() * w.determinant() < 0.0 {
        for r in 0..3 {
            v[(r, 2)] = -v[(r, 2)];
        }
    }
    let u = v * w;
    let mut flat = Vec::with_capacity(9);
    for r in 0..3 {
        for col in 0..3 {
            flat.push(u[(r, col)] as f32);
        }
    }
    Tensor::from_vec(flat, (3, 3), p.device())?.to_dtype(p.dtype())
}

/// Rotates `p` onto `q`, returning the rotated points and the rotation used.
pub fn kabsch_rotate(p: &Tensor, q: &Tensor) -> Result<(Tensor, Tensor)> {
    let u = kabsch(p, q)?;
    let rotated = p.matmul(&u)?;
    Ok((rotated, u))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{:?} != {:?}", a, b);
        }
    }

    fn centered_points(device: &Device) -> Result<Tensor> {
        Tensor::new(
            &[
                [1.0f32, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [-1.0, -1.0, -1.0],
            ],
            device,
        )
    }

    #[test]
    fn test_kabsch_recovers_rotation() -> Result<()> {
        let device = Device::Cpu;
        let p = centered_points(&device)?;
        let rot = Tensor::new(
            &[[0.0f32, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            &device,
        )?;
        let q = p.matmul(&rot)?;
        let u = kabsch(&p, &q)?;
        assert_close(
            &u.flatten_all()?.to_vec1::<f32>()?,
            &rot.flatten_all()?.to_vec1::<f32>()?,
            1e-4,
        );
        Ok(())
    }

    #[test]
    fn test_kabsch_rotate_aligns() -> Result<()> {
        let device = Device::Cpu;
        let p = centered_points(&device)?;
        let rot = Tensor::new(
            &[[0.0f32, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &device,
        )?;
        let q = p.matmul(&rot)?;
        let (aligned, u) = kabsch_rotate(&p, &q)?;
        assert_close(
            &aligned.flatten_all()?.to_vec1::<f32>()?,
            &q.flatten_all()?.to_vec1::<f32>()?,
            1e-4,
        );
        assert_eq!(u.dims(), &[3, 3]);
        Ok(())
    }

    #[test]
    fn test_kabsch_rejects_reflection() -> Result<()> {
        let device = Device::Cpu;
        let p = centered_points(&device)?;
        let mirror = Tensor::new(
            &[[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],
            &device,
        )?;
        let q = p.matmul(&mirror)?;
        let u = kabsch(&p, &q)?.to_vec2::<f32>()?;
        let det = u[0][0] * (u[1][1] * u[2][2] - u[1][2] * u[2][1])
            - u[0][1] * (u[1][0] * u[2][2] - u[1][2] * u[2][0])
            + u[0][2] * (u[1][0] * u[2][1] - u[1][1] * u[2][0]);
        assert!(det > 0.99, "expected a proper rotation, det = {det}");
        Ok(())
    }

    #[test]
    fn test_kabsch_shape_errors() {
        let device = Device::Cpu;
        let p = Tensor::zeros((4, 2), DType::F32, &device).unwrap();
        let q = Tensor::zeros((4, 3), DType::F32, &device).unwrap();
        assert!(kabsch(&p, &q).is_err());

        let p = Tensor::zeros((3, 3), DType::F32, &device).unwrap();
        assert!(kabsch(&p, &q).is_err());
    }
}
