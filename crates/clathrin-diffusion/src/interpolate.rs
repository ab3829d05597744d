//! Frame-path interpolation and forward-process displacement summaries.
//!
//! Paths run the geodesic on SO(3) for rotations and a straight line for
//! translations, materialized as `num_steps + 1` homogeneous frame stacks.

use candle_core::{DType, Device, Result, Tensor, D};
use clathrin_core::geometry::so3;
use clathrin_core::Frame;

/// Splits homogeneous frames `(..., L, 4, 4)` into rotations `(..., L, 3, 3)`
/// and translations `(..., L, 3)`.
pub fn frames_to_r_p(frames: &Tensor) -> Result<(Tensor, Tensor)> {
    let f = Frame::from_tensor_4x4(frames)?;
    Ok((f.rots().clone(), f.trans().clone()))
}

/// Packs rotation and translation stacks back into homogeneous frames.
pub fn r_p_to_frames(rots: &Tensor, trans: &Tensor) -> Result<Tensor> {
    Frame::new(rots.clone(), trans.clone())?.to_tensor_4x4()
}

/// Linear interpolation between two translation stacks.
pub fn interpolate_positions(pos1: &Tensor, pos2: &Tensor, fraction: f64) -> Result<Tensor> {
    let a = (pos1 * (1.0 - fraction))?;
    let b = (pos2 * fraction)?;
    &a + &b
}

/// Interpolates between two frame stacks, returning `num_steps + 1` stacks
/// whose first entry is `ft_0` and last is `ft_1`. Translations move
/// linearly; rotations follow `r0 @ Exp(fraction * Log(r0^T @ r1))`.
pub fn interpolate_frames(ft_0: &Tensor, ft_1: &Tensor, num_steps: usize) -> Result<Vec<Tensor>> {
    if num_steps == 0 {
        candle_core::bail!("interpolation needs at least one step");
    }
    let (r_0, p_0) = frames_to_r_p(ft_0)?;
    let (r_1, p_1) = frames_to_r_p(ft_1)?;

    let mut path = Vec::with_capacity(num_steps + 1);
    for i in 0..=num_steps {
        let fraction = i as f64 / num_steps as f64;
        let p = interpolate_positions(&p_0, &p_1, fraction)?;
        let r = so3::interpolate_rotations(&r_0, &r_1, fraction)?;
        path.push(r_p_to_frames(&r, &p)?);
    }
    Ok(path)
}

/// Rotation angle and translation displacement of `f_t` relative to `f_0`
/// under a forward process with variance `gamma`.
///
/// Frames are `(L, 4, 4)`; a generation mask keeps only rows where it is
/// positive. Returns the per-residue angle `(L,)` of `Log(r_0^T @ r_t)` and
/// the displacement `p_t - sqrt(gamma) * p_0` as `(L, 3)`.
pub fn compute_theta_translation(
    f_t: &Tensor,
    f_0: &Tensor,
    gamma: f64,
    gen_frame_mask: Option<&Tensor>,
) -> Result<(Tensor, Tensor)> {
    let (f_t, f_0) = match gen_frame_mask {
        Some(mask) => {
            let mask = mask
                .to_dtype(DType::F32)?
                .to_device(&Device::Cpu)?
                .contiguous()?
                .flatten_all()?
                .to_vec1::<f32>()?;
            if mask.len() != f_t.dim(0)? {
                candle_core::bail!(
                    "generation mask has {} entries for {} frames",
                    mask.len(),
                    f_t.dim(0)?
                );
            }
            let keep: Vec<u32> = mask
                .iter()
                .enumerate()
                .filter(|(_, m)| **m > 0.0)
                .map(|(i, _)| i as u32)
                .collect();
            let n_keep = keep.len();
            let idx = Tensor::from_vec(keep, n_keep, f_t.device())?;
            (f_t.index_select(&idx, 0)?, f_0.index_select(&idx, 0)?)
        }
        None => (f_t.clone(), f_0.clone()),
    };

    let (r_0, p_0) = frames_to_r_p(&f_0)?;
    let (r_t, p_t) = frames_to_r_p(&f_t)?;
    let rel = r_0
        .transpose(D::Minus2, D::Minus1)?
        .contiguous()?
        .broadcast_matmul(&r_t)?;
    let (theta, _axis) = so3::theta_and_axis(&so3::log(&rel)?)?;
    let translation = (&p_t - &(p_0 * gamma.sqrt())?)?;
    Ok((theta, translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EYE: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn rz(theta: f32) -> [[f32; 3]; 3] {
        [
            [theta.cos(), -theta.sin(), 0.0],
            [theta.sin(), theta.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ]
    }

    fn frame_stack(rots: &[[[f32; 3]; 3]], trans: &[[f32; 3]]) -> Result<Tensor> {
        let device = Device::Cpu;
        let l = rots.len();
        let r_flat: Vec<f32> = rots.iter().flatten().flatten().copied().collect();
        let r = Tensor::from_vec(r_flat, (l, 3, 3), &device)?;
        let p_flat: Vec<f32> = trans.iter().flatten().copied().collect();
        let p = Tensor::from_vec(p_flat, (l, 3), &device)?;
        r_p_to_frames(&r, &p)
    }

    fn assert_close(a: &Tensor, b: &Tensor, tol: f32) -> Result<()> {
        let a = a.flatten_all()?.to_vec1::<f32>()?;
        let b = b.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
        Ok(())
    }

    #[test]
    fn test_path_endpoints_and_count() -> Result<()> {
        let a = frame_stack(&[EYE, EYE], &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])?;
        let b = frame_stack(&[rz(FRAC_PI_2), EYE], &[[2.0, 4.0, 6.0], [1.0, 8.0, 0.0]])?;

        let path = interpolate_frames(&a, &b, 4)?;
        assert_eq!(path.len(), 5);
        assert_close(&path[0], &a, 1e-5)?;
        assert_close(&path[4], &b, 1e-5)?;
        Ok(())
    }

    #[test]
    fn test_midpoint_is_halfway() -> Result<()> {
        let a = frame_stack(&[EYE], &[[0.0, 0.0, 0.0]])?;
        let b = frame_stack(&[rz(FRAC_PI_2)], &[[2.0, 4.0, 6.0]])?;
        let path = interpolate_frames(&a, &b, 2)?;

        let mid = frame_stack(&[rz(FRAC_PI_2 / 2.0)], &[[1.0, 2.0, 3.0]])?;
        assert_close(&path[1], &mid, 1e-5)?;
        Ok(())
    }

    #[test]
    fn test_zero_steps_rejected() -> Result<()> {
        let a = frame_stack(&[EYE], &[[0.0, 0.0, 0.0]])?;
        assert!(interpolate_frames(&a, &a, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_split_and_pack_round_trip() -> Result<()> {
        let f = frame_stack(&[rz(0.3)], &[[1.0, 2.0, 3.0]])?;
        let (r, p) = frames_to_r_p(&f)?;
        assert_eq!(r.dims(), &[1, 3, 3]);
        assert_eq!(p.dims(), &[1, 3]);
        assert_close(&r_p_to_frames(&r, &p)?, &f, 1e-7)?;
        Ok(())
    }

    #[test]
    fn test_theta_translation_reference_values() -> Result<()> {
        let f_0 = frame_stack(&[EYE, EYE], &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]])?;
        let f_t = frame_stack(&[rz(FRAC_PI_2), EYE], &[[3.0, 0.0, 0.0], [1.0, 1.0, 1.0]])?;

        let (theta, translation) = compute_theta_translation(&f_t, &f_0, 1.0, None)?;
        let theta = theta.to_vec1::<f32>()?;
        assert!((theta[0] - FRAC_PI_2).abs() < 1e-4);
        assert!(theta[1].abs() < 1e-4);

        let translation = translation.to_vec2::<f32>()?;
        assert_eq!(translation[0], [3.0, 0.0, 0.0]);
        assert_eq!(translation[1], [0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_theta_translation_row_filter() -> Result<()> {
        let f_0 = frame_stack(&[EYE, EYE], &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]])?;
        let f_t = frame_stack(&[rz(FRAC_PI_2), EYE], &[[3.0, 0.0, 0.0], [1.0, 1.0, 1.0]])?;
        let mask = Tensor::from_vec(vec![0.0f32, 1.0], 2, &Device::Cpu)?;

        let (theta, translation) = compute_theta_translation(&f_t, &f_0, 4.0, Some(&mask))?;
        assert_eq!(theta.dims(), &[1]);
        assert_eq!(translation.dims(), &[1, 3]);
        // gamma = 4 doubles the reference translation before subtraction.
        let translation = translation.to_vec2::<f32>()?;
        assert_eq!(translation[0], [-1.0, -1.0, -1.0]);
        Ok(())
    }

    #[test]
    fn test_mask_length_mismatch_rejected() -> Result<()> {
        let f = frame_stack(&[EYE], &[[0.0, 0.0, 0.0]])?;
        let mask = Tensor::from_vec(vec![1.0f32, 1.0], 2, &Device::Cpu)?;
        assert!(compute_theta_translation(&f, &f, 1.0, Some(&mask)).is_err());
        Ok(())
    }
}
