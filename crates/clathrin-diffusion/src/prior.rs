//! Seeded prior draws over frames and torsions, and the time-conditioned
//! feature builder that mixes them with ground truth.
//!
//! The builder takes an immutable feature mapping and returns a new one with
//! `noisy_frames`, `noisy_quats`, `time_feat` and (when torsion noising is
//! on) `noisy_chi_sin_cos` merged in. Randomness flows through an explicit
//! generator derived from a `(seed, salt, key)` triple, so equal triples
//! reproduce draws exactly and unrelated call sites stay decoupled.

use crate::configs::PriorConfig;
use candle_core::{DType, Device, Result, Tensor, D};
use clathrin_core::residue::NUM_CHI_ANGLES;
use clathrin_core::{FeatureMap, FeatureResult};
use log::debug;
use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

/// Deterministic generator for a `(seed, salt, key)` triple. Equal triples
/// give equal streams; changing any component gives an unrelated stream.
pub fn prior_rng(seed: u64, salt: u64, key: &str) -> StdRng {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    salt.hash(&mut hasher);
    key.hash(&mut hasher);
    StdRng::seed_from_u64(hasher.finish())
}

/// Draws fully noised frame and torsion samples for the diffusion prior.
pub trait Diffuser {
    /// Returns `(frames, chi_angles)` shaped `batch + (seq_len, 4, 4)` and
    /// `batch + (seq_len, NUM_CHI_ANGLES)`, angles in radians.
    fn prior(
        &self,
        batch_dims: &[usize],
        seq_len: usize,
        dtype: DType,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<(Tensor, Tensor)>;
}

/// Uniform rotations, Gaussian translations, uniform torsion angles.
#[derive(Debug, Clone)]
pub struct IsotropicPrior {
    /// Standard deviation of prior translations, in angstroms.
    pub trans_scale: f64,
}

impl Default for IsotropicPrior {
    fn default() -> Self {
        Self { trans_scale: 10.0 }
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller; the lower bound keeps ln() finite.
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn uniform_rotation(rng: &mut StdRng) -> Rotation3<f64> {
    // A normalized Gaussian quaternion is uniform on SO(3).
    loop {
        let q = Quaternion::new(
            standard_normal(rng),
            standard_normal(rng),
            standard_normal(rng),
            standard_normal(rng),
        );
        if q.norm() > 1e-8 {
            return UnitQuaternion::from_quaternion(q).to_rotation_matrix();
        }
    }
}

impl Diffuser for IsotropicPrior {
    fn prior(
        &self,
        batch_dims: &[usize],
        seq_len: usize,
        dtype: DType,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<(Tensor, Tensor)> {
        let count: usize = batch_dims.iter().product::<usize>() * seq_len;

        let mut frames = Vec::with_capacity(count * 16);
        for _ in 0..count {
            let rot = uniform_rotation(rng);
            let m = rot.matrix();
            let t = [
                standard_normal(rng) * self.trans_scale,
                standard_normal(rng) * self.trans_scale,
                standard_normal(rng) * self.trans_scale,
            ];
            for row in 0..3 {
                for col in 0..3 {
                    frames.push(m[(row, col)] as f32);
                }
                frames.push(t[row] as f32);
            }
            frames.extend([0.0, 0.0, 0.0, 1.0]);
        }
        let mut frame_shape = batch_dims.to_vec();
        frame_shape.extend([seq_len, 4, 4]);
        let frames = Tensor::from_vec(frames, frame_shape, device)?.to_dtype(dtype)?;

        let mut angles = Vec::with_capacity(count * NUM_CHI_ANGLES);
        for _ in 0..count * NUM_CHI_ANGLES {
            angles.push(rng.gen_range(-PI..PI) as f32);
        }
        let mut chi_shape = batch_dims.to_vec();
        chi_shape.extend([seq_len, NUM_CHI_ANGLES]);
        let angles = Tensor::from_vec(angles, chi_shape, device)?.to_dtype(dtype)?;

        Ok((frames, angles))
    }
}

/// Radial-basis encoding of a scalar feature over `count` centers spanning
/// `[min, max]`, with sigma `(max - min) / count`.
pub fn rbf_kernel(x: &Tensor, count: usize, min: f64, max: f64) -> Result<Tensor> {
    let sigma = (max - min) / count as f64;
    let step = (count - 1).max(1) as f64;
    let centers: Vec<f32> = (0..count)
        .map(|i| (min + (max - min) * i as f64 / step) as f32)
        .collect();
    let centers = Tensor::from_vec(centers, count, x.device())?.to_dtype(x.dtype())?;
    let z = (x.unsqueeze(D::Minus1)?.broadcast_sub(&centers)? / sigma)?;
    z.sqr()?.neg()?.exp()
}

/// Stacks sin/cos pairs onto a trailing axis.
pub fn angles_to_sin_cos(angles: &Tensor) -> Result<Tensor> {
    Tensor::stack(&[angles.sin()?, angles.cos()?], D::Minus1)
}

/// Recovers angles from trailing `(sin, cos)` pairs.
pub fn sin_cos_to_angles(sin_cos: &Tensor) -> Result<Tensor> {
    let mut dims = sin_cos.dims().to_vec();
    if dims.last() != Some(&2) {
        candle_core::bail!("expected trailing (sin, cos) pairs, got shape {dims:?}");
    }
    let host = sin_cos
        .to_dtype(DType::F32)?
        .to_device(&Device::Cpu)?
        .contiguous()?
        .flatten_all()?
        .to_vec1::<f32>()?;
    let angles: Vec<f32> = host.chunks_exact(2).map(|p| p[0].atan2(p[1])).collect();
    dims.pop();
    Tensor::from_vec(angles, dims, sin_cos.device())?.to_dtype(sin_cos.dtype())
}

/// Replaces NaN entries with the given value.
pub fn nan_to_num(x: &Tensor, value: f64) -> Result<Tensor> {
    let is_nan = x.ne(x)?;
    let fill = Tensor::full(value, x.shape(), x.device())?.to_dtype(x.dtype())?;
    is_nan.where_cond(&fill, x)
}

/// Rotation of each `(..., 4, 4)` frame as a unit quaternion `(w, x, y, z)`
/// canonicalized to `w >= 0`.
pub fn rotation_quaternions(frames: &Tensor) -> Result<Tensor> {
    let dims = frames.dims().to_vec();
    let rank = dims.len();
    if rank < 2 || dims[rank - 1] != 4 || dims[rank - 2] != 4 {
        candle_core::bail!("expected (..., 4, 4) frames, got shape {dims:?}");
    }
    let host = frames
        .to_dtype(DType::F32)?
        .to_device(&Device::Cpu)?
        .contiguous()?
        .flatten_all()?
        .to_vec1::<f32>()?;

    let mut quats = Vec::with_capacity(host.len() / 4);
    for chunk in host.chunks_exact(16) {
        let m = Matrix3::new(
            chunk[0] as f64,
            chunk[1] as f64,
            chunk[2] as f64,
            chunk[4] as f64,
            chunk[5] as f64,
            chunk[6] as f64,
            chunk[8] as f64,
            chunk[9] as f64,
            chunk[10] as f64,
        );
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m));
        let q = if q.w < 0.0 { -q.into_inner() } else { q.into_inner() };
        quats.extend([q.w as f32, q.i as f32, q.j as f32, q.k as f32]);
    }
    let mut shape = dims;
    shape.truncate(rank - 2);
    shape.push(4);
    Tensor::from_vec(quats, shape, frames.device())?.to_dtype(frames.dtype())
}

/// Broadcast `mask > 0 ? on_true : on_false` at the shape of `on_false`.
fn select(mask: &Tensor, on_true: &Tensor, on_false: &Tensor) -> Result<Tensor> {
    let shape = on_false.shape();
    let cond = mask.gt(0.0)?.broadcast_as(shape)?.contiguous()?;
    let on_true = on_true.broadcast_as(shape)?.contiguous()?;
    cond.where_cond(&on_true, on_false)
}

/// Per-residue diffusion time: the broadcast scalar `t`, zeroed outside the
/// generation region, then forced to 1 where the frame is unknown. The
/// unknown-frame override wins when a residue is in both sets.
pub fn residue_time(
    t: &Tensor,
    frame_gen_mask: &Tensor,
    frame_mask: &Tensor,
) -> Result<Tensor> {
    let shape = frame_mask.shape();
    let t = t.unsqueeze(D::Minus1)?.broadcast_as(shape)?.contiguous()?;
    let zeros = t.zeros_like()?;
    let ones = t.ones_like()?;
    let t = frame_gen_mask.gt(0.0)?.where_cond(&t, &zeros)?;
    frame_mask.gt(0.0)?.where_cond(&t, &ones)
}

/// Builds the noisy, time-conditioned features fed to the denoising network.
///
/// Requires `frame_mask`, `frame_gen_mask`, `diffusion_t` and
/// `true_frame_tensor`; with torsions enabled also `chi_angles_sin_cos` and
/// `chi_mask`. Residues whose frame is known take the prior draw for
/// `noisy_frames`, residues with unknown frames keep the stored frame and are
/// pushed to time 1 instead.
pub fn build_prior_features(
    features: &FeatureMap,
    diffuser: &dyn Diffuser,
    seed: u64,
    config: &PriorConfig,
) -> FeatureResult<FeatureMap> {
    let frame_mask = features.get("frame_mask")?;
    let t = features.get("diffusion_t")?;
    let frame_gen_mask = features.get("frame_gen_mask")?;
    let f_0 = features.get("true_frame_tensor")?;
    let seq_len = frame_mask.dim(D::Minus1)?;

    let mut rng = prior_rng(seed, 0, "prior");
    let (f_prior, a_prior) =
        diffuser.prior(t.dims(), seq_len, f_0.dtype(), f_0.device(), &mut rng)?;

    let frame_sel = frame_mask.unsqueeze(D::Minus1)?.unsqueeze(D::Minus1)?;
    let noisy_frames = select(&frame_sel, &f_prior, f_0)?;

    let mut out = features.clone();
    out.insert("noisy_frames", noisy_frames.clone());

    if config.chi_enabled {
        let tor_0 = features.get("chi_angles_sin_cos")?;
        let chi_mask = features.get("chi_mask")?;
        let a_0 = sin_cos_to_angles(tor_0)?;
        let a_t = select(&frame_mask.unsqueeze(D::Minus1)?, &a_prior, &a_0)?;
        let noisy_chi = angles_to_sin_cos(&a_t)?;
        let noisy_chi = nan_to_num(&noisy_chi, 0.0)?;
        let noisy_chi = noisy_chi.broadcast_mul(&chi_mask.unsqueeze(D::Minus1)?)?;
        out.insert("noisy_chi_sin_cos", noisy_chi);
    }

    out.insert("noisy_quats", rotation_quaternions(&noisy_frames)?);

    let residue_t = residue_time(t, frame_gen_mask, frame_mask)?;
    out.insert("time_feat", rbf_kernel(&residue_t, config.d_time, 0.0, 1.0)?);

    debug!("prior features for {seq_len} residues, seed {seed}");
    Ok(out)
}
