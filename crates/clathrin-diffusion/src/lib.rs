//! # clathrin-diffusion
//!
//! Time-conditioned diffusion features over rigid backbone frames:
//!
//! - geodesic frame-path interpolation and displacement summaries
//! - seeded prior draws over SO(3) x R3 and side-chain torsions
//! - the masked, RBF-encoded time features fed to a denoising network
//! - generation-region mask parsing and JSON job configuration

pub mod configs;
pub mod interpolate;
pub mod masks;
pub mod prior;

pub use configs::{ConfigError, JobConfig, PriorConfig};
pub use interpolate::{
    compute_theta_translation, frames_to_r_p, interpolate_frames, interpolate_positions,
    r_p_to_frames,
};
pub use masks::{gen_region_mask, make_mask, MaskError};
pub use prior::{
    angles_to_sin_cos, build_prior_features, nan_to_num, prior_rng, rbf_kernel, residue_time,
    rotation_quaternions, sin_cos_to_angles, Diffuser, IsotropicPrior,
};
