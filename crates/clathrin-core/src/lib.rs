//! # clathrin-core
//!
//! Geometry primitives and residue-level plumbing shared by the clathrin
//! crates.
//!
//! __clathrin-core__ provides:
//! * Batched rigid transforms over candle tensors ([`Frame`])
//! * Exponential/logarithm maps and geodesic interpolation on SO(3)
//! * Kabsch alignment between paired point sets
//! * Backbone frames from atom coordinates and back, including carbonyl
//!   oxygen placement from virtual frames
//! * Residue constants: the residue-type alphabet, the 37-slot heavy-atom
//!   layout and idealized backbone geometry
//! * The string-keyed feature mapping passed between loaders, the diffusion
//!   pipeline and structure export ([`FeatureMap`])

pub mod backbone;
mod features;
pub mod geometry;
pub mod residue;

pub use self::features::{to_host_array, FeatureError, FeatureMap, FeatureResult, HostArray};
pub use self::geometry::rigid::{remove_center, Frame, FrameError, DEFAULT_FRAME_EPS};
