pub mod diffuse;
pub mod featurize;
pub mod interpolate;
