//! Resampling of view images into output coordinates.

pub mod distance;
pub mod interpolation;
pub mod transformed;

pub use distance::DistanceView;
pub use interpolation::{interpolate, is_inside, sample_linear, sample_nearest, Interpolation};
pub use transformed::TransformedView;
