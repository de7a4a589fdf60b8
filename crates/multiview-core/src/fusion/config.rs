use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_ALPHA, DEFAULT_CONTROL_POINT_SPACING, DEFAULT_MIN_REFERENCE_POINTS};
use crate::deform::{CellBlend, GridParams};
use crate::error::{FusionError, Result};
use crate::sample::Interpolation;
use crate::view::ViewId;
use crate::weights::WeightingConfig;

/// How the non-rigid correction is evaluated at output coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonRigidMode {
    /// Fit on a regular lattice once, blend between nodes on read.
    #[default]
    Grid,
    /// Fit at every queried coordinate. Exact but slow.
    Direct,
}

impl std::fmt::Display for NonRigidMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid => write!(f, "Grid"),
            Self::Direct => write!(f, "Direct"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Views that contribute image data. Empty means all views.
    pub views_to_fuse: Vec<ViewId>,
    /// Views whose landmarks define the reference points. Empty means all
    /// views.
    pub views_to_use: Vec<ViewId>,
    /// Landmark labels to build correspondences from.
    pub labels: Vec<String>,
    pub weighting: WeightingConfig,
    /// Distance between deformation grid nodes in output pixels, (x, y, z).
    pub control_point_spacing: [u32; 3],
    /// Locality of the moving least squares fit. Smaller is more local.
    pub alpha: f64,
    pub interpolation: Interpolation,
    /// Output downsampling factor, `None` for full resolution.
    pub downsampling: Option<f64>,
    /// Output the distance between rigid and non-rigid mapping instead of
    /// image data.
    pub display_distances: bool,
    pub cell_blend: CellBlend,
    /// Views with fewer reference points keep their rigid registration.
    pub min_reference_points: usize,
    pub mode: NonRigidMode,
    /// Value of output voxels no view contributes to.
    pub background: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            views_to_fuse: Vec::new(),
            views_to_use: Vec::new(),
            labels: vec!["beads".to_string()],
            weighting: WeightingConfig::default(),
            control_point_spacing: DEFAULT_CONTROL_POINT_SPACING,
            alpha: DEFAULT_ALPHA,
            interpolation: Interpolation::default(),
            downsampling: None,
            display_distances: false,
            cell_blend: CellBlend::default(),
            min_reference_points: DEFAULT_MIN_REFERENCE_POINTS,
            mode: NonRigidMode::default(),
            background: 0.0,
        }
    }
}

impl FusionConfig {
    /// Reject settings the fusion cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.control_point_spacing.iter().any(|&s| s == 0) {
            return Err(FusionError::InvalidConfig(
                "control point spacing must be positive".into(),
            ));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if let Some(ds) = self.downsampling {
            if !(ds.is_finite() && ds > 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "downsampling must be positive, got {ds}"
                )));
            }
        }
        if self.labels.is_empty() {
            return Err(FusionError::InvalidConfig(
                "at least one landmark label is required".into(),
            ));
        }
        let w = &self.weighting;
        if w.blending && (w.blending_range < 0.0 || w.blending_border < 0.0) {
            return Err(FusionError::InvalidConfig(
                "blending range and border must not be negative".into(),
            ));
        }
        if w.content_based && (w.content_sigma1 <= 0.0 || w.content_sigma2 <= 0.0) {
            return Err(FusionError::InvalidConfig(
                "content-based sigmas must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Downsampling factor, treating `1.0` as no downsampling.
    pub fn effective_downsampling(&self) -> Option<f64> {
        self.downsampling.filter(|&ds| ds != 1.0)
    }

    pub fn grid_params(&self) -> GridParams {
        GridParams {
            spacing: self.control_point_spacing,
            alpha: self.alpha,
            blend: self.cell_blend,
            min_reference_points: self.min_reference_points,
        }
    }
}
