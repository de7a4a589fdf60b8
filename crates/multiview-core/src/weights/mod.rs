//! Per-view confidence weights.
//!
//! A [`WeightField`] is evaluated at local image coordinates, so wrapping it
//! in a [`TransformedWeight`] with the same [`ViewMapping`] as the image keeps
//! image and weight aligned under non-rigid correction.

pub mod blending;
pub mod content_based;

use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{
    DEFAULT_BLENDING_BORDER, DEFAULT_BLENDING_RANGE, DEFAULT_CONTENT_SIGMA1,
    DEFAULT_CONTENT_SIGMA2,
};
use crate::deform::ViewMapping;
use crate::sample::is_inside;
use crate::transform::Affine3;
use crate::view::{ImageSource, Interval, ViewId};
use crate::volume::{to_point, VirtualVolume};

pub use blending::BlendingWeight;
pub use content_based::{gaussian_fft_3d, ContentBasedWeight};

/// Non-negative confidence of a view at a local image coordinate.
pub trait WeightField: Send + Sync {
    fn weight(&self, local: &Point3<f64>) -> f32;
}

/// 1 inside the image bounds, 0 outside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverageWeight {
    pub dims: [usize; 3],
}

impl WeightField for CoverageWeight {
    fn weight(&self, local: &Point3<f64>) -> f32 {
        if is_inside(self.dims, local) {
            1.0
        } else {
            0.0
        }
    }
}

/// Elementwise product of several weight fields.
#[derive(Clone)]
pub struct ProductWeight {
    fields: Vec<Arc<dyn WeightField>>,
}

impl ProductWeight {
    pub fn new(fields: Vec<Arc<dyn WeightField>>) -> Self {
        Self { fields }
    }
}

impl WeightField for ProductWeight {
    fn weight(&self, local: &Point3<f64>) -> f32 {
        let mut w = 1.0;
        for field in &self.fields {
            w *= field.weight(local);
            if w == 0.0 {
                break;
            }
        }
        w
    }
}

/// A weight field resampled into output coordinates.
#[derive(Clone)]
pub struct TransformedWeight {
    field: Arc<dyn WeightField>,
    mapping: Arc<ViewMapping>,
    interval: Interval,
}

impl TransformedWeight {
    pub fn new(field: Arc<dyn WeightField>, mapping: Arc<ViewMapping>, interval: Interval) -> Self {
        Self {
            field,
            mapping,
            interval,
        }
    }
}

impl VirtualVolume for TransformedWeight {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn get(&self, pos: [i64; 3]) -> f32 {
        let local = self.mapping.to_local(&to_point(pos));
        self.field.weight(&local)
    }
}

/// Which weights to use and their parameters, given in output pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingConfig {
    /// Edge-fade blending weights.
    pub blending: bool,
    /// Content-based weights.
    pub content_based: bool,
    pub blending_range: f32,
    pub blending_border: f32,
    pub content_sigma1: f64,
    pub content_sigma2: f64,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            blending: true,
            content_based: false,
            blending_range: DEFAULT_BLENDING_RANGE,
            blending_border: DEFAULT_BLENDING_BORDER,
            content_sigma1: DEFAULT_CONTENT_SIGMA1,
            content_sigma2: DEFAULT_CONTENT_SIGMA2,
        }
    }
}

impl std::fmt::Display for WeightingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.blending, self.content_based) {
            (true, true) => write!(f, "Blending x Content-based"),
            (true, false) => write!(f, "Blending"),
            (false, true) => write!(f, "Content-based"),
            (false, false) => write!(f, "Coverage only"),
        }
    }
}

/// Convert blending range and border from output pixels to the view's
/// local pixels, per axis. Accounts for anisotropy, downsampling and the
/// registration's own scale, all of which live in `model`.
pub fn adjust_blending(range: f32, border: f32, model: &Affine3) -> ([f32; 3], [f32; 3]) {
    let scales = model.axis_scales();
    let mut r = [range; 3];
    let mut b = [border; 3];
    for d in 0..3 {
        if scales[d] > 0.0 {
            r[d] = (range as f64 / scales[d]) as f32;
            b[d] = (border as f64 / scales[d]) as f32;
        }
    }
    (r, b)
}

/// Convert the content-based sigmas from output pixels to local pixels.
pub fn adjust_content_based(sigma1: f64, sigma2: f64, model: &Affine3) -> ([f64; 3], [f64; 3]) {
    let scales = model.axis_scales();
    let mut s1 = [sigma1; 3];
    let mut s2 = [sigma2; 3];
    for d in 0..3 {
        if scales[d] > 0.0 {
            s1[d] = sigma1 / scales[d];
            s2[d] = sigma2 / scales[d];
        }
    }
    (s1, s2)
}

/// Build the weight field of one view in local coordinates.
///
/// Without any weighting enabled the view still only contributes inside its
/// own image bounds.
pub fn build_weight_field(
    config: &WeightingConfig,
    view: ViewId,
    image: &dyn ImageSource,
    model: &Affine3,
) -> Arc<dyn WeightField> {
    let dims = image.dims();
    let mut fields: Vec<Arc<dyn WeightField>> = Vec::new();

    if config.blending {
        let (range, border) = adjust_blending(config.blending_range, config.blending_border, model);
        fields.push(Arc::new(BlendingWeight::new(dims, border, range)));
    }

    if config.content_based {
        let (sigma1, sigma2) =
            adjust_content_based(config.content_sigma1, config.content_sigma2, model);
        info!(view = %view, "Estimating entropy");
        fields.push(Arc::new(ContentBasedWeight::compute(image, sigma1, sigma2)));
    }

    match fields.len() {
        0 => Arc::new(CoverageWeight { dims }),
        1 => fields.remove(0),
        _ => Arc::new(ProductWeight::new(fields)),
    }
}
