use std::f64::consts::PI;

use nalgebra::Point3;

use super::WeightField;

/// Edge-fade weight: 1 in the image interior, falling off with a cosine
/// ramp over `range` pixels towards a zero-weight `border` at the image
/// edges.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendingWeight {
    dims: [usize; 3],
    border: [f32; 3],
    range: [f32; 3],
}

impl BlendingWeight {
    pub fn new(dims: [usize; 3], border: [f32; 3], range: [f32; 3]) -> Self {
        Self {
            dims,
            border,
            range,
        }
    }

    pub fn border(&self) -> [f32; 3] {
        self.border
    }

    pub fn range(&self) -> [f32; 3] {
        self.range
    }
}

/// Cosine ramp from 0 at `rel = 0` to 1 at `rel = 1`.
fn cosine_ramp(rel: f64) -> f64 {
    ((1.0 - rel) * PI).cos() * 0.5 + 0.5
}

impl WeightField for BlendingWeight {
    fn weight(&self, local: &Point3<f64>) -> f32 {
        let mut weight = 1.0f64;
        for d in 0..3 {
            let last = self.dims[d] as f64 - 1.0;
            let border = self.border[d] as f64;
            let l = local[d];
            let dist = (l - border).min(last - l - border);
            if dist < 0.0 {
                return 0.0;
            }
            let range = self.range[d] as f64;
            if range > 0.0 && dist < range {
                weight *= cosine_ramp(dist / range);
            }
        }
        weight as f32
    }
}
