use std::sync::Arc;

use crate::deform::ViewMapping;
use crate::view::{ImageSource, Interval};
use crate::volume::{to_point, VirtualVolume};

use super::interpolation::{interpolate, Interpolation};

/// A view's image resampled into output coordinates through its mapping.
#[derive(Clone)]
pub struct TransformedView {
    image: Arc<dyn ImageSource>,
    mapping: Arc<ViewMapping>,
    interval: Interval,
    interpolation: Interpolation,
    outside: f32,
}

impl TransformedView {
    pub fn new(
        image: Arc<dyn ImageSource>,
        mapping: Arc<ViewMapping>,
        interval: Interval,
        interpolation: Interpolation,
        outside: f32,
    ) -> Self {
        Self {
            image,
            mapping,
            interval,
            interpolation,
            outside,
        }
    }

    pub fn mapping(&self) -> &ViewMapping {
        &self.mapping
    }
}

impl VirtualVolume for TransformedView {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn get(&self, pos: [i64; 3]) -> f32 {
        let local = self.mapping.to_local(&to_point(pos));
        interpolate(self.image.as_ref(), &local, self.interpolation, self.outside)
    }
}
