use std::sync::Arc;

use crate::deform::ViewMapping;
use crate::view::Interval;
use crate::volume::{to_point, VirtualVolume};

use super::interpolation::is_inside;

/// Debugging aid: at every output coordinate, how far (in local image
/// pixels) the non-rigid mapping moves away from the rigid one.
///
/// Coordinates whose non-rigid position falls outside the image read as
/// `outside`.
#[derive(Clone)]
pub struct DistanceView {
    dims: [usize; 3],
    mapping: Arc<ViewMapping>,
    interval: Interval,
    outside: f32,
}

impl DistanceView {
    pub fn new(dims: [usize; 3], mapping: Arc<ViewMapping>, interval: Interval, outside: f32) -> Self {
        Self {
            dims,
            mapping,
            interval,
            outside,
        }
    }
}

impl VirtualVolume for DistanceView {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn get(&self, pos: [i64; 3]) -> f32 {
        let p = to_point(pos);
        let non_rigid = self.mapping.to_local(&p);
        if !is_inside(self.dims, &non_rigid) {
            return self.outside;
        }
        let rigid = self.mapping.rigid_to_local(&p);
        (non_rigid - rigid).norm() as f32
    }
}
