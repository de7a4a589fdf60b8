use std::sync::Arc;

use nalgebra::Point3;

use crate::view::Interval;

/// A computed-on-read volume over an output interval.
///
/// Reads take absolute output coordinates, never mutate shared state and may
/// happen from many threads at once.
pub trait VirtualVolume: Send + Sync {
    fn interval(&self) -> Interval;

    /// Value at `[x, y, z]` in output coordinates.
    fn get(&self, pos: [i64; 3]) -> f32;
}

impl<V: VirtualVolume + ?Sized> VirtualVolume for Arc<V> {
    fn interval(&self) -> Interval {
        (**self).interval()
    }

    fn get(&self, pos: [i64; 3]) -> f32 {
        (**self).get(pos)
    }
}

/// Volume with the same value everywhere.
#[derive(Clone, Copy, Debug)]
pub struct ConstantVolume {
    pub interval: Interval,
    pub value: f32,
}

impl ConstantVolume {
    pub fn new(interval: Interval, value: f32) -> Self {
        Self { interval, value }
    }
}

impl VirtualVolume for ConstantVolume {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn get(&self, _pos: [i64; 3]) -> f32 {
        self.value
    }
}

pub(crate) fn to_point(pos: [i64; 3]) -> Point3<f64> {
    Point3::new(pos[0] as f64, pos[1] as f64, pos[2] as f64)
}
