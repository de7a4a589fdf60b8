use std::fmt;

use ndarray::Array3;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Identifies one acquisition: a setup (angle, channel, tile, ...) imaged at
/// one time point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId {
    pub timepoint: u32,
    pub setup: u32,
}

impl ViewId {
    pub fn new(timepoint: u32, setup: u32) -> Self {
        Self { timepoint, setup }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tpId={} setupId={}", self.timepoint, self.setup)
    }
}

/// Inclusive integer box in (x, y, z) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl Interval {
    pub fn new(min: [i64; 3], max: [i64; 3]) -> Self {
        Self { min, max }
    }

    /// Interval starting at the origin with the given size.
    pub fn from_dims(dims: [usize; 3]) -> Self {
        Self {
            min: [0; 3],
            max: [
                dims[0] as i64 - 1,
                dims[1] as i64 - 1,
                dims[2] as i64 - 1,
            ],
        }
    }

    /// Smallest interval containing the real-valued box `[min, max]`.
    pub fn from_real_bounds(min: [f64; 3], max: [f64; 3]) -> Self {
        Self {
            min: [
                min[0].floor() as i64,
                min[1].floor() as i64,
                min[2].floor() as i64,
            ],
            max: [
                max[0].ceil() as i64,
                max[1].ceil() as i64,
                max[2].ceil() as i64,
            ],
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        let mut dims = [0usize; 3];
        for (d, dim) in dims.iter_mut().enumerate() {
            *dim = (self.max[d] - self.min[d] + 1).max(0) as usize;
        }
        dims
    }

    pub fn num_elements(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.max[d] < self.min[d])
    }

    pub fn contains(&self, pos: [i64; 3]) -> bool {
        (0..3).all(|d| pos[d] >= self.min[d] && pos[d] <= self.max[d])
    }

    /// Intersection of two intervals; `None` if they do not overlap.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let mut out = *self;
        for d in 0..3 {
            out.min[d] = self.min[d].max(other.min[d]);
            out.max[d] = self.max[d].min(other.max[d]);
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Grow the interval by `amount[d]` on both sides of every axis.
    pub fn expand(&self, amount: [i64; 3]) -> Interval {
        let mut out = *self;
        for d in 0..3 {
            out.min[d] -= amount[d];
            out.max[d] += amount[d];
        }
        out
    }

    /// Scale the interval by `factor`, rounding outwards.
    pub fn scale(&self, factor: f64) -> Interval {
        let mut out = *self;
        for d in 0..3 {
            out.min[d] = (self.min[d] as f64 * factor).floor() as i64;
            out.max[d] = (self.max[d] as f64 * factor).ceil() as i64;
        }
        out
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [w, h, d] = self.dims();
        write!(
            f,
            "[{}, {}, {}] -> [{}, {}, {}], dimensions ({} x {} x {})",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2], w, h, d
        )
    }
}

/// Raw image data of one view, addressable by integer voxel coordinate.
///
/// Implementations must be safe to read from many threads at once.
pub trait ImageSource: Send + Sync {
    /// Size along (x, y, z).
    fn dims(&self) -> [usize; 3];

    /// Intensity at `[x, y, z]`. Callers guarantee the position is in bounds.
    fn get(&self, pos: [usize; 3]) -> f32;

    fn interval(&self) -> Interval {
        Interval::from_dims(self.dims())
    }
}

/// In-memory view image backed by an `ndarray` volume of shape (z, y, x).
#[derive(Clone, Debug)]
pub struct ArrayImage<T> {
    pub data: Array3<T>,
}

impl<T> ArrayImage<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self { data }
    }
}

impl ArrayImage<f32> {
    /// Volume of size (x, y, z) filled with `value`.
    pub fn constant(dims: [usize; 3], value: f32) -> Self {
        Self::new(Array3::from_elem((dims[2], dims[1], dims[0]), value))
    }
}

impl<T> ImageSource for ArrayImage<T>
where
    T: ToPrimitive + Send + Sync,
{
    fn dims(&self) -> [usize; 3] {
        let (d, h, w) = self.data.dim();
        [w, h, d]
    }

    fn get(&self, pos: [usize; 3]) -> f32 {
        self.data[[pos[2], pos[1], pos[0]]].to_f32().unwrap_or(0.0)
    }
}
