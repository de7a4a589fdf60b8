use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::consts::IDENTITY_TOLERANCE;

/// 3-D affine transform `x -> L·x + t`, equivalent to a 3×4 homogeneous
/// matrix.
///
/// Serialized as the 12 row-major entries of the 3×4 matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 12]", into = "[f64; 12]")]
pub struct Affine3 {
    pub linear: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Affine3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 12]> for Affine3 {
    fn from(m: [f64; 12]) -> Self {
        Self::from_row_major(m)
    }
}

impl From<Affine3> for [f64; 12] {
    fn from(a: Affine3) -> Self {
        a.to_row_major()
    }
}

impl Affine3 {
    pub fn new(linear: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            linear,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Matrix3::identity(), Vector3::new(x, y, z))
    }

    /// Per-axis scaling about the origin.
    pub fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self::new(
            Matrix3::from_diagonal(&Vector3::new(sx, sy, sz)),
            Vector3::zeros(),
        )
    }

    /// Build from the 12 row-major entries `m00 m01 m02 m03 m10 ... m23`.
    pub fn from_row_major(m: [f64; 12]) -> Self {
        let linear = Matrix3::new(m[0], m[1], m[2], m[4], m[5], m[6], m[8], m[9], m[10]);
        let translation = Vector3::new(m[3], m[7], m[11]);
        Self::new(linear, translation)
    }

    pub fn to_row_major(&self) -> [f64; 12] {
        let l = &self.linear;
        let t = &self.translation;
        [
            l[(0, 0)],
            l[(0, 1)],
            l[(0, 2)],
            t.x,
            l[(1, 0)],
            l[(1, 1)],
            l[(1, 2)],
            t.y,
            l[(2, 0)],
            l[(2, 1)],
            l[(2, 2)],
            t.z,
        ]
    }

    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.linear * p.coords + self.translation)
    }

    /// Inverse transform, or `None` if the linear part is singular.
    pub fn inverse(&self) -> Option<Affine3> {
        let inv = self.linear.try_inverse()?;
        Some(Self::new(inv, -(inv * self.translation)))
    }

    /// Transform that applies `self` first and `next` afterwards.
    pub fn then(&self, next: &Affine3) -> Affine3 {
        Self::new(
            next.linear * self.linear,
            next.linear * self.translation + next.translation,
        )
    }

    /// Uniformly rescale the output space by `factor`, e.g. `1 / downsampling`.
    pub fn scaled(&self, factor: f64) -> Affine3 {
        self.then(&Self::from_scale(factor, factor, factor))
    }

    /// Length of the image of each unit axis, i.e. how many output pixels one
    /// input pixel spans along x, y and z.
    pub fn axis_scales(&self) -> [f64; 3] {
        [
            self.linear.column(0).norm(),
            self.linear.column(1).norm(),
            self.linear.column(2).norm(),
        ]
    }

    /// Weighted sum of several transforms' coefficients. The weights are
    /// expected to sum to one.
    pub fn weighted_sum<'a, I>(terms: I) -> Affine3
    where
        I: IntoIterator<Item = (f64, &'a Affine3)>,
    {
        let mut linear = Matrix3::zeros();
        let mut translation = Vector3::zeros();
        for (w, a) in terms {
            linear += a.linear * w;
            translation += a.translation * w;
        }
        Self::new(linear, translation)
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity_within(IDENTITY_TOLERANCE)
    }

    pub fn is_identity_within(&self, tolerance: f64) -> bool {
        (self.linear - Matrix3::identity()).amax() <= tolerance
            && self.translation.amax() <= tolerance
    }
}
