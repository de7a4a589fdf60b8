use nalgebra::Point3;

use crate::transform::Affine3;

use super::grid::DeformationGrid;
use super::mls::MovingLeastSquares;

/// Maps output coordinates back into one view's local image coordinates.
///
/// The variant is chosen once when the view is set up; samplers and weight
/// fields only call [`ViewMapping::to_local`].
#[derive(Clone, Debug)]
pub enum ViewMapping {
    /// Plain inverse of the rigid registration.
    Rigid { inverse: Affine3 },
    /// Grid-interpolated non-rigid correction followed by the inverse
    /// registration.
    Grid {
        grid: DeformationGrid,
        inverse: Affine3,
    },
    /// Moving least squares correction fitted at every queried location.
    Direct {
        mls: MovingLeastSquares,
        inverse: Affine3,
    },
}

impl ViewMapping {
    pub fn to_local(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            Self::Rigid { inverse } => inverse.apply(p),
            Self::Grid { grid, inverse } => inverse.apply(&grid.apply(p)),
            Self::Direct { mls, inverse } => inverse.apply(&mls.apply(p)),
        }
    }

    /// Local coordinate under the rigid registration alone.
    pub fn rigid_to_local(&self, p: &Point3<f64>) -> Point3<f64> {
        self.inverse().apply(p)
    }

    pub fn inverse(&self) -> &Affine3 {
        match self {
            Self::Rigid { inverse } | Self::Grid { inverse, .. } | Self::Direct { inverse, .. } => {
                inverse
            }
        }
    }

    pub fn is_non_rigid(&self) -> bool {
        !matches!(self, Self::Rigid { .. })
    }
}
