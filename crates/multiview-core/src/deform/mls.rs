use nalgebra::{Matrix3, Point3, Vector3};

use crate::consts::{MLS_DEGENERATE_DETERMINANT, MLS_MIN_SQUARED_DISTANCE};
use crate::landmarks::ReferenceAnchor;
use crate::transform::Affine3;

/// Influence of a reference point at squared distance `sq_dist` from the
/// fit location.
///
/// `alpha = 1` is the classic inverse squared distance. Smaller values make
/// the influence fall off faster (more local), larger values flatten it
/// towards a global average.
pub fn mls_weight(sq_dist: f64, alpha: f64) -> f64 {
    1.0 / sq_dist.max(MLS_MIN_SQUARED_DISTANCE).powf(1.0 / alpha)
}

/// Weighted least squares affine transform mapping `from[i]` onto `to[i]`.
///
/// Returns `None` when there are no points or all weights vanish. When the
/// weighted point cloud is degenerate (fewer than four points, or coplanar)
/// the fit falls back to the weighted mean translation.
pub fn fit_weighted_affine(
    from: &[Point3<f64>],
    to: &[Point3<f64>],
    weights: &[f64],
) -> Option<Affine3> {
    let wsum: f64 = weights.iter().sum();
    if from.is_empty() || wsum <= 0.0 || !wsum.is_finite() {
        return None;
    }

    let mut pc = Vector3::zeros();
    let mut qc = Vector3::zeros();
    for ((p, q), &w) in from.iter().zip(to).zip(weights) {
        pc += p.coords * w;
        qc += q.coords * w;
    }
    pc /= wsum;
    qc /= wsum;

    let mut cov = Matrix3::zeros();
    let mut cross = Matrix3::zeros();
    for ((p, q), &w) in from.iter().zip(to).zip(weights) {
        let a = p.coords - pc;
        let b = q.coords - qc;
        cov += a * a.transpose() * w;
        cross += b * a.transpose() * w;
    }

    let translation_only = Affine3::new(Matrix3::identity(), qc - pc);
    if from.len() < 4 {
        return Some(translation_only);
    }

    let scale = cov.trace() / 3.0;
    if scale <= 0.0 || (cov.determinant() / (scale * scale * scale)).abs() < MLS_DEGENERATE_DETERMINANT {
        return Some(translation_only);
    }

    match cov.try_inverse() {
        Some(inv) => {
            let linear = cross * inv;
            Some(Affine3::new(linear, qc - linear * pc))
        }
        None => Some(translation_only),
    }
}

/// Moving least squares correction of a view's rigid registration.
///
/// For every reference anchor the correction should carry the anchor's
/// world target onto the place where the rigid registration puts the
/// anchor's local position. Evaluated at an output location it yields a
/// locally fitted affine correction in world space.
#[derive(Clone, Debug)]
pub struct MovingLeastSquares {
    targets: Vec<Point3<f64>>,
    rigid_positions: Vec<Point3<f64>>,
    alpha: f64,
}

impl MovingLeastSquares {
    pub fn new(anchors: &[ReferenceAnchor], model: &Affine3, alpha: f64) -> Self {
        Self {
            targets: anchors.iter().map(|a| a.target).collect(),
            rigid_positions: anchors.iter().map(|a| model.apply(&a.local)).collect(),
            alpha,
        }
    }

    pub fn num_points(&self) -> usize {
        self.targets.len()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Locally fitted correction at output location `p`.
    pub fn fit_at(&self, p: &Point3<f64>) -> Affine3 {
        let weights: Vec<f64> = self
            .targets
            .iter()
            .map(|t| mls_weight((t - p).norm_squared(), self.alpha))
            .collect();
        fit_weighted_affine(&self.targets, &self.rigid_positions, &weights)
            .unwrap_or_else(Affine3::identity)
    }

    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.fit_at(p).apply(p)
    }
}
