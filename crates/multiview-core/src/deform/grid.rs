use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Point3;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{CELL_BLEND_SUPPORT, DEFAULT_CELL_BLEND_POWER};
use crate::error::{FusionError, Result};
use crate::landmarks::ReferenceAnchor;
use crate::transform::Affine3;
use crate::view::{Interval, ViewId};

use super::mls::MovingLeastSquares;

/// How the corrections of neighbouring grid nodes are blended at a query
/// location.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellBlend {
    /// Modified Shepard weights `((R - d)+ / (R d))^power` over all nodes
    /// within `R` cells. Weights reach zero at the support boundary, which
    /// keeps the blend continuous.
    InverseDistance { power: f64 },
    /// Trilinear weights of the eight enclosing nodes.
    Trilinear,
}

impl Default for CellBlend {
    fn default() -> Self {
        Self::InverseDistance {
            power: DEFAULT_CELL_BLEND_POWER,
        }
    }
}

impl std::fmt::Display for CellBlend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InverseDistance { power } => write!(f, "Inverse Distance (power {power})"),
            Self::Trilinear => write!(f, "Trilinear"),
        }
    }
}

/// Regular lattice of locally fitted affine corrections of one view.
///
/// Node `(i, j, k)` sits at `origin + (i, j, k) * spacing` in output
/// coordinates. Positions outside the lattice use the blend of the nearest
/// edge nodes.
#[derive(Clone, Debug)]
pub struct DeformationGrid {
    origin: [f64; 3],
    spacing: [f64; 3],
    counts: [usize; 3],
    corrections: Vec<Affine3>,
    blend: CellBlend,
}

impl DeformationGrid {
    /// Fit a correction at every node of a lattice spanning `lattice` with
    /// the given node spacing.
    pub fn build(
        mls: &MovingLeastSquares,
        lattice: &Interval,
        spacing: [u32; 3],
        blend: CellBlend,
    ) -> Self {
        let mut counts = [0usize; 3];
        let mut origin = [0.0f64; 3];
        let mut step = [0.0f64; 3];
        for d in 0..3 {
            let extent = (lattice.max[d] - lattice.min[d]).max(0) as f64;
            step[d] = spacing[d] as f64;
            counts[d] = (extent / step[d]).ceil() as usize + 1;
            origin[d] = lattice.min[d] as f64;
        }

        let mut corrections = Vec::with_capacity(counts[0] * counts[1] * counts[2]);
        for k in 0..counts[2] {
            for j in 0..counts[1] {
                for i in 0..counts[0] {
                    let p = Point3::new(
                        origin[0] + i as f64 * step[0],
                        origin[1] + j as f64 * step[1],
                        origin[2] + k as f64 * step[2],
                    );
                    corrections.push(mls.fit_at(&p));
                }
            }
        }

        Self {
            origin,
            spacing: step,
            counts,
            corrections,
            blend,
        }
    }

    /// Number of nodes along x, y and z.
    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    pub fn num_nodes(&self) -> usize {
        self.corrections.len()
    }

    pub fn blend(&self) -> CellBlend {
        self.blend
    }

    pub fn node_position(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(
            self.origin[0] + i as f64 * self.spacing[0],
            self.origin[1] + j as f64 * self.spacing[1],
            self.origin[2] + k as f64 * self.spacing[2],
        )
    }

    pub fn node(&self, i: usize, j: usize, k: usize) -> &Affine3 {
        &self.corrections[self.node_index(i, j, k)]
    }

    pub fn nodes(&self) -> &[Affine3] {
        &self.corrections
    }

    fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.counts[1] + j) * self.counts[0] + i
    }

    /// Position in fractional node units, clamped into the lattice.
    fn lattice_coords(&self, p: &Point3<f64>) -> [f64; 3] {
        let mut u = [0.0; 3];
        for d in 0..3 {
            let max = (self.counts[d] - 1) as f64;
            u[d] = ((p[d] - self.origin[d]) / self.spacing[d]).clamp(0.0, max);
        }
        u
    }

    /// Blended correction at output location `p`.
    pub fn correction_at(&self, p: &Point3<f64>) -> Affine3 {
        let u = self.lattice_coords(p);
        match self.blend {
            CellBlend::Trilinear => self.blend_trilinear(u),
            CellBlend::InverseDistance { power } => self.blend_inverse_distance(u, power),
        }
    }

    /// Apply the blended correction at `p` to `p` itself.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.correction_at(p).apply(p)
    }

    fn blend_trilinear(&self, u: [f64; 3]) -> Affine3 {
        let mut lo = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for d in 0..3 {
            if self.counts[d] < 2 {
                continue;
            }
            let i0 = (u[d].floor() as usize).min(self.counts[d] - 2);
            lo[d] = i0;
            frac[d] = u[d] - i0 as f64;
        }

        let mut terms: Vec<(f64, &Affine3)> = Vec::with_capacity(8);
        for corner in 0..8usize {
            let mut w = 1.0;
            let mut idx = [0usize; 3];
            for d in 0..3 {
                let upper = (corner >> d) & 1 == 1;
                if upper && self.counts[d] < 2 {
                    w = 0.0;
                    break;
                }
                idx[d] = lo[d] + upper as usize;
                w *= if upper { frac[d] } else { 1.0 - frac[d] };
            }
            if w > 0.0 {
                terms.push((w, self.node(idx[0], idx[1], idx[2])));
            }
        }
        Affine3::weighted_sum(terms)
    }

    fn blend_inverse_distance(&self, u: [f64; 3], power: f64) -> Affine3 {
        let r = CELL_BLEND_SUPPORT;
        let mut range = [(0usize, 0usize); 3];
        for d in 0..3 {
            let lo = (u[d] - r).ceil().max(0.0) as usize;
            let hi = ((u[d] + r).floor() as usize).min(self.counts[d] - 1);
            range[d] = (lo, hi);
        }

        let mut terms: Vec<(f64, &Affine3)> = Vec::new();
        let mut wsum = 0.0;
        for k in range[2].0..=range[2].1 {
            for j in range[1].0..=range[1].1 {
                for i in range[0].0..=range[0].1 {
                    let di = u[0] - i as f64;
                    let dj = u[1] - j as f64;
                    let dk = u[2] - k as f64;
                    let dist = (di * di + dj * dj + dk * dk).sqrt();
                    if dist < 1e-12 {
                        return *self.node(i, j, k);
                    }
                    if dist >= r {
                        continue;
                    }
                    let w = ((r - dist) / (r * dist)).powf(power);
                    wsum += w;
                    terms.push((w, self.node(i, j, k)));
                }
            }
        }

        if wsum <= 0.0 {
            let nearest = [u[0].round() as usize, u[1].round() as usize, u[2].round() as usize];
            return *self.node(nearest[0], nearest[1], nearest[2]);
        }
        Affine3::weighted_sum(terms.into_iter().map(|(w, a)| (w / wsum, a)))
    }
}

/// Axis-aligned box in output space covered by an image of size `dims`
/// registered with `model`.
pub fn view_footprint(model: &Affine3, dims: [usize; 3]) -> Interval {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for corner in 0..8usize {
        let local = Point3::new(
            if corner & 1 == 1 { dims[0].saturating_sub(1) as f64 } else { 0.0 },
            if corner & 2 == 2 { dims[1].saturating_sub(1) as f64 } else { 0.0 },
            if corner & 4 == 4 { dims[2].saturating_sub(1) as f64 } else { 0.0 },
        );
        let world = model.apply(&local);
        for d in 0..3 {
            min[d] = min[d].min(world[d]);
            max[d] = max[d].max(world[d]);
        }
    }
    Interval::from_real_bounds(min, max)
}

/// Parameters shared by the grids of all views of one run.
#[derive(Clone, Copy, Debug)]
pub struct GridParams {
    pub spacing: [u32; 3],
    pub alpha: f64,
    pub blend: CellBlend,
    pub min_reference_points: usize,
}

/// One view's input to grid construction.
#[derive(Clone, Debug)]
pub struct GridRequest<'a> {
    pub view: ViewId,
    pub dims: [usize; 3],
    pub model: Affine3,
    pub anchors: &'a [ReferenceAnchor],
}

/// Build the deformation grid of a single view, or `None` when the view
/// has too few anchors or does not overlap `bounding_box`.
pub fn build_view_grid(
    request: &GridRequest<'_>,
    params: &GridParams,
    bounding_box: &Interval,
) -> Result<Option<DeformationGrid>> {
    if params.spacing.iter().any(|&s| s == 0) {
        return Err(FusionError::InvalidConfig(
            "control point spacing must be positive".into(),
        ));
    }

    if request.anchors.len() < params.min_reference_points {
        debug!(
            view = %request.view,
            anchors = request.anchors.len(),
            "Too few reference points, using the affine model"
        );
        return Ok(None);
    }

    let spacing = [
        params.spacing[0] as i64,
        params.spacing[1] as i64,
        params.spacing[2] as i64,
    ];
    let footprint = view_footprint(&request.model, request.dims).expand(spacing);
    let Some(lattice) = footprint.intersect(bounding_box) else {
        warn!(view = %request.view, "View does not overlap the bounding box");
        return Ok(None);
    };

    let mls = MovingLeastSquares::new(request.anchors, &request.model, params.alpha);
    let grid = DeformationGrid::build(&mls, &lattice, params.spacing, params.blend);
    debug!(
        view = %request.view,
        anchors = request.anchors.len(),
        nodes = grid.num_nodes(),
        "Built deformation grid"
    );
    Ok(Some(grid))
}

/// Build the grids of all requested views on `pool`. Returns once every
/// view is done; the first error stops the remaining work.
pub fn compute_grids(
    requests: &[GridRequest<'_>],
    params: &GridParams,
    bounding_box: &Interval,
    pool: &ThreadPool,
) -> Result<BTreeMap<ViewId, Option<DeformationGrid>>> {
    compute_grids_with_progress(requests, params, bounding_box, pool, |_| {})
}

/// Like [`compute_grids`], calling `on_progress(views_done)` as each view's
/// grid is finished.
pub fn compute_grids_with_progress(
    requests: &[GridRequest<'_>],
    params: &GridParams,
    bounding_box: &Interval,
    pool: &ThreadPool,
    on_progress: impl Fn(usize) + Send + Sync,
) -> Result<BTreeMap<ViewId, Option<DeformationGrid>>> {
    info!(views = requests.len(), "Computing non-rigid grids");
    let done = AtomicUsize::new(0);
    let grids = pool.install(|| {
        requests
            .par_iter()
            .map(|req| {
                let grid = build_view_grid(req, params, bounding_box)?;
                on_progress(done.fetch_add(1, Ordering::Relaxed) + 1);
                Ok((req.view, grid))
            })
            .collect::<Result<BTreeMap<_, _>>>()
    })?;
    let non_rigid = grids.values().filter(|g| g.is_some()).count();
    info!(
        non_rigid,
        rigid = grids.len() - non_rigid,
        "Finished computing grids"
    );
    Ok(grids)
}
