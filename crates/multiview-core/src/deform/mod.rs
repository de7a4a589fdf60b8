//! Non-rigid correction of view registrations from reference points.

pub mod grid;
pub mod mapping;
pub mod mls;

pub use grid::{
    build_view_grid, compute_grids, compute_grids_with_progress, view_footprint, CellBlend,
    DeformationGrid, GridParams, GridRequest,
};
pub use mapping::ViewMapping;
pub use mls::{fit_weighted_affine, mls_weight, MovingLeastSquares};
