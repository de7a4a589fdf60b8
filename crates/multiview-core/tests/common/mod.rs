use std::sync::Arc;

use nalgebra::Point3;
use ndarray::Array3;
use rayon::ThreadPool;

use multiview_core::dataset::MemoryDataset;
use multiview_core::fusion::{create_worker_pool, FusionConfig};
use multiview_core::landmarks::ReferenceAnchor;
use multiview_core::transform::Affine3;
use multiview_core::view::{ArrayImage, ImageSource, ViewId};

pub const LABEL: &str = "beads";

pub fn pool() -> ThreadPool {
    create_worker_pool(Some(2)).expect("worker pool")
}

pub fn view(setup: u32) -> ViewId {
    ViewId::new(0, setup)
}

pub fn constant_image(dims: [usize; 3], value: f32) -> Arc<dyn ImageSource> {
    Arc::new(ArrayImage::constant(dims, value))
}

/// Image whose value encodes its own coordinate: `x + 10 y + 100 z`.
pub fn coordinate_image(dims: [usize; 3]) -> Arc<dyn ImageSource> {
    let data = Array3::from_shape_fn((dims[2], dims[1], dims[0]), |(z, y, x)| {
        (x + 10 * y + 100 * z) as f32
    });
    Arc::new(ArrayImage::new(data))
}

/// Fusion config with coverage weights only and the test label.
pub fn coverage_config() -> FusionConfig {
    let mut config = FusionConfig::default();
    config.labels = vec![LABEL.to_string()];
    config.weighting.blending = false;
    config.weighting.content_based = false;
    config
}

/// Register `label` with no landmarks for every view, so the label exists
/// but yields no correspondences.
pub fn add_empty_labels(dataset: &mut MemoryDataset, views: &[ViewId]) {
    for &v in views {
        dataset.landmarks_mut().set_points(v, LABEL, Vec::new());
    }
}

/// Five non-coplanar landmark positions in world coordinates.
pub fn bead_world_positions() -> Vec<Point3<f64>> {
    vec![
        Point3::new(12.0, 2.0, 2.0),
        Point3::new(26.0, 2.0, 2.0),
        Point3::new(12.0, 9.0, 2.0),
        Point3::new(12.0, 2.0, 9.0),
        Point3::new(22.0, 8.0, 7.0),
    ]
}

/// Two overlapping views of size 30x12x12, B shifted by 10 pixels along x.
///
/// Both carry the beads of [`bead_world_positions`], linked one to one.
/// `b_error` is added to the world position view B's registration assigns
/// to its beads, i.e. B's registration is off by `b_error`.
pub fn two_view_bead_dataset(a_value: f32, b_value: f32, b_error: [f64; 3]) -> MemoryDataset {
    let dims = [30, 12, 12];
    let a = view(0);
    let b = view(1);
    let model_a = Affine3::identity();
    let model_b = Affine3::from_translation(10.0, 0.0, 0.0);

    let mut dataset = MemoryDataset::new();
    dataset.add_view(a, constant_image(dims, a_value), model_a);
    dataset.add_view(b, constant_image(dims, b_value), model_b);

    let beads = bead_world_positions();
    let local_a: Vec<Point3<f64>> = beads.clone();
    let local_b: Vec<Point3<f64>> = beads
        .iter()
        .map(|w| Point3::new(w.x - 10.0 + b_error[0], w.y + b_error[1], w.z + b_error[2]))
        .collect();

    let db = dataset.landmarks_mut();
    db.set_points(a, LABEL, local_a);
    db.set_points(b, LABEL, local_b);
    for i in 0..beads.len() {
        db.link((a, LABEL, i), (b, LABEL, i));
    }
    dataset
}

/// Anchors whose targets are displaced from their local positions by a
/// smooth non-affine field.
pub fn warped_anchors() -> Vec<ReferenceAnchor> {
    let mut anchors = Vec::new();
    for &x in &[2.0f64, 17.0, 33.0] {
        for &y in &[3.0f64, 21.0, 36.0] {
            for &z in &[1.0f64, 19.0, 38.0] {
                let local = Point3::new(x, y, z);
                let target = Point3::new(
                    x + 0.8 * (y * 0.1).sin(),
                    y + 0.5 * (z * 0.07).cos(),
                    z + 0.02 * x,
                );
                anchors.push(ReferenceAnchor { local, target });
            }
        }
    }
    anchors
}
