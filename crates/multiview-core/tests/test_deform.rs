#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use nalgebra::{Matrix3, Point3, Vector3};

use multiview_core::dataset::ViewDataset;
use multiview_core::deform::{
    build_view_grid, compute_grids, fit_weighted_affine, mls_weight, view_footprint, CellBlend,
    DeformationGrid, GridParams, GridRequest, MovingLeastSquares, ViewMapping,
};
use multiview_core::error::FusionError;
use multiview_core::landmarks::{aggregate_correspondences, anchors_per_view, ReferenceAnchor};
use multiview_core::registration::RegistrationSnapshot;
use multiview_core::transform::Affine3;
use multiview_core::view::Interval;

use common::{pool, two_view_bead_dataset, view, warped_anchors, LABEL};

fn params(blend: CellBlend) -> GridParams {
    GridParams {
        spacing: [10, 10, 10],
        alpha: 1.0,
        blend,
        min_reference_points: 4,
    }
}

fn cube() -> Interval {
    Interval::new([0, 0, 0], [39, 39, 39])
}

fn warped_grid(blend: CellBlend) -> DeformationGrid {
    let anchors = warped_anchors();
    let request = GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::identity(),
        anchors: &anchors,
    };
    build_view_grid(&request, &params(blend), &cube())
        .expect("grid parameters are valid")
        .expect("enough anchors")
}

fn assert_points_close(a: &Point3<f64>, b: &Point3<f64>, eps: f64) {
    for d in 0..3 {
        assert_abs_diff_eq!(a[d], b[d], epsilon = eps);
    }
}

// ---------------------------------------------------------------------------
// Moving least squares
// ---------------------------------------------------------------------------

#[test]
fn test_mls_weight_alpha() {
    assert_abs_diff_eq!(mls_weight(4.0, 1.0), 0.25, epsilon = 1e-12);
    assert_abs_diff_eq!(mls_weight(4.0, 0.5), 1.0 / 16.0, epsilon = 1e-12);
    assert_abs_diff_eq!(mls_weight(4.0, 2.0), 0.5, epsilon = 1e-12);
}

#[test]
fn test_mls_weight_at_zero_distance_is_finite() {
    let w = mls_weight(0.0, 1.0);
    assert!(w.is_finite());
    assert!(w > mls_weight(1e-3, 1.0));
}

#[test]
fn test_fit_recovers_exact_affine() {
    let truth = Affine3::new(
        Matrix3::new(1.1, 0.1, 0.0, 0.0, 0.9, 0.05, 0.02, 0.0, 1.0),
        Vector3::new(1.0, 2.0, 3.0),
    );
    let from = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(0.0, 10.0, 0.0),
        Point3::new(0.0, 0.0, 10.0),
        Point3::new(7.0, 3.0, 5.0),
        Point3::new(2.0, 8.0, 9.0),
    ];
    let to: Vec<Point3<f64>> = from.iter().map(|p| truth.apply(p)).collect();
    let weights = vec![1.0, 0.5, 2.0, 0.3, 1.7, 0.9];

    let fit = fit_weighted_affine(&from, &to, &weights).expect("fit");
    for r in 0..3 {
        for c in 0..3 {
            assert_abs_diff_eq!(fit.linear[(r, c)], truth.linear[(r, c)], epsilon = 1e-9);
        }
        assert_abs_diff_eq!(fit.translation[r], truth.translation[r], epsilon = 1e-9);
    }
}

#[test]
fn test_fit_with_three_points_is_translation() {
    let from = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let to: Vec<Point3<f64>> = from.iter().map(|p| Point3::from(p.coords * 2.0)).collect();
    let fit = fit_weighted_affine(&from, &to, &[1.0, 1.0, 1.0]).expect("fit");

    assert_eq!(fit.linear, Matrix3::identity());
    assert_abs_diff_eq!(fit.translation.x, 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.translation.y, 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.translation.z, 0.0, epsilon = 1e-12);
}

#[test]
fn test_fit_with_coplanar_points_is_translation() {
    let from = vec![
        Point3::new(0.0, 0.0, 5.0),
        Point3::new(4.0, 0.0, 5.0),
        Point3::new(0.0, 4.0, 5.0),
        Point3::new(4.0, 4.0, 5.0),
        Point3::new(2.0, 1.0, 5.0),
    ];
    let to: Vec<Point3<f64>> = from
        .iter()
        .map(|p| Point3::new(p.x + 1.0, p.y - 2.0, p.z + 0.5))
        .collect();
    let fit = fit_weighted_affine(&from, &to, &[1.0; 5]).expect("fit");

    assert_eq!(fit.linear, Matrix3::identity());
    assert_abs_diff_eq!(fit.translation.x, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.translation.y, -2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.translation.z, 0.5, epsilon = 1e-12);
}

#[test]
fn test_fit_without_points_or_weight() {
    assert!(fit_weighted_affine(&[], &[], &[]).is_none());
    let p = vec![Point3::new(1.0, 2.0, 3.0)];
    assert!(fit_weighted_affine(&p, &p, &[0.0]).is_none());
}

#[test]
fn test_mls_uniform_shift_gives_uniform_correction() {
    // Every target sits one pixel further along x than the rigid position.
    let anchors: Vec<ReferenceAnchor> = warped_anchors()
        .into_iter()
        .map(|a| ReferenceAnchor {
            local: a.local,
            target: Point3::new(a.local.x + 1.0, a.local.y, a.local.z),
        })
        .collect();
    let mls = MovingLeastSquares::new(&anchors, &Affine3::identity(), 1.0);
    assert_eq!(mls.num_points(), 27);

    for p in [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(18.0, 22.0, 20.0),
        Point3::new(34.0, 36.0, 38.0),
    ] {
        let moved = mls.apply(&p);
        assert_points_close(&moved, &Point3::new(p.x - 1.0, p.y, p.z), 1e-6);
    }
}

#[test]
fn test_mls_reproduces_anchors() {
    let anchors = warped_anchors();
    let model = Affine3::from_translation(3.0, -1.0, 2.0);
    let mls = MovingLeastSquares::new(&anchors, &model, 1.0);

    // At its own target, an anchor dominates the fit.
    for a in anchors.iter().take(5) {
        let corrected = mls.apply(&a.target);
        assert_points_close(&corrected, &model.apply(&a.local), 1e-3);
    }
}

// ---------------------------------------------------------------------------
// Footprint and lattice
// ---------------------------------------------------------------------------

#[test]
fn test_view_footprint_translation() {
    let fp = view_footprint(&Affine3::identity(), [30, 12, 12]);
    assert_eq!(fp, Interval::new([0, 0, 0], [29, 11, 11]));

    let fp = view_footprint(&Affine3::from_translation(10.5, 0.0, -2.0), [30, 12, 12]);
    assert_eq!(fp, Interval::new([10, 0, -2], [40, 11, 9]));
}

#[test]
fn test_view_footprint_rotation() {
    let rot = Affine3::new(
        Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
        Vector3::zeros(),
    );
    let fp = view_footprint(&rot, [10, 20, 5]);
    assert_eq!(fp, Interval::new([-19, 0, 0], [0, 9, 4]));
}

#[test]
fn test_grid_lattice_clipped_to_bounding_box() {
    let grid = warped_grid(CellBlend::Trilinear);
    assert_eq!(grid.counts(), [5, 5, 5]);
    assert_eq!(grid.num_nodes(), 125);
    assert_eq!(grid.node_position(0, 0, 0), Point3::new(0.0, 0.0, 0.0));
    assert_eq!(grid.node_position(4, 2, 1), Point3::new(40.0, 20.0, 10.0));
}

// ---------------------------------------------------------------------------
// Grid construction
// ---------------------------------------------------------------------------

#[test]
fn test_zero_spacing_is_rejected() {
    let anchors = warped_anchors();
    let request = GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::identity(),
        anchors: &anchors,
    };
    let mut p = params(CellBlend::default());
    p.spacing = [10, 0, 10];
    let err = build_view_grid(&request, &p, &cube()).expect_err("zero spacing");
    assert!(matches!(err, FusionError::InvalidConfig(_)));
}

#[test]
fn test_too_few_anchors_gives_no_grid() {
    let anchors: Vec<ReferenceAnchor> = warped_anchors().into_iter().take(3).collect();
    let request = GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::identity(),
        anchors: &anchors,
    };
    let grid = build_view_grid(&request, &params(CellBlend::default()), &cube()).expect("ok");
    assert!(grid.is_none());
}

#[test]
fn test_view_outside_bounding_box_gives_no_grid() {
    let anchors = warped_anchors();
    let request = GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::from_translation(500.0, 0.0, 0.0),
        anchors: &anchors,
    };
    let grid = build_view_grid(&request, &params(CellBlend::default()), &cube()).expect("ok");
    assert!(grid.is_none());
}

#[test]
fn test_consistent_anchors_give_identity_nodes() {
    let anchors: Vec<ReferenceAnchor> = warped_anchors()
        .into_iter()
        .map(|a| ReferenceAnchor {
            local: a.local,
            target: a.local,
        })
        .collect();
    let request = GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::identity(),
        anchors: &anchors,
    };
    let grid = build_view_grid(&request, &params(CellBlend::default()), &cube())
        .expect("ok")
        .expect("grid");
    for node in grid.nodes() {
        assert!(node.is_identity(), "node {node:?} is not identity");
    }
}

#[test]
fn test_grid_nodes_equal_direct_fit() {
    let anchors = warped_anchors();
    let mls = MovingLeastSquares::new(&anchors, &Affine3::identity(), 1.0);
    for blend in [CellBlend::default(), CellBlend::Trilinear] {
        let grid = warped_grid(blend);
        for (i, j, k) in [(0, 0, 0), (1, 2, 3), (4, 4, 4), (2, 0, 4)] {
            let p = grid.node_position(i, j, k);
            let from_grid = grid.apply(&p);
            let direct = mls.apply(&p);
            assert_points_close(&from_grid, &direct, 1e-9);
        }
    }
}

#[test]
fn test_grid_is_continuous_across_cells() {
    let eps = 1e-5;
    for blend in [CellBlend::default(), CellBlend::Trilinear] {
        let grid = warped_grid(blend);
        for x in [5.0, 10.0, 15.0, 20.0] {
            let below = grid.apply(&Point3::new(x - eps, 13.3, 27.1));
            let above = grid.apply(&Point3::new(x + eps, 13.3, 27.1));
            assert_points_close(&below, &above, 1e-3);
        }
    }
}

#[test]
fn test_grid_clamps_outside_lattice() {
    for blend in [CellBlend::default(), CellBlend::Trilinear] {
        let grid = warped_grid(blend);
        let inside = grid.correction_at(&Point3::new(0.0, 13.3, 27.1));
        let outside = grid.correction_at(&Point3::new(-50.0, 13.3, 27.1));
        assert_eq!(inside, outside);
    }
}

#[test]
fn test_grid_corrections_from_landmarks() {
    // B is registered 2 pixels too far along x; A and B each get half of the
    // error as a uniform correction.
    let dataset = two_view_bead_dataset(1.0, 1.0, [2.0, 0.0, 0.0]);
    let views = dataset.views();
    let registrations =
        RegistrationSnapshot::resolve(&dataset, views.iter().copied(), None).expect("registrations");
    let set = aggregate_correspondences(
        dataset.landmarks(),
        &views,
        &[LABEL.to_string()],
        &registrations,
        &pool(),
    )
    .expect("correspondences");
    let anchors = anchors_per_view(&set.reference_points);
    let bb = Interval::new([0, 0, 0], [39, 11, 11]);

    for (v, expected_shift) in [(view(0), -1.0), (view(1), 1.0)] {
        let request = GridRequest {
            view: v,
            dims: [30, 12, 12],
            model: *registrations.get(v).expect("model"),
            anchors: &anchors[&v],
        };
        let grid = build_view_grid(&request, &params(CellBlend::default()), &bb)
            .expect("ok")
            .expect("grid");
        for node in grid.nodes() {
            assert!((node.linear - Matrix3::identity()).amax() < 1e-6);
            assert_abs_diff_eq!(node.translation.x, expected_shift, epsilon = 1e-6);
            assert_abs_diff_eq!(node.translation.y, 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(node.translation.z, 0.0, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_compute_grids_mixed_views() {
    let anchors = warped_anchors();
    let few: Vec<ReferenceAnchor> = anchors.iter().take(2).copied().collect();
    let requests = vec![
        GridRequest {
            view: view(0),
            dims: [40, 40, 40],
            model: Affine3::identity(),
            anchors: &anchors,
        },
        GridRequest {
            view: view(1),
            dims: [40, 40, 40],
            model: Affine3::identity(),
            anchors: &few,
        },
    ];
    let grids = compute_grids(&requests, &params(CellBlend::default()), &cube(), &pool())
        .expect("grids");
    assert_eq!(grids.len(), 2);
    assert!(grids[&view(0)].is_some());
    assert!(grids[&view(1)].is_none());
}

#[test]
fn test_compute_grids_propagates_errors() {
    let anchors = warped_anchors();
    let requests = vec![GridRequest {
        view: view(0),
        dims: [40, 40, 40],
        model: Affine3::identity(),
        anchors: &anchors,
    }];
    let mut p = params(CellBlend::default());
    p.spacing = [0, 0, 0];
    let result = compute_grids(&requests, &p, &cube(), &pool());
    assert!(matches!(result, Err(FusionError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

#[test]
fn test_mapping_variants() {
    let model = Affine3::from_translation(10.0, 0.0, 0.0);
    let inverse = model.inverse().expect("invertible");
    let p = Point3::new(15.0, 4.0, 4.0);

    let rigid = ViewMapping::Rigid { inverse };
    assert!(!rigid.is_non_rigid());
    assert_points_close(&rigid.to_local(&p), &Point3::new(5.0, 4.0, 4.0), 1e-12);

    let anchors: Vec<ReferenceAnchor> = warped_anchors()
        .into_iter()
        .map(|a| ReferenceAnchor {
            local: a.local,
            target: Point3::new(a.local.x + 10.0 - 2.0, a.local.y, a.local.z),
        })
        .collect();
    let mls = MovingLeastSquares::new(&anchors, &model, 1.0);
    let direct = ViewMapping::Direct { mls, inverse };
    assert!(direct.is_non_rigid());
    // C(target) = R(local): the correction adds 2 along x.
    assert_points_close(&direct.to_local(&p), &Point3::new(7.0, 4.0, 4.0), 1e-6);
    assert_points_close(&direct.rigid_to_local(&p), &Point3::new(5.0, 4.0, 4.0), 1e-12);
}
