#[allow(dead_code)]
mod common;

use std::collections::BTreeSet;

use approx::assert_abs_diff_eq;
use nalgebra::Point3;

use multiview_core::dataset::{MemoryDataset, ViewDataset};
use multiview_core::error::FusionError;
use multiview_core::landmarks::{
    aggregate_correspondences, anchors_per_view, assemble_corresponding_points,
    compute_reference_points, CorrespondingPair, DisjointSet, LandmarkCorrespondence,
    LandmarkStore,
};
use multiview_core::registration::RegistrationSnapshot;
use multiview_core::transform::Affine3;
use multiview_core::view::ViewId;

use common::{constant_image, pool, two_view_bead_dataset, view, LABEL};

/// Three views with one landmark each, linked A-B and B-C. The landmark sits
/// at local (5, 5, 5) in every view; registrations differ so the world
/// positions are (5, 5, 5), (6, 5, 5) and (5, 7, 5).
fn chain_dataset() -> MemoryDataset {
    let mut dataset = MemoryDataset::new();
    let models = [
        Affine3::identity(),
        Affine3::from_translation(1.0, 0.0, 0.0),
        Affine3::from_translation(0.0, 2.0, 0.0),
    ];
    for (setup, model) in models.into_iter().enumerate() {
        let v = view(setup as u32);
        dataset.add_view(v, constant_image([10, 10, 10], 0.0), model);
        dataset
            .landmarks_mut()
            .set_points(v, LABEL, vec![Point3::new(5.0, 5.0, 5.0)]);
    }
    let db = dataset.landmarks_mut();
    db.link((view(0), LABEL, 0), (view(1), LABEL, 0));
    db.link((view(1), LABEL, 0), (view(2), LABEL, 0));
    dataset
}

fn snapshot(dataset: &MemoryDataset) -> RegistrationSnapshot {
    RegistrationSnapshot::resolve(dataset, dataset.views(), None).expect("registrations")
}

fn labels() -> Vec<String> {
    vec![LABEL.to_string()]
}

fn all_pairs(dataset: &MemoryDataset) -> Vec<CorrespondingPair> {
    let set = aggregate_correspondences(
        dataset.landmarks(),
        &dataset.views(),
        &labels(),
        &snapshot(dataset),
        &pool(),
    )
    .expect("aggregation");
    set.pairs.into_values().flatten().collect()
}

// ---------------------------------------------------------------------------
// Disjoint set
// ---------------------------------------------------------------------------

#[test]
fn test_disjoint_set_union_find() {
    let mut sets = DisjointSet::new(5);
    assert_eq!(sets.len(), 5);
    sets.union(0, 1);
    sets.union(3, 4);
    sets.union(1, 4);
    assert_eq!(sets.find(0), sets.find(3));
    assert_ne!(sets.find(0), sets.find(2));

    let extra = sets.push();
    assert_eq!(extra, 5);
    assert_eq!(sets.find(extra), extra);
    assert!(!sets.is_empty());
}

#[test]
fn test_disjoint_set_self_union() {
    let mut sets = DisjointSet::new(2);
    sets.union(1, 1);
    assert_eq!(sets.find(1), 1);
    assert_ne!(sets.find(0), sets.find(1));
}

// ---------------------------------------------------------------------------
// Landmark store
// ---------------------------------------------------------------------------

#[test]
fn test_link_records_both_directions() {
    let dataset = chain_dataset();
    let store = dataset.landmarks();

    assert_eq!(store.labels(view(0)), BTreeSet::from([LABEL.to_string()]));
    assert!(store.labels(ViewId::new(9, 9)).is_empty());

    let from_b = store.correspondences(view(1), LABEL).expect("label exists");
    assert_eq!(from_b.len(), 2);
    assert!(from_b.contains(&LandmarkCorrespondence {
        local_index: 0,
        foreign_view: view(0),
        foreign_label: LABEL.to_string(),
        foreign_index: 0,
    }));
    assert!(store.points(view(0), "nuclei").is_none());
    assert_eq!(dataset.landmark_database().num_views(), 3);
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[test]
fn test_assemble_resolves_world_positions() {
    let dataset = chain_dataset();
    let use_set: BTreeSet<ViewId> = dataset.views().into_iter().collect();
    let label_set = BTreeSet::from([LABEL.to_string()]);
    let pairs = assemble_corresponding_points(
        dataset.landmarks(),
        view(1),
        LABEL,
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect("assembly");

    assert_eq!(pairs.len(), 2);
    for pair in &pairs {
        assert_eq!(pair.a.key.view, view(1));
        assert_eq!(pair.a.world, Point3::new(6.0, 5.0, 5.0));
    }
    let to_c = pairs
        .iter()
        .find(|p| p.b.key.view == view(2))
        .expect("pair to C");
    assert_eq!(to_c.b.world, Point3::new(5.0, 7.0, 5.0));
    assert_abs_diff_eq!(to_c.world_distance(), 5.0_f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_assemble_skips_views_outside_use_set() {
    let dataset = chain_dataset();
    let use_set = BTreeSet::from([view(0), view(1)]);
    let label_set = BTreeSet::from([LABEL.to_string()]);
    let pairs = assemble_corresponding_points(
        dataset.landmarks(),
        view(1),
        LABEL,
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect("assembly");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].b.key.view, view(0));
}

#[test]
fn test_assemble_skips_foreign_labels_not_requested() {
    let mut dataset = chain_dataset();
    let db = dataset.landmarks_mut();
    db.set_points(view(2), "nuclei", vec![Point3::new(1.0, 1.0, 1.0)]);
    db.link((view(1), LABEL, 0), (view(2), "nuclei", 0));

    let use_set: BTreeSet<ViewId> = dataset.views().into_iter().collect();
    let label_set = BTreeSet::from([LABEL.to_string()]);
    let pairs = assemble_corresponding_points(
        dataset.landmarks(),
        view(1),
        LABEL,
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect("assembly");
    assert_eq!(pairs.len(), 2);
    assert!(pairs.iter().all(|p| p.b.key.label == LABEL));
}

#[test]
fn test_assemble_missing_label() {
    let dataset = chain_dataset();
    let use_set: BTreeSet<ViewId> = dataset.views().into_iter().collect();
    let label_set = BTreeSet::from(["nuclei".to_string()]);
    let err = assemble_corresponding_points(
        dataset.landmarks(),
        view(0),
        "nuclei",
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect_err("label is missing");
    assert!(matches!(err, FusionError::LabelNotFound { view: v, .. } if v == view(0)));
}

#[test]
fn test_assemble_local_index_out_of_range() {
    let mut dataset = chain_dataset();
    dataset
        .landmarks_mut()
        .link((view(0), LABEL, 3), (view(1), LABEL, 0));
    let use_set: BTreeSet<ViewId> = dataset.views().into_iter().collect();
    let label_set = BTreeSet::from([LABEL.to_string()]);
    let err = assemble_corresponding_points(
        dataset.landmarks(),
        view(0),
        LABEL,
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect_err("index out of range");
    assert!(matches!(err, FusionError::CorrespondenceAssembly(_)));
}

#[test]
fn test_assemble_foreign_label_missing() {
    let mut dataset = chain_dataset();
    dataset.landmarks_mut().add_correspondence(
        view(0),
        LABEL,
        LandmarkCorrespondence {
            local_index: 0,
            foreign_view: view(2),
            foreign_label: "nuclei".to_string(),
            foreign_index: 0,
        },
    );
    let use_set: BTreeSet<ViewId> = dataset.views().into_iter().collect();
    let label_set = BTreeSet::from([LABEL.to_string(), "nuclei".to_string()]);
    let err = assemble_corresponding_points(
        dataset.landmarks(),
        view(0),
        LABEL,
        &use_set,
        &label_set,
        &snapshot(&dataset),
    )
    .expect_err("foreign label missing");
    assert!(matches!(err, FusionError::CorrespondenceAssembly(_)));
}

// ---------------------------------------------------------------------------
// Reference points
// ---------------------------------------------------------------------------

#[test]
fn test_chain_collapses_into_one_reference_point() {
    let dataset = chain_dataset();
    let pairs = all_pairs(&dataset);
    // Each link is loaded from both of its views.
    assert_eq!(pairs.len(), 4);

    let points = compute_reference_points(&pairs);
    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.members.len(), 3);
    assert_abs_diff_eq!(point.world.x, 16.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(point.world.y, 17.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(point.world.z, 5.0, epsilon = 1e-12);

    let member_views: Vec<ViewId> = point.members.iter().map(|m| m.key.view).collect();
    assert_eq!(member_views, vec![view(0), view(1), view(2)]);
}

#[test]
fn test_reference_points_do_not_depend_on_pair_order() {
    let dataset = two_view_bead_dataset(0.0, 0.0, [0.5, -0.25, 1.0]);
    let pairs = all_pairs(&dataset);
    let mut reversed = pairs.clone();
    reversed.reverse();

    let forward = compute_reference_points(&pairs);
    let backward = compute_reference_points(&reversed);
    assert_eq!(forward.len(), 5);
    assert_eq!(forward, backward);
}

#[test]
fn test_reference_point_is_midpoint_of_pair() {
    let dataset = two_view_bead_dataset(0.0, 0.0, [2.0, 0.0, 0.0]);
    let points = compute_reference_points(&all_pairs(&dataset));
    for point in &points {
        let [a, b] = [&point.members[0], &point.members[1]];
        assert_abs_diff_eq!(point.world.x, (a.world.x + b.world.x) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.world.x - a.world.x, 2.0, epsilon = 1e-12);
    }
}

#[test]
fn test_no_pairs_no_reference_points() {
    let points = compute_reference_points(&Vec::<CorrespondingPair>::new());
    assert!(points.is_empty());
}

#[test]
fn test_anchors_per_view() {
    let dataset = chain_dataset();
    let points = compute_reference_points(&all_pairs(&dataset));
    let anchors = anchors_per_view(&points);

    assert_eq!(anchors.len(), 3);
    let target = points[0].world;
    for v in [view(0), view(1), view(2)] {
        let list = &anchors[&v];
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].local, Point3::new(5.0, 5.0, 5.0));
        assert_eq!(list[0].target, target);
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[test]
fn test_aggregate_report() {
    let dataset = two_view_bead_dataset(0.0, 0.0, [0.0, 3.0, 4.0]);
    let set = aggregate_correspondences(
        dataset.landmarks(),
        &dataset.views(),
        &labels(),
        &snapshot(&dataset),
        &pool(),
    )
    .expect("aggregation");

    assert_eq!(set.report.reference_points, 5);
    assert_eq!(set.report.views.len(), 2);
    for stats in &set.report.views {
        assert_eq!(stats.pairs, 5);
        assert_abs_diff_eq!(stats.mean_distance.expect("pairs"), 5.0, epsilon = 1e-9);
    }
}

#[test]
fn test_aggregate_view_without_pairs() {
    let mut dataset = chain_dataset();
    dataset.add_view(view(3), constant_image([4, 4, 4], 0.0), Affine3::identity());
    dataset.landmarks_mut().set_points(view(3), LABEL, Vec::new());

    let set = aggregate_correspondences(
        dataset.landmarks(),
        &dataset.views(),
        &labels(),
        &snapshot(&dataset),
        &pool(),
    )
    .expect("aggregation");
    let stats = set
        .report
        .views
        .iter()
        .find(|s| s.view == view(3))
        .expect("stats for view 3");
    assert_eq!(stats.pairs, 0);
    assert_eq!(stats.mean_distance, None);
    assert_eq!(set.reference_points.len(), 1);
}

#[test]
fn test_aggregate_fails_on_missing_label() {
    let mut dataset = chain_dataset();
    dataset.add_view(view(3), constant_image([4, 4, 4], 0.0), Affine3::identity());

    let result = aggregate_correspondences(
        dataset.landmarks(),
        &dataset.views(),
        &labels(),
        &snapshot(&dataset),
        &pool(),
    );
    assert!(matches!(result, Err(FusionError::LabelNotFound { .. })));
}
