//! Landmark points, their cross-view correspondences and the reference
//! points derived from them.

pub mod aggregate;
pub mod reference;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nalgebra::Point3;

use crate::view::ViewId;

pub use aggregate::{
    aggregate_correspondences, aggregate_correspondences_with_progress,
    assemble_corresponding_points, CorrespondenceReport, CorrespondenceSet, CorrespondingPair, LandmarkRef, ViewCorrespondenceStats,
};
pub use reference::{
    anchors_per_view, compute_reference_points, DisjointSet, LandmarkKey, ReferenceAnchor,
    ReferenceMember, ReferencePoint,
};

/// One recorded correspondence of a landmark in some view to a landmark in
/// another view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandmarkCorrespondence {
    /// Index of the landmark in the owning view's list.
    pub local_index: usize,
    pub foreign_view: ViewId,
    pub foreign_label: String,
    /// Index of the landmark in the foreign view's list for `foreign_label`.
    pub foreign_index: usize,
}

/// Read access to detected landmark points and their correspondences.
pub trait LandmarkStore: Send + Sync {
    /// Labels available for a view.
    fn labels(&self, view: ViewId) -> BTreeSet<String>;

    /// Local coordinates of all landmarks of `view` with `label`.
    fn points(&self, view: ViewId, label: &str) -> Option<Vec<Point3<f64>>>;

    /// Correspondences recorded for the landmarks of `view` with `label`.
    fn correspondences(&self, view: ViewId, label: &str) -> Option<Vec<LandmarkCorrespondence>>;
}

#[derive(Clone, Debug, Default)]
struct LandmarkList {
    points: Vec<Point3<f64>>,
    correspondences: Vec<LandmarkCorrespondence>,
}

/// In-memory landmark store.
#[derive(Clone, Debug, Default)]
pub struct LandmarkDatabase {
    lists: HashMap<ViewId, BTreeMap<String, LandmarkList>>,
}

impl LandmarkDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the landmark points of `view` for `label`, keeping any recorded
    /// correspondences.
    pub fn set_points(&mut self, view: ViewId, label: &str, points: Vec<Point3<f64>>) {
        self.lists
            .entry(view)
            .or_default()
            .entry(label.to_string())
            .or_default()
            .points = points;
    }

    /// Record a one-directional correspondence.
    pub fn add_correspondence(&mut self, view: ViewId, label: &str, corr: LandmarkCorrespondence) {
        self.lists
            .entry(view)
            .or_default()
            .entry(label.to_string())
            .or_default()
            .correspondences
            .push(corr);
    }

    /// Record that landmark `a_index` of `(a, a_label)` and landmark
    /// `b_index` of `(b, b_label)` are the same structure, in both
    /// directions.
    pub fn link(
        &mut self,
        (a, a_label, a_index): (ViewId, &str, usize),
        (b, b_label, b_index): (ViewId, &str, usize),
    ) {
        self.add_correspondence(
            a,
            a_label,
            LandmarkCorrespondence {
                local_index: a_index,
                foreign_view: b,
                foreign_label: b_label.to_string(),
                foreign_index: b_index,
            },
        );
        self.add_correspondence(
            b,
            b_label,
            LandmarkCorrespondence {
                local_index: b_index,
                foreign_view: a,
                foreign_label: a_label.to_string(),
                foreign_index: a_index,
            },
        );
    }

    pub fn num_views(&self) -> usize {
        self.lists.len()
    }
}

impl LandmarkStore for LandmarkDatabase {
    fn labels(&self, view: ViewId) -> BTreeSet<String> {
        self.lists
            .get(&view)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn points(&self, view: ViewId, label: &str) -> Option<Vec<Point3<f64>>> {
        self.lists
            .get(&view)
            .and_then(|m| m.get(label))
            .map(|l| l.points.clone())
    }

    fn correspondences(&self, view: ViewId, label: &str) -> Option<Vec<LandmarkCorrespondence>> {
        self.lists
            .get(&view)
            .and_then(|m| m.get(label))
            .map(|l| l.correspondences.clone())
    }
}
