use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FusionError, Result};
use crate::landmarks::{LandmarkDatabase, LandmarkStore};
use crate::transform::Affine3;
use crate::view::{ImageSource, Interval, ViewId};

/// Everything the fusion needs to know about an acquisition.
///
/// Implementations own the storage format; the fusion only reads.
pub trait ViewDataset: Send + Sync {
    /// All views present in the dataset, sorted.
    fn views(&self) -> Vec<ViewId>;

    /// Raw image of a view.
    fn image(&self, view: ViewId) -> Result<Arc<dyn ImageSource>>;

    /// Fully resolved registration of a view, mapping local image
    /// coordinates to world coordinates.
    fn registration(&self, view: ViewId) -> Result<Affine3>;

    fn landmarks(&self) -> &dyn LandmarkStore;

    /// Named output bounding box in world coordinates.
    fn bounding_box(&self, name: &str) -> Option<Interval>;
}

/// A view held by a [`MemoryDataset`].
#[derive(Clone)]
struct MemoryView {
    image: Arc<dyn ImageSource>,
    registration: Affine3,
}

/// Dataset kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryDataset {
    views: BTreeMap<ViewId, MemoryView>,
    landmarks: LandmarkDatabase,
    bounding_boxes: BTreeMap<String, Interval>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a view.
    pub fn add_view(&mut self, view: ViewId, image: Arc<dyn ImageSource>, registration: Affine3) {
        self.views.insert(
            view,
            MemoryView {
                image,
                registration,
            },
        );
    }

    pub fn add_bounding_box(&mut self, name: &str, interval: Interval) {
        self.bounding_boxes.insert(name.to_string(), interval);
    }

    pub fn bounding_box_names(&self) -> impl Iterator<Item = &str> {
        self.bounding_boxes.keys().map(String::as_str)
    }

    pub fn landmark_database(&self) -> &LandmarkDatabase {
        &self.landmarks
    }

    pub fn landmarks_mut(&mut self) -> &mut LandmarkDatabase {
        &mut self.landmarks
    }
}

impl ViewDataset for MemoryDataset {
    fn views(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    fn image(&self, view: ViewId) -> Result<Arc<dyn ImageSource>> {
        self.views
            .get(&view)
            .map(|v| v.image.clone())
            .ok_or(FusionError::UnknownView(view))
    }

    fn registration(&self, view: ViewId) -> Result<Affine3> {
        self.views
            .get(&view)
            .map(|v| v.registration)
            .ok_or(FusionError::UnknownView(view))
    }

    fn landmarks(&self) -> &dyn LandmarkStore {
        &self.landmarks
    }

    fn bounding_box(&self, name: &str) -> Option<Interval> {
        self.bounding_boxes.get(name).copied()
    }
}
