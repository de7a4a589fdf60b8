use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{MemoryDataset, ViewDataset};
use crate::error::{FusionError, Result};
use crate::landmarks::LandmarkStore;
use crate::transform::Affine3;
use crate::view::{ImageSource, Interval, ViewId};

use super::raw::{Endian, PixelType, RawLayout, RawVolume};

/// One acquisition listed in a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub timepoint: u32,
    pub setup: u32,
    /// Raw volume file, relative to the manifest.
    pub file: PathBuf,
    /// Size in pixels, (x, y, z).
    pub dims: [usize; 3],
    #[serde(default)]
    pub pixel_type: PixelType,
    #[serde(default)]
    pub endian: Endian,
    #[serde(default)]
    pub offset: usize,
    /// Registration as a row-major 3x4 matrix, mapping calibrated
    /// coordinates to world coordinates.
    #[serde(default = "identity_row_major")]
    pub affine: [f64; 12],
    /// Calibration applied before `affine`.
    #[serde(default)]
    pub voxel_size: Option<[f64; 3]>,
}

fn identity_row_major() -> [f64; 12] {
    Affine3::identity().to_row_major()
}

impl ViewEntry {
    pub fn id(&self) -> ViewId {
        ViewId::new(self.timepoint, self.setup)
    }

    /// Full model from local pixel to world coordinates.
    pub fn model(&self) -> Affine3 {
        let affine = Affine3::from_row_major(self.affine);
        match self.voxel_size {
            Some([x, y, z]) => Affine3::from_scale(x, y, z).then(&affine),
            None => affine,
        }
    }

    pub fn layout(&self) -> RawLayout {
        RawLayout {
            dims: self.dims,
            pixel_type: self.pixel_type,
            endian: self.endian,
            offset: self.offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxEntry {
    pub name: String,
    pub min: [i64; 3],
    pub max: [i64; 3],
}

/// Landmark points of one view and label, in local pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkEntry {
    pub view: ViewId,
    pub label: String,
    pub points: Vec<[f64; 3]>,
}

/// Endpoint of a correspondence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkLink {
    pub view: ViewId,
    pub label: String,
    pub index: usize,
}

/// Two landmarks that are the same structure. Stored once, used in both
/// directions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceEntry {
    pub a: LandmarkLink,
    pub b: LandmarkLink,
}

/// TOML description of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub views: Vec<ViewEntry>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBoxEntry>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkEntry>,
    #[serde(default)]
    pub correspondences: Vec<CorrespondenceEntry>,
}

impl DatasetManifest {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FusionError::Manifest(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| FusionError::Manifest(e.to_string()))
    }

    /// Check references between sections.
    fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for v in &self.views {
            if !ids.insert(v.id()) {
                return Err(FusionError::Manifest(format!("duplicate view {}", v.id())));
            }
        }
        for l in &self.landmarks {
            if !ids.contains(&l.view) {
                return Err(FusionError::Manifest(format!(
                    "landmarks '{}' reference unknown view {}",
                    l.label, l.view
                )));
            }
        }
        for c in &self.correspondences {
            for end in [&c.a, &c.b] {
                if !ids.contains(&end.view) {
                    return Err(FusionError::Manifest(format!(
                        "correspondence references unknown view {}",
                        end.view
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dataset described by a TOML manifest with one raw file per view.
pub struct ManifestDataset {
    manifest: DatasetManifest,
    root: PathBuf,
    inner: MemoryDataset,
}

impl ManifestDataset {
    /// Read the manifest at `path` and map every view's raw file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let manifest = DatasetManifest::from_toml(&text)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_manifest(manifest, &root)
    }

    /// Build a dataset from a parsed manifest. Relative view files are
    /// resolved against `root`.
    pub fn from_manifest(manifest: DatasetManifest, root: &Path) -> Result<Self> {
        manifest.validate()?;

        let mut inner = MemoryDataset::new();
        for entry in &manifest.views {
            let file = root.join(&entry.file);
            let volume = RawVolume::open(&file, entry.layout())?;
            let image: Arc<dyn ImageSource> = Arc::new(volume);
            inner.add_view(entry.id(), image, entry.model());
        }

        for bb in &manifest.bounding_boxes {
            inner.add_bounding_box(&bb.name, Interval::new(bb.min, bb.max));
        }

        let db = inner.landmarks_mut();
        for l in &manifest.landmarks {
            let points = l
                .points
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect();
            db.set_points(l.view, &l.label, points);
        }
        for c in &manifest.correspondences {
            db.link(
                (c.a.view, c.a.label.as_str(), c.a.index),
                (c.b.view, c.b.label.as_str(), c.b.index),
            );
        }

        info!(
            views = manifest.views.len(),
            bounding_boxes = manifest.bounding_boxes.len(),
            correspondences = manifest.correspondences.len(),
            "Loaded dataset manifest"
        );

        Ok(Self {
            manifest,
            root: root.to_path_buf(),
            inner,
        })
    }

    pub fn manifest(&self) -> &DatasetManifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ViewDataset for ManifestDataset {
    fn views(&self) -> Vec<ViewId> {
        self.inner.views()
    }

    fn image(&self, view: ViewId) -> Result<Arc<dyn ImageSource>> {
        self.inner.image(view)
    }

    fn registration(&self, view: ViewId) -> Result<Affine3> {
        self.inner.registration(view)
    }

    fn landmarks(&self) -> &dyn LandmarkStore {
        self.inner.landmarks()
    }

    fn bounding_box(&self, name: &str) -> Option<Interval> {
        self.inner.bounding_box(name)
    }
}
