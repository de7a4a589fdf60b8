use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Point3;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::info;

use crate::error::{FusionError, Result};
use crate::registration::RegistrationSnapshot;
use crate::view::ViewId;

use super::reference::{compute_reference_points, LandmarkKey, ReferencePoint};
use super::LandmarkStore;

/// A landmark with its local position and its position in world space under
/// the view's rigid registration.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkRef {
    pub key: LandmarkKey,
    pub local: Point3<f64>,
    pub world: Point3<f64>,
}

/// Two landmarks in different views asserted to be the same structure.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrespondingPair {
    pub a: LandmarkRef,
    pub b: LandmarkRef,
}

impl CorrespondingPair {
    /// Distance between both landmarks after rigid registration.
    pub fn world_distance(&self) -> f64 {
        (self.a.world - self.b.world).norm()
    }
}

/// Correspondence diagnostics of one view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewCorrespondenceStats {
    pub view: ViewId,
    pub pairs: usize,
    /// Mean world distance between corresponding landmarks, `None` without
    /// pairs.
    pub mean_distance: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrespondenceReport {
    pub views: Vec<ViewCorrespondenceStats>,
    pub reference_points: usize,
}

/// Everything derived from the landmark correspondences of one run.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceSet {
    pub pairs: BTreeMap<ViewId, Vec<CorrespondingPair>>,
    pub reference_points: Vec<ReferencePoint>,
    pub report: CorrespondenceReport,
}

/// Load the landmarks of `view` with `label` and resolve every recorded
/// correspondence that points into `views_to_use` and one of `labels`.
///
/// A label missing from `view` is a configuration error; a correspondence
/// that cannot be resolved (unknown foreign label, index out of range) is an
/// assembly error. Both abort the run.
pub fn assemble_corresponding_points(
    store: &dyn LandmarkStore,
    view: ViewId,
    label: &str,
    views_to_use: &BTreeSet<ViewId>,
    labels: &BTreeSet<String>,
    registrations: &RegistrationSnapshot,
) -> Result<Vec<CorrespondingPair>> {
    if !store.labels(view).contains(label) {
        return Err(FusionError::LabelNotFound {
            view,
            label: label.to_string(),
        });
    }

    let points = store.points(view, label).unwrap_or_default();
    let correspondences = store.correspondences(view, label).unwrap_or_default();
    info!(
        view = %view,
        label,
        correspondences = correspondences.len(),
        "Loaded corresponding interest points (to all views)"
    );

    let model = registrations.get(view)?;
    let mut foreign_cache: HashMap<(ViewId, String), Vec<Point3<f64>>> = HashMap::new();
    let mut pairs = Vec::with_capacity(correspondences.len());

    for corr in &correspondences {
        if !views_to_use.contains(&corr.foreign_view) || !labels.contains(&corr.foreign_label) {
            continue;
        }

        let local = *points.get(corr.local_index).ok_or_else(|| {
            FusionError::CorrespondenceAssembly(format!(
                "view {view}, label '{label}': landmark index {} out of range ({} points)",
                corr.local_index,
                points.len()
            ))
        })?;

        let cache_key = (corr.foreign_view, corr.foreign_label.clone());
        if !foreign_cache.contains_key(&cache_key) {
            let foreign_points = store
                .points(corr.foreign_view, &corr.foreign_label)
                .ok_or_else(|| {
                    FusionError::CorrespondenceAssembly(format!(
                        "view {} has no label '{}' referenced from view {view}",
                        corr.foreign_view, corr.foreign_label
                    ))
                })?;
            foreign_cache.insert(cache_key.clone(), foreign_points);
        }
        let foreign_points = &foreign_cache[&cache_key];

        let foreign_local = *foreign_points.get(corr.foreign_index).ok_or_else(|| {
            FusionError::CorrespondenceAssembly(format!(
                "view {}, label '{}': landmark index {} out of range ({} points)",
                corr.foreign_view,
                corr.foreign_label,
                corr.foreign_index,
                foreign_points.len()
            ))
        })?;
        let foreign_model = registrations.get(corr.foreign_view)?;

        pairs.push(CorrespondingPair {
            a: LandmarkRef {
                key: LandmarkKey {
                    view,
                    label: label.to_string(),
                    index: corr.local_index,
                },
                local,
                world: model.apply(&local),
            },
            b: LandmarkRef {
                key: LandmarkKey {
                    view: corr.foreign_view,
                    label: corr.foreign_label.clone(),
                    index: corr.foreign_index,
                },
                local: foreign_local,
                world: foreign_model.apply(&foreign_local),
            },
        });
    }

    Ok(pairs)
}

/// Mean world distance between corresponding landmarks.
pub fn mean_world_distance(pairs: &[CorrespondingPair]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let sum: f64 = pairs.iter().map(CorrespondingPair::world_distance).sum();
    Some(sum / pairs.len() as f64)
}

/// Load all correspondences of `views_to_use` for `labels` and build the
/// reference points. Views are loaded in parallel on `pool`; the first
/// failure aborts the whole aggregation.
pub fn aggregate_correspondences(
    store: &dyn LandmarkStore,
    views_to_use: &[ViewId],
    labels: &[String],
    registrations: &RegistrationSnapshot,
    pool: &ThreadPool,
) -> Result<CorrespondenceSet> {
    aggregate_correspondences_with_progress(
        store,
        views_to_use,
        labels,
        registrations,
        pool,
        |_| {},
    )
}

/// Like [`aggregate_correspondences`], calling `on_progress(views_done)` as
/// each view's correspondences are loaded.
pub fn aggregate_correspondences_with_progress(
    store: &dyn LandmarkStore,
    views_to_use: &[ViewId],
    labels: &[String],
    registrations: &RegistrationSnapshot,
    pool: &ThreadPool,
    on_progress: impl Fn(usize) + Send + Sync,
) -> Result<CorrespondenceSet> {
    let use_set: BTreeSet<ViewId> = views_to_use.iter().copied().collect();
    let label_set: BTreeSet<String> = labels.iter().cloned().collect();
    let done = AtomicUsize::new(0);

    let per_view: Vec<(ViewId, Vec<CorrespondingPair>)> = pool.install(|| {
        use_set
            .par_iter()
            .map(|&view| {
                let mut pairs = Vec::new();
                for label in labels {
                    pairs.extend(assemble_corresponding_points(
                        store,
                        view,
                        label,
                        &use_set,
                        &label_set,
                        registrations,
                    )?);
                }
                on_progress(done.fetch_add(1, Ordering::Relaxed) + 1);
                Ok((view, pairs))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut report = CorrespondenceReport::default();
    let mut pairs_by_view = BTreeMap::new();
    for (view, pairs) in per_view {
        let mean_distance = mean_world_distance(&pairs);
        info!(
            view = %view,
            pairs = pairs.len(),
            average_distance = mean_distance.unwrap_or(0.0),
            "Loaded pairs of corresponding interest points"
        );
        report.views.push(ViewCorrespondenceStats {
            view,
            pairs: pairs.len(),
            mean_distance,
        });
        pairs_by_view.insert(view, pairs);
    }

    let reference_points = compute_reference_points(pairs_by_view.values().flatten());
    report.reference_points = reference_points.len();
    info!(
        reference_points = reference_points.len(),
        "Computed unique reference points"
    );

    Ok(CorrespondenceSet {
        pairs: pairs_by_view,
        reference_points,
        report,
    })
}
