use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info};

use crate::dataset::ViewDataset;
use crate::deform::{compute_grids_with_progress, GridRequest, MovingLeastSquares, ViewMapping};
use crate::error::{FusionError, Result};
use crate::landmarks::{
    aggregate_correspondences_with_progress, anchors_per_view, ReferenceAnchor,
};
use crate::registration::RegistrationSnapshot;
use crate::sample::{DistanceView, Interpolation, TransformedView};
use crate::view::{ImageSource, Interval, ViewId};
use crate::volume::{ConstantVolume, VirtualVolume};
use crate::weights::{build_weight_field, TransformedWeight, WeightField, WeightingConfig};

use super::config::{FusionConfig, NonRigidMode};
use super::fused::{Contribution, FusedVolume};
use super::types::{FusionOutput, FusionStage, NoOpReporter, ProgressReporter};

/// One view ready for compositing.
struct ViewSetup {
    view: ViewId,
    image: Arc<dyn ImageSource>,
    mapping: Arc<ViewMapping>,
}

/// Requested views that exist in the dataset; all of them when `requested`
/// is empty.
fn select_views(available: &[ViewId], requested: &[ViewId]) -> Vec<ViewId> {
    if requested.is_empty() {
        return available.to_vec();
    }
    let mut selected: Vec<ViewId> = requested
        .iter()
        .copied()
        .filter(|v| available.contains(v))
        .collect();
    selected.sort();
    selected.dedup();
    let removed = requested.len() - selected.len();
    if removed > 0 {
        info!(removed, "Removed views because they are not present");
    }
    selected
}

/// Output interval in (possibly downsampled) output coordinates.
fn output_interval(bounding_box: &Interval, downsampling: Option<f64>) -> Result<Interval> {
    let bb = match downsampling {
        Some(ds) => bounding_box.scale(1.0 / ds),
        None => *bounding_box,
    };
    if bb.is_empty() {
        return Err(FusionError::InvalidVolume(format!(
            "bounding box {bb} is empty"
        )));
    }
    Ok(bb)
}

fn load_images(
    dataset: &dyn ViewDataset,
    views: &[ViewId],
) -> Result<Vec<(ViewId, Arc<dyn ImageSource>)>> {
    views
        .iter()
        .map(|&view| Ok((view, dataset.image(view)?)))
        .collect()
}

/// Choose the mapping of every view to fuse: a non-rigid one when the view
/// has enough reference points, its rigid registration otherwise.
fn build_mappings(
    images: &[(ViewId, Arc<dyn ImageSource>)],
    registrations: &RegistrationSnapshot,
    anchors: &BTreeMap<ViewId, Vec<ReferenceAnchor>>,
    config: &FusionConfig,
    bounding_box: &Interval,
    pool: &ThreadPool,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<Vec<Arc<ViewMapping>>> {
    let no_anchors: Vec<ReferenceAnchor> = Vec::new();
    let anchors_of = |view: ViewId| anchors.get(&view).unwrap_or(&no_anchors);

    match config.mode {
        NonRigidMode::Grid => {
            let requests = images
                .iter()
                .map(|(view, image)| {
                    Ok(GridRequest {
                        view: *view,
                        dims: image.dims(),
                        model: *registrations.get(*view)?,
                        anchors: anchors_of(*view).as_slice(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let mut grids = compute_grids_with_progress(
                &requests,
                &config.grid_params(),
                bounding_box,
                pool,
                |done| reporter.advance(done),
            )?;

            images
                .iter()
                .map(|(view, _)| {
                    let inverse = registrations.inverse(*view)?;
                    let mapping = match grids.remove(view).flatten() {
                        Some(grid) => ViewMapping::Grid { grid, inverse },
                        None => ViewMapping::Rigid { inverse },
                    };
                    Ok(Arc::new(mapping))
                })
                .collect()
        }
        NonRigidMode::Direct => images
            .iter()
            .enumerate()
            .map(|(i, (view, _))| {
                let inverse = registrations.inverse(*view)?;
                let view_anchors = anchors_of(*view);
                let mapping = if view_anchors.len() < config.min_reference_points {
                    debug!(
                        view = %view,
                        anchors = view_anchors.len(),
                        "Too few reference points, using the affine model"
                    );
                    ViewMapping::Rigid { inverse }
                } else {
                    let model = registrations.get(*view)?;
                    let mls = MovingLeastSquares::new(view_anchors, model, config.alpha);
                    ViewMapping::Direct { mls, inverse }
                };
                reporter.advance(i + 1);
                Ok(Arc::new(mapping))
            })
            .collect(),
    }
}

/// Estimate the weight field of every view on `pool`. Content-based weights
/// are computed here, everything else is evaluated lazily.
fn build_weights(
    setups: &[ViewSetup],
    weighting: &WeightingConfig,
    registrations: &RegistrationSnapshot,
    pool: &ThreadPool,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<Vec<Arc<dyn WeightField>>> {
    let done = AtomicUsize::new(0);
    pool.install(|| {
        setups
            .par_iter()
            .map(|setup| {
                let model = registrations.get(setup.view)?;
                let field =
                    build_weight_field(weighting, setup.view, setup.image.as_ref(), model);
                reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                Ok(field)
            })
            .collect()
    })
}

fn assemble(
    setups: Vec<ViewSetup>,
    fields: Vec<Arc<dyn WeightField>>,
    interval: Interval,
    interpolation: Interpolation,
    display_distances: bool,
    background: f32,
) -> FusedVolume {
    let contributions = setups
        .into_iter()
        .zip(fields)
        .map(|(setup, field)| {
            let image: Arc<dyn VirtualVolume> = if display_distances {
                if setup.mapping.is_non_rigid() {
                    Arc::new(DistanceView::new(
                        setup.image.dims(),
                        setup.mapping.clone(),
                        interval,
                        0.0,
                    ))
                } else {
                    Arc::new(ConstantVolume::new(interval, 0.0))
                }
            } else {
                Arc::new(TransformedView::new(
                    setup.image,
                    setup.mapping.clone(),
                    interval,
                    interpolation,
                    0.0,
                ))
            };
            let weight = Arc::new(TransformedWeight::new(field, setup.mapping, interval));
            Contribution { image, weight }
        })
        .collect();
    FusedVolume::new(interval, contributions, background)
}

/// Fuse all selected views into a virtual volume over `bounding_box`, with
/// a thread-safe progress reporter.
///
/// All fallible work (configuration, correspondences, grids, content-based
/// weights) happens before this returns; reading the result cannot fail.
pub fn fuse_virtual_reported(
    dataset: &dyn ViewDataset,
    config: &FusionConfig,
    bounding_box: &Interval,
    pool: &ThreadPool,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<FusionOutput> {
    config.validate()?;

    let available = dataset.views();
    let views_to_fuse = select_views(&available, &config.views_to_fuse);
    let views_to_use = select_views(&available, &config.views_to_use);
    if views_to_fuse.is_empty() {
        return Err(FusionError::EmptyViewSet);
    }

    let downsampling = config.effective_downsampling();
    let bb = output_interval(bounding_box, downsampling)?;
    info!(
        bounding_box = %bb,
        views_to_fuse = views_to_fuse.len(),
        views_to_use = views_to_use.len(),
        weights = %config.weighting,
        mode = %config.mode,
        "Starting non-rigid fusion"
    );

    reporter.begin_stage(FusionStage::Registrations, None);
    let registrations = RegistrationSnapshot::resolve(
        dataset,
        views_to_use.iter().chain(&views_to_fuse).copied(),
        downsampling,
    )?;
    reporter.finish_stage();

    reporter.begin_stage(FusionStage::Correspondences, Some(views_to_use.len()));
    let correspondences = aggregate_correspondences_with_progress(
        dataset.landmarks(),
        &views_to_use,
        &config.labels,
        &registrations,
        pool,
        |done| reporter.advance(done),
    )?;
    let anchors = anchors_per_view(&correspondences.reference_points);
    reporter.finish_stage();

    let images = load_images(dataset, &views_to_fuse)?;

    reporter.begin_stage(FusionStage::Grids, Some(images.len()));
    let mappings =
        build_mappings(&images, &registrations, &anchors, config, &bb, pool, &reporter)?;
    reporter.finish_stage();

    let non_rigid_views = mappings.iter().filter(|m| m.is_non_rigid()).count();
    let setups: Vec<ViewSetup> = images
        .into_iter()
        .zip(mappings)
        .map(|((view, image), mapping)| ViewSetup {
            view,
            image,
            mapping,
        })
        .collect();

    reporter.begin_stage(FusionStage::Weights, Some(setups.len()));
    let fields = build_weights(&setups, &config.weighting, &registrations, pool, &reporter)?;
    reporter.finish_stage();

    reporter.begin_stage(FusionStage::Compositing, None);
    let volume = assemble(
        setups,
        fields,
        bb,
        config.interpolation,
        config.display_distances,
        config.background,
    );
    reporter.finish_stage();
    info!(
        non_rigid_views,
        rigid_views = volume.num_views() - non_rigid_views,
        "Virtual fusion ready"
    );

    Ok(FusionOutput {
        volume: Arc::new(volume),
        non_rigid_views,
        correspondences: correspondences.report,
    })
}

/// Fuse all selected views into a virtual volume over `bounding_box`.
pub fn fuse_virtual(
    dataset: &dyn ViewDataset,
    config: &FusionConfig,
    bounding_box: &Interval,
    pool: &ThreadPool,
) -> Result<FusionOutput> {
    fuse_virtual_reported(dataset, config, bounding_box, pool, Arc::new(NoOpReporter))
}

/// Like [`fuse_virtual`], looking the bounding box up by name.
pub fn fuse_named(
    dataset: &dyn ViewDataset,
    config: &FusionConfig,
    bounding_box: &str,
    pool: &ThreadPool,
) -> Result<FusionOutput> {
    let bb = dataset
        .bounding_box(bounding_box)
        .ok_or_else(|| FusionError::BoundingBoxNotFound(bounding_box.to_string()))?;
    fuse_virtual(dataset, config, &bb, pool)
}

/// Plain fusion with the rigid registrations only, blending weights and
/// linear interpolation. Useful as a baseline for the non-rigid result.
pub fn fuse_affine(
    dataset: &dyn ViewDataset,
    views: &[ViewId],
    bounding_box: &Interval,
    downsampling: Option<f64>,
) -> Result<FusedVolume> {
    let views = select_views(&dataset.views(), views);
    if views.is_empty() {
        return Err(FusionError::EmptyViewSet);
    }
    let downsampling = downsampling.filter(|&ds| ds != 1.0);
    let bb = output_interval(bounding_box, downsampling)?;
    let registrations = RegistrationSnapshot::resolve(dataset, views.iter().copied(), downsampling)?;
    let weighting = WeightingConfig::default();

    let mut setups = Vec::with_capacity(views.len());
    let mut fields = Vec::with_capacity(views.len());
    for (view, image) in load_images(dataset, &views)? {
        let model = registrations.get(view)?;
        fields.push(build_weight_field(&weighting, view, image.as_ref(), model));
        setups.push(ViewSetup {
            view,
            image,
            mapping: Arc::new(ViewMapping::Rigid {
                inverse: registrations.inverse(view)?,
            }),
        });
    }
    info!(views = setups.len(), bounding_box = %bb, "Affine fusion ready");

    Ok(assemble(
        setups,
        fields,
        bb,
        Interpolation::Linear,
        false,
        0.0,
    ))
}
