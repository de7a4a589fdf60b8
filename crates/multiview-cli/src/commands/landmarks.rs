use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use multiview_core::dataset::ViewDataset;
use multiview_core::fusion::create_worker_pool;
use multiview_core::io::dataset::ManifestDataset;
use multiview_core::landmarks::aggregate_correspondences;
use multiview_core::registration::RegistrationSnapshot;
use tracing::info;

use crate::summary::print_correspondence_report;

#[derive(Args)]
pub struct LandmarksArgs {
    /// Dataset manifest (TOML)
    pub dataset: PathBuf,

    /// Comma-separated landmark labels
    #[arg(long, default_value = "beads")]
    pub labels: String,

    /// Number of worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}

pub fn run(args: &LandmarksArgs) -> Result<()> {
    let dataset = ManifestDataset::load(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;
    let labels = super::fuse::parse_labels(&args.labels);
    let views = dataset.views();
    let pool = create_worker_pool(args.threads)?;
    info!(views = views.len(), labels = ?labels, "Assembling correspondences");

    let registrations = RegistrationSnapshot::resolve(&dataset, views.iter().copied(), None)?;
    let set = aggregate_correspondences(
        dataset.landmarks(),
        &views,
        &labels,
        &registrations,
        &pool,
    )
    .context("Failed to assemble corresponding points")?;

    print_correspondence_report(&set.report);

    let mut by_size: Vec<usize> = set.reference_points.iter().map(|p| p.members.len()).collect();
    by_size.sort_unstable();
    if let (Some(min), Some(max)) = (by_size.first(), by_size.last()) {
        println!("  Members per reference point: {min}..{max}");
    }

    Ok(())
}
