use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use multiview_core::dataset::ViewDataset;
use multiview_core::io::dataset::ManifestDataset;

#[derive(Args)]
pub struct InfoArgs {
    /// Dataset manifest (TOML)
    pub dataset: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let dataset = ManifestDataset::load(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;
    let manifest = dataset.manifest();

    println!("Dataset:     {}", args.dataset.display());
    println!("Views:       {}", manifest.views.len());

    let mut total_bytes = 0usize;
    for entry in &manifest.views {
        let [w, h, d] = entry.dims;
        let scales = entry.model().axis_scales();
        println!(
            "  {:<24} {}x{}x{} {:?}  scale {:.3}/{:.3}/{:.3}  {}",
            entry.id().to_string(),
            w,
            h,
            d,
            entry.pixel_type,
            scales[0],
            scales[1],
            scales[2],
            entry.file.display()
        );
        total_bytes += entry.layout().data_size().unwrap_or(0);
    }
    println!(
        "Data size:   {:.1} MB",
        total_bytes as f64 / (1024.0 * 1024.0)
    );

    if manifest.bounding_boxes.is_empty() {
        println!("Bounding boxes: none");
    } else {
        println!("Bounding boxes:");
        for bb in &manifest.bounding_boxes {
            if let Some(interval) = dataset.bounding_box(&bb.name) {
                println!("  {:<24} {}", bb.name, interval);
            }
        }
    }

    let landmarks = dataset.landmarks();
    println!("Landmarks:");
    for view in dataset.views() {
        let labels = landmarks.labels(view);
        if labels.is_empty() {
            continue;
        }
        let listed: Vec<String> = labels
            .iter()
            .map(|label| {
                let points = landmarks.points(view, label).map_or(0, |p| p.len());
                let corrs = landmarks
                    .correspondences(view, label)
                    .map_or(0, |c| c.len());
                format!("{label} ({points} points, {corrs} correspondences)")
            })
            .collect();
        println!("  {:<24} {}", view.to_string(), listed.join(", "));
    }
    println!("Correspondences: {}", manifest.correspondences.len());

    Ok(())
}
