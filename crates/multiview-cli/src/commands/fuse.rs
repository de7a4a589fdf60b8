use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use multiview_core::consts::MIN_MAX_SAMPLES_PER_AXIS;
use multiview_core::dataset::ViewDataset;
use multiview_core::deform::CellBlend;
use multiview_core::fusion::{
    create_worker_pool, fuse_affine, fuse_virtual_reported, FusionConfig, NonRigidMode,
};
use multiview_core::io::dataset::ManifestDataset;
use multiview_core::io::export::{min_max_approx, save_slices};
use multiview_core::sample::Interpolation;
use multiview_core::volume::VirtualVolume;
use tracing::{debug, info};

use crate::progress::BarReporter;
use crate::summary::{print_correspondence_report, print_fusion_summary};

#[derive(Clone, ValueEnum)]
pub enum InterpolationArg {
    Nearest,
    Linear,
}

#[derive(Clone, ValueEnum)]
pub enum BlendArg {
    InverseDistance,
    Trilinear,
}

#[derive(Args)]
pub struct FuseArgs {
    /// Dataset manifest (TOML)
    pub dataset: PathBuf,

    /// Name of the bounding box to fuse
    #[arg(short, long)]
    pub bounding_box: String,

    /// Fusion config file (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated landmark labels
    #[arg(long)]
    pub labels: Option<String>,

    /// Control point spacing in output pixels, one value or "x,y,z"
    #[arg(long)]
    pub spacing: Option<String>,

    /// Locality of the non-rigid fit (smaller is more local)
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Output downsampling factor
    #[arg(long)]
    pub downsampling: Option<f64>,

    /// Interpolation of the view images
    #[arg(long, value_enum)]
    pub interpolation: Option<InterpolationArg>,

    /// Blending of neighbouring grid nodes
    #[arg(long, value_enum)]
    pub blend: Option<BlendArg>,

    /// Disable edge-fade blending weights
    #[arg(long)]
    pub no_blending: bool,

    /// Enable content-based weights
    #[arg(long)]
    pub content_based: bool,

    /// Output the rigid/non-rigid displacement instead of image data
    #[arg(long)]
    pub display_distances: bool,

    /// Fit the correction at every voxel instead of on a grid
    #[arg(long)]
    pub direct: bool,

    /// Fuse with the rigid registrations only, for comparison
    #[arg(long)]
    pub affine: bool,

    /// Number of worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Output directory for the TIFF slices
    #[arg(short, long, default_value = "fused")]
    pub output: PathBuf,
}

pub fn parse_labels(s: &str) -> Vec<String> {
    s.split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn parse_spacing(s: &str) -> Result<[u32; 3]> {
    let values: Vec<u32> = s
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid control point spacing '{s}'"))?;
    match values.as_slice() {
        [v] => Ok([*v; 3]),
        [x, y, z] => Ok([*x, *y, *z]),
        _ => bail!("Control point spacing needs one or three values, got '{s}'"),
    }
}

fn build_config(args: &FuseArgs) -> Result<FusionConfig> {
    let mut config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid fusion config")?
    } else {
        FusionConfig::default()
    };

    if let Some(ref labels) = args.labels {
        config.labels = parse_labels(labels);
    }
    if let Some(ref spacing) = args.spacing {
        config.control_point_spacing = parse_spacing(spacing)?;
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(ds) = args.downsampling {
        config.downsampling = Some(ds);
    }
    if let Some(ref interp) = args.interpolation {
        config.interpolation = match interp {
            InterpolationArg::Nearest => Interpolation::NearestNeighbor,
            InterpolationArg::Linear => Interpolation::Linear,
        };
    }
    if let Some(ref blend) = args.blend {
        config.cell_blend = match blend {
            BlendArg::InverseDistance => CellBlend::default(),
            BlendArg::Trilinear => CellBlend::Trilinear,
        };
    }
    if args.no_blending {
        config.weighting.blending = false;
    }
    if args.content_based {
        config.weighting.content_based = true;
    }
    if args.display_distances {
        config.display_distances = true;
    }
    if args.direct {
        config.mode = NonRigidMode::Direct;
    }

    config.validate()?;
    Ok(config)
}

pub fn run(args: &FuseArgs) -> Result<()> {
    let config = build_config(args)?;
    let dataset = ManifestDataset::load(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;
    let bounding_box = dataset
        .bounding_box(&args.bounding_box)
        .with_context(|| format!("Bounding box '{}' not found", args.bounding_box))?;
    let pool = create_worker_pool(args.threads)?;
    info!(
        dataset = %args.dataset.display(),
        bounding_box = %bounding_box,
        threads = pool.current_num_threads(),
        "Loaded dataset"
    );
    debug!(?config, "Fusion config");

    let volume: Arc<dyn VirtualVolume> = if args.affine {
        println!("Affine fusion of {} views", dataset.views().len());
        Arc::new(fuse_affine(
            &dataset,
            &config.views_to_fuse,
            &bounding_box,
            config.downsampling,
        )?)
    } else {
        print_fusion_summary(&config, &args.dataset, &bounding_box, &args.output);
        let reporter = Arc::new(BarReporter::new());
        let output = fuse_virtual_reported(&dataset, &config, &bounding_box, &pool, reporter)
            .context("Fusion failed")?;
        print_correspondence_report(&output.correspondences);
        println!(
            "Non-rigid views: {}/{}",
            output.non_rigid_views,
            output.volume.num_views()
        );
        output.volume as Arc<dyn VirtualVolume>
    };

    let interval = volume.interval();
    println!("Output size: {:?}", interval.dims());

    let (min, max) = pool.install(|| min_max_approx(volume.as_ref(), MIN_MAX_SAMPLES_PER_AXIS));
    println!("Intensity range (approx.): {min:.2} .. {max:.2}");

    info!(min, max, "Estimated intensity range");

    let depth = interval.dims()[2];
    let pb = ProgressBar::new(depth as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Writing slices [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let written = pool.install(|| {
        save_slices(volume.as_ref(), &args.output, min, max, |done| {
            pb.set_position(done as u64)
        })
    })?;
    pb.finish();
    info!(slices = written.len(), output = %args.output.display(), "Saved fused volume");

    println!("Saved {} slices to {}", written.len(), args.output.display());
    Ok(())
}
