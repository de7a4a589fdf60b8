use std::path::Path;

use console::Style;
use multiview_core::fusion::FusionConfig;
use multiview_core::landmarks::CorrespondenceReport;
use multiview_core::view::Interval;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn view_list(views: &[multiview_core::view::ViewId]) -> String {
    if views.is_empty() {
        "all".to_string()
    } else {
        views.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
    }
}

pub fn print_fusion_summary(config: &FusionConfig, dataset: &Path, bounding_box: &Interval, output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Non-Rigid Fusion"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Dataset"), s.path.apply_to(dataset.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!("  {:<14}{}", s.label.apply_to("Bounding box"), s.value.apply_to(bounding_box));
    match config.downsampling {
        Some(ds) => println!("  {:<14}{}", s.label.apply_to("Downsampling"), s.value.apply_to(ds)),
        None => println!("  {:<14}{}", s.label.apply_to("Downsampling"), s.disabled.apply_to("none")),
    }
    println!();

    println!("  {}", s.header.apply_to("Views"));
    println!("    {:<12}{}", s.label.apply_to("Fuse"), s.value.apply_to(view_list(&config.views_to_fuse)));
    println!("    {:<12}{}", s.label.apply_to("Landmarks"), s.value.apply_to(view_list(&config.views_to_use)));
    println!("    {:<12}{}", s.label.apply_to("Labels"), s.value.apply_to(config.labels.join(", ")));
    println!();

    println!("  {}", s.header.apply_to("Non-Rigid"));
    println!("    {:<12}{}", s.label.apply_to("Mode"), s.method.apply_to(config.mode));
    let [sx, sy, sz] = config.control_point_spacing;
    println!("    {:<12}{}", s.label.apply_to("Spacing"), s.value.apply_to(format!("{sx}x{sy}x{sz}")));
    println!("    {:<12}{}", s.label.apply_to("Alpha"), s.value.apply_to(config.alpha));
    println!("    {:<12}{}", s.label.apply_to("Blend"), s.method.apply_to(config.cell_blend));
    println!("    {:<12}{}", s.label.apply_to("Min points"), s.value.apply_to(config.min_reference_points));
    println!();

    println!("  {}", s.header.apply_to("Fusion"));
    println!("    {:<12}{}", s.label.apply_to("Weights"), s.method.apply_to(&config.weighting));
    if config.weighting.blending {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Blending"),
            s.value.apply_to(format!(
                "range {}, border {}",
                config.weighting.blending_range, config.weighting.blending_border
            ))
        );
    }
    if config.weighting.content_based {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Content"),
            s.value.apply_to(format!(
                "sigma1 {}, sigma2 {}",
                config.weighting.content_sigma1, config.weighting.content_sigma2
            ))
        );
    }
    println!("    {:<12}{}", s.label.apply_to("Interp."), s.method.apply_to(config.interpolation));
    if config.display_distances {
        println!("    {:<12}{}", s.label.apply_to("Output"), s.disabled.apply_to("distances"));
    }
    println!();
}

pub fn print_correspondence_report(report: &CorrespondenceReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Correspondences"));
    for stats in &report.views {
        let distance = match stats.mean_distance {
            Some(d) => s.value.apply_to(format!("{d:.3}")),
            None => s.disabled.apply_to("n/a".to_string()),
        };
        println!(
            "    {:<24}{:>6} pairs   mean distance {}",
            s.label.apply_to(stats.view),
            s.value.apply_to(stats.pairs),
            distance
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reference points"),
        s.value.apply_to(report.reference_points)
    );
    println!();
}
