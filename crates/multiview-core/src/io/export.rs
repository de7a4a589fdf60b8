use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;

use crate::consts::{EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{FusionError, Result};
use crate::volume::VirtualVolume;

/// Read one z-slice of a virtual volume. `z` is an absolute output
/// coordinate. Shape is (height, width).
pub fn render_slice(volume: &dyn VirtualVolume, z: i64) -> Array2<f32> {
    let interval = volume.interval();
    let [w, h, _] = interval.dims();
    let [x0, y0, _] = interval.min;
    let mut result = Array2::<f32>::zeros((h, w));

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut line)| {
                for (col, v) in line.iter_mut().enumerate() {
                    *v = volume.get([x0 + col as i64, y0 + row as i64, z]);
                }
            });
    } else {
        for ((row, col), v) in result.indexed_iter_mut() {
            *v = volume.get([x0 + col as i64, y0 + row as i64, z]);
        }
    }
    result
}

/// Read the whole volume, shape (z, y, x). Slices are computed in parallel.
pub fn render_volume(volume: &dyn VirtualVolume) -> Array3<f32> {
    let interval = volume.interval();
    let [w, h, d] = interval.dims();
    let z0 = interval.min[2];
    let mut result = Array3::<f32>::zeros((d, h, w));
    result
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(k, mut plane)| {
            let [x0, y0, _] = interval.min;
            for ((row, col), v) in plane.indexed_iter_mut() {
                *v = volume.get([x0 + col as i64, y0 + row as i64, z0 + k as i64]);
            }
        });
    result
}

/// Approximate intensity range from a regular subsample of the volume.
pub fn min_max_approx(volume: &dyn VirtualVolume, samples_per_axis: usize) -> (f32, f32) {
    let interval = volume.interval();
    let dims = interval.dims();
    let axis_positions: Vec<Vec<i64>> = (0..3)
        .map(|d| {
            let n = samples_per_axis.max(1).min(dims[d].max(1));
            let step = dims[d] as f64 / n as f64;
            (0..n)
                .map(|i| interval.min[d] + (i as f64 * step) as i64)
                .collect()
        })
        .collect();

    axis_positions[2]
        .par_iter()
        .map(|&z| {
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for &y in &axis_positions[1] {
                for &x in &axis_positions[0] {
                    let v = volume.get([x, y, z]);
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
            (lo, hi)
        })
        .reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        )
}

/// Save a slice as 16-bit grayscale TIFF, mapping `[min, max]` to the full
/// 16-bit range.
pub fn save_slice_tiff(slice: &Array2<f32>, path: &Path, min: f32, max: f32) -> Result<()> {
    let (h, w) = slice.dim();
    let span = (max - min).max(EPSILON);

    let pixels: Vec<u16> = slice
        .iter()
        .map(|&v| (((v - min) / span).clamp(0.0, 1.0) * 65535.0) as u16)
        .collect();

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| FusionError::InvalidVolume("slice buffer size mismatch".into()))?;
    img.save(path)?;
    Ok(())
}

/// Write every z-slice of `volume` into `dir` as `slice_NNNN.tif`.
/// `on_slice` is called with the number of slices written so far.
pub fn save_slices<F>(
    volume: &dyn VirtualVolume,
    dir: &Path,
    min: f32,
    max: f32,
    mut on_slice: F,
) -> Result<Vec<PathBuf>>
where
    F: FnMut(usize),
{
    std::fs::create_dir_all(dir)?;
    let interval = volume.interval();
    let mut written = Vec::with_capacity(interval.dims()[2]);
    for (i, z) in (interval.min[2]..=interval.max[2]).enumerate() {
        let slice = render_slice(volume, z);
        let path = dir.join(format!("slice_{i:04}.tif"));
        save_slice_tiff(&slice, &path, min, max)?;
        written.push(path);
        on_slice(i + 1);
    }
    Ok(written)
}

/// Load a 16-bit grayscale image as raw sample values.
pub fn load_slice(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32
    }))
}
