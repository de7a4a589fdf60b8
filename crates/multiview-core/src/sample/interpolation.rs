use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::consts::INSIDE_TOLERANCE;
use crate::view::ImageSource;

/// Interpolation kernel used when sampling a view at a real coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    NearestNeighbor,
    #[default]
    Linear,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NearestNeighbor => write!(f, "Nearest Neighbor"),
            Self::Linear => write!(f, "Linear"),
        }
    }
}

/// Whether `local` lies within `[0, dim - 1]` on every axis.
pub fn is_inside(dims: [usize; 3], local: &Point3<f64>) -> bool {
    (0..3).all(|d| {
        let max = dims[d] as f64 - 1.0;
        local[d] >= -INSIDE_TOLERANCE && local[d] <= max + INSIDE_TOLERANCE
    })
}

fn clamp_index(v: i64, dim: usize) -> usize {
    v.clamp(0, dim as i64 - 1) as usize
}

/// Value of the voxel closest to `local`.
pub fn sample_nearest(image: &dyn ImageSource, local: &Point3<f64>) -> f32 {
    let dims = image.dims();
    image.get([
        clamp_index(local.x.round() as i64, dims[0]),
        clamp_index(local.y.round() as i64, dims[1]),
        clamp_index(local.z.round() as i64, dims[2]),
    ])
}

/// Trilinear interpolation at `local`, replicating edge voxels.
pub fn sample_linear(image: &dyn ImageSource, local: &Point3<f64>) -> f32 {
    let dims = image.dims();

    let x0 = local.x.floor() as i64;
    let y0 = local.y.floor() as i64;
    let z0 = local.z.floor() as i64;

    let fx = (local.x - x0 as f64) as f32;
    let fy = (local.y - y0 as f64) as f32;
    let fz = (local.z - z0 as f64) as f32;

    let xs = [clamp_index(x0, dims[0]), clamp_index(x0 + 1, dims[0])];
    let ys = [clamp_index(y0, dims[1]), clamp_index(y0 + 1, dims[1])];
    let zs = [clamp_index(z0, dims[2]), clamp_index(z0 + 1, dims[2])];

    let mut value = 0.0f32;
    for (iz, &z) in zs.iter().enumerate() {
        let wz = if iz == 0 { 1.0 - fz } else { fz };
        if wz == 0.0 {
            continue;
        }
        for (iy, &y) in ys.iter().enumerate() {
            let wy = if iy == 0 { 1.0 - fy } else { fy };
            if wy == 0.0 {
                continue;
            }
            for (ix, &x) in xs.iter().enumerate() {
                let wx = if ix == 0 { 1.0 - fx } else { fx };
                if wx == 0.0 {
                    continue;
                }
                value += image.get([x, y, z]) * wx * wy * wz;
            }
        }
    }
    value
}

/// Sample `image` at `local`, or return `outside` if the coordinate falls
/// outside the image.
pub fn interpolate(
    image: &dyn ImageSource,
    local: &Point3<f64>,
    interpolation: Interpolation,
    outside: f32,
) -> f32 {
    if !is_inside(image.dims(), local) {
        return outside;
    }
    match interpolation {
        Interpolation::NearestNeighbor => sample_nearest(image, local),
        Interpolation::Linear => sample_linear(image, local),
    }
}
