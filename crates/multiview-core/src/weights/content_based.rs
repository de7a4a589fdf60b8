use nalgebra::Point3;
use ndarray::{Array3, Axis, Zip};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::{EPSILON, GAUSSIAN_PADDING_SIGMAS};
use crate::sample::{is_inside, sample_linear};
use crate::view::{ArrayImage, ImageSource};

use super::WeightField;

/// Content-based weight: local image contrast estimated as
/// `G(σ2) * (I - G(σ1) * I)²`, normalised to `[0, 1]`.
///
/// The field is computed once per view at construction and sampled with
/// trilinear interpolation afterwards.
#[derive(Clone, Debug)]
pub struct ContentBasedWeight {
    field: ArrayImage<f32>,
}

impl ContentBasedWeight {
    /// Estimate the weights of `image`. Sigmas are in local image pixels,
    /// per axis (x, y, z).
    pub fn compute(image: &dyn ImageSource, sigma1: [f64; 3], sigma2: [f64; 3]) -> Self {
        let [w, h, d] = image.dims();
        let mut data = Array3::<f64>::zeros((d, h, w));
        for ((z, y, x), v) in data.indexed_iter_mut() {
            *v = image.get([x, y, z]) as f64;
        }

        let smoothed = gaussian_fft_3d(&data, sigma1);
        let residual = Zip::from(&data)
            .and(&smoothed)
            .map_collect(|&a, &b| (a - b) * (a - b));
        let contrast = gaussian_fft_3d(&residual, sigma2);

        Self {
            field: ArrayImage::new(normalize_min_max(&contrast)),
        }
    }

    pub fn from_field(field: Array3<f32>) -> Self {
        Self {
            field: ArrayImage::new(field),
        }
    }

    /// Precomputed weights, shape (z, y, x).
    pub fn field(&self) -> &Array3<f32> {
        &self.field.data
    }
}

impl WeightField for ContentBasedWeight {
    fn weight(&self, local: &Point3<f64>) -> f32 {
        if !is_inside(self.field.dims(), local) {
            return 0.0;
        }
        sample_linear(&self.field, local)
    }
}

/// Rescale to `[0, 1]`. A constant volume carries no contrast information
/// and maps to uniform weight 1.
fn normalize_min_max(data: &Array3<f64>) -> Array3<f32> {
    let (min, max) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if !span.is_finite() || span <= EPSILON as f64 {
        return data.mapv(|_| 1.0);
    }
    data.mapv(|v| ((v - min) / span) as f32)
}

/// Gaussian convolution of a (z, y, x) volume in the frequency domain.
///
/// `sigma` is given per axis in (x, y, z) order. The volume is padded by
/// three sigmas with replicated edge values before transforming, which keeps
/// the circular convolution from wrapping opposite borders into each other.
/// The filter is the exact DFT of a sampled, unit-sum Gaussian of radius
/// `3σ`, so the convolution preserves mass and stays non-negative.
///
/// The scratch spectrum is one `Complex<f64>` (16 bytes) per padded voxel:
/// a 512×512×200 view with σ = 40 needs about 3.7 GiB. Downsample large
/// views before enabling content-based weights.
pub fn gaussian_fft_3d(data: &Array3<f64>, sigma: [f64; 3]) -> Array3<f64> {
    let (d, h, w) = data.dim();
    if d == 0 || h == 0 || w == 0 {
        return data.clone();
    }
    // Axis order of the array is (z, y, x).
    let sig = [sigma[2], sigma[1], sigma[0]];
    let dims = [d, h, w];
    let pad: Vec<usize> = sig
        .iter()
        .map(|s| (s.max(0.0) * GAUSSIAN_PADDING_SIGMAS).ceil() as usize)
        .collect();
    let padded_dims = [dims[0] + 2 * pad[0], dims[1] + 2 * pad[1], dims[2] + 2 * pad[2]];

    let mut spectrum = Array3::<Complex<f64>>::zeros(padded_dims);
    for ((pz, py, px), v) in spectrum.indexed_iter_mut() {
        let z = clamp_padded(pz, pad[0], dims[0]);
        let y = clamp_padded(py, pad[1], dims[1]);
        let x = clamp_padded(px, pad[2], dims[2]);
        *v = Complex::new(data[[z, y, x]], 0.0);
    }

    let mut planner = FftPlanner::<f64>::new();
    for axis in 0..3 {
        let fft = planner.plan_fft_forward(padded_dims[axis]);
        Zip::from(spectrum.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
            let mut buf: Vec<Complex<f64>> = lane.iter().copied().collect();
            fft.process(&mut buf);
            for (dst, src) in lane.iter_mut().zip(buf) {
                *dst = src;
            }
        });
    }

    let transfer: Vec<Vec<f64>> = (0..3)
        .map(|axis| gaussian_transfer(padded_dims[axis], sig[axis]))
        .collect();
    for ((kz, ky, kx), v) in spectrum.indexed_iter_mut() {
        *v *= transfer[0][kz] * transfer[1][ky] * transfer[2][kx];
    }

    for axis in 0..3 {
        let ifft = planner.plan_fft_inverse(padded_dims[axis]);
        Zip::from(spectrum.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
            let mut buf: Vec<Complex<f64>> = lane.iter().copied().collect();
            ifft.process(&mut buf);
            for (dst, src) in lane.iter_mut().zip(buf) {
                *dst = src;
            }
        });
    }

    let scale = 1.0 / (padded_dims[0] * padded_dims[1] * padded_dims[2]) as f64;
    let mut result = Array3::<f64>::zeros((d, h, w));
    for ((z, y, x), v) in result.indexed_iter_mut() {
        *v = spectrum[[z + pad[0], y + pad[1], x + pad[2]]].re * scale;
    }
    result
}

fn clamp_padded(p: usize, pad: usize, len: usize) -> usize {
    p.saturating_sub(pad).min(len - 1)
}

/// Unit-sum Gaussian sampled at integer offsets `-r..=r`, `r = ⌈3σ⌉`.
fn make_gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (sigma * GAUSSIAN_PADDING_SIGMAS).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Exact `n`-point DFT of the sampled kernel, centred on index 0. The kernel
/// is symmetric, so the transform is real.
fn gaussian_transfer(n: usize, sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0; n];
    }
    let kernel = make_gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as f64;
    let step = 2.0 * std::f64::consts::PI / n as f64;
    (0..n)
        .map(|k| {
            kernel
                .iter()
                .enumerate()
                .map(|(i, g)| g * (step * k as f64 * (i as f64 - radius)).cos())
                .sum()
        })
        .collect()
}
