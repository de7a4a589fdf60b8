use std::sync::Arc;

use crate::view::Interval;
use crate::volume::VirtualVolume;

/// One view's contribution: its image and its weight, both in output
/// coordinates.
#[derive(Clone)]
pub struct Contribution {
    pub image: Arc<dyn VirtualVolume>,
    pub weight: Arc<dyn VirtualVolume>,
}

/// Weighted average of all contributions, computed on every read.
///
/// Voxels without any positive weight read as `background`.
#[derive(Clone)]
pub struct FusedVolume {
    interval: Interval,
    contributions: Vec<Contribution>,
    background: f32,
}

impl FusedVolume {
    pub fn new(interval: Interval, contributions: Vec<Contribution>, background: f32) -> Self {
        Self {
            interval,
            contributions,
            background,
        }
    }

    pub fn num_views(&self) -> usize {
        self.contributions.len()
    }

    pub fn background(&self) -> f32 {
        self.background
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }
}

impl VirtualVolume for FusedVolume {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn get(&self, pos: [i64; 3]) -> f32 {
        let mut sum = 0.0f64;
        let mut weight_sum = 0.0f64;
        for c in &self.contributions {
            let w = c.weight.get(pos);
            if w <= 0.0 {
                continue;
            }
            sum += c.image.get(pos) as f64 * w as f64;
            weight_sum += w as f64;
        }
        if weight_sum <= 0.0 {
            self.background
        } else {
            (sum / weight_sum) as f32
        }
    }
}
