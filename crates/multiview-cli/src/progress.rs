use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use multiview_core::fusion::{FusionStage, ProgressReporter};

/// Drives one terminal progress bar per fusion stage.
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

fn stage_bar(stage: FusionStage, total_items: Option<usize>) -> ProgressBar {
    match total_items {
        Some(total) => {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template("{msg:28} [{bar:40}] {pos}/{len}") {
                pb.set_style(style.progress_chars("=> "));
            }
            pb.set_message(stage.to_string());
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_message(stage.to_string());
            pb
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: FusionStage, total_items: Option<usize>) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.take() {
                previous.finish();
            }
            *slot = Some(stage_bar(stage, total_items));
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(ref pb) = *slot {
                pb.set_position(items_done as u64);
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish();
            }
        }
    }
}
