use std::sync::Arc;

use crate::landmarks::CorrespondenceReport;

use super::fused::FusedVolume;

/// Fusion stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FusionStage {
    Registrations,
    Correspondences,
    Grids,
    Weights,
    Compositing,
}

impl std::fmt::Display for FusionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registrations => write!(f, "Resolving registrations"),
            Self::Correspondences => write!(f, "Loading correspondences"),
            Self::Grids => write!(f, "Computing non-rigid grids"),
            Self::Weights => write!(f, "Preparing weights"),
            Self::Compositing => write!(f, "Assembling virtual fusion"),
        }
    }
}

/// Result of a fusion run. The volume is virtual; nothing is computed until
/// it is read.
#[derive(Clone)]
pub struct FusionOutput {
    pub volume: Arc<FusedVolume>,
    /// Views whose mapping carries a non-rigid correction.
    pub non_rigid_views: usize,
    pub correspondences: CorrespondenceReport,
}

/// Thread-safe progress reporting for a fusion run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., view count), if known.
    fn begin_stage(&self, _stage: FusionStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `fuse_virtual` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
