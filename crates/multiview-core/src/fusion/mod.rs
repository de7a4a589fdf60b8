pub mod config;
mod fused;
mod orchestrator;
mod types;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{FusionError, Result};

pub use config::{FusionConfig, NonRigidMode};
pub use fused::{Contribution, FusedVolume};
pub use orchestrator::{fuse_affine, fuse_named, fuse_virtual, fuse_virtual_reported};
pub use types::{FusionOutput, FusionStage, ProgressReporter};

/// Worker pool for the parallel parts of a fusion run. `None` sizes it to
/// the available parallelism.
pub fn create_worker_pool(threads: Option<usize>) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("fusion-worker-{i}"));
    if let Some(n) = threads {
        if n == 0 {
            return Err(FusionError::InvalidConfig(
                "worker pool needs at least one thread".into(),
            ));
        }
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| FusionError::ThreadPool(e.to_string()))
}
