//! Runtime arena: the worker pool, decompression service and visibility
//! tracker an application shares across all of its animations. Explicit
//! and caller-owned - nothing in the crate lives in a global.

use log::info;
use std::sync::Arc;

use crate::backend::BackendFactory;
use crate::core::inflate::{InflateClient, InflateService};
use crate::core::visibility::VisibilityTracker;
use crate::core::workers::Workers;

pub struct Runtime {
    workers: Workers,
    inflate: InflateService,
    visibility: VisibilityTracker,
}

impl Runtime {
    /// Pool size defaults to 75% of the CPU cores, leaving headroom for
    /// the caller's own threads.
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        let pool_size = (num_cpus::get() * 3 / 4).max(1);
        Self::with_pool_size(factory, pool_size)
    }

    /// Worker threads are provisioned lazily, on the first instance.
    pub fn with_pool_size(factory: Arc<dyn BackendFactory>, pool_size: usize) -> Self {
        info!("runtime created (pool size {pool_size})");
        Self {
            workers: Workers::new(factory, pool_size),
            inflate: InflateService::spawn(),
            visibility: VisibilityTracker::new(),
        }
    }

    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    pub fn inflate_client(&self) -> InflateClient {
        self.inflate.client()
    }
}
