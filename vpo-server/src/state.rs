//! Shared server state.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use vpo_config::VpoConfig;
use vpo_core::{Catalog, EventBus, Scanner, WorkerPool, WorkflowProcessor};

/// State handed to every handler. Handlers never block the event loop on
/// database writes; all catalog mutations go through the worker pool or
/// spawned tasks.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub config: Arc<VpoConfig>,
    pub processor: Arc<WorkflowProcessor>,
    pub scanner: Arc<Scanner>,
    pub workers: Arc<WorkerPool>,
    pub bus: Arc<EventBus>,
    pub started_at: Instant,
    pub shutting_down: Arc<AtomicBool>,
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
