//! Job worker pool.
//!
//! The queue itself is durable catalog state (`catalog::jobs`); this
//! module is the single-node worker side: claim, run, report, honor
//! cancellation, and purge old jobs on a schedule.

mod worker;

pub use worker::{WorkerPool, WorkerPoolConfig};
