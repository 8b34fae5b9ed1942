//! Live progress tracking.
//!
//! The [`aggregator`] combines per-path task readings for one run, the
//! [`store`] holds the latest snapshot per scan for concurrent readers and
//! [`polling`] is the read contract served to the CLI and HTTP clients.

pub mod aggregator;
pub mod polling;
pub mod snapshot;
pub mod store;

pub use aggregator::{ProgressAggregator, Registration, UpdateOutcome};
pub use polling::{PollStatus, ProgressReader, ProgressReport, ProgressView};
pub use snapshot::{AggregateProgress, PathProgress, PathReport, PathTaskStatus, ProgressPercent};
pub use store::{PathError, ProgressEntry, ProgressStore};
