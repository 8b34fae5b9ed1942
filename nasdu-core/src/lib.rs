//! # nasdu-core
//!
//! Progress tracking for remote directory-size scans.
//!
//! A scan measures one or more paths on a NAS through a rate-limited task
//! API: start a size task, poll it until it reports completion, stop it if
//! it runs too long. This crate owns everything between that remote
//! contract and the callers asking "how far along is scan X?":
//!
//! - [`runner`]: drives one invocation across its paths, in parallel or in
//!   sequence, with adaptive polling, retries, timeouts and cleanup.
//! - [`progress`]: combines per-path readings into one snapshot, keeps the
//!   latest snapshot per scan for concurrent readers and serves the
//!   polling contract.
//! - [`baseline`]: weights live byte counts by the sizes of the last
//!   successful run so a percentage can be shown.
//! - [`history`]: the persisted-result contract plus an in-memory store.
//! - [`remote`]: the remote task contract that backends implement.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nasdu_core::{
//!     config::{ProgressConfig, RunnerConfig},
//!     history::InMemoryHistoryStore,
//!     model::{ScanDefinition, ScanInvocation},
//!     paths::{CaseFolding, RemotePath},
//!     progress::{ProgressReader, ProgressStore},
//!     remote::RemoteSizeTasks,
//!     runner::ScanRunner,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn measure(remote: Arc<dyn RemoteSizeTasks>) -> nasdu_core::Result<()> {
//!     let store = Arc::new(ProgressStore::from_config(&ProgressConfig::default()));
//!     let runner = ScanRunner::new(
//!         remote,
//!         Arc::new(InMemoryHistoryStore::default()),
//!         store.clone(),
//!         RunnerConfig::default(),
//!         CaseFolding::Sensitive,
//!     );
//!
//!     let definition = ScanDefinition::new("Homes", [RemotePath::new("/homes")]);
//!     let result = runner
//!         .run(ScanInvocation::from_definition(&definition), CancellationToken::new())
//!         .await?;
//!     println!("{} bytes", result.totals().total_size);
//!
//!     let reader = ProgressReader::new(store);
//!     println!("{:?}", reader.get_progress("homes")?);
//!     Ok(())
//! }
//! ```

pub mod api_types;
pub mod baseline;
pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod model;
pub mod paths;
pub mod progress;
pub mod remote;
pub mod runner;
pub mod schedule;
pub mod slug;

pub use error::{HistoryError, RemoteError, Result, ScanError};
pub use ids::{RunId, ScanKey, ScanSlug};
pub use paths::{CaseFolding, RemotePath};
