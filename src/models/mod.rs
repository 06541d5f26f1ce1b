//! Data models for unnest.
//!
//! This module contains the core data structures shared by the services and the CLI:
//! - [`ArchiveTask`]: One unit of work (file list, destination, password)
//! - [`TaskStatus`]: Per-task status rollup reported to observers
//! - [`RunState`]: Progress, tallies and log buffer for the current run
//! - [`UserConfig`]: Extractor settings and saved passwords loaded from `unnest.yaml`
//! - [`MAX_CONCURRENT_DECODERS`]: Concurrency limit (always 1, single writer)
//!
//! # Architecture Note
//!
//! - **Serializable**: Config and task structs derive `Serialize`/`Deserialize` for YAML
//! - **Shared through StateManager**: RunState lives behind [`StateManager`](crate::state::StateManager)

pub mod config;
pub mod run_state;
pub mod task;

pub use config::{DEFAULT_MAX_DEPTH, ExtractorSettings, PasswordBook, UserConfig};
pub use run_state::{LOG_BUFFER_CAPACITY, MAX_CONCURRENT_DECODERS, RunState};
pub use task::{ArchiveTask, TaskStatus};
