//! Services module - the extraction pipeline.
//!
//! Everything here is **framework-agnostic**: no CLI or GUI code, only the logic that turns a
//! list of archives into a flat destination tree. Results flow out through the
//! [`RunObserver`](crate::state::RunObserver) callbacks and `tracing`.
//!
//! # Components
//!
//! - [`FormatSniffer`]: Classifies files by magic number (extension as fallback) and repairs
//!   the extension of mis-named archives. Never renames a non-archive.
//! - [`ExternalDecoder`]: The seam to the tool that actually unpacks bytes.
//!   [`CommandDecoder`] drives WinRAR/unrar or 7-Zip as a subprocess.
//! - [`ExtractionOrchestrator`]: Bounded-depth recursive extraction. Each frame decodes into
//!   its own scratch directory, recurses into nested archives and merges everything else
//!   into the single final output directory of the subtree.
//! - [`merge`]: Collision-resolving moves (`name_1.ext`, `dir_1`, ...).
//! - [`TaskRunner`]: Runs a task list on one worker with cooperative cancellation and
//!   per-task status rollup.
//!
//! # Execution Flow
//!
//! ```text
//! TaskRunner ── per file ──> ExtractionOrchestrator::extract_top_level
//!                               └─ extract_one (depth 1)
//!                                    ├─ FormatSniffer::identify / fix_extension
//!                                    ├─ ExternalDecoder::decode -> scratch dir
//!                                    ├─ classify every extracted file
//!                                    ├─ extract_one (depth + 1) for nested archives
//!                                    └─ merge::move_into final_output_dir
//! ```

pub mod decoder;
pub mod merge;
pub mod orchestrator;
pub mod runner;
pub mod sniffer;

pub use decoder::{CommandDecoder, DecodeError, DecoderKind, ExternalDecoder};
pub use merge::{MergeOutcome, move_into};
pub use orchestrator::{ExtractError, ExtractionOrchestrator, TEMP_DIR_PREFIX};
pub use runner::{RunSummary, TaskRunner};
pub use sniffer::{FormatSniffer, SniffKind, SniffResult};

use crate::state::RunObserver;

// Log lines go to both tracing (persisted) and the observer (shown to the user).

pub(crate) fn log_debug(observer: &dyn RunObserver, message: String) {
    tracing::debug!("{}", message);
    observer.on_log(&message);
}

pub(crate) fn log_info(observer: &dyn RunObserver, message: String) {
    tracing::info!("{}", message);
    observer.on_log(&message);
}

pub(crate) fn log_warn(observer: &dyn RunObserver, message: String) {
    tracing::warn!("{}", message);
    observer.on_log(&message);
}

pub(crate) fn log_error(observer: &dyn RunObserver, message: String) {
    tracing::error!("{}", message);
    observer.on_log(&message);
}
