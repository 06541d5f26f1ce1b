// unnest - recursive archive flattener
//
// This is the library crate containing the extraction pipeline and its data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{ArchiveTask, RunState, TaskStatus, UserConfig};
pub use services::{
    CommandDecoder, DecodeError, ExternalDecoder, ExtractError, ExtractionOrchestrator,
    FormatSniffer, RunSummary, SniffResult, TaskRunner,
};
pub use state::{NoopObserver, RunObserver, StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
