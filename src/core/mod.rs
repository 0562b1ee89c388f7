// Public modules
pub mod classify;
pub mod config;
pub mod error;
pub mod git;
pub mod logger;
pub mod manifest;
pub mod orchestrator;
pub mod platform;
pub mod retry;
pub mod workspace;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use logger::{LogLevel, RunLog};
pub use orchestrator::{Orchestrator, PipelineState, RunOutcome, RunReport, Stage};
