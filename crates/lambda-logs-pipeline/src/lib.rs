//! Log pipeline for lambda-logs
//!
//! This crate merges per-group event batches into one ordered, de-duplicated
//! sequence, renders events as terminal lines and drives the polling loop.

mod merger;
mod renderer;
mod scheduler;

pub use merger::{SeenSet, merge};
pub use renderer::{LineRenderer, PatternMismatch, RenderError, RenderOptions, named_color};
pub use scheduler::{
    Clock, CycleStats, DEFAULT_POLL_DELAY, INGESTION_LAG, MAX_RETRY_SPAN, PipelineError, PollScheduler,
    Schedule, SystemClock, next_window,
};

// Re-export types used in our public API
pub use lambda_logs_types::{EventSource, FetchError, LogEvent, ResolveError, Window};
