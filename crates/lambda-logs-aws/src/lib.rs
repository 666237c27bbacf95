//! AWS client for lambda-logs
//!
//! This crate resolves the Lambda log groups of a CloudFormation stack and
//! fetches filtered events from CloudWatch Logs.

mod client;
mod region;

pub use client::AwsClient;
pub use region::{DEFAULT_REGION, resolve_region};

// Re-export types that are used in our public API
pub use lambda_logs_types::{EventSource, FetchError, LogEvent, ResolveError, Window};
