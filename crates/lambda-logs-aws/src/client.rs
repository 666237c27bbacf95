//! CloudFormation and CloudWatch Logs client

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_cloudformation as cfn;
use aws_sdk_cloudformation::types::StackResourceSummary;
use aws_sdk_cloudwatchlogs as cloudwatchlogs;
use aws_sdk_cloudwatchlogs::types::FilteredLogEvent;
use aws_types::region::Region;
use futures::future::try_join_all;
use tracing::{debug, warn};

use lambda_logs_types::{EventSource, FetchError, LogEvent, ResolveError, Window};

const LAMBDA_RESOURCE_TYPE: &str = "AWS::Lambda::Function";
const LAMBDA_LOG_GROUP_PREFIX: &str = "/aws/lambda/";

/// AWS client wrapper
#[derive(Clone)]
pub struct AwsClient {
    cloudformation: cfn::Client,
    logs: cloudwatchlogs::Client,
}

impl AwsClient {
    /// Create clients for the given region using the default credential chain
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudformation: cfn::Client::new(&config),
            logs: cloudwatchlogs::Client::new(&config),
        }
    }

    /// Physical ids of all Lambda functions in the stack, `None` when the
    /// stack reports no resources at all
    async fn lambda_functions(&self, stack: &str) -> Result<Option<Vec<String>>> {
        let mut summaries: Option<Vec<StackResourceSummary>> = None;
        let mut next_token = None;

        loop {
            let response = self
                .cloudformation
                .list_stack_resources()
                .stack_name(stack)
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| format!("Failed to list resources for stack {}", stack))?;

            if let Some(page) = response.stack_resource_summaries {
                summaries.get_or_insert_with(Vec::new).extend(page);
            }

            next_token = response.next_token;
            if next_token.is_none() {
                break;
            }
        }

        Ok(lambda_function_ids(summaries))
    }

    /// Names of the existing log groups for one function
    async fn log_groups_for_function(&self, function: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}", LAMBDA_LOG_GROUP_PREFIX, function);
        let mut names = Vec::new();
        let mut next_token = None;

        loop {
            let response = self
                .logs
                .describe_log_groups()
                .log_group_name_prefix(&prefix)
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| format!("Failed to describe log groups with prefix {}", prefix))?;

            names.extend(
                response
                    .log_groups
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|g| g.log_group_name),
            );

            next_token = response.next_token;
            if next_token.is_none() {
                break;
            }
        }

        if names.is_empty() {
            debug!(%function, "function has no log group yet");
        }

        Ok(names)
    }

    async fn filter_events(
        &self,
        log_group: &str,
        window: Window,
        filter: &str,
    ) -> Result<Vec<LogEvent>> {
        let mut events = Vec::new();
        let mut next_token = None;

        loop {
            let response = self
                .logs
                .filter_log_events()
                .log_group_name(log_group)
                .start_time(window.start())
                .end_time(window.end())
                .filter_pattern(filter)
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to query log events from log group: {}", log_group)
                })?;

            if let Some(page) = response.events {
                events.extend(page.into_iter().map(to_log_event));
            }

            next_token = response.next_token;
            if next_token.is_none() {
                break;
            }
        }

        Ok(events)
    }
}

impl EventSource for AwsClient {
    async fn resolve_log_groups(&self, stack: &str) -> Result<Vec<String>, ResolveError> {
        let lookup = |source| ResolveError::Lookup {
            stack: stack.to_string(),
            source,
        };

        let functions = self
            .lambda_functions(stack)
            .await
            .map_err(lookup)?
            .ok_or_else(|| ResolveError::NoResources {
                stack: stack.to_string(),
            })?;

        debug!(%stack, count = functions.len(), "found Lambda functions");

        let per_function = try_join_all(
            functions
                .iter()
                .map(|function| self.log_groups_for_function(function)),
        )
        .await
        .map_err(lookup)?;

        let log_groups = dedupe_log_groups(per_function.into_iter().flatten());

        if log_groups.is_empty() {
            warn!(%stack, "no Lambda log groups found in stack");
        }

        Ok(log_groups)
    }

    async fn fetch_window(
        &self,
        log_group: &str,
        window: Window,
        filter: &str,
    ) -> Result<Vec<LogEvent>, FetchError> {
        self.filter_events(log_group, window, filter)
            .await
            .map_err(|source| FetchError {
                log_group: log_group.to_string(),
                source,
            })
    }
}

/// Lambda function ids among the stack's resources. A missing or empty
/// resource list yields `None`; a list without functions yields an empty set.
fn lambda_function_ids(summaries: Option<Vec<StackResourceSummary>>) -> Option<Vec<String>> {
    let summaries = summaries.filter(|s| !s.is_empty())?;
    Some(
        summaries
            .into_iter()
            .filter(|r| r.resource_type() == Some(LAMBDA_RESOURCE_TYPE))
            .filter_map(|r| r.physical_resource_id)
            .collect(),
    )
}

/// Drop repeated names, keeping the order of first discovery
fn dedupe_log_groups(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Convert an SDK event, deriving a stable id when the store omitted one
fn to_log_event(event: FilteredLogEvent) -> LogEvent {
    let message = event.message.unwrap_or_default();
    let id = event.event_id.unwrap_or_else(|| {
        surrogate_id(
            event.log_stream_name.as_deref().unwrap_or_default(),
            event.timestamp,
            &message,
        )
    });
    LogEvent::new(id, event.timestamp, &message)
}

fn surrogate_id(stream: &str, timestamp: Option<i64>, message: &str) -> String {
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    format!(
        "{}:{}:{:016x}",
        stream,
        timestamp.unwrap_or_default(),
        hasher.finish()
    )
}
