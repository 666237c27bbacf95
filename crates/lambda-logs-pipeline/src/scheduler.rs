use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use lambda_logs_types::{EventSource, FetchError, ResolveError, Window};

use crate::merger::{SeenSet, merge};
use crate::renderer::{LineRenderer, RenderError};

/// How far each polling window reaches back before the previous window's
/// end. Events can show up in the log store well after their timestamp.
pub const INGESTION_LAG: Duration = Duration::from_secs(10);

/// Oldest point a retried window may start at, measured back from now.
/// Older events of a window that keeps failing are given up on.
pub const MAX_RETRY_SPAN: Duration = Duration::from_secs(60 * 60);

/// Delay between polling cycles when none was given
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(5000);

/// Whether the pipeline runs once or keeps polling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    OneShot,
    Polling { delay: Duration },
}

/// Source of the current time in epoch milliseconds
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to write output")]
    Output(#[source] io::Error),
}

/// Counters for one fetch/merge/render cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Events returned by the log store, duplicates included
    pub fetched: usize,
    pub rendered: usize,
    /// Events dropped because the color pattern did not match
    pub skipped: usize,
}

/// Drives fetch, merge and render for one window and, when polling,
/// for every following window.
pub struct PollScheduler<S, W, C = SystemClock> {
    source: S,
    renderer: LineRenderer,
    out: W,
    clock: C,
    filter: String,
    schedule: Schedule,
    seen: SeenSet,
}

impl<S: EventSource, W: Write> PollScheduler<S, W> {
    pub fn new(
        source: S,
        renderer: LineRenderer,
        out: W,
        filter: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        Self {
            source,
            renderer,
            out,
            clock: SystemClock,
            filter: filter.into(),
            schedule,
            seen: SeenSet::new(),
        }
    }
}

impl<S, W, C> PollScheduler<S, W, C> {
    /// Replace the clock used to compute polling windows
    pub fn with_clock<C2: Clock>(self, clock: C2) -> PollScheduler<S, W, C2> {
        PollScheduler {
            source: self.source,
            renderer: self.renderer,
            out: self.out,
            clock,
            filter: self.filter,
            schedule: self.schedule,
            seen: self.seen,
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<S: EventSource, W: Write, C: Clock> PollScheduler<S, W, C> {
    /// Resolve the stack's log groups once, then run cycles starting at
    /// `window`. Returns after one cycle in one-shot mode; when polling it
    /// only returns on an output error.
    pub async fn run(&mut self, stack: &str, window: Window) -> Result<(), PipelineError> {
        let log_groups = self.source.resolve_log_groups(stack).await?;
        info!(%stack, count = log_groups.len(), "resolved log groups");

        let mut window = window;
        loop {
            let result = self.cycle(&log_groups, window).await;

            let Schedule::Polling { delay } = self.schedule else {
                return result.map(|_| ());
            };

            let succeeded = match result {
                Ok(_) => true,
                Err(PipelineError::Output(e)) => return Err(PipelineError::Output(e)),
                Err(e) => {
                    warn!(error = %describe(&e), "polling cycle failed, retrying its window");
                    false
                }
            };

            tokio::time::sleep(delay).await;
            window = next_window(window, succeeded, self.clock.now_ms());
        }
    }

    /// Fetch every log group for `window`, merge the results and render
    /// the events not seen before.
    pub async fn cycle(
        &mut self,
        log_groups: &[String],
        window: Window,
    ) -> Result<CycleStats, PipelineError> {
        let source = &self.source;
        let filter = self.filter.as_str();

        let batches = try_join_all(
            log_groups
                .iter()
                .map(|group| source.fetch_window(group, window, filter)),
        )
        .await?;

        let mut stats = CycleStats {
            fetched: batches.iter().map(Vec::len).sum(),
            ..Default::default()
        };

        for event in merge(&mut self.seen, batches) {
            match self.renderer.render(&mut self.out, &event) {
                Ok(()) => stats.rendered += 1,
                Err(RenderError::PatternMismatch(e)) => {
                    warn!(event_id = %event.id, "skipping line: {}", e);
                    stats.skipped += 1;
                }
                Err(RenderError::Io(e)) => return Err(PipelineError::Output(e)),
            }
        }
        self.out.flush().map_err(PipelineError::Output)?;

        debug!(
            start = window.start(),
            end = window.end(),
            fetched = stats.fetched,
            rendered = stats.rendered,
            skipped = stats.skipped,
            "cycle complete"
        );

        Ok(stats)
    }
}

/// Window of the next polling cycle.
///
/// After a successful cycle the window restarts [`INGESTION_LAG`] before
/// the previous end; after a failed one the previous start is kept so the
/// failed range is fetched again, but never further back than
/// [`MAX_RETRY_SPAN`] before `now`.
pub fn next_window(previous: Window, succeeded: bool, now: i64) -> Window {
    if succeeded {
        return previous.advance(INGESTION_LAG, now);
    }

    let retry = previous.extend_to(now);
    let earliest = now.saturating_sub(MAX_RETRY_SPAN.as_millis() as i64);
    if retry.start() < earliest {
        warn!(
            dropped_from = retry.start(),
            dropped_to = earliest,
            "retry window too long, giving up on its oldest part"
        );
    }
    retry.clamp_start(earliest)
}

fn describe(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
