//! Shared types for lambda-logs
//!
//! This crate contains the data model used across the lambda-logs crates,
//! the errors they exchange and the [`EventSource`] seam to the log store.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

// ============================================================================
// Log Types
// ============================================================================

/// A single log event as returned by the log store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    /// Identifier assigned by the log store, used for deduplication
    pub id: String,

    /// Milliseconds since epoch (if the store reported one)
    pub timestamp: Option<i64>,

    /// Message text, right-trimmed
    pub message: String,
}

impl LogEvent {
    /// Create a new event, trimming trailing whitespace from the message
    pub fn new(id: impl Into<String>, timestamp: Option<i64>, message: &str) -> Self {
        Self {
            id: id.into(),
            timestamp,
            message: message.trim_end().to_string(),
        }
    }

    /// Timestamp converted to local time
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        self.timestamp
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
    }
}

// ============================================================================
// Window Types
// ============================================================================

/// Half-open time interval `[start, end)` in epoch milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    start: i64,
    end: i64,
}

impl Window {
    /// Create a window, rejecting `start >= end`
    pub fn new(start: i64, end: i64) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// The window following this one: starts `overlap` before this window's
    /// end and reaches up to `now`.
    pub fn advance(&self, overlap: Duration, now: i64) -> Self {
        let start = self.end - overlap.as_millis() as i64;
        Self {
            start,
            end: now.max(start + 1),
        }
    }

    /// Same start, end moved forward to `now` (never backwards)
    pub fn extend_to(&self, now: i64) -> Self {
        Self {
            start: self.start,
            end: now.max(self.end),
        }
    }

    /// Move the start forward to `earliest` if it lies before it, keeping
    /// the window non-empty
    pub fn clamp_start(&self, earliest: i64) -> Self {
        Self {
            start: self.start.max(earliest.min(self.end - 1)),
            end: self.end,
        }
    }
}

/// Parse a relative time expression such as `15m` or `2h`.
///
/// Grammar: `<int><unit>` with unit one of `s`, `m`, `h`, `d`, `w`.
pub fn parse_time_expr(expr: &str) -> Result<Duration, TimeExprError> {
    let trimmed = expr.trim();
    let invalid = || TimeExprError {
        expr: expr.to_string(),
    };

    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let unit_ms: u64 = match unit {
        's' => 1_000,
        'm' => 60 * 1_000,
        'h' => 60 * 60 * 1_000,
        'd' => 24 * 60 * 60 * 1_000,
        'w' => 7 * 24 * 60 * 60 * 1_000,
        _ => return Err(invalid()),
    };

    let factor: u64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| invalid())?;

    factor
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

/// Resolve a look-back expression into an absolute epoch millisecond value
pub fn look_back(expr: &str, now: i64) -> Result<i64, TimeExprError> {
    let ago = parse_time_expr(expr)?;
    i64::try_from(ago.as_millis())
        .ok()
        .and_then(|ms| now.checked_sub(ms))
        .ok_or_else(|| TimeExprError {
            expr: expr.to_string(),
        })
}

// ============================================================================
// Event Source
// ============================================================================

/// The upstream log store: resolves a stack into log groups and fetches
/// filtered events per group and window.
pub trait EventSource {
    /// Log group names belonging to the stack's functions
    fn resolve_log_groups(
        &self,
        stack: &str,
    ) -> impl Future<Output = Result<Vec<String>, ResolveError>> + Send;

    /// All events of one log group inside `window` matching `filter`.
    /// The filter is passed to the store verbatim.
    fn fetch_window(
        &self,
        log_group: &str,
        window: Window,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<LogEvent>, FetchError>> + Send;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("start time {start} must be before end time {end}")]
pub struct WindowError {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid time expression '{expr}', expected <int><unit> with unit one of s, m, h, d, w")]
pub struct TimeExprError {
    pub expr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no resources available in stack '{stack}'")]
    NoResources { stack: String },

    #[error("failed to resolve log groups of stack '{stack}'")]
    Lookup {
        stack: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("failed to fetch events from log group '{log_group}'")]
pub struct FetchError {
    pub log_group: String,
    #[source]
    pub source: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_right_trimmed() {
        let event = LogEvent::new("1", Some(1), "  hello world \n\t");
        assert_eq!(event.message, "  hello world");
    }

    #[test]
    fn test_window_rejects_empty_and_inverted() {
        assert!(Window::new(10, 10).is_err());
        assert!(Window::new(11, 10).is_err());
        let window = Window::new(0, 10).unwrap();
        assert_eq!((window.start(), window.end()), (0, 10));
    }

    #[test]
    fn test_window_advance_overlaps_previous_end() {
        let window = Window::new(0, 10_000).unwrap();
        let next = window.advance(Duration::from_secs(10), 25_000);
        assert_eq!(next, Window::new(0, 25_000).unwrap());

        // a clock behind the new start still yields a non-empty window
        let late = window.advance(Duration::from_secs(1), 0);
        assert_eq!(late.start(), 9_000);
        assert_eq!(late.end(), 9_001);
    }

    #[test]
    fn test_window_extend_never_shrinks() {
        let window = Window::new(100, 200).unwrap();
        assert_eq!(window.extend_to(500).end(), 500);
        assert_eq!(window.extend_to(150).end(), 200);
        assert_eq!(window.extend_to(500).start(), 100);
    }

    #[test]
    fn test_window_clamp_start() {
        let window = Window::new(100, 1_000).unwrap();
        assert_eq!(window.clamp_start(400), Window::new(400, 1_000).unwrap());
        assert_eq!(window.clamp_start(50), window);
        assert_eq!(window.clamp_start(5_000), Window::new(999, 1_000).unwrap());
    }

    #[test]
    fn test_parse_time_expr_units() {
        assert_eq!(parse_time_expr("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_time_expr("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_time_expr(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_time_expr("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_time_expr("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_parse_time_expr_rejects_garbage() {
        assert!(parse_time_expr("").is_err());
        assert!(parse_time_expr("15").is_err());
        assert!(parse_time_expr("m").is_err());
        assert!(parse_time_expr("-5m").is_err());
        assert!(parse_time_expr("5y").is_err());
        assert!(parse_time_expr("5─").is_err());
    }

    #[test]
    fn test_look_back() {
        assert_eq!(look_back("15m", 1_000_000).unwrap(), 100_000);
        assert_eq!(look_back("0s", 42).unwrap(), 42);
    }

    #[test]
    fn test_look_back_rejects_out_of_range() {
        // fits u64 milliseconds but not i64
        assert!(look_back("9223372036854776s", 1_700_000_000_000).is_err());
        // fits i64 milliseconds but underflows the subtraction
        assert!(look_back("9223372036854775s", -1_700_000_000_000).is_err());
        // overflows the u64 multiplication
        assert!(parse_time_expr("18446744073709551615w").is_err());
    }
}
