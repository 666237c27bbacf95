use std::io::{self, Write};

use crossterm::style::{Color, Stylize, style};
use regex::Regex;
use tracing::debug;

use lambda_logs_types::LogEvent;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Color pattern did not match the message
#[derive(Debug, thiserror::Error)]
#[error("color pattern '{pattern}' does not match message '{message}'")]
pub struct PatternMismatch {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    PatternMismatch(#[from] PatternMismatch),

    #[error("failed to write log line")]
    Io(#[from] io::Error),
}

/// How events are turned into lines
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Pattern whose match (from the start of the message) becomes the prefix
    pub color_pattern: Option<Regex>,

    /// Prefix color
    pub color: Color,

    /// Maximum characters of the message body, zero or negative for no limit
    pub max_message_length: i64,

    /// Whether to emit ANSI colors at all
    pub colored: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color_pattern: None,
            color: Color::DarkYellow,
            max_message_length: 350,
            colored: true,
        }
    }
}

/// Formats single events for the terminal
#[derive(Clone, Debug)]
pub struct LineRenderer {
    options: RenderOptions,
}

impl LineRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Split an event into its (uncolored) prefix and message body
    pub fn split(&self, event: &LogEvent) -> Result<(String, String), PatternMismatch> {
        let (prefix, body) = match &self.options.color_pattern {
            None => {
                let prefix = event
                    .local_time()
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_else(|| "-".to_string());
                (prefix, event.message.as_str())
            }
            Some(re) => {
                let m = re.find(&event.message).ok_or_else(|| PatternMismatch {
                    pattern: re.as_str().to_string(),
                    message: event.message.clone(),
                })?;
                let rest = &event.message[m.end()..];
                // the character right after the match is a separator
                let body = rest
                    .char_indices()
                    .nth(1)
                    .map_or("", |(idx, _)| &rest[idx..])
                    .trim_start();
                (event.message[..m.end()].to_string(), body)
            }
        };

        Ok((prefix, self.truncate(body).to_string()))
    }

    /// Format a full line without trailing newline
    pub fn format(&self, event: &LogEvent) -> Result<String, PatternMismatch> {
        let (prefix, body) = self.split(event)?;
        let prefix = if self.options.colored {
            style(prefix).with(self.options.color).to_string()
        } else {
            prefix
        };
        Ok(format!("{} {}", prefix, body))
    }

    /// Write one event as a line
    pub fn render<W: Write>(&self, out: &mut W, event: &LogEvent) -> Result<(), RenderError> {
        let line = self.format(event)?;
        writeln!(out, "{}", line)?;
        Ok(())
    }

    fn truncate<'a>(&self, body: &'a str) -> &'a str {
        let Ok(max) = usize::try_from(self.options.max_message_length) else {
            return body;
        };
        if max == 0 {
            return body;
        }
        match body.char_indices().nth(max) {
            Some((idx, _)) => &body[..idx],
            None => body,
        }
    }
}

/// Map a color name to a terminal color, defaulting to yellow.
///
/// Accepts the basic ANSI names plus `gray`/`grey` and bright variants
/// written as `redBright` or `red_bright`.
pub fn named_color(name: &str) -> Color {
    let lower = name.trim().to_lowercase().replace('_', "");
    let (base, bright) = match lower.strip_suffix("bright") {
        Some(base) => (base, true),
        None => (lower.as_str(), false),
    };

    match (base, bright) {
        ("black", false) => Color::Black,
        ("black", true) | ("gray", _) | ("grey", _) => Color::DarkGrey,
        ("red", false) => Color::DarkRed,
        ("red", true) => Color::Red,
        ("green", false) => Color::DarkGreen,
        ("green", true) => Color::Green,
        ("yellow", false) => Color::DarkYellow,
        ("yellow", true) => Color::Yellow,
        ("blue", false) => Color::DarkBlue,
        ("blue", true) => Color::Blue,
        ("magenta", false) => Color::DarkMagenta,
        ("magenta", true) => Color::Magenta,
        ("cyan", false) => Color::DarkCyan,
        ("cyan", true) => Color::Cyan,
        ("white", false) => Color::Grey,
        ("white", true) => Color::White,
        _ => {
            debug!(color = name, "unknown color, using yellow");
            Color::DarkYellow
        }
    }
}
