//! Settings resolution: CLI flags over config file over built-in defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use lambda_logs_pipeline::{DEFAULT_POLL_DELAY, RenderOptions, Schedule, named_color};
use lambda_logs_types::{TimeExprError, Window, WindowError, look_back, parse_time_expr};

use crate::Args;

/// Look-back used when no start time was given
const DEFAULT_LOOK_BACK: Duration = Duration::from_secs(15 * 60);

const DEFAULT_COLOR: &str = "yellow";

const DEFAULT_MSG_LENGTH: i64 = 350;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid --{flag} value")]
    TimeExpr {
        flag: &'static str,
        #[source]
        source: TimeExprError,
    },

    #[error("start time '{start}' may not be after end time '{end}'! Please check your inputs")]
    InvalidWindow {
        start: String,
        end: String,
        #[source]
        source: WindowError,
    },

    #[error("invalid color pattern")]
    ColorPattern(#[from] regex::Error),

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Defaults loaded from a TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub region: Option<String>,
    pub color: Option<String>,
    pub color_pattern: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub msg_length: Option<i64>,
    pub poll: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything the pipeline needs, validated
#[derive(Debug)]
pub struct Settings {
    pub stack: String,
    pub filter: String,
    pub region: Option<String>,
    pub window: Window,
    pub schedule: Schedule,
    pub render: RenderOptions,
}

impl Settings {
    /// Merge flags and file values and validate them against `now`
    pub fn resolve(
        args: Args,
        file: FileConfig,
        now: i64,
        colored: bool,
    ) -> Result<Self, ConfigError> {
        let start_expr = args.start.or(file.start);
        let end_expr = args.end.or(file.end);

        let start = match &start_expr {
            Some(expr) => resolve_time("start", expr, now)?,
            None => now - DEFAULT_LOOK_BACK.as_millis() as i64,
        };
        let end = match &end_expr {
            Some(expr) => resolve_time("end", expr, now)?,
            None => now,
        };

        let window = Window::new(start, end).map_err(|source| ConfigError::InvalidWindow {
            start: start_expr.unwrap_or_else(|| "15m".to_string()),
            end: end_expr.unwrap_or_else(|| "now".to_string()),
            source,
        })?;

        let color_pattern = args
            .color_pattern
            .or(file.color_pattern)
            .filter(|p| !p.is_empty())
            .map(|p| Regex::new(&p))
            .transpose()?;

        let color = args
            .color
            .or(file.color)
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());

        let schedule = match args.poll.or(file.poll) {
            Some(expr) => Schedule::Polling {
                delay: poll_delay(&expr),
            },
            None => Schedule::OneShot,
        };

        Ok(Self {
            stack: args.stack,
            filter: args.filter,
            region: args.region.or(file.region),
            window,
            schedule,
            render: RenderOptions {
                color_pattern,
                color: named_color(&color),
                max_message_length: args
                    .msg_length
                    .or(file.msg_length)
                    .unwrap_or(DEFAULT_MSG_LENGTH),
                colored,
            },
        })
    }
}

fn resolve_time(flag: &'static str, expr: &str, now: i64) -> Result<i64, ConfigError> {
    look_back(expr, now).map_err(|source| ConfigError::TimeExpr { flag, source })
}

/// Polling delay, falling back to the default for missing or unusable values
fn poll_delay(expr: &str) -> Duration {
    match parse_time_expr(expr) {
        Ok(delay) if !delay.is_zero() => delay,
        _ => {
            debug!(poll = expr, "no usable poll delay, using default");
            DEFAULT_POLL_DELAY
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["lambda-logs", "--stack", "my-stack", "--filter", "ERROR"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn resolve(extra: &[&str]) -> Result<Settings, ConfigError> {
        Settings::resolve(args(extra), FileConfig::default(), NOW, false)
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(&[]).unwrap();
        assert_eq!(settings.stack, "my-stack");
        assert_eq!(settings.filter, "ERROR");
        assert_eq!(settings.window, Window::new(NOW - 15 * 60 * 1000, NOW).unwrap());
        assert_eq!(settings.schedule, Schedule::OneShot);
        assert_eq!(settings.render.max_message_length, 350);
        assert!(settings.render.color_pattern.is_none());
        assert_eq!(settings.render.color, named_color("yellow"));
        assert!(settings.region.is_none());
    }

    #[test]
    fn test_relative_window() {
        let settings = resolve(&["--start", "2h", "--end", "30m"]).unwrap();
        assert_eq!(settings.window.start(), NOW - 2 * 60 * 60 * 1000);
        assert_eq!(settings.window.end(), NOW - 30 * 60 * 1000);
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = resolve(&["--start", "5m", "--end", "10m"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { .. }));

        let err = resolve(&["--start", "0s"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { .. }));
    }

    #[test]
    fn test_bad_time_expression_rejected() {
        let err = resolve(&["--start", "yesterday"]).unwrap_err();
        assert!(matches!(err, ConfigError::TimeExpr { flag: "start", .. }));

        let err = resolve(&["--end", "9223372036854776s"]).unwrap_err();
        assert!(matches!(err, ConfigError::TimeExpr { flag: "end", .. }));
    }

    #[test]
    fn test_poll_delay() {
        let settings = resolve(&["--poll", "10s"]).unwrap();
        assert_eq!(
            settings.schedule,
            Schedule::Polling {
                delay: Duration::from_secs(10)
            }
        );

        for extra in [&["--poll"][..], &["--poll", "soon"][..], &["--poll", "0s"][..]] {
            let settings = resolve(extra).unwrap();
            assert_eq!(
                settings.schedule,
                Schedule::Polling {
                    delay: DEFAULT_POLL_DELAY
                }
            );
        }
    }

    #[test]
    fn test_camel_case_flags() {
        let settings = resolve(&[
            "--colorPattern",
            "ERROR",
            "--msgLength",
            "-1",
            "--color",
            "red",
        ])
        .unwrap();
        assert_eq!(
            settings.render.color_pattern.as_ref().map(Regex::as_str),
            Some("ERROR")
        );
        assert_eq!(settings.render.max_message_length, -1);
        assert_eq!(settings.render.color, named_color("red"));
    }

    #[test]
    fn test_invalid_color_pattern_rejected() {
        let err = resolve(&["--colorPattern", "(unclosed"]).unwrap_err();
        assert!(matches!(err, ConfigError::ColorPattern(_)));
    }

    #[test]
    fn test_missing_required_flags() {
        assert!(Args::try_parse_from(["lambda-logs", "--stack", "s"]).is_err());
        assert!(Args::try_parse_from(["lambda-logs", "--filter", "f"]).is_err());
    }

    #[test]
    fn test_file_config_below_flags() {
        let file: FileConfig = toml::from_str(
            r#"
            region = "eu-west-1"
            color = "cyan"
            start = "1h"
            msg_length = 80
            poll = "30s"
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(args(&["--msgLength", "20"]), file, NOW, false).unwrap();
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.window.start(), NOW - 60 * 60 * 1000);
        assert_eq!(settings.render.max_message_length, 20);
        assert_eq!(
            settings.schedule,
            Schedule::Polling {
                delay: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("colour = \"red\"").is_err());
    }
}
