use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lambda_logs_aws::{AwsClient, resolve_region};
use lambda_logs_pipeline::{LineRenderer, PollScheduler};

mod config;

use config::{FileConfig, Settings};

/// lambda-logs - Stream CloudWatch logs of all Lambda functions in a CloudFormation stack
#[derive(Parser, Debug)]
#[command(name = "lambda-logs")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CloudFormation stack whose Lambda functions are tailed
    #[arg(long)]
    pub stack: String,

    /// CloudWatch Logs filter pattern, passed through unchanged
    #[arg(long, allow_hyphen_values = true)]
    pub filter: String,

    /// AWS region (defaults to the AWS CLI configuration, then us-east-1)
    #[arg(long)]
    pub region: Option<String>,

    /// Regex whose match, from the start of the message, is shown colored
    /// instead of the timestamp
    #[arg(long = "colorPattern", visible_alias = "color-pattern", value_name = "REGEX")]
    pub color_pattern: Option<String>,

    /// Color of the line prefix
    #[arg(long)]
    pub color: Option<String>,

    /// Start of the time window as look-back, e.g. 15m, 2h, 1d [default: 15m]
    #[arg(long, value_name = "AGO")]
    pub start: Option<String>,

    /// End of the time window as look-back [default: now]
    #[arg(long, value_name = "AGO")]
    pub end: Option<String>,

    /// Maximum characters of the message shown, 0 for no limit [default: 350]
    #[arg(
        long = "msgLength",
        visible_alias = "msg-length",
        allow_negative_numbers = true
    )]
    pub msg_length: Option<i64>,

    /// Keep polling for new events, waiting the given delay between requests
    /// [default delay: 5s]
    #[arg(long, value_name = "DELAY", num_args = 0..=1, default_missing_value = "")]
    pub poll: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// TOML file with default values for the optional flags
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr, stdout only carries log lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let colored = !args.no_color && std::io::stdout().is_terminal();
    let now = chrono::Utc::now().timestamp_millis();
    let settings = Settings::resolve(args, file, now, colored)?;

    let region = resolve_region(settings.region.as_deref()).await;
    info!(%region, stack = %settings.stack, schedule = ?settings.schedule, "starting");

    let client = AwsClient::new(&region).await;
    let mut scheduler = PollScheduler::new(
        client,
        LineRenderer::new(settings.render),
        std::io::stdout(),
        settings.filter,
        settings.schedule,
    );

    scheduler
        .run(&settings.stack, settings.window)
        .await
        .context("An unexpected error occurred while retrieving Lambda logs")
}
