//! fitsync CLI - Command-line driver for Synheart Sync
//!
//! Commands:
//! - once: authorize, run one fetch cycle, print the snapshot payload
//! - run: keep syncing and print a payload after every cycle
//! - config: print the default sync configuration
//! - check-fixture: validate a provider fixture file

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use synheart_sync::clock::{Clock, FixedClock, SystemClock};
use synheart_sync::provider::AuthResult;
use synheart_sync::types::CoordinatorState;
use synheart_sync::{
    FixtureProvider, MetricKind, SnapshotEncoder, SyncConfig, SyncCoordinator, SyncError,
    PRODUCER_NAME, SYNC_VERSION,
};

/// fitsync - Keep wearable fitness metrics in sync
#[derive(Parser)]
#[command(name = "fitsync")]
#[command(author = "Synheart AI Inc")]
#[command(version = SYNC_VERSION)]
#[command(about = "Authorize against a fitness provider and poll daily metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// Provider fixture file (JSON)
    #[arg(short, long)]
    fixture: PathBuf,

    /// Sync config file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Freeze the clock at this RFC 3339 instant (useful for recorded fixtures)
    #[arg(long)]
    at: Option<String>,

    /// Simulate the user denying the activity permission prompt
    #[arg(long)]
    deny_permission: bool,

    /// Simulate the provider denying authorization
    #[arg(long)]
    deny_auth: bool,

    /// Output format
    #[arg(long)]
    output_format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize, run one fetch cycle and print the snapshot
    Once {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Keep syncing, printing a snapshot after every cycle
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// Override the refresh interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Stop after this many cycles (including the initial one)
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Print the default sync configuration
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a provider fixture file
    CheckFixture {
        /// Fixture file path
        fixture: PathBuf,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One compact JSON payload per line
    Ndjson,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FitsyncCliError> {
    match cli.command {
        Commands::Once { session } => block_on(cmd_once(session)),
        Commands::Run {
            session,
            interval_secs,
            cycles,
        } => block_on(cmd_run(session, interval_secs, cycles)),
        Commands::Config { output } => cmd_config(output.as_deref()),
        Commands::CheckFixture { fixture, json } => cmd_check_fixture(&fixture, json),
    }
}

fn block_on<F>(future: F) -> Result<(), FitsyncCliError>
where
    F: std::future::Future<Output = Result<(), FitsyncCliError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

/// Coordinator plus what is needed to print its payloads
struct Session {
    sync: SyncCoordinator,
    encoder: SnapshotEncoder,
    format: OutputFormat,
}

impl Session {
    fn open(args: &SessionArgs, interval_secs: Option<u64>) -> Result<Self, FitsyncCliError> {
        let mut config = match &args.config {
            Some(path) => SyncConfig::from_json(&fs::read_to_string(path)?)
                .map_err(SyncError::Config)?,
            None => SyncConfig::default(),
        };
        if let Some(secs) = interval_secs {
            config.interval_secs = secs;
        }

        let mut provider = FixtureProvider::from_json(&fs::read_to_string(&args.fixture)?)?;
        if args.deny_permission {
            provider = provider.with_permission(false);
        }
        if args.deny_auth {
            provider = provider.with_authorization(AuthResult::denied("denied from command line"));
        }

        let clock: Arc<dyn Clock> = match &args.at {
            Some(at) => {
                let at: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(at)
                    .map_err(|e| FitsyncCliError::InvalidArgument(format!("--at: {e}")))?;
                Arc::new(FixedClock::new(at))
            }
            None => Arc::new(SystemClock),
        };

        let format = args.output_format.unwrap_or_else(|| {
            if atty::is(atty::Stream::Stdout) {
                OutputFormat::JsonPretty
            } else {
                OutputFormat::Ndjson
            }
        });

        Ok(Self {
            sync: SyncCoordinator::with_clock(Arc::new(provider), config, clock)?,
            encoder: SnapshotEncoder::new(),
            format,
        })
    }

    fn print(&self) -> Result<(), FitsyncCliError> {
        let payload = self.encoder.encode(
            &self.sync.snapshot(),
            &self.sync.status(),
            &self.sync.config().metrics,
        );
        let line = match self.format {
            OutputFormat::Ndjson => serde_json::to_string(&payload)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&payload)?,
        };
        let mut stdout = io::stdout();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }

    /// Start syncing; prints the payload and fails when not connected
    async fn start(&self) -> Result<(), FitsyncCliError> {
        let status = self.sync.start().await?;
        if status.state == CoordinatorState::UnauthorizedFailed {
            self.print()?;
            return Err(FitsyncCliError::NotConnected(
                status.failure.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        Ok(())
    }
}

async fn cmd_once(args: SessionArgs) -> Result<(), FitsyncCliError> {
    let session = Session::open(&args, None)?;
    session.start().await?;
    session.print()?;
    session.sync.stop().await;
    Ok(())
}

async fn cmd_run(
    args: SessionArgs,
    interval_secs: Option<u64>,
    cycles: Option<u32>,
) -> Result<(), FitsyncCliError> {
    let session = Session::open(&args, interval_secs)?;
    let mut reports = session.sync.subscribe();

    session.start().await?;
    reports.borrow_and_update();
    session.print()?;

    let mut printed: u32 = 1;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while cycles.map_or(true, |limit| printed < limit) {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                session.print()?;
                printed += 1;
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.sync.stop().await;
    Ok(())
}

fn cmd_config(output: Option<&Path>) -> Result<(), FitsyncCliError> {
    let json = SyncConfig::default().to_json().map_err(SyncError::Config)?;
    match output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Serialize)]
struct FixtureReport {
    producer: String,
    version: String,
    valid: bool,
    sample_counts: Vec<(MetricKind, usize)>,
    failing_metrics: Vec<MetricKind>,
}

fn cmd_check_fixture(path: &Path, json: bool) -> Result<(), FitsyncCliError> {
    let provider = FixtureProvider::from_json(&fs::read_to_string(path)?)?;

    let counts = provider.sample_counts();
    let report = FixtureReport {
        producer: PRODUCER_NAME.to_string(),
        version: SYNC_VERSION.to_string(),
        valid: true,
        sample_counts: MetricKind::ALL
            .iter()
            .map(|kind| (*kind, counts.get(kind).copied().unwrap_or(0)))
            .collect(),
        failing_metrics: provider.failing_metrics(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Fixture {} is valid", path.display());
        for (kind, count) in &report.sample_counts {
            println!("  {:<12} {} samples", kind.label(), count);
        }
        for kind in &report.failing_metrics {
            println!("  {:<12} scripted to fail", kind.label());
        }
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FitsyncCliError {
    Io(io::Error),
    Sync(SyncError),
    Json(serde_json::Error),
    InvalidArgument(String),
    NotConnected(String),
}

impl From<io::Error> for FitsyncCliError {
    fn from(e: io::Error) -> Self {
        FitsyncCliError::Io(e)
    }
}

impl From<SyncError> for FitsyncCliError {
    fn from(e: SyncError) -> Self {
        FitsyncCliError::Sync(e)
    }
}

impl From<serde_json::Error> for FitsyncCliError {
    fn from(e: serde_json::Error) -> Self {
        FitsyncCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FitsyncCliError> for CliError {
    fn from(e: FitsyncCliError) -> Self {
        match e {
            FitsyncCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FitsyncCliError::Sync(SyncError::Config(e)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'fitsync config' for a valid starting point".to_string()),
            },
            FitsyncCliError::Sync(e) => CliError {
                code: "SYNC_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FitsyncCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FitsyncCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Timestamps use RFC 3339, e.g. 2024-01-15T09:00:00Z".to_string()),
            },
            FitsyncCliError::NotConnected(reason) => CliError {
                code: "NOT_CONNECTED".to_string(),
                message: reason,
                hint: Some("Grant the activity permission and authorize the provider".to_string()),
            },
        }
    }
}
