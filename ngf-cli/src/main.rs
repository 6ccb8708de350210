use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;

pub mod session;

use ngf_bus::{BusKind, Properties};
use ngf_client::{ClientConfig, NgfClient};
use session::{Action, Plan, ScheduledAction};

/// Play non-graphic feedback events through ngfd
///
/// Connects to the feedback daemon, plays every EVENT, optionally pauses,
/// resumes or stops them after a delay, and prints notifications until all
/// events have ended or the timeout expires.
#[derive(Parser, Debug)]
#[command(name = "ngf-play")]
#[command(about = "Play non-graphic feedback events through ngfd")]
#[command(version)]
pub struct Args {
    /// Event names to play, e.g. ringtone or battery_low
    #[arg(required = true)]
    pub events: Vec<String>,

    /// Use the session bus instead of the system bus
    #[arg(long)]
    pub session: bool,

    /// Well-known name of the daemon
    #[arg(long, env = "NGF_SERVICE")]
    pub service: Option<String>,

    /// Object path of the daemon
    #[arg(long, env = "NGF_PATH")]
    pub path: Option<String>,

    /// Interface of the daemon
    #[arg(long, env = "NGF_INTERFACE")]
    pub interface: Option<String>,

    /// Extra event property as key=value (repeatable)
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Pause all events after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub pause_after: Option<f64>,

    /// Resume all events after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub resume_after: Option<f64>,

    /// Stop all events after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub stop_after: Option<f64>,

    /// Give up after this many seconds (0 waits forever)
    #[arg(short, long, default_value = "30")]
    pub timeout: f64,

    /// Print notifications as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "NGF_LOG_LEVEL")]
    pub log_level: String,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self.events.iter().find(|e| e.trim().is_empty()) {
            return Err(anyhow::anyhow!("Invalid event name {:?}", name));
        }

        let delays = [
            ("--pause-after", self.pause_after),
            ("--resume-after", self.resume_after),
            ("--stop-after", self.stop_after),
            ("--timeout", Some(self.timeout)),
        ];
        for (flag, value) in delays {
            if let Some(seconds) = value {
                to_duration(flag, seconds)?;
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }

    /// Client configuration: `NGF_BUS` and friends, overridden by flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_env().context("Invalid NGF_* environment")?;

        if self.session {
            config = config.with_bus(BusKind::Session);
        }
        if let Some(service) = &self.service {
            config = config.with_service(service.clone());
        }
        if let Some(path) = &self.path {
            config = config.with_path(path.clone());
        }
        if let Some(interface) = &self.interface {
            config = config.with_interface(interface.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn plan(&self) -> Result<Plan> {
        let mut properties = Properties::new();
        for assignment in &self.properties {
            properties
                .parse_assignment(assignment)
                .with_context(|| format!("Invalid property '{}'", assignment))?;
        }

        let mut actions = Vec::new();
        for (flag, seconds, action) in [
            ("--pause-after", self.pause_after, Action::Pause),
            ("--resume-after", self.resume_after, Action::Resume),
            ("--stop-after", self.stop_after, Action::Stop),
        ] {
            if let Some(seconds) = seconds {
                actions.push(ScheduledAction {
                    at: to_duration(flag, seconds)?,
                    action,
                });
            }
        }

        let timeout = to_duration("--timeout", self.timeout)?;

        Ok(Plan {
            events: self.events.clone(),
            properties,
            actions,
            timeout: (!timeout.is_zero()).then_some(timeout),
            json: self.json,
        })
    }
}

/// Seconds from the command line as a `Duration`
fn to_duration(flag: &str, seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("{} must be a non-negative number of seconds, got {}", flag, seconds))
}

/// Initialize tracing/logging with the specified log level
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase())),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_tracing(&args.log_level);

    let config = args.client_config()?;
    let plan = args.plan()?;

    info!(
        "Connecting to {} on the {:?} bus",
        config.dbus.destination, config.dbus.bus
    );
    let client = NgfClient::with_config(config).context("Failed to create feedback client")?;

    let mut stdout = std::io::stdout().lock();
    let summary = session::run(&client, &plan, &mut stdout)?;

    info!(
        "Played {}, completed {}, failed {}",
        summary.played, summary.completed, summary.failed
    );

    if summary.timed_out {
        anyhow::bail!("Timed out waiting for events to finish");
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} events failed", summary.failed, summary.played);
    }

    Ok(())
}
