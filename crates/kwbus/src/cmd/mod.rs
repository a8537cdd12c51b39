use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use kwbus_transport::TransportKind;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod publish;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish a payload for a keyword, repeating it every interval.
    Publish(PublishArgs),
    /// Subscribe to a keyword and print every fresh payload.
    Subscribe(SubscribeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Publish(args) => publish::run(args),
        Command::Subscribe(args) => subscribe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where to publish or subscribe: one endpoint on the command line, or a
/// hub configuration file.
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Transport family (socket, file, pipe).
    #[arg(required_unless_present = "config", requires = "address")]
    pub kind: Option<TransportKind>,
    /// Endpoint address: host:port for sockets, a path prefix for files and pipes.
    #[arg(required_unless_present = "config")]
    pub address: Option<String>,
    /// JSON hub configuration listing several endpoints.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["kind", "address"])]
    pub config: Option<PathBuf>,
    /// Keyword to publish or subscribe to.
    #[arg(long, short = 'k')]
    pub keyword: String,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Payload text.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the payload from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Time between updates (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Exit after sending N updates.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Exit after printing N payloads.
    #[arg(long)]
    pub count: Option<usize>,
    /// Time between update checks (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub poll: String,
    /// Give up when no payload arrived within this time (e.g. 10s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Sleep for `duration`, waking early once `running` clears.
pub(crate) fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLICE));
    }
}
