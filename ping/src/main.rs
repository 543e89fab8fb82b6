//! Command line ping built on `tokio_icmp_echo`.

mod report;

use clap::Parser;
use report::ConsoleReporter;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use tokio_icmp_echo::address::{self, AddressFamily};
use tokio_icmp_echo::session::{self, CancelHandle, StopReason};
use tokio_icmp_echo::transport::RawTransport;
use tokio_icmp_echo::{cancellation, PingConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Send ICMP ECHO_REQUEST packets to a network host.
#[derive(Parser, Debug)]
#[command(name = "ping")]
#[command(version)]
#[command(about = "Send ICMP ECHO_REQUEST packets to a network host")]
pub struct Args {
    /// Target hostname or IP address.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Stop after this many requests. -1 runs until interrupted.
    #[arg(
        short,
        long,
        default_value = "-1",
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub count: i64,

    /// Seconds to wait between requests.
    #[arg(short, long, default_value = "1", value_parser = parse_seconds)]
    pub interval: Duration,

    /// Number of payload bytes.
    #[arg(short, long, default_value = "56")]
    pub size: usize,

    /// Address family, 4 or 6.
    #[arg(short, long, default_value = "4", value_parser = parse_family)]
    pub family: AddressFamily,

    /// IP time to live / hop limit of outgoing requests.
    #[arg(
        short,
        long,
        default_value = "64",
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    pub ttl: u8,

    /// Seconds to wait for each reply.
    #[arg(
        short = 'W',
        long,
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub wait: u64,

    /// Print the final statistics as JSON.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_family(value: &str) -> Result<AddressFamily, String> {
    let number: u8 = value
        .parse()
        .map_err(|_| format!("expected 4 or 6, got {:?}", value))?;
    AddressFamily::from_number(number)
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{}", e))
}

impl Args {
    fn to_config(&self) -> PingConfig {
        PingConfig {
            family: self.family,
            payload_size: self.size,
            ttl: self.ttl,
            wait: Duration::from_secs(self.wait),
            interval: self.interval,
            count: u64::try_from(self.count).ok(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            return tokio::signal::ctrl_c().await;
        }
    };
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(e) = interrupted {
                warn!(error = %e, "Cannot listen for SIGINT");
                terminate.recv().await;
            }
        }
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Cancels the run once `signal` fires. A listener that failed to install never fires.
async fn cancel_on<F>(signal: F, handle: CancelHandle)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Cannot listen for shutdown signals");
        std::future::pending::<()>().await;
    }
    info!("Interrupted, stopping after the current probe");
    handle.cancel();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = args.to_config();

    let target = match address::resolve(&args.host, config.family).await {
        Ok(target) => target,
        Err(e) => {
            eprintln!("ping: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (handle, cancel) = cancellation();
    tokio::spawn(cancel_on(shutdown_signal(), handle));

    let mut console = ConsoleReporter::new(args.host.clone(), args.json);
    match session::run(RawTransport::open, target, config, cancel, &mut console).await {
        Ok(summary) => match summary.stop {
            StopReason::TransportFailed(e) => {
                eprintln!("ping: {}", e);
                ExitCode::FAILURE
            }
            StopReason::CountReached | StopReason::Cancelled => ExitCode::SUCCESS,
        },
        Err(e) => {
            eprintln!("ping: {}", e);
            ExitCode::FAILURE
        }
    }
}
