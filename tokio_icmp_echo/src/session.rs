//! The probe loop: one run against one target, from transport open to summary.

use crate::address::AddressFamily;
use crate::config::PingConfig;
use crate::error::{PingError, PingResult};
use crate::probe::{EchoProbe, ProbeOutcome};
use crate::stats::RunStatistics;
use crate::transport::ProbeTransport;
use std::net::IpAddr;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Creates a linked cancel handle / token pair.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Receives progress of a run. Implemented by the console output.
pub trait Reporter {
    fn start(&mut self, _target: IpAddr, _config: &PingConfig) {}

    fn probe(&mut self, sequence: u64, outcome: &ProbeOutcome);

    fn finish(&mut self, stats: &RunStatistics, stop: &StopReason);
}

#[derive(Debug)]
pub enum StopReason {
    CountReached,
    Cancelled,
    TransportFailed(PingError),
}

#[derive(Debug)]
pub struct RunSummary {
    pub stats: RunStatistics,
    pub stop: StopReason,
}

pub struct ProbeLoop {
    config: PingConfig,
    probe: EchoProbe,
    next_sequence: u64,
}

impl ProbeLoop {
    pub fn new(config: PingConfig, identifier: u16) -> Self {
        Self {
            probe: EchoProbe::new(identifier, config.probe_config()),
            config,
            next_sequence: 0,
        }
    }

    /// Probes until the count is reached, `cancel` fires, or the transport fails.
    pub async fn run<T, R>(
        &mut self,
        transport: &mut T,
        target: IpAddr,
        stats: &mut RunStatistics,
        cancel: &mut Cancellation,
        reporter: &mut R,
    ) -> StopReason
    where
        T: ProbeTransport + ?Sized,
        R: Reporter + ?Sized,
    {
        loop {
            if self.config.count_reached(stats.sent()) {
                return StopReason::CountReached;
            }
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let sequence = self.next_sequence;
            self.next_sequence += 1;
            // The wire field wraps, the run counter does not.
            let outcome = self
                .probe
                .probe(transport, target, (sequence & 0xFFFF) as u16)
                .await;
            stats.record(&outcome);
            reporter.probe(sequence, &outcome);

            match outcome {
                ProbeOutcome::TransportError(e) => {
                    warn!(error = %e, sequence, "Transport failed, stopping");
                    return StopReason::TransportFailed(e);
                }
                ProbeOutcome::Timeout => debug!(sequence, "No reply"),
                _ => {}
            }
        }
    }
}

/// Opens the transport, runs the probe loop and releases the transport on every exit path.
///
/// Setup failures are returned before any probe is sent and without reporting
/// statistics.
pub async fn run<T, F, R>(
    open: F,
    target: IpAddr,
    config: PingConfig,
    mut cancel: Cancellation,
    reporter: &mut R,
) -> PingResult<RunSummary>
where
    T: ProbeTransport,
    F: FnOnce(AddressFamily) -> PingResult<T>,
    R: Reporter + ?Sized,
{
    config.validate()?;
    if !config.family.matches(&target) {
        return Err(PingError::InvalidConfig(format!(
            "{} is not an {} address",
            target, config.family
        )));
    }
    let mut transport = open(config.family)?;
    info!(%target, family = %config.family, "Starting probes");
    reporter.start(target, &config);

    let identifier = (std::process::id() & 0xFFFF) as u16;
    let mut stats = RunStatistics::default();
    let stop = ProbeLoop::new(config, identifier)
        .run(&mut transport, target, &mut stats, &mut cancel, reporter)
        .await;
    transport.close();

    debug!(sent = stats.sent(), received = stats.received(), ?stop, "Run finished");
    reporter.finish(&stats, &stop);
    Ok(RunSummary { stats, stop })
}
