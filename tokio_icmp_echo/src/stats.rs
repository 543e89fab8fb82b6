use crate::probe::ProbeOutcome;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSummary {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
}

/// Min / max / mean of the given round-trip times, or `None` if there are none.
pub fn finalize(durations: &[Duration]) -> Option<RttSummary> {
    let first = *durations.first()?;
    let (min, max, total) = durations.iter().fold(
        (first, first, 0u128),
        |(min, max, total), d| (min.min(*d), max.max(*d), total + d.as_nanos()),
    );
    let mean = total / durations.len() as u128;
    Some(RttSummary {
        min,
        max,
        mean: Duration::from_nanos(mean as u64),
    })
}

/// Counters for one run, owned and updated by the probe loop only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    sent: u64,
    received: u64,
    durations: Vec<Duration>,
}

impl RunStatistics {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.sent += 1;
        if let ProbeOutcome::Success { elapsed, .. } = outcome {
            self.received += 1;
            self.durations.push(*elapsed);
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Round-trip times of successful probes, in completion order.
    pub fn durations(&self) -> &[Duration] {
        &self.durations
    }

    /// Share of sent probes left unanswered, in percent. Zero when nothing was sent.
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        (self.sent - self.received) as f64 * 100.0 / self.sent as f64
    }

    pub fn rtt(&self) -> Option<RttSummary> {
        finalize(&self.durations)
    }
}
