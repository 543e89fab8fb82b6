//! Console output of a run: one line per probe and a closing summary.

use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio_icmp_echo::{PingConfig, ProbeOutcome, Reporter, RunStatistics, StopReason};

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_rtt(d: Duration) -> String {
    format!("{:.3} ms", millis(d))
}

/// The line printed for one probe, or `None` for outcomes reported on stderr.
pub fn probe_line(sequence: u64, outcome: &ProbeOutcome) -> Option<String> {
    match outcome {
        ProbeOutcome::Success { elapsed, reply } => {
            let ttl = reply
                .ttl
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            Some(format!(
                "{} bytes from {}: icmp_seq={} ttl={} time={}",
                reply.bytes,
                reply.source,
                sequence,
                ttl,
                format_rtt(*elapsed)
            ))
        }
        ProbeOutcome::TimeExceeded { from, .. } => Some(format!(
            "From {} icmp_seq={} Time to live exceeded",
            from, sequence
        )),
        ProbeOutcome::Timeout => Some(format!("Request timeout for icmp_seq {}", sequence)),
        ProbeOutcome::ProtocolError(e) => Some(format!("icmp_seq={} {}", sequence, e)),
        ProbeOutcome::TransportError(_) => None,
    }
}

pub fn summary_text(host: &str, stats: &RunStatistics) -> String {
    let mut text = format!(
        "--- {} ping statistics ---\n\
         {} packets transmitted, {} packets received, {:.1}% packet loss",
        host,
        stats.sent(),
        stats.received(),
        stats.loss_percent()
    );
    if let Some(rtt) = stats.rtt() {
        text.push_str(&format!(
            "\nrtt min/max/avg: {} / {} / {}",
            format_rtt(rtt.min),
            format_rtt(rtt.max),
            format_rtt(rtt.mean)
        ));
    }
    text
}

#[derive(Debug, Serialize)]
pub struct RttMillis {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Serialize)]
pub struct JsonSummary<'a> {
    pub host: &'a str,
    pub address: Option<IpAddr>,
    pub sent: u64,
    pub received: u64,
    pub loss_percent: f64,
    pub rtt_ms: Option<RttMillis>,
}

impl<'a> JsonSummary<'a> {
    pub fn new(host: &'a str, address: Option<IpAddr>, stats: &RunStatistics) -> Self {
        Self {
            host,
            address,
            sent: stats.sent(),
            received: stats.received(),
            loss_percent: stats.loss_percent(),
            rtt_ms: stats.rtt().map(|rtt| RttMillis {
                min: millis(rtt.min),
                max: millis(rtt.max),
                avg: millis(rtt.mean),
            }),
        }
    }
}

pub struct ConsoleReporter {
    host: String,
    address: Option<IpAddr>,
    json: bool,
}

impl ConsoleReporter {
    pub fn new(host: String, json: bool) -> Self {
        Self {
            host,
            address: None,
            json,
        }
    }
}

impl Reporter for ConsoleReporter {
    fn start(&mut self, target: IpAddr, config: &PingConfig) {
        self.address = Some(target);
        if !self.json {
            println!(
                "PING {} ({}): {} data bytes",
                self.host, target, config.payload_size
            );
        }
    }

    fn probe(&mut self, sequence: u64, outcome: &ProbeOutcome) {
        if let ProbeOutcome::TransportError(e) = outcome {
            eprintln!("ping: icmp_seq={} {}", sequence, e);
            return;
        }
        if self.json {
            return;
        }
        if let Some(line) = probe_line(sequence, outcome) {
            println!("{}", line);
        }
    }

    fn finish(&mut self, stats: &RunStatistics, _stop: &StopReason) {
        if self.json {
            match serde_json::to_string_pretty(&JsonSummary::new(&self.host, self.address, stats)) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to serialize statistics: {}", e),
            }
        } else {
            println!();
            println!("{}", summary_text(&self.host, stats));
        }
    }
}
