//! ICMP echo ("ping") engine on top of tokio.
//!
//! A run resolves one target, opens one raw transport, then sends Echo
//! Requests one at a time at a fixed interval, pairing each with its reply
//! and accumulating round-trip statistics until the requested count is
//! reached or the run is cancelled.

pub mod address;
pub mod codec;
pub mod config;
pub mod error;
pub mod probe;
pub mod session;
pub mod stats;
pub mod transport;

pub use address::AddressFamily;
pub use config::PingConfig;
pub use error::{PingError, PingResult};
pub use probe::{EchoProbe, ProbeConfig, ProbeOutcome, ReplyMetadata};
pub use session::{
    cancellation, CancelHandle, Cancellation, ProbeLoop, Reporter, RunSummary, StopReason,
};
pub use stats::{RttSummary, RunStatistics};
pub use transport::{Datagram, ProbeTransport};
