//! Datagram transport seam between the probe engine and the network.

#[cfg(unix)]
pub mod raw;

use crate::address::AddressFamily;
use crate::error::PingResult;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

#[cfg(unix)]
pub use raw::RawTransport;

/// One received ICMP message, starting at the ICMP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub source: IpAddr,
    /// TTL / hop limit the message arrived with, when the platform reports it.
    pub ttl: Option<u8>,
}

/// An open endpoint able to carry ICMP messages of a single address family.
///
/// Implementations are opened once per run and reused for every probe.
#[async_trait]
pub trait ProbeTransport: Send {
    fn family(&self) -> AddressFamily;

    /// Sets the TTL (IPv4) or unicast hop limit (IPv6) of outgoing datagrams.
    ///
    /// Best effort: some platforms ignore it for IPv6.
    fn set_time_to_live(&mut self, hops: u8) -> PingResult<()>;

    /// Sends the whole buffer as one datagram. A short write is an error.
    async fn send(&mut self, packet: &[u8], destination: IpAddr) -> PingResult<usize>;

    /// Waits up to `timeout` for the next datagram.
    ///
    /// Returns `Err(PingError::Timeout)` if nothing arrived in time.
    async fn receive(&mut self, timeout: Duration) -> PingResult<Datagram>;

    /// Releases the endpoint. Calling it more than once is a no-op.
    fn close(&mut self);
}
