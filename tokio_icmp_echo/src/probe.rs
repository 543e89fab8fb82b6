use crate::address::AddressFamily;
use crate::codec::{self, EchoReply, EchoRequest, ReplyKind};
use crate::error::PingError;
use crate::transport::{Datagram, ProbeTransport};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub family: AddressFamily,
    pub payload_size: usize,
    pub ttl: u8,
    pub wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMetadata {
    pub source: IpAddr,
    /// Length of the ICMP message, header included.
    pub bytes: usize,
    pub sequence: u16,
    pub ttl: Option<u8>,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Success {
        elapsed: Duration,
        reply: ReplyMetadata,
    },
    /// A router on the path dropped the request.
    TimeExceeded { elapsed: Duration, from: IpAddr },
    Timeout,
    TransportError(PingError),
    ProtocolError(PingError),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Success { elapsed, .. } | Self::TimeExceeded { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }
}

/// Sends one Echo Request at a time and waits for the reply that answers it.
pub struct EchoProbe {
    identifier: u16,
    config: ProbeConfig,
    applied_ttl: Option<u8>,
}

impl EchoProbe {
    pub fn new(identifier: u16, config: ProbeConfig) -> Self {
        Self {
            identifier,
            config,
            applied_ttl: None,
        }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn probe<T>(
        &mut self,
        transport: &mut T,
        target: IpAddr,
        sequence: u16,
    ) -> ProbeOutcome
    where
        T: ProbeTransport + ?Sized,
    {
        let request = match EchoRequest::new(
            self.config.family,
            self.identifier,
            sequence,
            self.config.payload_size,
        ) {
            Ok(request) => request,
            Err(e) => return ProbeOutcome::ProtocolError(e.into()),
        };
        self.apply_ttl(transport);

        let packet = request.to_bytes();
        let start = Instant::now();
        if let Err(e) = transport.send(&packet, target).await {
            return ProbeOutcome::TransportError(e);
        }
        trace!(%target, sequence, bytes = packet.len(), "Sent echo request");

        let deadline = start + self.config.wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ProbeOutcome::Timeout;
            }
            let datagram = match transport.receive(remaining).await {
                Ok(datagram) => datagram,
                Err(PingError::Timeout(_)) => return ProbeOutcome::Timeout,
                Err(e) if e.is_fatal() => return ProbeOutcome::TransportError(e),
                Err(e) => return ProbeOutcome::ProtocolError(e),
            };
            let elapsed = start.elapsed();

            let reply = match codec::decode(&datagram.bytes, self.config.family) {
                Ok(reply) => reply,
                Err(e) => return ProbeOutcome::ProtocolError(e.into()),
            };
            if let Some(outcome) = self.classify(&request, &datagram, &reply, elapsed) {
                return outcome;
            }
        }
    }

    fn apply_ttl<T>(&mut self, transport: &mut T)
    where
        T: ProbeTransport + ?Sized,
    {
        let ttl = self.config.ttl;
        if self.applied_ttl == Some(ttl) {
            return;
        }
        if let Err(e) = transport.set_time_to_live(ttl) {
            warn!(ttl, error = %e, "Failed to set TTL, using the system default");
        }
        self.applied_ttl = Some(ttl);
    }

    // Returns None for messages that don't answer this request.
    fn classify(
        &self,
        request: &EchoRequest,
        datagram: &Datagram,
        reply: &EchoReply,
        elapsed: Duration,
    ) -> Option<ProbeOutcome> {
        let ours = request.id();
        match reply.kind {
            ReplyKind::EchoReply => match reply.echo {
                Some(id) if id == ours => Some(ProbeOutcome::Success {
                    elapsed,
                    reply: ReplyMetadata {
                        source: datagram.source,
                        bytes: datagram.bytes.len(),
                        sequence: id.sequence,
                        ttl: datagram.ttl,
                    },
                }),
                Some(id) if id.identifier == ours.identifier => {
                    debug!(
                        expected = ours.sequence,
                        got = id.sequence,
                        "Discarding late or duplicate reply"
                    );
                    None
                }
                _ => None,
            },
            ReplyKind::EchoRequest => None,
            ReplyKind::TimeExceeded => match reply.echo {
                Some(id) if id == ours => Some(ProbeOutcome::TimeExceeded {
                    elapsed,
                    from: datagram.source,
                }),
                _ => {
                    debug!(
                        source = %datagram.source,
                        "Ignoring time exceeded for another sender"
                    );
                    None
                }
            },
            ReplyKind::Other(ty) => match reply.echo {
                Some(id) if id == ours => Some(ProbeOutcome::ProtocolError(
                    PingError::UnexpectedMessage {
                        ty,
                        code: reply.code,
                    },
                )),
                // Errors quoting anything but our request belong to other traffic.
                _ if codec::is_error_type(self.config.family, ty) => {
                    debug!(
                        ty,
                        code = reply.code,
                        source = %datagram.source,
                        "Ignoring foreign ICMP error"
                    );
                    None
                }
                _ => {
                    trace!(ty, source = %datagram.source, "Ignoring informational message");
                    None
                }
            },
        }
    }
}
