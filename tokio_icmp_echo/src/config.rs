use crate::address::AddressFamily;
use crate::codec;
use crate::error::{PingError, PingResult};
use crate::probe::ProbeConfig;
use std::time::Duration;

pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
pub const DEFAULT_TTL: u8 = 64;
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingConfig {
    pub family: AddressFamily,
    pub payload_size: usize,
    pub ttl: u8,
    /// How long to wait for each reply.
    pub wait: Duration,
    /// Pause before each probe.
    pub interval: Duration,
    /// Stop after this many probes. `None` runs until cancelled.
    pub count: Option<u64>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            family: AddressFamily::V4,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            ttl: DEFAULT_TTL,
            wait: DEFAULT_WAIT,
            interval: DEFAULT_INTERVAL,
            count: None,
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> PingResult<()> {
        let max = codec::max_payload(self.family);
        if self.payload_size > max {
            return Err(PingError::InvalidConfig(format!(
                "packet size {} exceeds the {} maximum of {}",
                self.payload_size, self.family, max
            )));
        }
        if self.ttl == 0 {
            return Err(PingError::InvalidConfig("ttl must be at least 1".into()));
        }
        if self.wait.is_zero() {
            return Err(PingError::InvalidConfig("wait must be positive".into()));
        }
        Ok(())
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            family: self.family,
            payload_size: self.payload_size,
            ttl: self.ttl,
            wait: self.wait,
        }
    }

    pub fn count_reached(&self, sent: u64) -> bool {
        matches!(self.count, Some(count) if sent >= count)
    }
}
