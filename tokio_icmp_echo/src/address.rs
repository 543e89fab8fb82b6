use crate::error::{PingError, PingResult};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    pub fn matches(&self, addr: &IpAddr) -> bool {
        Self::of(addr) == *self
    }

    pub fn from_number(n: u8) -> Result<Self, String> {
        match n {
            4 => Ok(Self::V4),
            6 => Ok(Self::V6),
            _ => Err(format!("unknown address family {} (expected 4 or 6)", n)),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// Picks the first candidate of the requested family.
pub fn select<I>(host: &str, candidates: I, family: AddressFamily) -> PingResult<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    candidates
        .into_iter()
        .find(|addr| family.matches(addr))
        .ok_or_else(|| PingError::AddressNotFound {
            host: host.to_string(),
            family,
        })
}

/// Resolves `host` with the system resolver, then selects an address of `family`.
pub async fn resolve(host: &str, family: AddressFamily) -> PingResult<IpAddr> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return select(host, [addr], family);
    }
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| PingError::Resolution {
            host: host.to_string(),
            source,
        })?;
    select(host, addrs.map(|a| a.ip()), family)
}
