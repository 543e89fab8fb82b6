//! Error types for echo probing.

use crate::address::AddressFamily;
use crate::codec::{DecodeError, EncodeError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PingError {
    // Setup errors
    #[error("Failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No {family} address found for {host}")]
    AddressNotFound { host: String, family: AddressFamily },

    #[error("Permission denied opening a raw {family} socket (root or CAP_NET_RAW required)")]
    Permission {
        family: AddressFamily,
        #[source]
        source: std::io::Error,
    },

    #[error("{family} is not supported on this host: {source}")]
    UnsupportedFamily {
        family: AddressFamily,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Packet errors
    #[error("Failed to encode echo request: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to decode reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unexpected ICMP message type={ty} code={code}")]
    UnexpectedMessage { ty: u8, code: u8 },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("Partial write: sent {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("Transport is closed")]
    Closed,

    #[error("No reply within {0:?}")]
    Timeout(Duration),
}

impl PingError {
    /// Returns true if the transport can no longer be used for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::PartialWrite { .. } | Self::Closed
        )
    }

    /// Maps an error raised while opening a socket onto the setup taxonomy.
    pub(crate) fn from_open(family: AddressFamily, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::Permission { family, source };
        }
        match source.raw_os_error() {
            Some(libc::EPERM) | Some(libc::EACCES) => Self::Permission { family, source },
            Some(libc::EAFNOSUPPORT) | Some(libc::EPROTONOSUPPORT) => {
                Self::UnsupportedFamily { family, source }
            }
            _ => Self::Transport(source),
        }
    }
}

impl From<std::io::Error> for PingError {
    fn from(err: std::io::Error) -> Self {
        PingError::Transport(err)
    }
}

pub type PingResult<T> = Result<T, PingError>;
