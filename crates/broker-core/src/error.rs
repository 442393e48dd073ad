use thiserror::Error;

use crate::proxy::ProxyKey;

/// Errors raised while parsing or constructing a [`crate::proxy::ProxyRecord`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProxyError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("port must be in 1..=65535, got {0}")]
    InvalidPort(i64),
}

/// Errors raised by [`crate::domain_monitor::DomainMonitor`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// Delisting a proxy the monitor never registered (or already delisted)
    /// is a caller bug, not a recoverable condition.
    #[error("cannot delist unknown proxy key: {0}")]
    UnknownKey(ProxyKey),
}
