use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// A proxy's wire protocol. The canonical string form is always uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Socks4 => "SOCKS4",
            Protocol::Socks5 => "SOCKS5",
        }
    }

    /// Parses a protocol tag case-insensitively. `"http"`, `"HTTP"`, and
    /// `"Http"` are all accepted.
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        match raw.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Protocol::Http),
            "HTTPS" => Ok(Protocol::Https),
            "SOCKS4" => Ok(Protocol::Socks4),
            "SOCKS5" => Ok(Protocol::Socks5),
            other => Err(ProxyError::UnknownProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical, stable identity of a proxy: `PROTO://HOST:PORT`,
/// uppercased. Equality is byte-identical on this string, matching
/// spec's "case-preserving strings; equality is byte-identical" rule
/// once both sides have gone through [`ProxyRecord::new`]'s
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyKey(String);

impl ProxyKey {
    fn new(protocol: Protocol, host: &str, port: u16) -> Self {
        ProxyKey(format!("{protocol}://{}:{port}", host.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ProxyKey> for String {
    fn from(key: ProxyKey) -> Self {
        key.0
    }
}

/// Immutable-by-convention description of one upstream proxy endpoint.
/// `resp_time`/`geo`/`anon_level` are the only fields a caller should
/// ever see change across re-registrations; identity is the
/// `(protocol, host, port)` triple captured by [`ProxyRecord::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Non-negative seconds; `0.0` means "unknown".
    pub resp_time: f64,
    pub geo: Option<String>,
    pub anon_level: Option<String>,
}

impl ProxyRecord {
    pub fn new(
        protocol: Protocol,
        host: impl AsRef<str>,
        port: u16,
        resp_time: f64,
        geo: Option<String>,
        anon_level: Option<String>,
    ) -> Self {
        Self {
            protocol,
            host: host.as_ref().to_ascii_uppercase(),
            port,
            resp_time: resp_time.max(0.0),
            geo: geo.map(|g| g.to_ascii_uppercase()),
            anon_level: anon_level.map(|a| a.to_ascii_uppercase()),
        }
    }

    pub fn key(&self) -> ProxyKey {
        ProxyKey::new(self.protocol, &self.host, self.port)
    }

    /// Validating constructor for untrusted input (the REST adapter's
    /// `port` comes in as a freely-typed integer). Rejects `port == 0`,
    /// matching spec's `1..65535` range.
    pub fn try_new(
        protocol: Protocol,
        host: impl AsRef<str>,
        port: i64,
        resp_time: f64,
        geo: Option<String>,
        anon_level: Option<String>,
    ) -> Result<Self, ProxyError> {
        if !(1..=65535).contains(&port) {
            return Err(ProxyError::InvalidPort(port));
        }
        Ok(Self::new(
            protocol,
            host,
            port as u16,
            resp_time,
            geo,
            anon_level,
        ))
    }

    /// The property tags this record contributes to a
    /// [`crate::domain_monitor::DomainMonitor`]'s inverted index:
    /// `geo` and `anon_level`, when present.
    pub fn property_tags(&self) -> impl Iterator<Item = &str> {
        self.geo
            .iter()
            .chain(self.anon_level.iter())
            .map(|s| s.as_str())
    }
}
