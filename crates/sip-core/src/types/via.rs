//! # SIP Via Header
//!
//! One Via value (RFC 3261 §20.42). A header line with comma-separated
//! values is parsed into one [`Via`] per value, topmost first.
//!
//! ```text
//! Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bK776asdhds;rport
//! ```
//!
//! Parameters of interest:
//!
//! - `branch`: transaction identifier, `z9hG4bK`-prefixed per RFC 3261
//! - `received`: source address seen by the next hop
//! - `rport`: symmetric response port (RFC 3581)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::param::{param_value, find_param, remove_param, set_param, write_params, Param};
use super::uri::{bracket_host, strip_brackets, DEFAULT_SIPS_PORT, DEFAULT_SIP_PORT};

/// RFC 3261 branch magic cookie
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// A single Via value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    pub protocol_name: String,
    pub protocol_version: String,
    pub transport: String,
    /// sent-by host, IPv6 without brackets
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Default for Via {
    fn default() -> Self {
        Self {
            protocol_name: "SIP".into(),
            protocol_version: "2.0".into(),
            transport: "UDP".into(),
            host: String::new(),
            port: None,
            params: Vec::new(),
        }
    }
}

impl Via {
    /// `SIP/2.0/<transport> host[:port]`
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            transport: transport.into(),
            host: strip_brackets(host.into()),
            port,
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.set_branch(branch);
        self
    }

    pub fn branch(&self) -> Option<&str> {
        param_value(&self.params, "branch")
    }

    pub fn set_branch(&mut self, branch: impl Into<String>) {
        set_param(&mut self.params, "branch", Some(branch.into()));
    }

    /// True if the branch carries the RFC 3261 magic cookie.
    pub fn has_rfc3261_branch(&self) -> bool {
        self.branch().map_or(false, |b| b.starts_with(BRANCH_MAGIC_COOKIE))
    }

    pub fn received(&self) -> Option<&str> {
        param_value(&self.params, "received")
    }

    pub fn set_received(&mut self, received: impl Into<String>) {
        set_param(&mut self.params, "received", Some(received.into()));
    }

    /// Whether an `rport` parameter is present, with or without value.
    pub fn has_rport(&self) -> bool {
        find_param(&self.params, "rport").is_some()
    }

    /// The numeric `rport` value, if filled in.
    pub fn rport(&self) -> Option<u16> {
        param_value(&self.params, "rport").and_then(|v| v.parse().ok())
    }

    /// `None` writes an empty `rport` flag requesting symmetric response routing.
    pub fn set_rport(&mut self, port: Option<u16>) {
        set_param(&mut self.params, "rport", port.map(|p| p.to_string()));
    }

    pub fn remove_param(&mut self, name: &str) -> bool {
        remove_param(&mut self.params, name)
    }

    pub fn is_reliable_transport(&self) -> bool {
        !self.transport.eq_ignore_ascii_case("UDP")
    }

    /// sent-by port, with the transport's default applied.
    pub fn sent_by_port(&self) -> u16 {
        self.port.unwrap_or(if self.transport.eq_ignore_ascii_case("TLS") {
            DEFAULT_SIPS_PORT
        } else {
            DEFAULT_SIP_PORT
        })
    }

    /// Where a response to the request carrying this Via goes
    /// (RFC 3261 §18.2.2, RFC 3581 §4): `received` overrides the host and
    /// a filled-in `rport` overrides the port.
    pub fn response_target(&self) -> (String, u16) {
        let host = self.received().unwrap_or(&self.host).to_string();
        let port = self.rport().unwrap_or_else(|| self.sent_by_port());
        (host, port)
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {}",
            self.protocol_name,
            self.protocol_version,
            self.transport,
            bracket_host(&self.host)
        )?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write_params(f, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_via_display() {
        let mut via = Via::new("UDP", "pc33.atlanta.com", Some(5060)).with_branch("z9hG4bK776asdhds");
        via.set_rport(None);
        assert_eq!(via.to_string(), "SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bK776asdhds;rport");
        assert!(via.has_rfc3261_branch());
        assert!(via.has_rport());
        assert_eq!(via.rport(), None);
    }

    #[test]
    fn test_response_target() {
        let mut via = Via::new("UDP", "client.example.com", None);
        assert_eq!(via.response_target(), ("client.example.com".to_string(), 5060));

        via.set_received("192.0.2.4");
        via.set_rport(Some(40000));
        assert_eq!(via.response_target(), ("192.0.2.4".to_string(), 40000));

        let tls = Via::new("TLS", "client.example.com", None);
        assert_eq!(tls.response_target().1, 5061);
    }
}
