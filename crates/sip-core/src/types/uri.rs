//! # SIP URI
//!
//! [`SipUri`] models `sip:` and `sips:` URIs (RFC 3261 §19.1):
//!
//! ```text
//! sip:user:password@host:port;uri-parameters?headers
//! ```
//!
//! Components are stored unescaped and escaped again on marshal, so a
//! parsed URI printed with `Display` parses back to an equal value.
//!
//! ```rust
//! use sigstack_sip_core::parse_uri;
//!
//! let uri = parse_uri("sip:alice@sip.example.org:5061;transport=tls").unwrap();
//! assert_eq!(uri.user.as_deref(), Some("alice"));
//! assert_eq!(uri.host, "sip.example.org");
//! assert_eq!(uri.port, Some(5061));
//! assert_eq!(uri.transport(), Some("tls"));
//! assert_eq!(uri.to_string(), "sip:alice@sip.example.org:5061;transport=tls");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::generic_uri::GenericUri;
use super::param::{find_param, param_value, remove_param, set_param, Param};
use crate::error::{Error, Result};
use crate::escape::{escape, HEADER_UNRESERVED, PARAM_UNRESERVED, PASSWORD_UNRESERVED, USER_UNRESERVED};

/// Default port for `sip:` over UDP/TCP
pub const DEFAULT_SIP_PORT: u16 = 5060;
/// Default port for `sips:` or TLS
pub const DEFAULT_SIPS_PORT: u16 = 5061;

/// One `name=value` pair from the `?headers` part of a SIP URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriHeader {
    pub name: String,
    pub value: String,
}

/// A SIP or SIPS URI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SipUri {
    /// `sips:` scheme
    pub secure: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Host name or IP literal; IPv6 is stored without brackets
    pub host: String,
    pub port: Option<u16>,
    /// URI parameters, in wire order
    pub params: Vec<Param>,
    /// URI headers, in wire order, duplicates kept
    pub headers: Vec<UriHeader>,
}

impl SipUri {
    /// `sip:host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: strip_brackets(host.into()),
            ..Default::default()
        }
    }

    /// `sips:host`
    pub fn sips(host: impl Into<String>) -> Self {
        Self {
            secure: true,
            ..Self::new(host)
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "sips"
        } else {
            "sip"
        }
    }

    /// Host as written in a URI: IPv6 literals are bracketed.
    pub fn host_port_string(&self) -> String {
        let host = bracket_host(&self.host);
        match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        }
    }

    /// The port to use when contacting this URI.
    pub fn listening_port(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            let tls = self.transport().map_or(false, |t| t.eq_ignore_ascii_case("tls"));
            if self.secure || tls {
                DEFAULT_SIPS_PORT
            } else {
                DEFAULT_SIP_PORT
            }
        })
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        find_param(&self.params, name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        param_value(&self.params, name)
    }

    pub fn set_param(&mut self, name: &str, value: Option<&str>) {
        set_param(&mut self.params, name, value.map(str::to_string));
    }

    pub fn remove_param(&mut self, name: &str) -> bool {
        remove_param(&mut self.params, name)
    }

    pub fn transport(&self) -> Option<&str> {
        self.param_value("transport")
    }

    pub fn set_transport(&mut self, transport: Option<&str>) {
        self.set_or_remove("transport", transport);
    }

    /// The `user=` parameter (e.g. `phone`)
    pub fn user_param(&self) -> Option<&str> {
        self.param_value("user")
    }

    pub fn set_user_param(&mut self, user: Option<&str>) {
        self.set_or_remove("user", user);
    }

    pub fn method_param(&self) -> Option<&str> {
        self.param_value("method")
    }

    pub fn set_method_param(&mut self, method: Option<&str>) {
        self.set_or_remove("method", method);
    }

    pub fn maddr(&self) -> Option<&str> {
        self.param_value("maddr")
    }

    pub fn set_maddr(&mut self, maddr: Option<&str>) {
        self.set_or_remove("maddr", maddr);
    }

    /// The `ttl` parameter; -1 when absent or not a number.
    pub fn ttl(&self) -> i32 {
        self.param_value("ttl")
            .and_then(|v| v.parse().ok())
            .unwrap_or(-1)
    }

    /// A negative ttl removes the parameter.
    pub fn set_ttl(&mut self, ttl: i32) {
        if ttl < 0 {
            self.remove_param("ttl");
        } else {
            self.set_param("ttl", Some(&ttl.to_string()));
        }
    }

    pub fn lr(&self) -> bool {
        self.has_param("lr")
    }

    pub fn set_lr(&mut self, lr: bool) {
        if lr {
            self.set_param("lr", None);
        } else {
            self.remove_param("lr");
        }
    }

    fn set_or_remove(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => self.set_param(name, Some(value)),
            None => {
                self.remove_param(name);
            }
        }
    }

    /// Appends a `?name=value` header. Existing headers of the same name are kept.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(UriHeader {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn headers(&self) -> &[UriHeader] {
        &self.headers
    }

    /// Copy without parameters or headers.
    pub fn without_params(&self) -> Self {
        Self {
            params: Vec::new(),
            headers: Vec::new(),
            ..self.clone()
        }
    }
}

pub(crate) fn strip_brackets(host: String) -> String {
    match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(inner) => inner.to_string(),
        None => host,
    }
}

pub(crate) fn bracket_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme())?;
        if let Some(user) = &self.user {
            f.write_str(&escape(user, USER_UNRESERVED))?;
            if let Some(password) = &self.password {
                write!(f, ":{}", escape(password, PASSWORD_UNRESERVED))?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.host_port_string())?;

        for param in &self.params {
            write!(f, ";{}", escape(&param.name, PARAM_UNRESERVED))?;
            if let Some(value) = &param.value {
                write!(f, "={}", escape(value, PARAM_UNRESERVED))?;
            }
        }

        for (i, header) in self.headers.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(
                f,
                "{}{}={}",
                sep,
                escape(&header.name, HEADER_UNRESERVED),
                escape(&header.value, HEADER_UNRESERVED)
            )?;
        }
        Ok(())
    }
}

/// RFC 3261 §19.1.4 comparison.
///
/// User and password compare case-sensitively, the host case-insensitively.
/// `user`, `ttl`, `method`, `maddr` and `transport` must agree when either
/// side has them; other parameters only when both sides have them. Headers
/// must match as a set.
impl PartialEq for SipUri {
    fn eq(&self, other: &Self) -> bool {
        const STRICT: [&str; 5] = ["user", "ttl", "method", "maddr", "transport"];

        if self.secure != other.secure
            || self.user != other.user
            || self.password != other.password
            || !self.host.eq_ignore_ascii_case(&other.host)
            || self.port != other.port
        {
            return false;
        }

        for name in STRICT {
            let ours = self.param(name).map(|p| p.value.as_deref());
            let theirs = other.param(name).map(|p| p.value.as_deref());
            let same = match (ours, theirs) {
                (None, None) => true,
                (Some(a), Some(b)) => eq_ignore_case_opt(a, b),
                _ => false,
            };
            if !same {
                return false;
            }
        }

        for ours in &self.params {
            if let Some(theirs) = other.param(&ours.name) {
                if !eq_ignore_case_opt(ours.value.as_deref(), theirs.value.as_deref()) {
                    return false;
                }
            }
        }

        let contains_all = |a: &[UriHeader], b: &[UriHeader]| {
            a.iter().all(|h| {
                b.iter()
                    .any(|o| o.name.eq_ignore_ascii_case(&h.name) && o.value == h.value)
            })
        };
        contains_all(&self.headers, &other.headers) && contains_all(&other.headers, &self.headers)
    }
}

fn eq_ignore_case_opt(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl FromStr for SipUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        crate::parser::parse_uri(s).ok_or_else(|| Error::InvalidUri(s.to_string()))
    }
}

/// Any URI that may appear as a Request-URI or in an address header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Uri {
    Sip(SipUri),
    Generic(GenericUri),
}

impl Uri {
    pub fn as_sip(&self) -> Option<&SipUri> {
        match self {
            Uri::Sip(uri) => Some(uri),
            Uri::Generic(_) => None,
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            Uri::Sip(uri) => uri.scheme(),
            Uri::Generic(uri) => &uri.scheme,
        }
    }

    /// Host, if the URI has one
    pub fn host(&self) -> Option<&str> {
        match self {
            Uri::Sip(uri) => Some(&uri.host),
            Uri::Generic(uri) => uri.host.as_deref(),
        }
    }
}

impl From<SipUri> for Uri {
    fn from(uri: SipUri) -> Self {
        Uri::Sip(uri)
    }
}

impl From<GenericUri> for Uri {
    fn from(uri: GenericUri) -> Self {
        Uri::Generic(uri)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uri::Sip(uri) => uri.fmt(f),
            Uri::Generic(uri) => uri.fmt(f),
        }
    }
}

impl FromStr for Uri {
    type Err = Error;

    /// SIP and SIPS URIs parse as [`Uri::Sip`], anything else as [`Uri::Generic`].
    fn from_str(s: &str) -> Result<Self> {
        if let Some(uri) = crate::parser::parse_uri(s) {
            return Ok(Uri::Sip(uri));
        }
        crate::parser::parse_generic_uri(s)
            .map(Uri::Generic)
            .ok_or_else(|| Error::InvalidUri(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_defaults_to_minus_one() {
        let mut uri = SipUri::new("example.com");
        assert_eq!(uri.ttl(), -1);
        uri.set_ttl(16);
        assert_eq!(uri.ttl(), 16);
        assert_eq!(uri.to_string(), "sip:example.com;ttl=16");
        uri.set_ttl(-1);
        assert!(!uri.has_param("ttl"));
    }

    #[test]
    fn test_params_are_independent() {
        let mut uri = SipUri::new("example.com");
        uri.set_transport(Some("tcp"));
        uri.set_lr(true);
        uri.set_maddr(Some("239.255.255.1"));
        uri.set_transport(None);
        assert!(uri.lr());
        assert_eq!(uri.maddr(), Some("239.255.255.1"));
        assert_eq!(uri.transport(), None);
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let uri = SipUri::new("[2001:db8::1]").with_port(5070);
        assert_eq!(uri.host, "2001:db8::1");
        assert_eq!(uri.to_string(), "sip:[2001:db8::1]:5070");
    }

    #[test]
    fn test_listening_port() {
        assert_eq!(SipUri::new("a.example").listening_port(), 5060);
        assert_eq!(SipUri::sips("a.example").listening_port(), 5061);
        let tls = SipUri::new("a.example").with_param("transport", Some("TLS"));
        assert_eq!(tls.listening_port(), 5061);
        assert_eq!(SipUri::new("a.example").with_port(7000).listening_port(), 7000);
    }

    #[test]
    fn test_equality_rules() {
        let a = SipUri::new("EXAMPLE.com").with_user("alice");
        let b = SipUri::new("example.COM").with_user("alice");
        assert_eq!(a, b);

        // user part is case-sensitive
        assert_ne!(a, SipUri::new("example.com").with_user("Alice"));

        // explicit default port is not the same as no port
        assert_ne!(a, b.clone().with_port(5060));

        // a strict parameter on one side only
        assert_ne!(a, b.clone().with_param("transport", Some("tcp")));

        // other parameters only matter when both carry them
        let c = a.clone().with_param("foo", Some("1"));
        assert_eq!(c, b);
        assert_ne!(c, b.clone().with_param("foo", Some("2")));

        let mut d = a.clone();
        d.add_header("subject", "hi");
        assert_ne!(d, a);
    }

    #[test]
    fn test_escaped_user_marshal() {
        let uri = SipUri::new("example.com").with_user("john doe").with_password("p@ss");
        assert_eq!(uri.to_string(), "sip:john%20doe:p%40ss@example.com");
    }
}
