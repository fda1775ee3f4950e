//! Collector bindings for `SIP-message` and the typed headers.

use sigstack_abnf_core::{Collector, Parser};
use tracing::warn;

use super::uri::{register_generic_uri, register_sip_uri};
use crate::types::header::canonical_name;
use crate::types::param::Param;
use crate::types::uri::strip_brackets;
use crate::types::{Address, CSeq, GenericUri, Header, Method, SipUri, StatusCode, Uri, Via};

/// Start line and headers, as collected from the grammar. The body is
/// attached afterwards from Content-Length.
#[derive(Debug, Default)]
pub(crate) struct MessageHead {
    pub(crate) method: Option<Method>,
    pub(crate) uri: Option<Uri>,
    pub(crate) status: Option<u16>,
    pub(crate) reason: String,
    pub(crate) headers: Vec<Header>,
}

/// A From or To value before it is known to have a URI.
#[derive(Debug, Default)]
struct AddressParts {
    display_name: Option<String>,
    uri: Option<Uri>,
    params: Vec<Param>,
}

impl AddressParts {
    fn into_address(self) -> Option<Address> {
        Some(Address {
            display_name: self.display_name,
            uri: self.uri?,
            params: self.params,
        })
    }
}

/// `token [ EQUAL gen-value ]`, whitespace around `=` removed. Quoted
/// values keep their quotes.
fn generic_param(text: &str) -> Param {
    match text.split_once('=') {
        Some((name, value)) => Param {
            name: name.trim().to_string(),
            value: Some(value.trim().to_string()),
        },
        None => Param {
            name: text.trim().to_string(),
            value: None,
        },
    }
}

/// Strips the quotes and `\` escapes of a quoted display name, or trims a
/// token list.
fn display_name(text: &str) -> String {
    let text = text.trim();
    let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) else {
        return text.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `host [ ":" port ]` with optional whitespace around the colon.
fn sent_by(via: &mut Via, text: &str) {
    let text = text.trim();
    let (host, port) = if let Some(rest) = text.strip_prefix('[') {
        match rest.split_once(']') {
            Some((host, tail)) => (host.to_string(), tail.trim().strip_prefix(':')),
            None => (text.to_string(), None),
        }
    } else {
        match text.split_once(':') {
            Some((host, port)) => (host.trim().to_string(), Some(port)),
            None => (text.to_string(), None),
        }
    };
    via.host = strip_brackets(host);
    via.port = port.and_then(|p| p.trim().parse().ok());
}

fn cseq(text: &str) -> Option<CSeq> {
    let mut parts = text.split_whitespace();
    let seq = parts.next()?.parse().ok()?;
    let method = parts.next()?.parse().ok()?;
    Some(CSeq { seq, method })
}

fn count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn register_via(parser: &mut Parser) {
    parser
        .set_handler("via-parm", Via::default)
        .set_collector("protocol-name", Collector::string(|v: &mut Via, s| v.protocol_name = s.to_string()))
        .set_collector(
            "protocol-version",
            Collector::string(|v: &mut Via, s| v.protocol_version = s.to_string()),
        )
        .set_collector("transport", Collector::string(|v: &mut Via, s| v.transport = s.to_string()))
        .set_collector("sent-by", Collector::string(|v: &mut Via, s| sent_by(v, s)))
        .set_collector("via-params", Collector::string(|v: &mut Via, s| v.params.push(generic_param(s))));
}

fn register_address(parser: &mut Parser, rule: &str) {
    parser
        .set_handler(rule, AddressParts::default)
        .set_collector(
            "display-name",
            Collector::string(|a: &mut AddressParts, s| a.display_name = Some(display_name(s))),
        )
        .set_collector("SIP-URI", Collector::child(|a: &mut AddressParts, uri: SipUri| a.uri = Some(Uri::Sip(uri))))
        .set_collector(
            "SIP-URI-noparams",
            Collector::child(|a: &mut AddressParts, uri: SipUri| a.uri = Some(Uri::Sip(uri))),
        )
        .set_collector(
            "absoluteURI",
            Collector::child(|a: &mut AddressParts, uri: GenericUri| a.uri = Some(Uri::Generic(uri))),
        )
        .set_collector(
            "generic-param",
            Collector::string(|a: &mut AddressParts, s| a.params.push(generic_param(s))),
        );
}

/// Adds `header` built from an address, or logs why it was dropped.
fn push_address(head: &mut MessageHead, parts: AddressParts, to: bool) {
    match parts.into_address() {
        Some(address) if to => head.headers.push(Header::To(address)),
        Some(address) => head.headers.push(Header::From(address)),
        None => {
            let header = if to { "To" } else { "From" };
            warn!(header, "Dropping address header without URI");
        }
    }
}

/// Builds the parser that turns `SIP-message` matches into [`MessageHead`]s.
pub(crate) fn register_message(parser: &mut Parser) {
    register_sip_uri(parser, "SIP-URI");
    register_sip_uri(parser, "SIP-URI-noparams");
    register_generic_uri(parser);
    register_via(parser);
    register_address(parser, "from-spec");
    register_address(parser, "to-spec");

    parser
        .set_handler("SIP-message", MessageHead::default)
        .set_collector(
            "Method",
            Collector::string(|m: &mut MessageHead, s| m.method = s.parse().ok()),
        )
        .set_collector(
            "SIP-URI",
            Collector::child(|m: &mut MessageHead, uri: SipUri| m.uri = Some(Uri::Sip(uri))),
        )
        .set_collector(
            "absoluteURI",
            Collector::child(|m: &mut MessageHead, uri: GenericUri| m.uri = Some(Uri::Generic(uri))),
        )
        .set_collector(
            "Status-Code",
            Collector::int(|m: &mut MessageHead, v| m.status = u16::try_from(v).ok()),
        )
        .set_collector("Reason-Phrase", Collector::string(|m: &mut MessageHead, s| m.reason = s.to_string()))
        .set_collector("via-parm", Collector::child(|m: &mut MessageHead, via: Via| m.headers.push(Header::Via(via))))
        .set_collector(
            "from-spec",
            Collector::child(|m: &mut MessageHead, parts: AddressParts| push_address(m, parts, false)),
        )
        .set_collector(
            "to-spec",
            Collector::child(|m: &mut MessageHead, parts: AddressParts| push_address(m, parts, true)),
        )
        .set_collector(
            "callid",
            Collector::string(|m: &mut MessageHead, s| m.headers.push(Header::CallId(s.to_string()))),
        )
        .set_collector(
            "cseq-value",
            Collector::string(|m: &mut MessageHead, s| match cseq(s) {
                Some(value) => m.headers.push(Header::CSeq(value)),
                None => warn!(value = %s, "Dropping malformed CSeq"),
            }),
        )
        .set_collector(
            "content-length-value",
            Collector::int(|m: &mut MessageHead, v| m.headers.push(Header::ContentLength(count(v)))),
        )
        .set_collector(
            "max-forwards-value",
            Collector::int(|m: &mut MessageHead, v| m.headers.push(Header::MaxForwards(count(v)))),
        )
        .set_collector(
            "extension-header",
            Collector::string(|m: &mut MessageHead, s| {
                let Some((name, value)) = s.split_once(':') else {
                    return;
                };
                let name = name.trim();
                if let Some(known) = canonical_name(name) {
                    warn!(header = %known, value = %value.trim(), "Dropping header with malformed value");
                    return;
                }
                m.headers.push(Header::extension(name, value.trim()));
            }),
        );
}

impl MessageHead {
    pub(crate) fn is_response(&self) -> bool {
        self.status.is_some()
    }

    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.status.map(StatusCode)
    }
}
