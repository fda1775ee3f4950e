//! Collector bindings for `SIP-URI` and `absoluteURI`.

use sigstack_abnf_core::{Collector, Parser};

use crate::escape::unescape;
use crate::types::param::Param;
use crate::types::uri::{strip_brackets, UriHeader};
use crate::types::{GenericUri, SipUri};

/// Splits `name[=value]`, unescaping both halves.
fn split_escaped(text: &str) -> (String, Option<String>) {
    match text.split_once('=') {
        Some((name, value)) => (unescape(name), Some(unescape(value))),
        None => (unescape(text), None),
    }
}

fn port(value: i64) -> Option<u16> {
    u16::try_from(value).ok()
}

/// Installs the [`SipUri`] handler on `rule` (`SIP-URI` or `SIP-URI-noparams`).
pub(crate) fn register_sip_uri(parser: &mut Parser, rule: &str) {
    parser
        .set_handler(rule, SipUri::default)
        .set_collector(
            "sip-uri-scheme",
            Collector::string(|uri: &mut SipUri, s| uri.secure = s.eq_ignore_ascii_case("sips")),
        )
        .set_collector("user", Collector::string(|uri: &mut SipUri, s| uri.user = Some(unescape(s))))
        .set_collector(
            "password",
            Collector::string(|uri: &mut SipUri, s| uri.password = Some(unescape(s))),
        )
        .set_collector(
            "host",
            Collector::string(|uri: &mut SipUri, s| uri.host = strip_brackets(s.to_string())),
        )
        .set_collector("port", Collector::int(|uri: &mut SipUri, v| uri.port = port(v)))
        .set_collector(
            "uri-parameter",
            Collector::string(|uri: &mut SipUri, s| {
                let (name, value) = split_escaped(s);
                uri.params.push(Param { name, value });
            }),
        )
        .set_collector(
            "uri-header",
            Collector::string(|uri: &mut SipUri, s| {
                let (name, value) = split_escaped(s);
                uri.headers.push(UriHeader {
                    name,
                    value: value.unwrap_or_default(),
                });
            }),
        );
}

/// Installs the [`GenericUri`] handler on `absoluteURI`.
pub(crate) fn register_generic_uri(parser: &mut Parser) {
    parser
        .set_handler("absoluteURI", GenericUri::default)
        .set_collector("scheme", Collector::string(|uri: &mut GenericUri, s| uri.scheme = s.to_string()))
        .set_collector("user", Collector::string(|uri: &mut GenericUri, s| uri.user = Some(unescape(s))))
        .set_collector(
            "password",
            Collector::string(|uri: &mut GenericUri, s| uri.password = Some(unescape(s))),
        )
        .set_collector(
            "host",
            Collector::string(|uri: &mut GenericUri, s| uri.host = Some(strip_brackets(s.to_string()))),
        )
        .set_collector("port", Collector::int(|uri: &mut GenericUri, v| uri.port = port(v)))
        .set_collector("abs-path", Collector::string(|uri: &mut GenericUri, s| uri.path = Some(unescape(s))))
        .set_collector("query", Collector::string(|uri: &mut GenericUri, s| uri.query = Some(unescape(s))))
        .set_collector(
            "opaque-part",
            Collector::string(|uri: &mut GenericUri, s| uri.opaque = Some(s.to_string())),
        );
}
