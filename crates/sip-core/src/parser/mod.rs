//! Grammar-driven parsing of SIP messages and URIs.
//!
//! The SIP grammar is compiled once into a shared [`Grammar`], and three
//! parsers are built on top of it: one for whole messages, one for SIP
//! URIs, and one for generic absolute URIs.
//!
//! ```
//! use sigstack_sip_core::parse_message;
//! use sigstack_sip_core::types::{HeaderAccess, Method};
//!
//! let raw = b"OPTIONS sip:carol@chicago.example.com SIP/2.0\r\n\
//! Via: SIP/2.0/UDP pc33.atlanta.example.com;branch=z9hG4bKhjhs8ass877\r\n\
//! Call-ID: a84b4c76e66710\r\n\
//! CSeq: 63104 OPTIONS\r\n\
//! Content-Length: 0\r\n\
//! \r\n";
//!
//! let message = parse_message(raw).unwrap();
//! let request = message.as_request().unwrap();
//! assert_eq!(request.method, Method::Options);
//! assert_eq!(request.call_id(), Some("a84b4c76e66710"));
//! ```

mod grammar;
mod message;
mod uri;

pub use grammar::{sip_grammar, SIP_ABNF, SIP_GRAMMAR_NAME};

use std::sync::Arc;

use bytes::Bytes;
use lazy_static::lazy_static;
use sigstack_abnf_core::{Grammar, Parser};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::{GenericUri, Message, Request, Response, SipUri};
use message::MessageHead;

type BuiltParser = std::result::Result<Parser, sigstack_abnf_core::Error>;

lazy_static! {
    static ref SIP_GRAMMAR: Arc<Grammar> = sip_grammar();
    static ref MESSAGE_PARSER: BuiltParser = build_parser(message::register_message);
    static ref URI_PARSER: BuiltParser = build_parser(|p| uri::register_sip_uri(p, "SIP-URI"));
    static ref GENERIC_URI_PARSER: BuiltParser = build_parser(uri::register_generic_uri);
}

fn build_parser(register: fn(&mut Parser)) -> BuiltParser {
    let mut parser = Parser::new(Arc::clone(&SIP_GRAMMAR))?;
    register(&mut parser);
    parser.verify()?;
    Ok(parser)
}

fn ready_parser(built: &'static BuiltParser) -> Result<&'static Parser> {
    built.as_ref().map_err(|e| Error::Grammar(e.clone()))
}

/// Parses one SIP message and returns it with the number of bytes used
/// (start line, headers, and body).
///
/// The body length comes from Content-Length; without one, the rest of the
/// input is the body.
pub fn parse_message_with_length(input: &[u8]) -> Result<(Message, usize)> {
    let parser = ready_parser(&MESSAGE_PARSER)?;
    let (head, consumed) = parser.parse_as::<MessageHead>("SIP-message", input);
    let head = match head {
        Some(head) if consumed > 0 => head,
        _ => {
            debug!(consumed, total = input.len(), "Input is not a SIP message");
            return Err(Error::Parse { consumed });
        }
    };

    let available = input.len() - consumed;
    let declared = head.headers.iter().find_map(|h| match h {
        crate::types::Header::ContentLength(n) => Some(*n as usize),
        _ => None,
    });
    let body_len = declared.unwrap_or(available);
    if body_len > available {
        return Err(Error::IncompleteBody {
            expected: body_len,
            available,
        });
    }
    let body = Bytes::copy_from_slice(&input[consumed..consumed + body_len]);
    trace!(head = consumed, body = body_len, "Parsed SIP message");

    let message = if head.is_response() {
        let status = head
            .status()
            .ok_or_else(|| Error::InvalidMessage("missing status code".into()))?;
        Message::Response(Response {
            status,
            reason: head.reason,
            headers: head.headers,
            body,
        })
    } else {
        let method = head
            .method
            .ok_or_else(|| Error::InvalidMessage("missing method".into()))?;
        let uri = head
            .uri
            .ok_or_else(|| Error::InvalidMessage("missing Request-URI".into()))?;
        Message::Request(Request {
            method,
            uri,
            headers: head.headers,
            body,
        })
    };
    Ok((message, consumed + body_len))
}

/// Parses one SIP message from the start of `input`.
pub fn parse_message(input: &[u8]) -> Result<Message> {
    parse_message_with_length(input).map(|(message, _)| message)
}

/// Like [`parse_message_with_length`], but reports failures as `(None, n)`
/// where `n` is how far the grammar got.
pub fn parse_message_partial(input: &[u8]) -> (Option<Message>, usize) {
    match parse_message_with_length(input) {
        Ok((message, consumed)) => (Some(message), consumed),
        Err(Error::Parse { consumed }) => (None, consumed),
        Err(Error::IncompleteBody { available, .. }) => (None, input.len() - available),
        Err(_) => (None, 0),
    }
}

/// Parses a complete `sip:` or `sips:` URI. Trailing input is an error.
pub fn parse_uri(text: &str) -> Option<SipUri> {
    let parser = ready_parser(&URI_PARSER).ok()?;
    match parser.parse_as::<SipUri>("SIP-URI", text) {
        (Some(uri), len) if len == text.len() => Some(uri),
        (_, len) => {
            debug!(uri = %text, matched = len, "Not a SIP URI");
            None
        }
    }
}

/// Parses a complete absolute URI of any scheme. Trailing input is an error.
pub fn parse_generic_uri(text: &str) -> Option<GenericUri> {
    let parser = ready_parser(&GENERIC_URI_PARSER).ok()?;
    match parser.parse_as::<GenericUri>("absoluteURI", text) {
        (Some(uri), len) if len == text.len() => Some(uri),
        (_, len) => {
            debug!(uri = %text, matched = len, "Not an absolute URI");
            None
        }
    }
}
