//! SIP requests, responses, and the [`Message`] enum that carries either.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::header::{CSeq, Header};
use super::method::Method;
use super::status::StatusCode;
use super::uri::Uri;
use super::via::Via;

/// The protocol version written on start lines
pub const SIP_VERSION: &str = "SIP/2.0";

/// Header lookups shared by requests, responses and [`Message`].
pub trait HeaderAccess {
    fn headers(&self) -> &[Header];

    fn headers_mut(&mut self) -> &mut Vec<Header>;

    /// First header named `name` (compact forms accepted)
    fn header_named(&self, name: &str) -> Option<&Header> {
        self.headers().iter().find(|h| h.is_named(name))
    }

    /// Every header named `name`, in order
    fn headers_named<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = &'a Header> + 'a> {
        Box::new(self.headers().iter().filter(move |h| h.is_named(name)))
    }

    fn via_headers(&self) -> Vec<&Via> {
        self.headers()
            .iter()
            .filter_map(|h| match h {
                Header::Via(via) => Some(via),
                _ => None,
            })
            .collect()
    }

    fn top_via(&self) -> Option<&Via> {
        self.headers().iter().find_map(|h| match h {
            Header::Via(via) => Some(via),
            _ => None,
        })
    }

    fn top_via_mut(&mut self) -> Option<&mut Via> {
        self.headers_mut().iter_mut().find_map(|h| match h {
            Header::Via(via) => Some(via),
            _ => None,
        })
    }

    fn from(&self) -> Option<&Address> {
        self.headers().iter().find_map(|h| match h {
            Header::From(address) => Some(address),
            _ => None,
        })
    }

    fn to(&self) -> Option<&Address> {
        self.headers().iter().find_map(|h| match h {
            Header::To(address) => Some(address),
            _ => None,
        })
    }

    fn to_mut(&mut self) -> Option<&mut Address> {
        self.headers_mut().iter_mut().find_map(|h| match h {
            Header::To(address) => Some(address),
            _ => None,
        })
    }

    fn call_id(&self) -> Option<&str> {
        self.headers().iter().find_map(|h| match h {
            Header::CallId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    fn cseq(&self) -> Option<&CSeq> {
        self.headers().iter().find_map(|h| match h {
            Header::CSeq(cseq) => Some(cseq),
            _ => None,
        })
    }

    fn content_length(&self) -> Option<u32> {
        self.headers().iter().find_map(|h| match h {
            Header::ContentLength(n) => Some(*n),
            _ => None,
        })
    }

    fn max_forwards(&self) -> Option<u32> {
        self.headers().iter().find_map(|h| match h {
            Header::MaxForwards(n) => Some(*n),
            _ => None,
        })
    }

    fn push_header(&mut self, header: Header) {
        self.headers_mut().push(header);
    }

    /// Inserts `via` as the new topmost Via.
    fn push_via(&mut self, via: Via) {
        let headers = self.headers_mut();
        let at = headers.iter().position(|h| matches!(h, Header::Via(_))).unwrap_or(0);
        headers.insert(at, Header::Via(via));
    }
}

/// A SIP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<Uri>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let start = format!("{} {} {}", self.method, self.uri, SIP_VERSION);
        marshal(&start, &self.headers, &self.body)
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// A SIP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    /// A response with the canonical reason phrase for `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let start = format!("{} {} {}", SIP_VERSION, self.status, self.reason);
        marshal(&start, &self.headers, &self.body)
    }
}

impl HeaderAccess for Response {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// Either kind of SIP message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(request) => Some(request),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(response) => Some(response),
            Message::Request(_) => None,
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Message::Request(request) => &request.body,
            Message::Response(response) => &response.body,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Message::Request(request) => request.to_bytes(),
            Message::Response(response) => response.to_bytes(),
        }
    }

    /// Short description for logs: method or status code
    pub fn short_description(&self) -> String {
        match self {
            Message::Request(request) => request.method.to_string(),
            Message::Response(response) => format!("{} {}", response.status, response.reason),
        }
    }
}

impl HeaderAccess for Message {
    fn headers(&self) -> &[Header] {
        match self {
            Message::Request(request) => &request.headers,
            Message::Response(response) => &response.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        match self {
            Message::Request(request) => &mut request.headers,
            Message::Response(response) => &mut response.headers,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

/// Start line, headers, and body. Content-Length is written as present, or
/// appended from the body size when the message has none.
fn marshal(start_line: &str, headers: &[Header], body: &[u8]) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    head.push_str(start_line);
    head.push_str("\r\n");

    let mut has_length = false;
    for header in headers {
        has_length |= matches!(header, Header::ContentLength(_));
        head.push_str(&header.to_string());
        head.push_str("\r\n");
    }
    if !has_length {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(request) => request.fmt(f),
            Message::Response(response) => response.fmt(f),
        }
    }
}
