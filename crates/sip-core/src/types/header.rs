use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::method::Method;
use super::via::Via;

/// CSeq value: sequence number and method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

/// A typed header line.
///
/// Headers without a typed representation are kept verbatim as
/// [`Header::Extension`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Header {
    Via(Via),
    From(Address),
    To(Address),
    CallId(String),
    CSeq(CSeq),
    ContentLength(u32),
    MaxForwards(u32),
    Extension { name: String, value: String },
}

impl Header {
    /// Canonical header name (or the extension name as received)
    pub fn name(&self) -> &str {
        match self {
            Header::Via(_) => "Via",
            Header::From(_) => "From",
            Header::To(_) => "To",
            Header::CallId(_) => "Call-ID",
            Header::CSeq(_) => "CSeq",
            Header::ContentLength(_) => "Content-Length",
            Header::MaxForwards(_) => "Max-Forwards",
            Header::Extension { name, .. } => name,
        }
    }

    /// Compares against `name`, accepting compact forms.
    pub fn is_named(&self, name: &str) -> bool {
        let wanted = canonical_name(name).unwrap_or(name);
        self.name().eq_ignore_ascii_case(wanted)
    }

    pub fn extension(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header::Extension {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Maps a typed header's long or compact name to its canonical form.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    const NAMES: [(&str, &str, &str); 7] = [
        ("via", "v", "Via"),
        ("from", "f", "From"),
        ("to", "t", "To"),
        ("call-id", "i", "Call-ID"),
        ("cseq", "", "CSeq"),
        ("content-length", "l", "Content-Length"),
        ("max-forwards", "", "Max-Forwards"),
    ];
    NAMES
        .iter()
        .find(|(long, compact, _)| {
            name.eq_ignore_ascii_case(long) || (!compact.is_empty() && name.eq_ignore_ascii_case(compact))
        })
        .map(|(_, _, canonical)| *canonical)
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name())?;
        match self {
            Header::Via(via) => via.fmt(f),
            Header::From(address) | Header::To(address) => address.fmt(f),
            Header::CallId(id) => f.write_str(id),
            Header::CSeq(cseq) => cseq.fmt(f),
            Header::ContentLength(n) | Header::MaxForwards(n) => write!(f, "{}", n),
            Header::Extension { value, .. } => f.write_str(value),
        }
    }
}
