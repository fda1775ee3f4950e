//! Percent-escaping for URI components (RFC 3261 §19.1.2, RFC 3986 §2.1).
//!
//! Each component has its own set of characters that may appear unescaped
//! beside the `unreserved` set; everything else is written as `%HH`.

use std::fmt::Write;

/// `mark` characters from RFC 3261 `unreserved`
const MARK: &[u8] = b"-_.!~*'()";

pub(crate) const USER_UNRESERVED: &[u8] = b"&=+$,;?/";
pub(crate) const PASSWORD_UNRESERVED: &[u8] = b"&=+$,";
pub(crate) const PARAM_UNRESERVED: &[u8] = b"[]/:&+$";
pub(crate) const HEADER_UNRESERVED: &[u8] = b"[]/?:+$";
pub(crate) const PATH_UNRESERVED: &[u8] = b"/;:@&=+$,";
pub(crate) const QUERY_UNRESERVED: &[u8] = b";/?:@&=+$,";

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || MARK.contains(&b)
}

/// Escapes every byte of `text` that is neither unreserved nor in `extra`.
pub(crate) fn escape(text: &str, extra: &[u8]) -> String {
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        if is_unreserved(b) || extra.contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

/// Decodes `%HH` sequences. A malformed escape is kept as is.
pub(crate) fn unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    if !bytes.contains(&b'%') {
        return text.to_string();
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
