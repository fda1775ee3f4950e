use std::net::{IpAddr, SocketAddr};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use sigstack_sip_core::{
    CSeq, Header, HeaderAccess, Method, Request, Response, StatusCode, Uri, Via, BRANCH_MAGIC_COOKIE,
};
use sigstack_sip_transport::Error as TransportError;

use crate::error::{Error, Result};

/// Max-Forwards on requests the transaction layer builds itself
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

const TAG_LENGTH: usize = 10;

/// A fresh RFC 3261 branch: magic cookie plus a random UUID.
pub fn generate_branch() -> String {
    format!("{}-{}", BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// A random From/To tag.
pub fn generate_tag() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TAG_LENGTH)
        .map(char::from)
        .collect()
}

/// Makes sure `request` has a top Via with an RFC 3261 branch, adding a
/// fresh one if it is missing or lacks the magic cookie. Returns the branch.
pub fn ensure_branch(request: &mut Request) -> Result<String> {
    let via = request.top_via_mut().ok_or(sigstack_sip_core::Error::MissingHeader("Via"))?;
    if !via.has_rfc3261_branch() {
        via.set_branch(generate_branch());
    }
    Ok(via.branch().unwrap_or_default().to_string())
}

/// A response to `request` carrying its Via, From, To, Call-ID and CSeq.
pub fn create_response(request: &Request, status: StatusCode) -> Response {
    let mut response = Response::new(status);
    for header in request.headers() {
        let copied = matches!(
            header,
            Header::Via(_) | Header::From(_) | Header::To(_) | Header::CallId(_) | Header::CSeq(_)
        );
        if copied {
            response.headers.push(header.clone());
        }
    }
    response
}

fn route_headers(request: &Request) -> Vec<Header> {
    request.headers_named("Route").cloned().collect()
}

fn required<'a, T>(value: Option<&'a T>, name: &'static str) -> Result<&'a T>
where
    T: ?Sized,
{
    value.ok_or(Error::SipCore(sigstack_sip_core::Error::MissingHeader(name)))
}

/// The ACK for a non-2xx final response to `invite` (RFC 3261 §17.1.1.3).
///
/// Request-URI, top Via, Call-ID, From and Route come from the INVITE and
/// To from the response, so the ACK carries the response's to-tag.
pub fn create_ack_for_error_response(invite: &Request, response: &Response) -> Result<Request> {
    let via = required(invite.top_via(), "Via")?;
    let cseq = required(invite.cseq(), "CSeq")?;

    let mut ack = Request::new(Method::Ack, invite.uri.clone()).with_header(Header::Via(via.clone()));
    ack.headers.extend(route_headers(invite));
    Ok(ack
        .with_header(Header::MaxForwards(DEFAULT_MAX_FORWARDS))
        .with_header(Header::From(required(invite.from(), "From")?.clone()))
        .with_header(Header::To(required(response.to(), "To")?.clone()))
        .with_header(Header::CallId(required(invite.call_id(), "Call-ID")?.to_string()))
        .with_header(Header::CSeq(CSeq::new(cseq.seq, Method::Ack))))
}

/// A CANCEL for `invite` (RFC 3261 §9.1).
///
/// Everything that identifies the INVITE transaction is copied, including
/// the top Via and its branch; CSeq keeps its number with method CANCEL.
pub fn create_cancel_request(invite: &Request) -> Result<Request> {
    let via = required(invite.top_via(), "Via")?;
    let cseq = required(invite.cseq(), "CSeq")?;

    let mut cancel = Request::new(Method::Cancel, invite.uri.clone()).with_header(Header::Via(via.clone()));
    cancel.headers.extend(route_headers(invite));
    Ok(cancel
        .with_header(Header::MaxForwards(DEFAULT_MAX_FORWARDS))
        .with_header(Header::From(required(invite.from(), "From")?.clone()))
        .with_header(Header::To(required(invite.to(), "To")?.clone()))
        .with_header(Header::CallId(required(invite.call_id(), "Call-ID")?.to_string()))
        .with_header(Header::CSeq(CSeq::new(cseq.seq, Method::Cancel))))
}

/// Host and port a request is sent to: the Request-URI's `maddr` or host,
/// and its port or the scheme default.
pub fn request_destination(request: &Request) -> Result<(String, u16)> {
    match &request.uri {
        Uri::Sip(uri) => {
            let host = uri.maddr().unwrap_or(&uri.host);
            if host.is_empty() {
                return Err(sigstack_sip_core::Error::InvalidUri(uri.to_string()).into());
            }
            Ok((host.to_string(), uri.listening_port()))
        }
        Uri::Generic(uri) => Err(sigstack_sip_core::Error::InvalidUri(format!(
            "cannot route to {} URI",
            uri.scheme
        ))
        .into()),
    }
}

/// Resolves `host:port` to the first address the system resolver returns.
///
/// IP literals resolve without a lookup.
pub async fn resolve_destination(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::ResolveFailed(format!("{}: {}", host, e)))?;
    addrs
        .next()
        .ok_or_else(|| TransportError::ResolveFailed(host.to_string()).into())
}

/// Stamps `received` and a requested `rport` on the top Via of an incoming
/// request (RFC 3261 §18.2.1, RFC 3581).
pub fn stamp_received(request: &mut Request, source: SocketAddr) {
    if let Some(via) = request.top_via_mut() {
        let sent_by = via.host.trim_start_matches('[').trim_end_matches(']');
        if sent_by.parse::<IpAddr>().ok() != Some(source.ip()) {
            via.set_received(source.ip().to_string());
        }
        if via.has_rport() {
            via.set_rport(Some(source.port()));
        }
    }
}

/// Transport protocol a request's top Via names, `UDP` when absent.
pub fn via_transport(request: &Request) -> &str {
    request.top_via().map(|via: &Via| via.transport.as_str()).unwrap_or("UDP")
}
