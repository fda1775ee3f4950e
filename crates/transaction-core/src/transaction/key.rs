use std::fmt;
use std::hash::{Hash, Hasher};

use sigstack_sip_core::{HeaderAccess, Method, Request, Response};

/// Identifies a SIP transaction (RFC 3261 §17.1.3, §17.2.3).
///
/// The top Via `branch` is globally unique when it carries the `z9hG4bK`
/// cookie, so branch plus method is enough to tell transactions apart; a
/// CANCEL shares its INVITE's branch but is a separate transaction.
/// `is_server` keeps the client and server sides of a UA apart.
#[derive(Clone)]
pub struct TransactionKey {
    /// Top Via branch parameter
    pub branch: String,

    /// Method of the request that created the transaction
    pub method: Method,

    pub is_server: bool,
}

impl TransactionKey {
    pub fn new(branch: String, method: Method, is_server: bool) -> Self {
        Self {
            branch,
            method,
            is_server,
        }
    }

    /// Key of the server transaction an incoming request belongs to.
    ///
    /// `None` when the request has no top Via branch.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = request.top_via()?.branch()?;
        if branch.is_empty() {
            return None;
        }
        Some(Self::new(branch.to_string(), request.method.clone(), true))
    }

    /// Key of the client transaction an incoming response belongs to: top
    /// Via branch plus the CSeq method.
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = response.top_via()?.branch()?;
        if branch.is_empty() {
            return None;
        }
        let cseq = response.cseq()?;
        Some(Self::new(branch.to_string(), cseq.method.clone(), false))
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Same branch and side, different method.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            branch: self.branch.clone(),
            method,
            is_server: self.is_server,
        }
    }
}

impl fmt::Debug for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "{}:{}:{}", self.branch, self.method, side)
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "Key({}:{}:{})", self.branch, self.method, side)
    }
}

impl PartialEq for TransactionKey {
    fn eq(&self, other: &Self) -> bool {
        self.branch == other.branch && self.method == other.method && self.is_server == other.is_server
    }
}

impl Eq for TransactionKey {}

impl Hash for TransactionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.branch.hash(state);
        self.method.hash(state);
        self.is_server.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigstack_sip_core::{CSeq, Header, SipUri, StatusCode, Via};
    use std::collections::HashSet;

    fn request(method: Method, branch: Option<&str>) -> Request {
        let mut via = Via::new("UDP", "client.example.com", Some(5060));
        if let Some(branch) = branch {
            via.set_branch(branch);
        }
        Request::new(method.clone(), SipUri::new("example.com").with_user("bob"))
            .with_header(Header::Via(via))
            .with_header(Header::CSeq(CSeq::new(1, method)))
    }

    #[test]
    fn test_from_request() {
        let key = TransactionKey::from_request(&request(Method::Invite, Some("z9hG4bKkey1"))).unwrap();
        assert_eq!(key.branch(), "z9hG4bKkey1");
        assert_eq!(key.method(), &Method::Invite);
        assert!(key.is_server());
        assert_eq!(key.to_string(), "Key(z9hG4bKkey1:INVITE:server)");

        assert!(TransactionKey::from_request(&request(Method::Invite, None)).is_none());
        assert!(TransactionKey::from_request(&request(Method::Invite, Some(""))).is_none());
    }

    #[test]
    fn test_from_response_uses_cseq_method() {
        let response = Response::new(StatusCode::OK)
            .with_header(Header::Via(
                Via::new("UDP", "client.example.com", None).with_branch("z9hG4bKkey2"),
            ))
            .with_header(Header::CSeq(CSeq::new(7, Method::Cancel)));
        let key = TransactionKey::from_response(&response).unwrap();
        assert_eq!(key, TransactionKey::new("z9hG4bKkey2".into(), Method::Cancel, false));

        let no_cseq = Response::new(StatusCode::OK).with_header(Header::Via(
            Via::new("UDP", "client.example.com", None).with_branch("z9hG4bKkey2"),
        ));
        assert!(TransactionKey::from_response(&no_cseq).is_none());
    }

    #[test]
    fn test_cancel_and_invite_are_distinct() {
        let invite = TransactionKey::from_request(&request(Method::Invite, Some("z9hG4bKsame"))).unwrap();
        let cancel = TransactionKey::from_request(&request(Method::Cancel, Some("z9hG4bKsame"))).unwrap();
        assert_ne!(invite, cancel);
        assert_eq!(cancel.with_method(Method::Invite), invite);

        let client = TransactionKey::new("z9hG4bKsame".into(), Method::Invite, false);
        let mut keys = HashSet::new();
        keys.insert(invite);
        keys.insert(cancel);
        keys.insert(client);
        assert_eq!(keys.len(), 3);
    }
}
