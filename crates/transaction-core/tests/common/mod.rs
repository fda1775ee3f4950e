//! Shared harness for the transaction integration tests: an in-memory
//! transport that records every send, and helpers to build requests and
//! wait for events.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use sigstack_sip_core::{Address, CSeq, Header, HeaderAccess, Message, Method, Request, Response, SipUri, Via};
use sigstack_sip_transport::{Error as TransportError, Result as TransportResult, Transport, TransportEvent};
use sigstack_transaction_core::{ProviderConfig, TransactionEvent, TransactionProvider};

pub const LOCAL_ADDR: &str = "127.0.0.1:5060";
pub const REMOTE_ADDR: &str = "127.0.0.1:5070";

/// A message handed to the transport, with the (virtual) time it was sent
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub destination: SocketAddr,
    pub at: Instant,
}

#[derive(Debug)]
pub struct MockTransport {
    local_addr: SocketAddr,
    reliable: bool,
    closed: AtomicBool,
    pub fail_sends: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockTransport {
    pub fn new(reliable: bool) -> Self {
        Self {
            local_addr: LOCAL_ADDR.parse().unwrap(),
            reliable,
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_requests(&self, method: Method) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|s| s.message.as_request().map_or(false, |r| r.method == method))
            .collect()
    }

    pub fn sent_responses(&self, status: u16) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|s| s.message.as_response().map_or(false, |r| r.status_code() == status))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                destination,
                reason: "network unreachable".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            message,
            destination,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_reliable(&self) -> bool {
        self.reliable
    }

    fn name(&self) -> &'static str {
        if self.reliable {
            "TCP"
        } else {
            "UDP"
        }
    }
}

/// A provider wired to a [`MockTransport`]
pub struct TestStack {
    pub provider: TransactionProvider,
    pub events: mpsc::Receiver<TransactionEvent>,
    pub transport: Arc<MockTransport>,
    inject_tx: mpsc::Sender<TransportEvent>,
}

impl TestStack {
    pub fn new() -> Self {
        Self::with_transport(MockTransport::new(false))
    }

    pub fn reliable() -> Self {
        Self::with_transport(MockTransport::new(true))
    }

    fn with_transport(transport: MockTransport) -> Self {
        let transport = Arc::new(transport);
        let (inject_tx, inject_rx) = mpsc::channel(100);
        let config = ProviderConfig::default().with_unmatched_messages(true);
        let (provider, events) = TransactionProvider::new(transport.clone(), inject_rx, config);
        Self {
            provider,
            events,
            transport,
            inject_tx,
        }
    }

    /// Delivers `message` as if it arrived from `source`.
    pub async fn inject(&self, message: impl Into<Message>, source: SocketAddr) {
        self.inject_tx
            .send(TransportEvent::MessageReceived {
                message: message.into(),
                source,
                destination: LOCAL_ADDR.parse().unwrap(),
            })
            .await
            .unwrap();
    }

    pub async fn inject_event(&self, event: TransportEvent) {
        self.inject_tx.send(event).await.unwrap();
    }

    /// Waits for the first event matching `pred`, dropping the others.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> TransactionEvent
    where
        F: FnMut(&TransactionEvent) -> bool,
    {
        loop {
            let event = timeout(Duration::from_secs(120), self.events.recv())
                .await
                .expect("timed out waiting for transaction event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    /// Lets spawned tasks run without moving the clock.
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }
}

pub fn remote() -> SocketAddr {
    REMOTE_ADDR.parse().unwrap()
}

/// An outgoing request from alice to bob at [`REMOTE_ADDR`]; the Via has no
/// branch yet.
pub fn outgoing_request(method: Method, transport: &str) -> Request {
    Request::new(method.clone(), SipUri::new("127.0.0.1").with_user("bob").with_port(5070))
        .with_header(Header::Via(Via::new(transport, "127.0.0.1", Some(5060))))
        .with_header(Header::MaxForwards(70))
        .with_header(Header::From(
            Address::new(SipUri::new("atlanta.example.com").with_user("alice")).with_tag("9fxced76sl"),
        ))
        .with_header(Header::To(Address::new(SipUri::new("biloxi.example.com").with_user("bob"))))
        .with_header(Header::CallId("3848276298220188511@atlanta.example.com".into()))
        .with_header(Header::CSeq(CSeq::new(1, method)))
}

/// A request arriving from bob with the given branch
pub fn incoming_request(method: Method, branch: &str) -> Request {
    Request::new(method.clone(), SipUri::new("127.0.0.1").with_user("alice"))
        .with_header(Header::Via(Via::new("UDP", "127.0.0.1", Some(5070)).with_branch(branch)))
        .with_header(Header::MaxForwards(70))
        .with_header(Header::From(
            Address::new(SipUri::new("biloxi.example.com").with_user("bob")).with_tag("a6c85cf"),
        ))
        .with_header(Header::To(Address::new(SipUri::new("atlanta.example.com").with_user("alice"))))
        .with_header(Header::CallId("a84b4c76e66710@pc33.biloxi.example.com".into()))
        .with_header(Header::CSeq(CSeq::new(7, method)))
}

/// A response to `request` as the far end would send it
pub fn response_to(request: &Request, status: sigstack_sip_core::StatusCode, to_tag: Option<&str>) -> Response {
    let mut response = sigstack_transaction_core::utils::create_response(request, status);
    if let (Some(tag), Some(to)) = (to_tag, response.to_mut()) {
        to.set_tag(tag);
    }
    response
}

/// The single request the transport has sent so far with `method`
pub fn only_sent(transport: &MockTransport, method: Method) -> Request {
    let sent = transport.sent_requests(method);
    assert!(!sent.is_empty(), "no request sent");
    sent[0].message.as_request().unwrap().clone()
}
