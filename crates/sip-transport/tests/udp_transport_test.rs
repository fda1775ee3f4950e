use std::net::SocketAddr;
use std::time::Duration;

use serial_test::serial;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

use sigstack_sip_core::types::{CSeq, Header, HeaderAccess, Method, Request, SipUri, Via};
use sigstack_sip_core::Message;
use sigstack_sip_transport::{bind_udp, Error, Transport, TransportEvent, UdpTransport};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn options_request() -> Message {
    Request::new(Method::Options, SipUri::new("127.0.0.1").with_user("bob"))
        .with_header(Header::Via(Via::new("UDP", "127.0.0.1", Some(5060)).with_branch("z9hG4bKudp1")))
        .with_header(Header::CallId("udp-test-1".into()))
        .with_header(Header::CSeq(CSeq::new(1, Method::Options)))
        .into()
}

async fn next_event(rx: &mut Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
#[serial]
async fn test_udp_round_trip() {
    let (alice, _alice_rx) = bind_udp(loopback()).await.unwrap();
    let (bob, mut bob_rx) = UdpTransport::bind(loopback(), Some(10)).await.unwrap();
    let bob_addr = bob.local_addr().unwrap();

    alice.send_message(options_request(), bob_addr).await.unwrap();

    match next_event(&mut bob_rx).await {
        TransportEvent::MessageReceived {
            message,
            source,
            destination,
        } => {
            assert_eq!(source, alice.local_addr().unwrap());
            assert_eq!(destination, bob_addr);
            let request = message.as_request().unwrap();
            assert_eq!(request.method, Method::Options);
            assert_eq!(request.call_id(), Some("udp-test-1"));
            assert_eq!(request.top_via().and_then(Via::branch), Some("z9hG4bKudp1"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_malformed_datagram_reports_error_and_keeps_running() {
    let (bob, mut bob_rx) = bind_udp(loopback()).await.unwrap();
    let bob_addr = bob.local_addr().unwrap();

    let raw = UdpSocket::bind(loopback()).await.unwrap();
    raw.send_to(b"this is not SIP", bob_addr).await.unwrap();
    assert!(matches!(next_event(&mut bob_rx).await, TransportEvent::Error { .. }));

    // keep-alives are ignored silently
    raw.send_to(b"\r\n\r\n", bob_addr).await.unwrap();

    let (alice, _alice_rx) = bind_udp(loopback()).await.unwrap();
    alice.send_message(options_request(), bob_addr).await.unwrap();
    assert!(matches!(
        next_event(&mut bob_rx).await,
        TransportEvent::MessageReceived { .. }
    ));
}

#[tokio::test]
#[serial]
async fn test_close_stops_transport() {
    let (transport, mut rx) = bind_udp(loopback()).await.unwrap();
    assert!(!transport.is_closed());
    assert!(!transport.is_reliable());
    assert_eq!(transport.name(), "UDP");
    assert!(transport.matches("udp", "127.0.0.1:5060".parse().unwrap()));
    assert!(!transport.matches("TCP", "127.0.0.1:5060".parse().unwrap()));

    transport.close().await.unwrap();
    assert!(transport.is_closed());
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Closed));

    let result = transport
        .send_message(options_request(), "127.0.0.1:5060".parse().unwrap())
        .await;
    assert!(matches!(result, Err(Error::TransportClosed)));
    assert!(!transport.matches("UDP", "127.0.0.1:5060".parse().unwrap()));
}
