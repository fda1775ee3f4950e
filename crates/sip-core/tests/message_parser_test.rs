// Parser tests for complete SIP messages

use bytes::Bytes;
use sigstack_sip_core::{
    parse_message, parse_message_partial, parse_message_with_length,
    types::{Address, CSeq, Header, HeaderAccess, Method, Request, SipUri, StatusCode, Uri, Via},
    Error, Message,
};

const INVITE: &[u8] = b"INVITE sip:bob@biloxi.example.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.example.com;branch=z9hG4bK776asdhds\r\n\
Max-Forwards: 70\r\n\
To: Bob <sip:bob@biloxi.example.com>\r\n\
From: \"Alice\" <sip:alice@atlanta.example.com>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710@pc33.atlanta.example.com\r\n\
CSeq: 314159 INVITE\r\n\
Contact: <sip:alice@pc33.atlanta.example.com>\r\n\
Content-Length: 0\r\n\
\r\n";

fn request(message: &Message) -> &Request {
    message.as_request().expect("expected a request")
}

#[test]
fn test_minimal_invite() {
    let raw = b"INVITE sip:bob@example.com SIP/2.0\r\nVia: SIP/2.0/UDP host;branch=z9hG4bKabc\r\nCSeq: 1 INVITE\r\n\r\n";
    let message = parse_message(raw).unwrap();
    let request = request(&message);

    assert_eq!(request.method, Method::Invite);
    assert_eq!(request.uri.host(), Some("example.com"));
    let vias = request.via_headers();
    assert_eq!(vias.len(), 1);
    assert_eq!(vias[0].branch(), Some("z9hG4bKabc"));
    assert_eq!(vias[0].host, "host");
    assert_eq!(request.cseq(), Some(&CSeq::new(1, Method::Invite)));
    assert!(request.body.is_empty());
}

#[test]
fn test_full_invite_headers() {
    let (message, consumed) = parse_message_with_length(INVITE).unwrap();
    assert_eq!(consumed, INVITE.len());
    let request = request(&message);

    let via = request.top_via().unwrap();
    assert_eq!(via.transport, "UDP");
    assert_eq!(via.host, "pc33.atlanta.example.com");
    assert_eq!(via.port, None);
    assert!(via.has_rfc3261_branch());

    assert_eq!(request.max_forwards(), Some(70));

    let to = request.to().unwrap();
    assert_eq!(to.display_name.as_deref(), Some("Bob"));
    assert_eq!(to.tag(), None);
    assert_eq!(to.uri.to_string(), "sip:bob@biloxi.example.com");

    let from = request.from().unwrap();
    assert_eq!(from.display_name.as_deref(), Some("Alice"));
    assert_eq!(from.tag(), Some("1928301774"));

    assert_eq!(request.call_id(), Some("a84b4c76e66710@pc33.atlanta.example.com"));
    assert_eq!(request.cseq().map(|c| c.seq), Some(314159));
    assert_eq!(request.content_length(), Some(0));

    match request.header_named("contact") {
        Some(Header::Extension { name, value }) => {
            assert_eq!(name, "Contact");
            assert_eq!(value, "<sip:alice@pc33.atlanta.example.com>");
        }
        other => panic!("expected Contact extension header, got {:?}", other),
    }
}

#[test]
fn test_response_with_multiple_vias() {
    let raw = b"SIP/2.0 180 Ringing\r\n\
Via: SIP/2.0/UDP proxy.example.com;branch=z9hG4bK1;received=192.0.2.3, SIP/2.0/TCP client.example.com:5070;branch=z9hG4bK2\r\n\
Via: SIP/2.0/UDP origin.example.com;branch=z9hG4bK3;rport=40000\r\n\
To: <sip:bob@biloxi.example.com>;tag=a6c85cf\r\n\
From: <sip:alice@atlanta.example.com>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710\r\n\
CSeq: 314159 INVITE\r\n\
Content-Length: 0\r\n\
\r\n";
    let message = parse_message(raw).unwrap();
    let response = message.as_response().unwrap();
    assert_eq!(response.status, StatusCode::RINGING);
    assert_eq!(response.reason, "Ringing");

    let vias = response.via_headers();
    assert_eq!(vias.len(), 3);
    assert_eq!(vias[0].received(), Some("192.0.2.3"));
    assert_eq!(vias[1].transport, "TCP");
    assert_eq!(vias[1].port, Some(5070));
    assert_eq!(vias[1].branch(), Some("z9hG4bK2"));
    assert_eq!(vias[2].rport(), Some(40000));
    assert_eq!(response.to().and_then(Address::tag), Some("a6c85cf"));
    assert_eq!(response.cseq().map(|c| &c.method), Some(&Method::Invite));
}

#[test]
fn test_via_received_ipv6_and_multicast_params() {
    let raw = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP host;branch=z9hG4bK1;received=2001:db8::1;rport=5070\r\n\
Via: SIP/2.0/UDP [2001:db8::9]:5062;maddr=224.2.0.1;ttl=16;received=192.0.2.8\r\n\
CSeq: 1 INVITE\r\n\
\r\n";
    let message = parse_message(raw).unwrap();
    let response = message.as_response().unwrap();

    let vias = response.via_headers();
    assert_eq!(vias.len(), 2);
    assert_eq!(vias[0].branch(), Some("z9hG4bK1"));
    assert_eq!(vias[0].received(), Some("2001:db8::1"));
    assert_eq!(vias[0].rport(), Some(5070));
    assert_eq!(vias[1].host, "2001:db8::9");
    assert_eq!(vias[1].port, Some(5062));
    assert_eq!(vias[1].received(), Some("192.0.2.8"));
    assert_eq!(
        vias[1].to_string(),
        "SIP/2.0/UDP [2001:db8::9]:5062;maddr=224.2.0.1;ttl=16;received=192.0.2.8"
    );

    // the stamped form survives a marshal and re-parse
    let reparsed = parse_message(response.to_string().as_bytes()).unwrap();
    assert_eq!(reparsed.as_response().unwrap().via_headers(), vias);
}

#[test]
fn test_via_with_out_of_range_port_is_dropped() {
    let raw = b"OPTIONS sip:bob@example.com SIP/2.0\r\nVia: SIP/2.0/UDP host:99999;branch=z9hG4bKp\r\nCSeq: 2 OPTIONS\r\n\r\n";
    let message = parse_message(raw).unwrap();
    assert!(request(&message).via_headers().is_empty());
    assert!(parse_message(b"OPTIONS sip:bob@example.com:70000 SIP/2.0\r\nCSeq: 2 OPTIONS\r\n\r\n").is_err());
}

#[test]
fn test_compact_header_forms() {
    let raw = b"OPTIONS sip:carol@chicago.example.com SIP/2.0\r\n\
v: SIP/2.0/UDP pc33.atlanta.example.com;branch=z9hG4bKnashds7\r\n\
f: <sip:alice@atlanta.example.com>;tag=1928301774\r\n\
t: <sip:carol@chicago.example.com>\r\n\
i: a84b4c76e66710\r\n\
CSeq: 63104 OPTIONS\r\n\
l: 0\r\n\
\r\n";
    let message = parse_message(raw).unwrap();
    assert_eq!(message.top_via().and_then(Via::branch), Some("z9hG4bKnashds7"));
    assert_eq!(message.from().and_then(Address::tag), Some("1928301774"));
    assert!(message.to().is_some());
    assert_eq!(message.call_id(), Some("a84b4c76e66710"));
    assert_eq!(message.content_length(), Some(0));
    assert!(message.header_named("i").is_some());
}

#[test]
fn test_body_is_delimited_by_content_length() {
    let raw = b"MESSAGE sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/TCP host.example.com;branch=z9hG4bKmsg\r\n\
CSeq: 2 MESSAGE\r\n\
Content-Length: 5\r\n\
\r\n\
helloINVITE";
    let (message, consumed) = parse_message_with_length(raw).unwrap();
    assert_eq!(message.body(), &Bytes::from_static(b"hello"));
    assert_eq!(consumed, raw.len() - "INVITE".len());
}

#[test]
fn test_body_without_content_length_takes_the_rest() {
    let raw = b"MESSAGE sip:bob@example.com SIP/2.0\r\nCSeq: 2 MESSAGE\r\n\r\nhi there";
    let message = parse_message(raw).unwrap();
    assert_eq!(message.body().as_ref(), b"hi there");
}

#[test]
fn test_short_body_is_an_error() {
    let raw = b"MESSAGE sip:bob@example.com SIP/2.0\r\nContent-Length: 10\r\n\r\nabc";
    match parse_message(raw) {
        Err(Error::IncompleteBody { expected, available }) => {
            assert_eq!(expected, 10);
            assert_eq!(available, 3);
        }
        other => panic!("expected IncompleteBody, got {:?}", other),
    }

    let (message, consumed) = parse_message_partial(raw);
    assert!(message.is_none());
    assert_eq!(consumed, raw.len() - 3);
}

#[test]
fn test_malformed_typed_header_is_dropped() {
    let raw = b"BYE sip:bob@example.com SIP/2.0\r\n\
CSeq: not-a-number BYE\r\n\
Max-Forwards: 69\r\n\
\r\n";
    let message = parse_message(raw).unwrap();
    assert_eq!(message.cseq(), None);
    assert!(message.header_named("CSeq").is_none());
    assert_eq!(message.max_forwards(), Some(69));
}

#[test]
fn test_extension_headers_keep_order_and_name() {
    let raw = b"INFO sip:bob@example.com SIP/2.0\r\n\
Subject: lunch\r\n\
Route: <sip:p1.example.com;lr>\r\n\
Route: <sip:p2.example.com;lr>\r\n\
\r\n";
    let message = parse_message(raw).unwrap();
    assert_eq!(request(&message).method, Method::Info);
    let routes: Vec<String> = message.headers_named("Route").map(|h| h.to_string()).collect();
    assert_eq!(
        routes,
        vec!["Route: <sip:p1.example.com;lr>", "Route: <sip:p2.example.com;lr>"]
    );
    assert_eq!(
        message.header_named("subject"),
        Some(&Header::extension("Subject", "lunch"))
    );
}

#[test]
fn test_extension_method_and_generic_request_uri() {
    let raw = b"FOO tel:+1-201-555-0123 SIP/2.0\r\n\r\n";
    let message = parse_message(raw).unwrap();
    let request = request(&message);
    assert_eq!(request.method, Method::Extension("FOO".into()));
    match &request.uri {
        Uri::Generic(uri) => assert_eq!(uri.opaque.as_deref(), Some("+1-201-555-0123")),
        other => panic!("expected a generic URI, got {}", other),
    }
}

#[test]
fn test_not_a_sip_message() {
    match parse_message(b"hello world") {
        Err(Error::Parse { consumed }) => assert_eq!(consumed, 0),
        other => panic!("expected Parse error, got {:?}", other),
    }
    assert_eq!(parse_message_partial(b"").0, None);
}

#[test]
fn test_marshalled_request_parses_back() {
    let uri = SipUri::new("biloxi.example.com").with_user("bob");
    let original = Request::new(Method::Register, uri.clone())
        .with_header(Header::Via(
            Via::new("UDP", "192.0.2.10", Some(5062)).with_branch("z9hG4bKreg1"),
        ))
        .with_header(Header::MaxForwards(70))
        .with_header(Header::To(Address::new(uri.clone())))
        .with_header(Header::From(Address::new(uri).with_display_name("Bob").with_tag("456248")))
        .with_header(Header::CallId("843817637684230@998sdasdh09".into()))
        .with_header(Header::CSeq(CSeq::new(1826, Method::Register)))
        .with_body("v=0\r\n");

    let bytes = original.to_bytes();
    let parsed = parse_message(&bytes).unwrap();
    let parsed = request(&parsed);

    assert_eq!(parsed.method, original.method);
    assert_eq!(parsed.uri, original.uri);
    assert_eq!(parsed.body, original.body);
    assert_eq!(parsed.content_length(), Some(5));
    assert_eq!(&parsed.headers[..original.headers.len()], &original.headers[..]);
}
