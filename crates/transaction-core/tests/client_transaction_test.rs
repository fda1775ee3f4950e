mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use sigstack_sip_core::{Address, CSeq, HeaderAccess, Method, StatusCode, Via};
use sigstack_transaction_core::{Error, TransactionEvent, TransactionState};

use common::{only_sent, outgoing_request, remote, response_to, TestStack};

fn close_to(actual: Duration, expected_ms: u64) -> bool {
    let expected = Duration::from_millis(expected_ms);
    let diff = if actual > expected { actual - expected } else { expected - actual };
    diff < Duration::from_millis(20)
}

#[tokio::test(start_paused = true)]
async fn test_invite_retransmits_with_backoff_until_timer_b() {
    let mut stack = TestStack::new();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "UDP"))
        .await
        .unwrap();
    assert_eq!(stack.provider.transaction_state(&key).await.unwrap(), TransactionState::Initial);

    let start = Instant::now();
    stack.provider.send_request(&key).await.unwrap();

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTimeout { transaction_id } if *transaction_id == key))
        .await;
    assert!(close_to(start.elapsed(), 32_000), "timer B fired after {:?}", start.elapsed());

    let terminated = stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
    match terminated {
        TransactionEvent::TransactionTerminated { transaction_id, is_server } => {
            assert_eq!(transaction_id, key);
            assert!(!is_server);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let sends = stack.transport.sent_requests(Method::Invite);
    let expected = [0, 500, 1_500, 3_500, 7_500, 11_500, 15_500, 19_500, 23_500, 27_500, 31_500];
    assert_eq!(sends.len(), expected.len());
    for (sent, offset) in sends.iter().zip(expected) {
        assert!(
            close_to(sent.at - sends[0].at, offset),
            "retransmission at {:?}, expected {}ms",
            sent.at - sends[0].at,
            offset
        );
        assert_eq!(sent.destination, remote());
    }

    // Nothing more goes out once the transaction is gone
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(stack.transport.sent_requests(Method::Invite).len(), expected.len());
    assert!(stack.provider.active_transactions().await.is_empty());
    assert!(matches!(
        stack.provider.transaction_state(&key).await,
        Err(Error::TransactionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_invite_error_response_is_acknowledged() {
    let mut stack = TestStack::new();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "UDP"))
        .await
        .unwrap();
    stack.provider.send_request(&key).await.unwrap();
    stack.settle().await;

    let invite = only_sent(&stack.transport, Method::Invite);
    let busy = response_to(&invite, StatusCode::BUSY_HERE, Some("8321234356"));
    stack.inject(busy.clone(), remote()).await;

    match stack
        .wait_for(|e| matches!(e, TransactionEvent::FailureResponse { .. }))
        .await
    {
        TransactionEvent::FailureResponse { transaction_id, response } => {
            assert_eq!(transaction_id, key);
            assert_eq!(response.status_code(), 486);
        }
        other => panic!("unexpected event {:?}", other),
    }
    let received_at = Instant::now();
    stack.settle().await;
    assert_eq!(stack.provider.transaction_state(&key).await.unwrap(), TransactionState::Completed);

    let acks = stack.transport.sent_requests(Method::Ack);
    assert_eq!(acks.len(), 1);
    let ack = acks[0].message.as_request().unwrap();
    assert_eq!(acks[0].destination, remote());
    assert_eq!(ack.uri, invite.uri);
    assert_eq!(ack.top_via().and_then(Via::branch), invite.top_via().and_then(Via::branch));
    assert_eq!(ack.cseq(), Some(&CSeq::new(1, Method::Ack)));
    assert_eq!(ack.to().and_then(Address::tag), Some("8321234356"));
    assert_eq!(ack.call_id(), invite.call_id());

    // A retransmitted final response is answered with the same ACK
    stack.inject(busy, remote()).await;
    stack.settle().await;
    assert_eq!(stack.transport.sent_requests(Method::Ack).len(), 2);

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
    assert!(received_at.elapsed() >= Duration::from_secs(32));
    assert_eq!(stack.transport.sent_requests(Method::Invite).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invite_success_moves_to_accepted() {
    let mut stack = TestStack::new();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "UDP"))
        .await
        .unwrap();
    stack.provider.send_request(&key).await.unwrap();
    stack.settle().await;

    let invite = only_sent(&stack.transport, Method::Invite);
    stack
        .inject(response_to(&invite, StatusCode::RINGING, Some("314159")), remote())
        .await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::ProvisionalResponse { .. }))
        .await;

    let ok = response_to(&invite, StatusCode::OK, Some("314159"));
    stack.inject(ok.clone(), remote()).await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::SuccessResponse { .. }))
        .await;
    stack.settle().await;
    assert_eq!(stack.provider.transaction_state(&key).await.unwrap(), TransactionState::Accepted);

    // Retransmitted 2xx still reaches the TU, which owns the ACK
    stack.inject(ok, remote()).await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::SuccessResponse { .. }))
        .await;
    assert!(stack.transport.sent_requests(Method::Ack).is_empty());

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_non_invite_retransmits_at_t2_after_provisional() {
    let mut stack = TestStack::new();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Options, "UDP"))
        .await
        .unwrap();
    stack.provider.send_request(&key).await.unwrap();
    stack.settle().await;

    let options = only_sent(&stack.transport, Method::Options);
    stack.inject(response_to(&options, StatusCode::TRYING, None), remote()).await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::ProvisionalResponse { .. }))
        .await;
    stack.settle().await;
    assert_eq!(stack.provider.transaction_state(&key).await.unwrap(), TransactionState::Proceeding);

    tokio::time::sleep(Duration::from_millis(9_000)).await;
    let sends = stack.transport.sent_requests(Method::Options);
    let offsets: Vec<_> = sends.iter().map(|s| s.at - sends[0].at).collect();
    assert_eq!(sends.len(), 4, "sent at {:?}", offsets);
    assert!(close_to(offsets[1], 500));
    assert!(close_to(offsets[2], 4_500));
    assert!(close_to(offsets[3], 8_500));

    stack
        .inject(response_to(&options, StatusCode::OK, Some("a6c85cf")), remote())
        .await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::SuccessResponse { .. }))
        .await;
    let completed_at = Instant::now();

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
    assert!(close_to(completed_at.elapsed(), 5_000), "timer K after {:?}", completed_at.elapsed());
    assert_eq!(stack.transport.sent_requests(Method::Options).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_non_invite_timer_f() {
    let mut stack = TestStack::new();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Register, "UDP"))
        .await
        .unwrap();
    let start = Instant::now();
    stack.provider.send_request(&key).await.unwrap();

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTimeout { .. }))
        .await;
    assert!(close_to(start.elapsed(), 32_000));
    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_terminates_transaction() {
    let mut stack = TestStack::new();
    stack.transport.fail_sends.store(true, Ordering::SeqCst);

    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "UDP"))
        .await
        .unwrap();
    stack.provider.send_request(&key).await.unwrap();

    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransportError { transaction_id } if *transaction_id == key))
        .await;
    match stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await
    {
        TransactionEvent::TransactionTerminated { transaction_id, is_server } => {
            assert_eq!(transaction_id, key);
            assert!(!is_server);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(stack.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_pending_invite() {
    let mut stack = TestStack::new();
    let invite_key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "UDP"))
        .await
        .unwrap();
    stack.provider.send_request(&invite_key).await.unwrap();
    stack.settle().await;

    let invite = only_sent(&stack.transport, Method::Invite);
    stack
        .inject(response_to(&invite, StatusCode::RINGING, Some("5x8y")), remote())
        .await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::ProvisionalResponse { .. }))
        .await;

    let cancel_key = stack.provider.cancel(&invite_key).await.unwrap();
    assert_eq!(cancel_key.branch(), invite_key.branch());
    assert_eq!(cancel_key.method(), &Method::Cancel);
    stack.settle().await;

    let cancel = only_sent(&stack.transport, Method::Cancel);
    assert_eq!(cancel.uri, invite.uri);
    assert_eq!(cancel.top_via().and_then(Via::branch), invite.top_via().and_then(Via::branch));
    assert_eq!(cancel.call_id(), invite.call_id());
    assert_eq!(cancel.cseq(), Some(&CSeq::new(1, Method::Cancel)));
    assert_eq!(cancel.from(), invite.from());
    assert_eq!(cancel.to(), invite.to());

    // Both transactions take their own responses
    stack.inject(response_to(&cancel, StatusCode::OK, Some("5x8y")), remote()).await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::SuccessResponse { transaction_id, .. } if *transaction_id == cancel_key))
        .await;
    stack
        .inject(response_to(&invite, StatusCode::REQUEST_TERMINATED, Some("5x8y")), remote())
        .await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::FailureResponse { transaction_id, .. } if *transaction_id == invite_key))
        .await;
    stack.settle().await;

    assert!(matches!(
        stack.provider.cancel(&invite_key).await,
        Err(Error::InvalidState(_))
    ));
    assert!(stack.provider.cancel(&cancel_key).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reliable_transport_skips_retransmissions() {
    let mut stack = TestStack::reliable();
    let key = stack
        .provider
        .create_client_transaction(outgoing_request(Method::Invite, "TCP"))
        .await
        .unwrap();
    stack.provider.send_request(&key).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(stack.transport.sent_requests(Method::Invite).len(), 1);

    let invite = only_sent(&stack.transport, Method::Invite);
    stack
        .inject(response_to(&invite, StatusCode::DECLINE, Some("x1")), remote())
        .await;
    stack
        .wait_for(|e| matches!(e, TransactionEvent::FailureResponse { .. }))
        .await;
    let received_at = Instant::now();

    // No Timer D over a reliable transport
    stack
        .wait_for(|e| matches!(e, TransactionEvent::TransactionTerminated { .. }))
        .await;
    assert!(received_at.elapsed() < Duration::from_millis(10));
    assert_eq!(stack.transport.sent_requests(Method::Ack).len(), 1);
}
