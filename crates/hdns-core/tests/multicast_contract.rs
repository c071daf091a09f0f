//! Contract Test: Shared Stream Fan-Out
//!
//! Constraints verified:
//! - Every subscriber receives each payload, over one shared connection
//! - Late subscribers start with the most recent payload
//! - The last subscriber leaving closes the socket; a new one reconnects
//! - A terminal error reaches each subscriber exactly once

mod common;

use common::*;
use hdns_core::error::StreamError;
use hdns_core::{ConnectionState, StreamEvent};
use serde_json::json;
use tokio_stream::StreamExt;

#[tokio::test(start_paused = true)]
async fn every_subscriber_receives_each_payload() {
    let (connector, mut peers) = ScriptedConnector::new([Script::Accept]);
    let client = client(connector.clone(), exact_config(None));
    let (handle, _events) = client
        .open::<serde_json::Value, serde_json::Value>("stream/record", &[])
        .unwrap();
    let mut a = handle.messages();
    let mut b = handle.messages();

    let peer = next_peer(&mut peers).await;
    peer.push_json(json!([1]));
    peer.push_json(json!([1, 2]));

    for subscriber in [&mut a, &mut b] {
        assert_eq!(subscriber.next().await, Some(Ok(json!([1]))));
        assert_eq!(subscriber.next().await, Some(Ok(json!([1, 2]))));
    }
    assert_eq!(connector.attempts(), 1, "subscribers share one connection");
    handle.close();
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_starts_with_latest_payload() {
    let (connector, mut peers) = ScriptedConnector::new([Script::Accept]);
    let client = client(connector, exact_config(None));
    let (handle, _events) = client
        .open::<serde_json::Value, serde_json::Value>("stream/address", &[])
        .unwrap();
    let mut early = handle.messages();

    let peer = next_peer(&mut peers).await;
    peer.push_json(json!({ "ip": "192.0.2.1" }));
    peer.push_json(json!({ "ip": "192.0.2.2" }));
    early.next().await;
    early.next().await;
    assert_eq!(handle.latest(), Some(json!({ "ip": "192.0.2.2" })));

    let mut late = handle.messages();
    assert_eq!(late.next().await, Some(Ok(json!({ "ip": "192.0.2.2" }))));

    peer.push_json(json!({ "ip": "192.0.2.3" }));
    assert_eq!(late.next().await, Some(Ok(json!({ "ip": "192.0.2.3" }))));
    assert_eq!(early.next().await, Some(Ok(json!({ "ip": "192.0.2.3" }))));
    handle.close();
}

#[tokio::test(start_paused = true)]
async fn last_unsubscribe_goes_idle_and_resubscribe_reconnects() {
    let (connector, mut peers) = ScriptedConnector::new([Script::Accept, Script::Accept]);
    let client = client(connector.clone(), exact_config(None));
    let (handle, mut events) = client
        .open::<serde_json::Value, serde_json::Value>("stream/record", &[])
        .unwrap();

    let first = handle.messages();
    let first_peer = next_peer(&mut peers).await;
    first_peer.push_json(json!(["a"]));
    wait_for(&mut events, |e| *e == StreamEvent::MessageReceived).await;

    drop(first);
    wait_for(&mut events, |e| *e == StreamEvent::Idle).await;
    assert!(first_peer.is_closed());
    assert_eq!(*handle.state().borrow(), ConnectionState::Idle);

    let mut second = handle.messages();
    assert_eq!(second.next().await, Some(Ok(json!(["a"]))), "replays latest");
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, StreamEvent::ConnectAttempt { .. })).await,
        StreamEvent::ConnectAttempt { attempt: 0 }
    );

    let second_peer = next_peer(&mut peers).await;
    second_peer.push_json(json!(["b"]));
    assert_eq!(second.next().await, Some(Ok(json!(["b"]))));
    assert_eq!(connector.attempts(), 2);
    handle.close();
}

#[tokio::test(start_paused = true)]
async fn terminal_error_reaches_each_subscriber_once() {
    let connector = ScriptedConnector::refusing();
    let client = client(connector, exact_config(Some(0)));
    let (handle, mut events) = client
        .open::<serde_json::Value, serde_json::Value>("stream/address", &[])
        .unwrap();
    let mut a = handle.messages();
    let mut b = handle.messages();

    wait_for(&mut events, |e| matches!(e, StreamEvent::TerminalFailure { .. })).await;

    for subscriber in [&mut a, &mut b] {
        assert!(matches!(
            subscriber.next().await,
            Some(Err(StreamError::RetriesExhausted { attempts: 0, .. }))
        ));
        assert!(subscriber.next().await.is_none());
    }

    let mut after = handle.messages();
    assert!(after.next().await.is_none(), "terminated stream yields nothing");
}
