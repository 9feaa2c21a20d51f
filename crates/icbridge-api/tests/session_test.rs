#![allow(clippy::unwrap_used)]

use std::time::Duration;

use icbridge_api::codec::RequestCommand;
use icbridge_api::{Error, Message, Request, Session, SessionConfig, SessionEvent, SessionState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, SessionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = SessionConfig {
        port,
        reconnect_delay: Duration::from_millis(50),
        login_timeout: Duration::from_millis(100),
        ..SessionConfig::new("127.0.0.1")
    };
    (listener, config)
}

async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

#[tokio::test]
async fn delivers_split_lines_and_writes_requests() {
    let (listener, config) = listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();

        write
            .write_all(br#"{"command":"NotifyList","response":"200","objectList":[{"objn"#)
            .await
            .unwrap();
        write.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        write
            .write_all(b"am\":\"C0001\",\"params\":{\"STATUS\":\"ON\"}}]}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str::<serde_json::Value>(&line).unwrap()
    });

    let (session, mut events) = Session::connect(config, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.generation(), 1);

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Connected { generation: 1 }
    ));

    match next_event(&mut events).await {
        SessionEvent::Message {
            generation,
            message: Message::Changes { changes, .. },
        } => {
            assert_eq!(generation, 1);
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].object_id, "C0001");
            assert_eq!(changes[0].params["STATUS"], "ON");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let request = Request::hardware_definition("CIRCUITS");
    let id = request.message_id.clone();
    session.send(request);

    let received = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received["command"], RequestCommand::GetQuery.as_ref());
    assert_eq!(received["messageID"], id.as_str());
    assert_eq!(received["arguments"], "CIRCUITS");

    session.close().await;
}

#[tokio::test]
async fn undecodable_line_is_reported_and_skipped() {
    let (listener, config) = listener().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket
            .write_all(b"not json\n{\"command\":\"SetParamList\",\"response\":\"200\",\"messageID\":\"m\"}\n")
            .await
            .unwrap();
        tokio::time::sleep(WAIT).await;
    });

    let (session, mut events) = Session::connect(config, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected { .. }));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::DecodeFailed {
            error: Error::Decode { .. },
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Message {
            message: Message::Acknowledged { .. },
            ..
        }
    ));

    session.close().await;
}

#[tokio::test]
async fn reconnects_after_close_with_new_generation() {
    let (listener, config) = listener().await;

    tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        let (_second, _) = listener.accept().await.unwrap();
        tokio::time::sleep(WAIT).await;
    });

    let (session, mut events) = Session::connect(config, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Connected { generation: 1 }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected { generation: 1, .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Connected { generation: 2 }
    ));
    assert_eq!(session.generation(), 2);
    assert_eq!(session.state(), SessionState::Connected);

    session.close().await;
}

#[tokio::test]
async fn shutdown_stops_reconnecting() {
    let (listener, config) = listener().await;

    tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        tokio::time::sleep(WAIT).await;
    });

    let cancel = CancellationToken::new();
    let (session, mut events) = Session::connect(config, cancel.clone()).await.unwrap();
    let mut state = session.state_changes();

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected { .. }));
    cancel.cancel();

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == SessionState::Closed))
        .await
        .unwrap()
        .unwrap();
    session.close().await;
}

#[tokio::test]
async fn refused_connection_fails_inline() {
    let (listener, config) = listener().await;
    drop(listener);

    let err = Session::connect(config, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transient(), "unexpected error: {err}");
}

#[tokio::test]
async fn close_flushes_queued_requests() {
    let (listener, config) = listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let mut received = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            received.push(value["messageID"].as_str().unwrap().to_owned());
        }
        received
    });

    let (session, mut events) = Session::connect(config, CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected { .. }));

    let first = Request::set_param("C0003", "STATUS", "ON");
    let second = Request::set_param("p0101", "SPEED", "2250");
    let expected = vec![first.message_id.clone(), second.message_id.clone()];
    session.send(first);
    session.send(second);
    session.close().await;

    let received = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, expected);
}
