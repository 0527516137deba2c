//! Terminal stream lifecycle tests against an in-memory relay

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use rt_client::{StreamFailure, TerminalStream, DETACHED_REASON};
use rt_core::config::StreamConfig;
use rt_core::error::{StreamError, TransportError};
use rt_core::{HostFacts, StreamState, TransportMode};
use rt_protocol::{ClientPayload, ServerPayload, SessionId, TerminalSize};

use common::{flush, MockRelay};

const TIMEOUT: Duration = Duration::from_secs(5);

fn host() -> HostFacts {
    HostFacts {
        hostname: "workstation".to_string(),
        platform: "linux".to_string(),
        username: "dev".to_string(),
        home_dir: "/home/dev".to_string(),
    }
}

fn stream_over(relay: &Arc<MockRelay>) -> TerminalStream {
    TerminalStream::with_host(relay.clone(), StreamConfig::default(), host())
}

/// Disconnect reasons in call order
fn record_disconnects(stream: TerminalStream) -> (TerminalStream, Arc<Mutex<Vec<String>>>) {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    let stream = stream.on_disconnect(move |reason| sink.lock().unwrap().push(reason.to_string()));
    (stream, reasons)
}

#[tokio::test]
async fn test_connect_registers_and_reaches_connected() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);

    let session_id = stream.connect(TIMEOUT).await.unwrap();
    assert_eq!(stream.state(), StreamState::Connected);
    assert_eq!(stream.session_id(), Some(session_id.clone()));

    flush().await;
    let sent = relay.sent();
    let ClientPayload::Register(request) = &sent[0].payload else {
        panic!("first message should register, got {:?}", sent[0].payload);
    };
    assert_eq!(request.hostname, "workstation");
    assert_eq!(request.initial_size, TerminalSize::new(80, 24));
    assert!(!request.version.ends_with("-attach"));
    assert_eq!(sent[0].message_id, format!("{}-1", session_id));
    assert!(stream.metrics().connected_at.is_some());
}

#[tokio::test]
async fn test_connect_rejects_local_transport() {
    let relay = Arc::new(MockRelay::new(TransportMode::Local));
    let stream = stream_over(&relay);

    let err = stream.connect(TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::StreamingUnsupported(TransportMode::Local)
    ));
    assert_eq!(relay.streams_opened(), 0);
    assert_eq!(stream.state(), StreamState::Idle);
}

#[tokio::test]
async fn test_connect_twice_is_invalid() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    stream.connect(TIMEOUT).await.unwrap();

    let err = stream.connect(TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::InvalidState {
            operation: "connect",
            state: StreamState::Connected
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_moves_to_error() {
    let relay = MockRelay::silent();
    let stream = stream_over(&relay);

    let err = stream.connect(Duration::from_secs(2)).await.unwrap_err();
    match err {
        StreamError::Timeout {
            operation, after, ..
        } => {
            assert_eq!(operation, "connect");
            assert_eq!(after, Duration::from_secs(2));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(stream.state(), StreamState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_attach_unknown_session_times_out_with_hint() {
    let relay = MockRelay::silent();
    let stream = stream_over(&relay);

    let err = stream
        .attach(SessionId::new("made-up"), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("agent may have disconnected"));
}

#[tokio::test]
async fn test_resize_encodes_one_message_when_connected() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    stream.connect(TIMEOUT).await.unwrap();

    for (cols, rows) in [(1, 1), (120, 40), (u16::MAX, 300)] {
        let before = relay.sent().len();
        stream.send_resize(cols, rows).await.unwrap();
        flush().await;

        let sent = relay.sent_payloads();
        assert_eq!(sent.len(), before + 1);
        let payload = sent.last().unwrap();
        assert_eq!(payload, &ClientPayload::Resize(TerminalSize::new(cols, rows)));
        assert_eq!(
            payload.status_reason(),
            Some(format!("resize:{}x{}", cols, rows))
        );
    }
}

#[tokio::test]
async fn test_sends_fail_when_not_connected() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);

    assert!(matches!(
        stream.send_resize(80, 24).await,
        Err(StreamError::NotConnected(StreamState::Idle))
    ));
    assert!(matches!(
        stream.send_input("ls\n").await,
        Err(StreamError::NotConnected(StreamState::Idle))
    ));

    stream.connect(TIMEOUT).await.unwrap();
    stream.close("done");

    assert!(matches!(
        stream.send_signal(2).await,
        Err(StreamError::NotConnected(StreamState::Closed))
    ));
    assert!(matches!(
        stream.request_history(10, 0).await,
        Err(StreamError::NotConnected(StreamState::Closed))
    ));
}

#[tokio::test]
async fn test_input_is_sequenced_and_counted() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    stream.connect(TIMEOUT).await.unwrap();

    stream.send_input("echo hi\n").await.unwrap();
    stream.send_input(Bytes::from_static(b"exit\n")).await.unwrap();
    flush().await;

    let inputs: Vec<_> = relay
        .sent_payloads()
        .into_iter()
        .filter_map(|p| match p {
            ClientPayload::Input { data, sequence } => Some((data, sequence)),
            _ => None,
        })
        .collect();
    assert_eq!(
        inputs,
        vec![
            (Bytes::from_static(b"echo hi\n"), 0),
            (Bytes::from_static(b"exit\n"), 1)
        ]
    );

    let metrics = stream.metrics();
    assert_eq!(metrics.messages_sent, 2);
    assert_eq!(metrics.bytes_sent, 13);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));
    stream.connect(TIMEOUT).await.unwrap();

    for _ in 0..5 {
        stream.close("user quit");
    }
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(*reasons.lock().unwrap(), vec!["user quit".to_string()]);
}

#[tokio::test]
async fn test_close_from_idle() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));

    stream.close("never started");
    stream.close("again");
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_close_from_listener() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    let handle = stream.clone();
    let stream = stream.on_output(move |_| handle.close("closed by listener"));
    let (stream, reasons) = record_disconnects(stream);
    stream.connect(TIMEOUT).await.unwrap();

    relay.push(ServerPayload::Output {
        data: Bytes::from_static(b"bye"),
        sequence: 0,
    });
    flush().await;

    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(
        *reasons.lock().unwrap(),
        vec!["closed by listener".to_string()]
    );
}

#[tokio::test]
async fn test_detach_then_reattach() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));
    let session_id = stream.connect(TIMEOUT).await.unwrap();

    assert_eq!(stream.detach(), Some(session_id.clone()));
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(*reasons.lock().unwrap(), vec![DETACHED_REASON.to_string()]);
    flush().await;
    assert_eq!(relay.sent_payloads().last(), Some(&ClientPayload::Detach));

    // Fresh instance, same session
    let again = stream_over(&relay);
    let attached = again.attach(session_id.clone(), TIMEOUT).await.unwrap();
    assert_eq!(attached, session_id);
    assert_eq!(again.state(), StreamState::Connected);

    flush().await;
    let registers: Vec<_> = relay
        .sent()
        .into_iter()
        .filter_map(|m| match m.payload {
            ClientPayload::Register(request) => Some((m.session_id, request.version)),
            _ => None,
        })
        .collect();
    assert_eq!(registers.len(), 2);
    assert_eq!(registers[1].0, session_id);
    assert!(registers[1].1.ends_with("-attach"));
    assert_eq!(again.metrics().reconnect_attempts, 0);

    // The detached instance itself may re-attach as well
    stream.attach(session_id, TIMEOUT).await.unwrap();
    assert!(stream.is_connected());
    assert_eq!(stream.metrics().reconnect_attempts, 1);
}

#[tokio::test]
async fn test_detach_before_start_returns_none() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));

    assert_eq!(stream.detach(), None);
    assert_eq!(stream.state(), StreamState::Idle);
    assert!(reasons.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_attach_while_connected_is_invalid() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    let session_id = stream.connect(TIMEOUT).await.unwrap();

    let err = stream.attach(session_id, TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::InvalidState {
            operation: "attach",
            state: StreamState::Connected
        }
    ));
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_wait_ready() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);

    assert!(matches!(
        stream.wait_ready(TIMEOUT).await,
        Err(StreamError::InvalidState {
            state: StreamState::Idle,
            ..
        })
    ));

    stream.connect(TIMEOUT).await.unwrap();
    stream.wait_ready(TIMEOUT).await.unwrap();

    stream.close("done");
    assert!(stream.wait_ready(TIMEOUT).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_when_idle() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    stream.connect(TIMEOUT).await.unwrap();

    let keepalive = StreamConfig::default().keepalive_interval;
    tokio::time::sleep(keepalive * 2 - Duration::from_secs(1)).await;

    assert!(relay.sent_payloads().contains(&ClientPayload::Heartbeat));
    assert!(stream.metrics().heartbeats_sent >= 1);
    assert!(stream.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_receive_error_while_registering_fails_fast() {
    let relay = MockRelay::silent();
    let stream = stream_over(&relay);

    let started = tokio::time::Instant::now();
    let pending = tokio::spawn({
        let stream = stream.clone();
        async move { stream.connect(TIMEOUT).await }
    });
    flush().await;
    assert_eq!(stream.state(), StreamState::Registering);

    relay.push_result(Err(TransportError::Closed));
    let err = pending.await.unwrap().unwrap_err();

    assert!(
        matches!(err, StreamError::Transport(TransportError::Closed)),
        "{err:?}"
    );
    assert!(started.elapsed() < TIMEOUT);
    assert_eq!(stream.state(), StreamState::Error);
    assert_eq!(stream.metrics().errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hang_up_while_registering_fails_fast() {
    let relay = MockRelay::silent();
    let stream = stream_over(&relay);

    let started = tokio::time::Instant::now();
    let pending = tokio::spawn({
        let stream = stream.clone();
        async move { stream.attach(SessionId::new("remote-1"), TIMEOUT).await }
    });
    flush().await;

    relay.hang_up();
    let err = pending.await.unwrap().unwrap_err();

    assert!(matches!(err, StreamError::Transport(TransportError::Closed)), "{err:?}");
    assert!(started.elapsed() < TIMEOUT);
    assert_eq!(stream.state(), StreamState::Error);
}

#[tokio::test]
async fn test_ping_is_answered() {
    let relay = MockRelay::cooperative();
    let stream = stream_over(&relay);
    stream.connect(TIMEOUT).await.unwrap();

    relay.push(ServerPayload::Ping);
    flush().await;

    assert_eq!(relay.sent_payloads().last(), Some(&ClientPayload::Heartbeat));
    assert_eq!(stream.metrics().heartbeats_sent, 1);
}

#[tokio::test]
async fn test_output_and_history_reach_listeners() {
    let relay = MockRelay::cooperative();
    let output = Arc::new(Mutex::new(Vec::new()));
    let history = Arc::new(Mutex::new(Vec::new()));
    let (out, hist) = (Arc::clone(&output), Arc::clone(&history));

    let stream = stream_over(&relay)
        .on_output(move |data| out.lock().unwrap().extend_from_slice(&data))
        .on_history(move |page| hist.lock().unwrap().extend(page.commands.clone()));
    stream.connect(TIMEOUT).await.unwrap();

    for chunk in [&b"hello "[..], b"world"] {
        relay.push(ServerPayload::Output {
            data: Bytes::copy_from_slice(chunk),
            sequence: 0,
        });
    }
    relay.push(ServerPayload::History {
        commands: vec!["ls".to_string(), "pwd".to_string()],
        total: 2,
    });
    relay.push(ServerPayload::Unknown { kind: 0x7f });
    flush().await;

    assert_eq!(output.lock().unwrap().as_slice(), b"hello world");
    assert_eq!(*history.lock().unwrap(), vec!["ls", "pwd"]);
    assert_eq!(stream.metrics().messages_received, 5);
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_listener_panic_does_not_stop_dispatch() {
    let relay = MockRelay::cooperative();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let stream = stream_over(&relay).on_output(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("listener failure");
        }
    });
    stream.connect(TIMEOUT).await.unwrap();

    for n in 0..3 {
        relay.push(ServerPayload::Output {
            data: Bytes::from(format!("line {n}")),
            sequence: n,
        });
    }
    flush().await;

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_session_closed_by_relay() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));
    stream.connect(TIMEOUT).await.unwrap();

    relay.push(ServerPayload::SessionClosed {
        reason: "agent exited".to_string(),
    });
    flush().await;

    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(*reasons.lock().unwrap(), vec!["agent exited".to_string()]);
}

#[tokio::test]
async fn test_relay_hang_up_closes_stream() {
    let relay = MockRelay::cooperative();
    let (stream, reasons) = record_disconnects(stream_over(&relay));
    stream.connect(TIMEOUT).await.unwrap();

    relay.hang_up();
    flush().await;

    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(
        *reasons.lock().unwrap(),
        vec!["stream ended by relay".to_string()]
    );
}

#[tokio::test]
async fn test_receive_error_is_fatal_when_connected() {
    let relay = MockRelay::cooperative();
    let failures: Arc<Mutex<Vec<StreamFailure>>> = Arc::default();
    let sink = Arc::clone(&failures);
    let stream = stream_over(&relay).on_error(move |failure| sink.lock().unwrap().push(failure.clone()));
    stream.connect(TIMEOUT).await.unwrap();

    relay.push_result(Err(TransportError::Closed));
    flush().await;

    assert_eq!(stream.state(), StreamState::Error);
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].fatal);
    assert_eq!(failures[0].code, "STREAM_ERROR");
    assert_eq!(stream.metrics().errors, 1);
}
