//! In-memory relay used by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;

use rt_core::error::TransportError;
use rt_core::traits::{InboundStream, OutboundStream};
use rt_core::{Credential, Transport, TransportFactory, TransportMode};
use rt_protocol::{
    CallMetadata, ClientMessage, ClientPayload, RpcRequest, RpcResponse, ServerMessage,
    ServerPayload, SessionId, SessionRecord,
};

pub type Responder = Arc<dyn Fn(&RpcRequest) -> Result<RpcResponse, TransportError> + Send + Sync>;

type InboundSender = mpsc::UnboundedSender<Result<ServerMessage, TransportError>>;

/// Records what the client sends and answers as the test dictates
pub struct MockRelay {
    mode: TransportMode,
    /// Answer every register with `SessionStarted`
    auto_ack: bool,
    responder: Responder,
    /// Requests that are accepted but never answered
    stall: Arc<dyn Fn(&RpcRequest) -> bool + Send + Sync>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    inbound: Arc<Mutex<Option<InboundSender>>>,
    calls: Mutex<Vec<RpcRequest>>,
    streams_opened: AtomicUsize,
}

impl MockRelay {
    pub fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            auto_ack: false,
            responder: Arc::new(|_| Ok(RpcResponse::Ok)),
            stall: Arc::new(|_| false),
            sent: Arc::default(),
            inbound: Arc::default(),
            calls: Mutex::new(Vec::new()),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// Streaming relay that acknowledges every registration
    pub fn cooperative() -> Arc<Self> {
        Arc::new(Self::new(TransportMode::Relay).auto_ack(true))
    }

    /// Streaming relay that never acknowledges
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::new(TransportMode::Relay))
    }

    pub fn auto_ack(mut self, enabled: bool) -> Self {
        self.auto_ack = enabled;
        self
    }

    pub fn respond(
        mut self,
        f: impl Fn(&RpcRequest) -> Result<RpcResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(f);
        self
    }

    /// Never answer requests matching `f`
    pub fn stall_when(mut self, f: impl Fn(&RpcRequest) -> bool + Send + Sync + 'static) -> Self {
        self.stall = Arc::new(f);
        self
    }

    /// Everything the client's pump has emitted so far
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_payloads(&self) -> Vec<ClientPayload> {
        self.sent().into_iter().map(|m| m.payload).collect()
    }

    pub fn calls(&self) -> Vec<RpcRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    /// Deliver a message on the current stream
    pub fn push(&self, payload: ServerPayload) {
        self.push_result(Ok(ServerMessage::new(SessionId::new("mock"), payload)));
    }

    pub fn push_result(&self, message: Result<ServerMessage, TransportError>) {
        let inbound = self.inbound.lock().unwrap();
        let tx = inbound.as_ref().expect("no stream open");
        tx.unbounded_send(message).expect("stream receiver dropped");
    }

    /// End the current inbound stream
    pub fn hang_up(&self) {
        self.inbound.lock().unwrap().take();
    }
}

#[async_trait]
impl Transport for MockRelay {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    fn metadata(&self) -> CallMetadata {
        CallMetadata::with_api_key("test-key", "test")
    }

    async fn open_stream(&self, mut outbound: OutboundStream) -> Result<InboundStream, TransportError> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded();
        *self.inbound.lock().unwrap() = Some(tx);

        let inbound = Arc::clone(&self.inbound);
        let sent = Arc::clone(&self.sent);
        let auto_ack = self.auto_ack;
        tokio::spawn(async move {
            while let Some(message) = outbound.next().await {
                if auto_ack && matches!(message.payload, ClientPayload::Register(_)) {
                    let ack = ServerMessage::new(message.session_id.clone(), ServerPayload::SessionStarted);
                    if let Some(tx) = inbound.lock().unwrap().as_ref() {
                        let _ = tx.unbounded_send(Ok(ack));
                    }
                }
                sent.lock().unwrap().push(message);
            }
        });

        Ok(rx.boxed())
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        if (self.stall)(&request) {
            return futures::future::pending().await;
        }
        (self.responder)(&request)
    }
}

/// Hands out transports built by a closure and counts connections
pub struct MockFactory {
    build: Box<dyn Fn(usize) -> Arc<MockRelay> + Send + Sync>,
    connects: AtomicUsize,
    credentials: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new(build: impl Fn(usize) -> Arc<MockRelay> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            build: Box::new(build),
            connects: AtomicUsize::new(0),
            credentials: Mutex::new(Vec::new()),
        })
    }

    /// Factory that must never be used
    pub fn unused() -> Arc<Self> {
        Self::new(|_| Arc::new(MockRelay::new(TransportMode::Relay)))
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        let transport: Arc<dyn Transport> = (self.build)(n);
        Ok(transport)
    }
}

pub fn record(session_id: &str, hostname: &str) -> SessionRecord {
    SessionRecord {
        session_id: SessionId::new(session_id),
        machine_hostname: hostname.to_string(),
        machine_name: hostname.to_string(),
        status: "connected".to_string(),
        os: "linux".to_string(),
        agent_version: "1.0.0".to_string(),
        heartbeat_age_seconds: 1,
        has_shell: true,
        shell: "/bin/bash".to_string(),
        working_directory: "/home/test".to_string(),
        connected_at: 1_700_000_000,
    }
}

/// Let spawned tasks run
pub async fn flush() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
