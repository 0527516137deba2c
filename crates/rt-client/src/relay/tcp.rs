//! Relay transport over plain TCP
//!
//! Every connection carries length-prefixed frames (see
//! `rt_protocol::frame`). A stream gets a connection of its own; unary
//! calls share one lazily opened connection that is re-established after
//! any failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

use rt_core::config::RelayConfig;
use rt_core::error::TransportError;
use rt_core::traits::{InboundStream, OutboundStream};
use rt_core::{Credential, Transport, TransportFactory, TransportMode};
use rt_protocol::{
    CallMetadata, ClientMessage, FrameCodec, LegacyClientMessage, RpcEnvelope, RpcRequest,
    RpcResponse, ServerMessage, WireFormat, WireMessage,
};

type CallConnection = Framed<TcpStream, FrameCodec<RpcEnvelope, RpcResponse>>;

async fn dial(address: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let connect_error = |reason: String| TransportError::Connect {
        address: address.to_string(),
        reason,
    };

    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| connect_error(format!("timed out after {:?}", timeout)))?
        .map_err(|e| connect_error(e.to_string()))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Drain `outbound` into the socket until it ends or the socket fails
async fn pump<M, S>(write: OwnedWriteHalf, outbound: S)
where
    M: WireMessage + Send + 'static,
    S: Stream<Item = M> + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(write, FrameCodec::<M, ServerMessage>::new());
    let mut outbound = outbound;

    while let Some(message) = outbound.next().await {
        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "Relay stream write failed");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "Relay stream shutdown failed");
    }
}

/// Relay reached over TCP
pub struct TcpRelayTransport {
    address: String,
    connect_timeout: Duration,
    wire_format: WireFormat,
    metadata: CallMetadata,
    calls: Mutex<Option<CallConnection>>,
}

impl TcpRelayTransport {
    /// Transport for `config`; nothing is dialled until first use
    pub fn new(config: &RelayConfig, client_version: impl Into<String>) -> Self {
        Self {
            address: config.address.clone(),
            connect_timeout: config.connect_timeout,
            wire_format: config.wire_format,
            metadata: CallMetadata {
                api_key: config.api_key.clone(),
                client_version: client_version.into(),
            },
            calls: Mutex::new(None),
        }
    }

    /// Transport with its call connection already established
    pub async fn connect(
        config: &RelayConfig,
        client_version: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let transport = Self::new(config, client_version);
        let stream = dial(&transport.address, transport.connect_timeout).await?;
        *transport.calls.lock().await = Some(Framed::new(stream, FrameCodec::new()));
        Ok(transport)
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for TcpRelayTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }

    fn metadata(&self) -> CallMetadata {
        self.metadata.clone()
    }

    async fn open_stream(&self, outbound: OutboundStream) -> Result<InboundStream, TransportError> {
        let stream = dial(&self.address, self.connect_timeout).await?;
        let (read, write) = stream.into_split();
        tracing::debug!(address = %self.address, format = ?self.wire_format, "Relay stream opened");

        match self.wire_format {
            WireFormat::Tagged => {
                tokio::spawn(pump(write, outbound));
            }
            WireFormat::Legacy => {
                tokio::spawn(pump(write, outbound.map(LegacyClientMessage::from)));
            }
        }

        let inbound = FramedRead::new(read, FrameCodec::<ClientMessage, ServerMessage>::new())
            .map(|frame| frame.map_err(TransportError::from));
        Ok(inbound.boxed())
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        let mut calls = self.calls.lock().await;
        if calls.is_none() {
            let stream = dial(&self.address, self.connect_timeout).await?;
            *calls = Some(Framed::new(stream, FrameCodec::new()));
        }
        let Some(connection) = calls.as_mut() else {
            return Err(TransportError::Closed);
        };

        let name = request.name();
        let envelope = RpcEnvelope {
            metadata: self.metadata.clone(),
            request,
        };

        let result = match connection.send(envelope).await {
            Ok(()) => match connection.next().await {
                Some(Ok(response)) => Ok(response),
                Some(Err(e)) => Err(TransportError::from(e)),
                None => Err(TransportError::Closed),
            },
            Err(e) => Err(TransportError::from(e)),
        };

        if let Err(e) = &result {
            tracing::debug!(request = name, error = %e, "Relay call failed; dropping connection");
            *calls = None;
        }
        result
    }
}

/// Opens independent relay connections with a given credential
pub struct TcpRelayFactory {
    config: RelayConfig,
    client_version: String,
}

impl TcpRelayFactory {
    pub fn new(config: RelayConfig, client_version: impl Into<String>) -> Self {
        Self {
            config,
            client_version: client_version.into(),
        }
    }
}

#[async_trait]
impl TransportFactory for TcpRelayFactory {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError> {
        let config = RelayConfig {
            api_key: Some(credential.expose().to_string()),
            ..self.config.clone()
        };
        let transport = TcpRelayTransport::connect(&config, self.client_version.clone()).await?;
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_protocol::{ClientPayload, ServerPayload, SessionId};
    use tokio::net::TcpListener;

    fn relay_config(address: String) -> RelayConfig {
        RelayConfig {
            address,
            api_key: Some("key-1".to_string()),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_call_carries_metadata() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, FrameCodec::<RpcResponse, RpcEnvelope>::new());
            let envelope = framed.next().await.unwrap().unwrap();
            framed.send(RpcResponse::Ok).await.unwrap();
            envelope
        });

        let transport = TcpRelayTransport::new(&relay_config(address), "test");
        let response = transport
            .call(RpcRequest::CloseSession {
                session_id: SessionId::new("s1"),
            })
            .await
            .unwrap();
        assert_eq!(response, RpcResponse::Ok);

        let envelope = server.await.unwrap();
        assert_eq!(envelope.metadata.api_key.as_deref(), Some("key-1"));
        assert_eq!(envelope.request.name(), "close_session");
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed =
                Framed::new(socket, FrameCodec::<ServerMessage, ClientMessage>::new());
            let first = framed.next().await.unwrap().unwrap();
            framed
                .send(ServerMessage::new(SessionId::new("s1"), ServerPayload::SessionStarted))
                .await
                .unwrap();
            first
        });

        let transport = TcpRelayTransport::new(&relay_config(address), "test");
        let outbound = futures::stream::iter(vec![ClientMessage::new(
            SessionId::new("s1"),
            "s1-1".to_string(),
            ClientPayload::Heartbeat,
        )])
        .chain(futures::stream::pending())
        .boxed();

        let mut inbound = transport.open_stream(outbound).await.unwrap();
        let message = inbound.next().await.unwrap().unwrap();
        assert_eq!(message.payload, ServerPayload::SessionStarted);

        let first = server.await.unwrap();
        assert_eq!(first.payload, ClientPayload::Heartbeat);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpRelayTransport::connect(&relay_config(address), "test").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
