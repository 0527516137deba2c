//! Transport traits
//!
//! A transport is how the client reaches a remote session. The relay
//! transport carries both the long-lived bidirectional stream and unary
//! calls; a local transport (co-located agent) only answers unary calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use rt_protocol::{CallMetadata, ClientMessage, RpcRequest, RpcResponse, ServerMessage};

/// Outbound half handed to `Transport::open_stream`
pub type OutboundStream = BoxStream<'static, ClientMessage>;

/// Inbound half returned by `Transport::open_stream`
pub type InboundStream = BoxStream<'static, Result<ServerMessage, TransportError>>;

/// Kind of transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Remote relay; supports streaming
    Relay,
    /// Co-located agent; unary calls only
    Local,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Relay => write!(f, "relay"),
            TransportMode::Local => write!(f, "local"),
        }
    }
}

/// Abstraction over a connection to the relay or a local agent
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which kind of transport this is
    fn mode(&self) -> TransportMode;

    /// Whether `open_stream` is supported
    fn is_streaming(&self) -> bool {
        self.mode() == TransportMode::Relay
    }

    /// Authentication metadata attached to every call
    fn metadata(&self) -> CallMetadata;

    /// Open a bidirectional stream
    ///
    /// The transport drains `outbound` in order until it ends; ending it is
    /// how the caller signals end-of-output.
    async fn open_stream(&self, outbound: OutboundStream) -> Result<InboundStream, TransportError>;

    /// Issue one request/response call
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError>;
}

/// Secret used to establish fresh authenticated connections
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an API key
    pub fn api_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Creates independent, freshly authenticated transports
///
/// Split transfers open one connection per part so that no single
/// connection exceeds the relay's per-connection byte cap.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Establish a new connection
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacted() {
        let credential = Credential::api_key("secret-key");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert_eq!(credential.expose(), "secret-key");
    }

    #[test]
    fn test_transport_mode_display() {
        assert_eq!(TransportMode::Relay.to_string(), "relay");
        assert_eq!(TransportMode::Local.to_string(), "local");
    }
}
