//! rt-protocol: Wire protocol for relayterm
//!
//! This crate defines the messages exchanged between the client engine and
//! the relay: the long-lived terminal stream (client and server halves),
//! the unary request/response calls used when no stream is available, and
//! the length-prefixed frame format that carries both.

pub mod codec;
pub mod compat;
pub mod error;
pub mod frame;
pub mod message;
pub mod rpc;
pub mod session;

pub use codec::{FrameCodec, WireMessage};
pub use compat::{LegacyClientMessage, LegacyPayload, WireFormat};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{
    ClientMessage, ClientPayload, MessageKind, RegisterRequest, ServerMessage, ServerPayload,
    TerminalSize, PROTOCOL_VERSION,
};
pub use rpc::{
    CallMetadata, DirEntry, RemoteFileInfo, RpcEnvelope, RpcErrorCode, RpcRequest, RpcResponse,
    SessionLookup, SessionRecord,
};
pub use session::SessionId;
