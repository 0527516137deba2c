//! Core trait definitions

mod transport;

pub use transport::{Credential, InboundStream, OutboundStream, Transport, TransportFactory, TransportMode};
