//! Concrete relay transport

mod tcp;

pub use tcp::{TcpRelayFactory, TcpRelayTransport};
