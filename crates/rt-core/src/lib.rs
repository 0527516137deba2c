//! rt-core: Core abstractions and configuration for relayterm
//!
//! This crate provides the error taxonomy, configuration structures, the
//! transport seam and the shared domain types used by the client engine
//! and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::RtError;
pub use traits::{Credential, Transport, TransportFactory, TransportMode};
pub use types::{FileEntry, FileInfo, HostFacts, SessionInfo, SessionStatus, SignalType, StreamState};
