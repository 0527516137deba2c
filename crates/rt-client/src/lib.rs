//! rt-client: Client engine for relayterm
//!
//! Talks to a remote terminal session through a relay that limits both
//! idle time and bytes per connection:
//!
//! - [`TerminalStream`] keeps a long-lived bidirectional stream alive with
//!   heartbeats and dispatches inbound messages to listeners.
//! - [`TerminalService`] issues unary calls and runs one-shot commands
//!   through the marker protocol when no stream is available.
//! - [`DownloadService`] copies remote files with chunked reads, splitting
//!   large files into parts fetched over separate connections.

mod calls;
pub mod download;
pub mod exec;
pub mod relay;
pub mod service;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod transfer;

pub use download::{DownloadMetrics, DownloadResult, DownloadService};
pub use exec::ExecOutcome;
pub use relay::{TcpRelayFactory, TcpRelayTransport};
pub use service::TerminalService;
pub use session::SessionResolver;
pub use stream::handlers::{HistoryPage, StatusChange, StreamFailure};
pub use stream::metrics::StreamMetrics;
pub use stream::{TerminalStream, DETACHED_REASON};
pub use terminal::RawModeGuard;
pub use transfer::{ProgressFn, TransferEngine, TransferStats};
