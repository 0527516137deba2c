//! CLI command implementations

mod connect;
mod download;
mod exec;
mod sessions;

use std::sync::Arc;

use anyhow::Result;

use rt_client::{SessionResolver, TcpRelayFactory, TcpRelayTransport, TerminalService};
use rt_core::config::ClientConfig;
use rt_core::error::SessionError;
use rt_core::{Credential, Transport, TransportFactory};
use rt_protocol::SessionId;

use crate::output::print_error;

pub use connect::{connect_command, key_to_bytes};
pub use download::download_command;
pub use exec::exec_command;
pub use sessions::sessions_command;

/// Exit code for local timeouts and errors
pub const EXIT_FAILURE: u8 = 255;

/// Exit code after a local Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// Client version reported to the relay
pub fn client_version() -> String {
    concat!("relayterm-", env!("CARGO_PKG_VERSION")).to_string()
}

/// Loaded configuration plus the relay transport built from it
pub struct Context {
    config: ClientConfig,
    transport: Arc<TcpRelayTransport>,
}

impl Context {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(TcpRelayTransport::new(&config.relay, client_version()));
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Factory for the fresh per-part connections of split transfers
    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(TcpRelayFactory::new(self.config.relay.clone(), client_version()))
    }

    pub fn credential(&self) -> Option<Credential> {
        self.config.relay.api_key.clone().map(Credential::api_key)
    }

    pub fn terminal_service(&self) -> TerminalService {
        TerminalService::new(
            self.transport(),
            self.config.stream.clone(),
            self.config.exec.clone(),
        )
    }
}

/// Point `sessions` at a session: explicit id, else machine, else the
/// relay's most recently active session
pub(crate) async fn select_session(
    sessions: &SessionResolver,
    host: Option<&str>,
    session: Option<&str>,
) -> Result<SessionId> {
    if let Some(session) = session {
        let session_id = SessionId::new(session);
        sessions.set_session_id(session_id.clone());
        return Ok(session_id);
    }

    if let Some(host) = host {
        let info = match sessions.set_machine(host, true).await {
            Ok(info) => info,
            Err(e) => {
                report_session_error(&e);
                return Err(e.into());
            }
        };
        tracing::info!(hostname = %info.hostname, session_id = %info.session_id, "Using machine");
        return Ok(info.session_id);
    }

    match sessions.active_session(None).await? {
        Some(info) => {
            tracing::info!(hostname = %info.hostname, session_id = %info.session_id, "Using active session");
            sessions.set_session_id(info.session_id.clone());
            Ok(info.session_id)
        }
        None => {
            print_error("No active session; pass --host or --session");
            Err(SessionError::NoSession.into())
        }
    }
}

fn report_session_error(error: &SessionError) {
    match error {
        SessionError::Ambiguous {
            hostname,
            matches_count,
            hostnames,
        } => {
            print_error(&format!(
                "'{}' matches {} machines; be more specific:",
                hostname, matches_count
            ));
            for name in hostnames {
                eprintln!("  {}", name);
            }
        }
        other => print_error(&other.to_string()),
    }
}
