//! Interactive terminal over a live stream

use std::io::Write;

use anyhow::{Context as _, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::{mpsc, watch};

use rt_client::terminal::local_size;
use rt_client::{RawModeGuard, TerminalStream};
use rt_protocol::SessionId;

use super::{Context, EXIT_FAILURE};
use crate::output::{print_error, print_info, print_success, print_warning};

/// Why the interactive loop ended
enum Exit {
    Detach,
    Closed(String),
}

/// Start a new session, or attach to `session`, and hand the local
/// terminal to it until Ctrl+] or the session ends
pub async fn connect_command(ctx: &Context, session: Option<&str>) -> Result<u8> {
    let mut config = ctx.config().stream.clone();
    config.initial_size = local_size(config.initial_size);
    let timeout = config.connect_timeout;

    let (closed_tx, mut closed_rx) = watch::channel(None::<String>);
    let stream = TerminalStream::new(ctx.transport(), config)
        .on_output(|data| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(&data);
            let _ = stdout.flush();
        })
        .on_error(|failure| tracing::warn!(code = %failure.code, fatal = failure.fatal, "{}", failure.message))
        .on_disconnect(move |reason| {
            let _ = closed_tx.send(Some(reason.to_string()));
        });

    let started = match session {
        Some(session) => {
            print_info(&format!("Attaching to session {}...", session));
            stream.attach(SessionId::new(session), timeout).await
        }
        None => {
            print_info("Starting a new session...");
            stream.connect(timeout).await
        }
    };
    let session_id = match started {
        Ok(session_id) => session_id,
        Err(e) => {
            print_error(&e.to_string());
            return Ok(EXIT_FAILURE);
        }
    };
    print_info(&format!("Connected to {} (Press Ctrl+] to detach)", session_id));

    let exit = {
        let _guard = RawModeGuard::acquire()
            .and_then(RawModeGuard::alternate_screen)
            .context("Failed to enter raw mode")?;
        run_interactive(&stream, &mut closed_rx).await
    };

    match exit {
        Exit::Detach => {
            stream.detach();
            print_success(&format!(
                "Detached from {}; reattach with `relayterm connect --session {}`",
                session_id, session_id
            ));
            Ok(0)
        }
        Exit::Closed(reason) => {
            print_warning(&format!("Session ended: {}", reason));
            Ok(0)
        }
    }
}

/// Forward keys and resizes until detach or disconnect
async fn run_interactive(
    stream: &TerminalStream,
    closed_rx: &mut watch::Receiver<Option<String>>,
) -> Exit {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let reader = tokio::task::spawn_blocking(move || {
        while !event_tx.is_closed() {
            if event::poll(std::time::Duration::from_millis(10)).unwrap_or(false) {
                match event::read() {
                    Ok(evt) => {
                        if event_tx.blocking_send(evt).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Terminal event read failed");
                        break;
                    }
                }
            }
        }
    });

    let exit = loop {
        tokio::select! {
            Some(evt) = event_rx.recv() => match evt {
                Event::Key(KeyEvent { code, modifiers, kind, .. }) if kind != KeyEventKind::Release => {
                    // Ctrl+] arrives as ']' or, from the raw 0x1d byte, as '5'
                    if modifiers.contains(KeyModifiers::CONTROL)
                        && matches!(code, KeyCode::Char(']') | KeyCode::Char('5'))
                    {
                        break Exit::Detach;
                    }
                    let data = key_to_bytes(code, modifiers);
                    if !data.is_empty() {
                        if let Err(e) = stream.send_input(data).await {
                            break Exit::Closed(e.to_string());
                        }
                    }
                }
                Event::Paste(text) => {
                    if let Err(e) = stream.send_input(text.into_bytes()).await {
                        break Exit::Closed(e.to_string());
                    }
                }
                Event::Resize(cols, rows) => {
                    if let Err(e) = stream.send_resize(cols, rows).await {
                        tracing::warn!(error = %e, "Resize not sent");
                    }
                }
                _ => {}
            },

            changed = closed_rx.changed() => {
                let reason = match changed {
                    Ok(()) => closed_rx.borrow().clone(),
                    Err(_) => None,
                };
                break Exit::Closed(reason.unwrap_or_else(|| "stream ended".to_string()));
            }
        }
    };

    drop(event_rx);
    if let Err(e) = reader.await {
        tracing::debug!(error = %e, "Terminal event reader ended abnormally");
    }
    exit
}

/// Convert a key event to the bytes a terminal would send
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    match code {
        Char(c) if modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
            // Ctrl+A = 0x01 ... Ctrl+Z = 0x1a
            vec![(c.to_ascii_lowercase() as u8) - b'a' + 1]
        }
        Char(c) if modifiers.contains(KeyModifiers::ALT) => {
            let mut bytes = vec![0x1b];
            bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
            bytes
        }
        Char(c) => c.to_string().into_bytes(),
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => b"\x1b[Z".to_vec(),
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => b"\x1b[A".to_vec(),
        Down => b"\x1b[B".to_vec(),
        Right => b"\x1b[C".to_vec(),
        Left => b"\x1b[D".to_vec(),
        Home => b"\x1b[H".to_vec(),
        End => b"\x1b[F".to_vec(),
        PageUp => b"\x1b[5~".to_vec(),
        PageDown => b"\x1b[6~".to_vec(),
        Delete => b"\x1b[3~".to_vec(),
        Insert => b"\x1b[2~".to_vec(),
        F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => vec![],
        },
        _ => vec![],
    }
}
