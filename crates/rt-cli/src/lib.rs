//! rt-cli: Command-line interface for relayterm
//!
//! Provides the `relayterm` binary: interactive terminals, one-shot
//! commands, downloads and session listings against a relay.

pub mod commands;
pub mod output;
