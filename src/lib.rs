//! Login-gated chat relay over newline-delimited TCP
//!
//! This library provides a small multi-client chat server and a companion
//! client. Every connection must authenticate with `#login <id>` before it
//! may participate; authenticated lines are rebroadcast to all connected
//! clients as `"<id> > <message>"`. Both sides interpret `#`-prefixed console
//! commands locally instead of sending them over the wire.

pub mod client;
pub mod error;
pub mod link;
pub mod server;

pub use client::{ChatClient, ClientConfig};
pub use error::{RelayError, Result};
pub use link::{ClientLink, LinkEvent};
pub use server::{ChatServer, Router, ServerConfig};

/// Port used when none is configured or given on the command line
pub const DEFAULT_PORT: u16 = 5555;

/// Leading character that marks a console line as a command
pub const COMMAND_MARKER: char = '#';

/// Wire token that starts a login attempt
pub const LOGIN_COMMAND: &str = "#login";

/// Local display sink for console-facing notices.
///
/// Both the operator console and the client console report through this
/// trait, so tests can swap in a recording sink.
pub trait ConsoleSink: Send + Sync {
    /// Show one message to the local user
    fn display(&self, message: &str);
}

/// Console sink that prints to stdout
pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn display(&self, message: &str) {
        println!("> {}", message);
    }
}

/// What the console loop should do after a line has been dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleOutcome {
    /// Keep reading console input
    Continue,
    /// Terminate the process
    Quit,
}
