//! Server side of the chat relay
//!
//! The [`Router`] holds the per-connection login state machine and the
//! broadcast fan-out; the [`ChatServer`] owns the TCP accept loop and the
//! listening lifecycle; the console module dispatches operator commands.

pub mod console;
pub mod listener;
pub mod router;

pub use console::{handle_console_line, ServerCommand};
pub use listener::{ChatServer, ServerConfig};
pub use router::Router;
