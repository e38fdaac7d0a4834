//! Operator console command grammar and dispatch
//!
//! Lines typed at the server console starting with the command marker are
//! parsed against a closed command set; anything else is displayed locally
//! as a server message and never forwarded to clients.

use crate::server::ChatServer;
use crate::{ConsoleOutcome, COMMAND_MARKER};

/// Commands available on the server operator console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Close the server and terminate the process
    Quit,
    /// Stop accepting new connections; existing ones remain
    Stop,
    /// Stop listening and disconnect all current clients
    Close,
    /// Change the listening port; argument still unvalidated
    SetPort(Option<String>),
    /// Start listening on the configured port
    Start,
    /// Report the configured port
    GetPort,
    /// Anything starting with the marker that matches no command
    Unknown(String),
}

impl ServerCommand {
    /// Parse an operator line.
    ///
    /// Returns `None` when the line does not start with the command marker;
    /// such lines are not commands at all. Command names are
    /// case-insensitive.
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with(COMMAND_MARKER) {
            return None;
        }
        let mut tokens = line.split_whitespace();
        let name = tokens.next().unwrap_or("").to_lowercase();
        Some(match name.as_str() {
            "#quit" => ServerCommand::Quit,
            "#stop" => ServerCommand::Stop,
            "#close" => ServerCommand::Close,
            "#setport" => ServerCommand::SetPort(tokens.next().map(str::to_string)),
            "#start" => ServerCommand::Start,
            "#getport" => ServerCommand::GetPort,
            _ => ServerCommand::Unknown(name),
        })
    }
}

/// Dispatch one operator console line against the server.
///
/// Usage errors are reported to the console and never mutate state; only
/// `#quit` asks the console loop to terminate the process.
pub async fn handle_console_line(server: &mut ChatServer, line: &str) -> ConsoleOutcome {
    let Some(command) = ServerCommand::parse(line) else {
        server
            .console()
            .display(&format!("SERVER MESSAGE > {}", line));
        return ConsoleOutcome::Continue;
    };

    match command {
        ServerCommand::Quit => {
            server.close().await;
            return ConsoleOutcome::Quit;
        }
        ServerCommand::Stop => {
            server.stop_listening().await;
        }
        ServerCommand::Close => {
            server.close().await;
            server.console().display("The server has shut down.");
        }
        ServerCommand::SetPort(arg) => {
            if server.is_listening() {
                server
                    .console()
                    .display("Error: Stop the server before setting the port.");
            } else {
                match arg.as_deref().map(str::parse::<u16>) {
                    None => server.console().display("Usage: #setport <port>"),
                    Some(Err(_)) => server.console().display("Error: Port must be a number."),
                    Some(Ok(port)) => {
                        server.set_port(port);
                        server.console().display(&format!("Port set to {}", port));
                    }
                }
            }
        }
        ServerCommand::Start => {
            if server.is_listening() {
                server.console().display("Error: Server already running.");
            } else if server.listen().await.is_err() {
                server
                    .console()
                    .display("Error: Server could not be started.");
            }
        }
        ServerCommand::GetPort => {
            server
                .console()
                .display(&format!("Server port: {}", server.port()));
        }
        ServerCommand::Unknown(name) => {
            server
                .console()
                .display(&format!("Unknown command: {}", name));
        }
    }

    ConsoleOutcome::Continue
}
