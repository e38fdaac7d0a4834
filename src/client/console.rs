//! Client console command grammar and dispatch
//!
//! Mirrors the server's marker convention: `#`-prefixed lines are local
//! commands and never reach the wire; everything else is forwarded to the
//! server verbatim.

use tracing::debug;

use crate::client::ChatClient;
use crate::{ConsoleOutcome, COMMAND_MARKER};

/// Commands available on the client console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Close the connection if open, then terminate the process
    Quit,
    /// Close the connection without terminating
    Logoff,
    /// Change the server host; argument still unvalidated
    SetHost(Option<String>),
    /// Change the server port; argument still unvalidated
    SetPort(Option<String>),
    /// Open the connection to the configured host and port
    Login,
    /// Report the configured host
    GetHost,
    /// Report the configured port
    GetPort,
    /// Anything starting with the marker that matches no command
    Unknown(String),
}

impl ClientCommand {
    /// Parse a user line.
    ///
    /// Returns `None` when the line does not start with the command marker;
    /// such lines are chat payload. Command names are case-insensitive.
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with(COMMAND_MARKER) {
            return None;
        }
        let mut tokens = line.split_whitespace();
        let name = tokens.next().unwrap_or("").to_lowercase();
        Some(match name.as_str() {
            "#quit" => ClientCommand::Quit,
            "#logoff" => ClientCommand::Logoff,
            "#sethost" => ClientCommand::SetHost(tokens.next().map(str::to_string)),
            "#setport" => ClientCommand::SetPort(tokens.next().map(str::to_string)),
            "#login" => ClientCommand::Login,
            "#gethost" => ClientCommand::GetHost,
            "#getport" => ClientCommand::GetPort,
            _ => ClientCommand::Unknown(name),
        })
    }
}

/// Dispatch one user console line against the client.
///
/// Non-command lines go to the server; a failed send is the one path besides
/// `#quit` that terminates the client.
pub async fn handle_user_line(client: &mut ChatClient, line: &str) -> ConsoleOutcome {
    let Some(command) = ClientCommand::parse(line) else {
        if let Err(e) = client.send(line) {
            debug!(error = %e, "send to server failed");
            client
                .console()
                .display("Could not send message to server.  Terminating client.");
            client.quit();
            return ConsoleOutcome::Quit;
        }
        return ConsoleOutcome::Continue;
    };

    match command {
        ClientCommand::Quit => {
            client.quit();
            return ConsoleOutcome::Quit;
        }
        ClientCommand::Logoff => {
            if client.is_connected() {
                let _ = client.close_connection();
            } else {
                client
                    .console()
                    .display("Error: Client is not currently connected.");
            }
        }
        ClientCommand::SetHost(arg) => {
            if client.is_connected() {
                client
                    .console()
                    .display("Error: Cannot change host while connected.");
            } else {
                match arg {
                    None => client.console().display("Usage: #sethost <host>"),
                    Some(host) => {
                        client.set_host(host.clone());
                        client.console().display(&format!("Host set to {}", host));
                    }
                }
            }
        }
        ClientCommand::SetPort(arg) => {
            if client.is_connected() {
                client
                    .console()
                    .display("Error: Cannot change port while connected.");
            } else {
                match arg.as_deref().map(str::parse::<u16>) {
                    None => client.console().display("Usage: #setport <port>"),
                    Some(Err(_)) => client.console().display("Error: Port must be a number."),
                    Some(Ok(port)) => {
                        client.set_port(port);
                        client.console().display(&format!("Port set to {}", port));
                    }
                }
            }
        }
        ClientCommand::Login => {
            if client.is_connected() {
                client
                    .console()
                    .display("Error: Already connected to the server.");
            } else {
                match client.connect().await {
                    Ok(()) => client.console().display("Logged in to the server."),
                    Err(e) => client
                        .console()
                        .display(&format!("Error connecting to the server: {}", e)),
                }
            }
        }
        ClientCommand::GetHost => {
            client
                .console()
                .display(&format!("Current host: {}", client.host()));
        }
        ClientCommand::GetPort => {
            client
                .console()
                .display(&format!("Current port: {}", client.port()));
        }
        ClientCommand::Unknown(name) => {
            client
                .console()
                .display(&format!("Unknown command: {}", name));
        }
    }

    ConsoleOutcome::Continue
}
