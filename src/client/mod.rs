//! Chat client: connection lifecycle and server relay
//!
//! The client forwards non-command user input to the server and relays every
//! line received from the server to the local display sink. Connection
//! target (host, port) is mutable only while disconnected; the console
//! module enforces that.

pub mod console;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::{ConsoleSink, DEFAULT_PORT, LOGIN_COMMAND};

pub use console::{handle_user_line, ClientCommand};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server host to connect to
    pub host: String,
    /// Server port to connect on
    pub port: u16,
    /// Identifier sent as `#login <id>` right after connecting, when set
    pub login_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            login_id: None,
        }
    }
}

/// One open connection to the server.
///
/// Dropping this unwinds both socket tasks: the writer sees its channel
/// close and drops the write half, the reader then reports the resulting
/// EOF through the display sink.
struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    reader_task: JoinHandle<()>,
}

/// Line-oriented chat client
pub struct ChatClient {
    host: String,
    port: u16,
    login_id: Option<String>,
    console: Arc<dyn ConsoleSink>,
    connection: Option<Connection>,
}

impl ChatClient {
    /// Create a client with the given configuration and display sink
    pub fn new(config: ClientConfig, console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            host: config.host,
            port: config.port,
            login_id: config.login_id,
            console,
            connection: None,
        }
    }

    /// Currently configured host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Currently configured port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Change the host. Callers must be disconnected; the command
    /// dispatcher enforces that.
    pub fn set_host<T: Into<String>>(&mut self, host: T) {
        self.host = host.into();
    }

    /// Change the port. Same caller contract as [`ChatClient::set_host`].
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// The user-facing display sink
    pub fn console(&self) -> &Arc<dyn ConsoleSink> {
        &self.console
    }

    /// Whether an open connection to the server exists.
    ///
    /// A connection the server has since dropped counts as disconnected even
    /// before the user runs `#logoff`.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| !c.outbound.is_closed())
            .unwrap_or(false)
    }

    /// Open the connection to the configured host and port.
    ///
    /// Spawns the reader task that relays server lines to the display sink,
    /// and sends the login line when a login identifier is configured.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(RelayError::connection("already connected"));
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                RelayError::connection(format!(
                    "could not reach {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;
        info!(host = %self.host, port = self.port, "connected to server");

        let (read_half, mut write_half) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let write_task = tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                {
                    break;
                }
            }
        });

        let console = Arc::clone(&self.console);
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => console.display(&line),
                    Ok(None) => {
                        console.display("Connection to server has been closed.");
                        break;
                    }
                    Err(e) => {
                        debug!(error = %e, "read from server failed");
                        console.display("The connection to server has been lost.");
                        break;
                    }
                }
            }
            write_task.abort();
        });

        self.connection = Some(Connection {
            outbound: outbound_tx,
            reader_task,
        });

        if let Some(id) = self.login_id.clone() {
            self.send(&format!("{} {}", LOGIN_COMMAND, id))?;
        }
        Ok(())
    }

    /// Send one line to the server
    pub fn send(&self, line: &str) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| RelayError::connection("not connected to server"))?;
        connection
            .outbound
            .send(line.to_string())
            .map_err(|_| RelayError::connection("connection to server is gone"))
    }

    /// Close the connection.
    ///
    /// Dropping the outbound channel makes the writer task drop the socket;
    /// the reader task then reports the close through the display sink.
    pub fn close_connection(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(_) => {
                info!("disconnected from server");
                Ok(())
            }
            None => Err(RelayError::connection("not connected")),
        }
    }

    /// Terminate the client: close the connection if one is open
    pub fn quit(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader_task.abort();
        }
    }
}
