//! TCP accept loop and listening lifecycle
//!
//! Each accepted connection gets one reader task and one writer task; the
//! writer drains the link's outbound channel onto the socket, the reader
//! feeds received lines to the [`Router`]. The accept loop itself runs in
//! its own task so the operator console can stop and restart listening
//! without touching established connections.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::link::{ClientLink, LinkEvent};
use crate::server::Router;
use crate::{ConsoleSink, DEFAULT_PORT};

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Line-oriented chat server.
///
/// Owns the router, the configured port, and the accept-loop task while
/// listening. The operator console mutates it through the command
/// dispatcher.
pub struct ChatServer {
    port: u16,
    router: Arc<Router>,
    console: Arc<dyn ConsoleSink>,
    accept_task: Option<JoinHandle<()>>,
}

impl ChatServer {
    /// Create a server with the given configuration and console sink
    pub fn new(config: ServerConfig, console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            port: config.port,
            router: Arc::new(Router::new(Arc::clone(&console))),
            console,
            accept_task: None,
        }
    }

    /// Currently configured port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Change the port. Callers must not be listening; the command
    /// dispatcher enforces that.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Whether the accept loop is currently running
    pub fn is_listening(&self) -> bool {
        self.accept_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// The message router shared with all connection tasks
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The operator-facing display sink
    pub fn console(&self) -> &Arc<dyn ConsoleSink> {
        &self.console
    }

    /// Bind the listener and start accepting connections.
    ///
    /// When configured with port 0 the OS-assigned port is adopted, so
    /// `port()` afterwards reports the real one.
    pub async fn listen(&mut self) -> Result<()> {
        if self.is_listening() {
            return Err(RelayError::config("server is already listening"));
        }

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| RelayError::network(format!("failed to bind port {}: {}", self.port, e)))?;
        self.port = listener
            .local_addr()
            .map_err(|e| RelayError::network(format!("failed to read local address: {}", e)))?
            .port();

        self.router.listening_started(self.port);

        let router = Arc::clone(&self.router);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, router)));
        Ok(())
    }

    /// Stop accepting new connections. Established connections remain.
    pub async fn stop_listening(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            // Wait for the task to drop so the listener socket is released
            // before the port can be rebound.
            let _ = task.await;
            self.router.listening_stopped();
        }
    }

    /// Stop listening and disconnect every current client
    pub async fn close(&mut self) {
        self.stop_listening().await;
        self.router.disconnect_all().await;
    }
}

/// Accept connections until the task is aborted
async fn accept_loop(listener: TcpListener, router: Arc<Router>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "accepted connection");
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    handle_connection(stream, router).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
            }
        }
    }
}

/// Run one connection to completion.
///
/// The writer task resolves first when the link is closed from the server
/// side; the reader resolving first means the peer went away (EOF or
/// transport error).
async fn handle_connection(stream: TcpStream, router: Arc<Router>) {
    let addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            debug!(error = %e, "connection vanished before setup");
            return;
        }
    };

    let (read_half, mut write_half) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let link = Arc::new(ClientLink::new(addr, outbound_tx));
    router.register(Arc::clone(&link)).await;

    let mut write_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match event {
                LinkEvent::Line(line) => {
                    if write_half.write_all(line.as_bytes()).await.is_err()
                        || write_half.write_all(b"\n").await.is_err()
                    {
                        break;
                    }
                }
                LinkEvent::Close => break,
            }
        }
        // Dropping the write half here sends FIN to the peer
    });

    let errored = read_lines(read_half, &link, &router, &mut write_task).await;
    write_task.abort();

    if errored {
        router.connection_lost(&link).await;
    } else {
        router.client_closed(&link).await;
    }
}

/// Feed received lines to the router until the connection ends.
///
/// Returns true when the connection ended on a transport error rather than
/// a clean EOF or server-side close.
async fn read_lines(
    read_half: OwnedReadHalf,
    link: &Arc<ClientLink>,
    router: &Arc<Router>,
    write_task: &mut JoinHandle<()>,
) -> bool {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            // Writer finished: the link was closed or the socket broke while
            // writing. Stop reading so the connection can be torn down.
            _ = &mut *write_task => return false,
            next = lines.next_line() => match next {
                Ok(Some(line)) => router.handle_line(link, &line).await,
                Ok(None) => {
                    debug!(link = %link.id(), "peer closed the connection");
                    return false;
                }
                Err(e) => {
                    debug!(link = %link.id(), error = %e, "read failed");
                    return true;
                }
            },
        }
    }
}
