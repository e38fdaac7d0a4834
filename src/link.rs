//! Per-connection link handle shared between the router and the socket tasks
//!
//! The socket itself lives inside the per-connection reader/writer tasks; the
//! router only ever sees a [`ClientLink`]. Outbound traffic goes through an
//! unbounded channel drained by the writer task, so a slow or dead peer never
//! blocks the sender.

use std::net::SocketAddr;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Outbound instruction consumed by a link's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Deliver one line to the peer (newline appended on the wire)
    Line(String),
    /// Stop writing and drop the socket
    Close,
}

/// Handle for one live client connection.
///
/// A connection is unauthenticated while its login attribute is unset and
/// authenticated once it is set. The attribute can be bound exactly once;
/// [`ClientLink::bind_login`] refuses a second bind.
#[derive(Debug)]
pub struct ClientLink {
    id: Uuid,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<LinkEvent>,
    login_id: RwLock<Option<String>>,
}

impl ClientLink {
    /// Create a new link backed by the given outbound channel
    pub fn new(addr: SocketAddr, outbound: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            outbound,
            login_id: RwLock::new(None),
        }
    }

    /// Unique identity of this connection
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote peer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Login identifier, if this connection has authenticated
    pub async fn login_id(&self) -> Option<String> {
        self.login_id.read().await.clone()
    }

    /// Check whether the login attribute has been bound
    pub async fn is_authenticated(&self) -> bool {
        self.login_id.read().await.is_some()
    }

    /// Bind the login identifier.
    ///
    /// Fails without overwriting if an identifier is already bound; the
    /// identifier is immutable for the life of the connection.
    pub async fn bind_login(&self, id: &str) -> Result<()> {
        let mut login = self.login_id.write().await;
        if login.is_some() {
            return Err(RelayError::auth("login ID already bound"));
        }
        *login = Some(id.to_string());
        Ok(())
    }

    /// Queue one line for delivery to the peer
    pub fn send(&self, line: &str) -> Result<()> {
        self.outbound
            .send(LinkEvent::Line(line.to_string()))
            .map_err(|_| RelayError::connection("link writer is gone"))
    }

    /// Ask the writer task to drop the socket.
    ///
    /// Lines queued before the close are still flushed. Closing is
    /// unilateral; there is no drain of inbound traffic.
    pub fn close(&self) {
        let _ = self.outbound.send(LinkEvent::Close);
    }
}
