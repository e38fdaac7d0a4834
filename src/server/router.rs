//! Session state machine and broadcast fan-out
//!
//! The router owns the set of live links and decides, per incoming line,
//! whether it is a login attempt, an authenticated chat message, or a
//! protocol violation. Login is a strict prerequisite for relay: any
//! non-login traffic from an unauthenticated connection closes that
//! connection. Broadcast is unconditional fan-out to every live link, sender
//! included; a dead recipient is skipped without disturbing the rest.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::link::ClientLink;
use crate::{ConsoleSink, LOGIN_COMMAND};

/// Login-gated message router for the server side
pub struct Router {
    /// Live links indexed by link ID
    links: RwLock<HashMap<Uuid, Arc<ClientLink>>>,
    /// Operator-facing display sink
    console: Arc<dyn ConsoleSink>,
}

impl Router {
    /// Create a router reporting to the given console sink
    pub fn new(console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            console,
        }
    }

    /// Number of currently registered links
    pub async fn client_count(&self) -> usize {
        self.links.read().await.len()
    }

    /// Handle one line received from a link.
    ///
    /// Lines from a single link arrive here strictly in order (each link has
    /// one reader task); lines from different links may interleave freely.
    pub async fn handle_line(&self, link: &ClientLink, msg: &str) {
        let login = link.login_id().await;
        self.console.display(&format!(
            "Message received: {} from {}",
            msg,
            login.as_deref().unwrap_or("null")
        ));

        if msg.trim().starts_with(LOGIN_COMMAND) {
            self.handle_login(link, msg.trim()).await;
            return;
        }

        let Some(sender) = login else {
            let _ = link.send("ERROR - You are not logged in. Disconnecting.");
            link.close();
            return;
        };

        // The broadcast payload is the original line, only the sender label
        // is prefixed.
        self.broadcast(&format!("{} > {}", sender, msg)).await;
    }

    /// Process a `#login` line. Login lines are never broadcast.
    async fn handle_login(&self, link: &ClientLink, msg: &str) {
        let mut tokens = msg.split_whitespace();
        tokens.next(); // the #login token itself

        let Some(id) = tokens.next() else {
            let _ = link.send("ERROR: No login ID provided. Disconnecting client.");
            link.close();
            return;
        };

        // bind_login refuses a second bind, so the first identifier survives
        if link.bind_login(id).await.is_err() {
            let _ = link.send("ERROR: You are already logged in. Connection closing.");
            link.close();
            return;
        }

        info!(link = %link.id(), login = id, "client logged in");
        self.console.display(&format!("Client {} logged in", id));
        let _ = link.send(&format!("Login successful. Welcome {}.", id));
    }

    /// Send one line to every currently live link.
    ///
    /// Best-effort per recipient: a link whose writer task is gone is logged
    /// and skipped.
    pub async fn broadcast(&self, line: &str) {
        let links = self.links.read().await;
        for link in links.values() {
            if let Err(e) = link.send(line) {
                warn!(link = %link.id(), error = %e, "skipping broadcast to dead link");
            }
        }
    }

    /// Hook: the accept loop handed us a new connection
    pub async fn register(&self, link: Arc<ClientLink>) {
        debug!(link = %link.id(), peer = %link.addr(), "client connected");
        self.console
            .display("A new client has connected to the server.");
        self.links.write().await.insert(link.id(), link);
    }

    /// Hook: a connection ended normally (EOF or server-initiated close)
    pub async fn client_closed(&self, link: &ClientLink) {
        self.links.write().await.remove(&link.id());
        match link.login_id().await {
            Some(id) => {
                info!(link = %link.id(), login = %id, "client disconnected");
                self.console.display(&format!("{} has disconnected.", id));
            }
            None => {
                debug!(link = %link.id(), "client disconnected before login");
                self.console.display("An unidentified client has disconnected.");
            }
        }
    }

    /// Hook: a connection ended on a transport error.
    ///
    /// State-wise identical to a close, with a distinguishable notice.
    pub async fn connection_lost(&self, link: &ClientLink) {
        self.links.write().await.remove(&link.id());
        warn!(link = %link.id(), "client connection lost");
        self.console.display("A client's connection was lost");
    }

    /// Hook: the server started listening
    pub fn listening_started(&self, port: u16) {
        info!(port, "server listening");
        self.console.display(&format!(
            "Server listening for connections on port {}",
            port
        ));
    }

    /// Hook: the server stopped listening
    pub fn listening_stopped(&self) {
        info!("server stopped listening");
        self.console
            .display("Server has stopped listening for connections.");
    }

    /// Close every live link and forget them all
    pub async fn disconnect_all(&self) {
        let mut links = self.links.write().await;
        for link in links.values() {
            link.close();
        }
        links.clear();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::link::LinkEvent;
    use crate::test_support::RecordingConsole;

    fn test_router() -> (Router, Arc<RecordingConsole>) {
        let console = Arc::new(RecordingConsole::new());
        (Router::new(console.clone() as Arc<dyn ConsoleSink>), console)
    }

    fn test_link() -> (Arc<ClientLink>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(ClientLink::new("127.0.0.1:9999".parse().unwrap(), tx)),
            rx,
        )
    }

    /// Drain everything currently queued on a link
    fn drain(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn login_binds_identifier_and_replies() {
        let (router, console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;

        router.handle_line(&link, "#login alice").await;

        assert_eq!(link.login_id().await.as_deref(), Some("alice"));
        assert_eq!(
            drain(&mut rx),
            vec![LinkEvent::Line("Login successful. Welcome alice.".into())]
        );
        assert!(console.contains("Client alice logged in"));
    }

    #[tokio::test]
    async fn login_without_id_is_fatal_to_the_connection() {
        let (router, _console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;

        router.handle_line(&link, "#login").await;

        assert!(!link.is_authenticated().await);
        assert_eq!(
            drain(&mut rx),
            vec![
                LinkEvent::Line("ERROR: No login ID provided. Disconnecting client.".into()),
                LinkEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn second_login_closes_without_rebinding() {
        let (router, _console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;

        router.handle_line(&link, "#login alice").await;
        drain(&mut rx);
        router.handle_line(&link, "#login bob").await;

        assert_eq!(link.login_id().await.as_deref(), Some("alice"));
        assert_eq!(
            drain(&mut rx),
            vec![
                LinkEvent::Line("ERROR: You are already logged in. Connection closing.".into()),
                LinkEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn login_takes_only_the_second_token() {
        let (router, _console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;

        router.handle_line(&link, "#login alice extra tokens").await;

        assert_eq!(link.login_id().await.as_deref(), Some("alice"));
        assert_eq!(
            drain(&mut rx),
            vec![LinkEvent::Line("Login successful. Welcome alice.".into())]
        );
    }

    #[tokio::test]
    async fn unauthenticated_chat_is_rejected_and_not_broadcast() {
        let (router, _console) = test_router();
        let (anon, mut anon_rx) = test_link();
        let (other, mut other_rx) = test_link();
        router.register(Arc::clone(&anon)).await;
        router.register(Arc::clone(&other)).await;
        router.handle_line(&other, "#login bob").await;
        drain(&mut other_rx);

        router.handle_line(&anon, "hi").await;

        assert_eq!(
            drain(&mut anon_rx),
            vec![
                LinkEvent::Line("ERROR - You are not logged in. Disconnecting.".into()),
                LinkEvent::Close,
            ]
        );
        // No broadcast reached the logged-in client
        assert_eq!(drain(&mut other_rx), vec![]);
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_including_the_sender() {
        let (router, _console) = test_router();
        let (alice, mut alice_rx) = test_link();
        let (bob, mut bob_rx) = test_link();
        router.register(Arc::clone(&alice)).await;
        router.register(Arc::clone(&bob)).await;
        router.handle_line(&alice, "#login alice").await;
        router.handle_line(&bob, "#login bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        router.handle_line(&alice, "hello").await;

        let expected = LinkEvent::Line("alice > hello".into());
        assert_eq!(drain(&mut bob_rx), vec![expected.clone()]);
        // Fan-out includes the sender
        assert_eq!(drain(&mut alice_rx), vec![expected]);
    }

    #[tokio::test]
    async fn login_lines_are_never_broadcast() {
        let (router, _console) = test_router();
        let (alice, mut alice_rx) = test_link();
        let (bob, mut bob_rx) = test_link();
        router.register(Arc::clone(&alice)).await;
        router.register(Arc::clone(&bob)).await;
        router.handle_line(&alice, "#login alice").await;
        drain(&mut alice_rx);

        router.handle_line(&bob, "#login bob").await;

        assert_eq!(drain(&mut alice_rx), vec![]);
        drain(&mut bob_rx);
    }

    #[tokio::test]
    async fn dead_link_does_not_block_delivery_to_others() {
        let (router, console) = test_router();
        let (alice, mut alice_rx) = test_link();
        let (bob, bob_rx) = test_link();
        let (carol, mut carol_rx) = test_link();
        router.register(Arc::clone(&alice)).await;
        router.register(Arc::clone(&bob)).await;
        router.register(Arc::clone(&carol)).await;
        router.handle_line(&alice, "#login alice").await;
        router.handle_line(&bob, "#login bob").await;
        router.handle_line(&carol, "#login carol").await;
        drain(&mut alice_rx);
        drain(&mut carol_rx);

        // Bob's writer task is gone; his link is dead but still registered
        drop(bob_rx);
        router.handle_line(&alice, "still here?").await;

        let expected = LinkEvent::Line("alice > still here?".into());
        assert_eq!(drain(&mut alice_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut carol_rx), vec![expected]);

        // Once the hook fires, later broadcasts no longer see bob at all
        router.connection_lost(&bob).await;
        assert!(console.contains("A client's connection was lost"));
        assert_eq!(router.client_count().await, 2);
    }

    #[tokio::test]
    async fn disconnect_logs_the_bound_identifier() {
        let (router, console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;
        router.handle_line(&link, "#login alice").await;
        drain(&mut rx);

        router.client_closed(&link).await;

        assert!(console.contains("alice has disconnected."));
        assert_eq!(router.client_count().await, 0);
    }

    #[tokio::test]
    async fn disconnect_all_closes_every_link() {
        let (router, _console) = test_router();
        let (alice, mut alice_rx) = test_link();
        let (bob, mut bob_rx) = test_link();
        router.register(Arc::clone(&alice)).await;
        router.register(Arc::clone(&bob)).await;

        router.disconnect_all().await;

        assert_eq!(router.client_count().await, 0);
        assert_eq!(drain(&mut alice_rx), vec![LinkEvent::Close]);
        assert_eq!(drain(&mut bob_rx), vec![LinkEvent::Close]);
    }

    #[tokio::test]
    async fn every_received_line_is_reported_to_the_console() {
        let (router, console) = test_router();
        let (link, mut rx) = test_link();
        router.register(Arc::clone(&link)).await;

        router.handle_line(&link, "#login alice").await;
        router.handle_line(&link, "hello").await;
        drain(&mut rx);

        assert!(console.contains("Message received: #login alice from null"));
        assert!(console.contains("Message received: hello from alice"));
    }
}
