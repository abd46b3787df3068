use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A connected realtime client.
///
/// The sender side of an unbounded channel; the WebSocket task owns the
/// receiver and relays everything onto the wire. Dropping the receiver (on
/// disconnect) makes later sends fail silently, which is the intended
/// fire-and-forget behavior.
#[derive(Debug)]
pub struct Session {
    /// Connection identifier, unique per WebSocket.
    pub id: Uuid,
    /// Outbound message channel for this client.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Tracks open realtime sessions and fans broadcast events out to them.
///
/// The session set is owned here and nothing else touches it. Broadcasts to
/// different sessions are independent: a slow client only backs up its own
/// channel. Within one session, events arrive in broadcast order. There is
/// no replay: clients that connect after a broadcast never see it.
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionManager {
    /// Creates an empty, shareable manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Adds a newly connected session.
    pub async fn register(&self, session: Session) {
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        tracing::info!(connection_id = %id, "Realtime session opened");
    }

    /// Removes a session after its client disconnects.
    pub async fn unregister(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
        tracing::info!(connection_id = %id, "Realtime session closed");
    }

    /// Sends a named event to every currently open session.
    ///
    /// Send failures (client already gone) are ignored; the session is
    /// cleaned up by its own connection task.
    pub async fn broadcast(&self, event: &str, payload: &serde_json::Value) {
        let envelope = serde_json::json!({
            "event": event,
            "payload": payload,
        })
        .to_string();

        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let _ = session.tx.send(envelope.clone());
        }
        tracing::debug!(event, recipients = sessions.len(), "Broadcast delivered");
    }

    /// Number of currently open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
