use crate::connection::SessionManager;
use async_nats::jetstream::{
    self,
    consumer::{pull::Config as ConsumerConfig, AckPolicy},
    stream::{Config as StreamConfig, StorageType},
};
use edupath_core::{DomainEvent, EdupathError, EdupathResult};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Connection settings for the event bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Queue server URL, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
    /// Durable stream holding domain events.
    pub stream: String,
    /// Subject the stream captures, e.g. `edupath.events`.
    pub subject: String,
    /// Durable consumer name; reusing it resumes from the last ack.
    pub consumer: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_backoff: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream: "EDUPATH_EVENTS".to_string(),
            subject: "edupath.events".to_string(),
            consumer: "edupath-gateway".to_string(),
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

/// Long-lived consumer that drains the durable queue and rebroadcasts each
/// domain event to every open realtime session.
///
/// Messages are acknowledged after the local broadcast attempt, not after
/// client receipt: consumption from the queue is at-least-once, delivery to
/// clients is best-effort with no buffering. An event arriving while no
/// session is open is simply dropped after the broadcast.
pub struct EventBridge {
    config: BridgeConfig,
    sessions: Arc<SessionManager>,
}

impl EventBridge {
    /// Creates a bridge that fans out through `sessions`.
    pub fn new(config: BridgeConfig, sessions: Arc<SessionManager>) -> Self {
        Self { config, sessions }
    }

    /// Runs the consume loop forever.
    ///
    /// The queue is the sole channel for realtime alerts, so the bridge
    /// never gives up: every connection failure or stream end is followed
    /// by a fixed backoff and a fresh connection attempt. HTTP traffic is
    /// unaffected throughout.
    pub async fn run(self) {
        loop {
            info!(url = %self.config.url, "Connecting to message queue");
            match self.consume().await {
                Ok(()) => warn!("Queue message stream ended"),
                Err(e) => warn!(error = %e, "Queue connection lost"),
            }
            info!(
                backoff_secs = self.config.reconnect_backoff.as_secs(),
                "Scheduling queue reconnection"
            );
            tokio::time::sleep(self.config.reconnect_backoff).await;
        }
    }

    /// One connection lifetime: connect, assert the durable pieces, then
    /// consume until the stream errors or ends.
    async fn consume(&self) -> EdupathResult<()> {
        let client = async_nats::connect(&self.config.url)
            .await
            .map_err(|e| EdupathError::Queue(e.to_string()))?;
        let context = jetstream::new(client);

        // Idempotent: safe to repeat on every reconnect.
        let stream = context
            .get_or_create_stream(StreamConfig {
                name: self.config.stream.clone(),
                subjects: vec![self.config.subject.clone()],
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| EdupathError::Queue(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.consumer,
                ConsumerConfig {
                    durable_name: Some(self.config.consumer.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EdupathError::Queue(e.to_string()))?;

        info!(
            stream = %self.config.stream,
            consumer = %self.config.consumer,
            "Consuming domain events"
        );

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| EdupathError::Queue(e.to_string()))?;

        while let Some(next) = messages.next().await {
            let message = next.map_err(|e| EdupathError::Queue(e.to_string()))?;
            self.dispatch(&message.payload).await;
            // Ack after the broadcast attempt so a crash before this point
            // redelivers the message on reconnect.
            message
                .ack()
                .await
                .map_err(|e| EdupathError::Queue(e.to_string()))?;
        }

        Ok(())
    }

    /// Deserializes one queue payload and rebroadcasts it.
    ///
    /// Malformed payloads are logged and dropped; the caller still acks
    /// them, so a poison message can never stall the stream.
    async fn dispatch(&self, payload: &[u8]) {
        match serde_json::from_slice::<DomainEvent>(payload) {
            Ok(event) => {
                info!(event = %event.event, "Rebroadcasting domain event");
                self.sessions.broadcast(&event.event, &event.payload).await;
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed queue message");
            }
        }
    }
}
