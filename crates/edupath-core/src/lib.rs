//! Core types and error definitions shared across the EduPath gateway crates.
//!
//! # Main types
//!
//! - [`EdupathError`] — Unified error enum for all gateway subsystems.
//! - [`EdupathResult`] — Convenience alias for `Result<T, EdupathError>`.
//! - [`DomainEvent`] — An asynchronous event consumed from the message queue
//!   and fanned out to realtime clients.
//! - [`UserProfile`] — The identity embedded in issued tokens and returned
//!   from the login route.

use serde::{Deserialize, Serialize};

/// Top-level error type for the EduPath gateway.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum EdupathError {
    /// An authentication or credential-verification failure.
    #[error("Auth error: {0}")]
    Auth(String),

    /// A failure while querying or registering with the discovery backend.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A resolved upstream service could not be reached or timed out.
    #[error("Upstream '{service}' unreachable: {detail}")]
    Upstream {
        /// Logical name of the service that failed.
        service: String,
        /// Underlying error string, safe to surface to callers.
        detail: String,
    },

    /// A failure in the message-queue connection or consumer.
    #[error("Queue error: {0}")]
    Queue(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// A convenience `Result` alias using [`EdupathError`].
pub type EdupathResult<T> = Result<T, EdupathError>;

/// A domain event delivered over the message queue.
///
/// The payload is opaque to the gateway: it is deserialized only far enough
/// to recover the event name, then rebroadcast verbatim to realtime clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event name, e.g. `"profile_alert"`.
    pub event: String,
    /// Arbitrary structured payload produced upstream.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Creates a new event with the given name and payload.
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// The identity carried by an issued credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable subject identifier.
    pub id: String,
    /// Display name shown in the dashboard.
    pub name: String,
    /// Coarse role, e.g. `"teacher"` or `"student"`.
    pub role: String,
}
