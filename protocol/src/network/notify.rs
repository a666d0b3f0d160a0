//! Change notifications emitted after asset persistence.
//!
//! Subscribers (API layers, caches) listen for events such as
//! `multisignatures/change`. Delivery is best-effort: a failed emit is
//! logged by the caller and never fails the write that triggered it.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::transaction::error::ErrorKind;

/// One emitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no subscribers for {0}")]
    NoSubscribers(String),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BestEffort
    }
}

pub trait EventNotifier: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn emit(&self, _event: &str, _payload: serde_json::Value) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: broadcast::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl EventNotifier for ChannelNotifier {
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        self.tx
            .send(Notification {
                event: event.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers(event.to_string()))
    }
}
