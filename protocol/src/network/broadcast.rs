//! Best-effort peer broadcast of freshly pooled transactions.
//!
//! Admission never waits on the network. The engine hands the transaction
//! to [`spawn_broadcast`], which runs the send on the ambient tokio runtime
//! and only logs a failure.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transaction::error::ErrorKind;
use crate::transaction::Transaction;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast channel closed")]
    ChannelClosed,

    #[error("peer rejected transaction: {0}")]
    Rejected(String),
}

impl BroadcastError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BestEffort
    }
}

/// Outbound gossip for unconfirmed transactions.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_unconfirmed_transaction(
        &self,
        trs: &Transaction,
    ) -> Result<(), BroadcastError>;
}

/// Drops every transaction. Used when the node runs without peers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn broadcast_unconfirmed_transaction(
        &self,
        _trs: &Transaction,
    ) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// Forwards transactions into an mpsc channel drained by a transport task.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: mpsc::Sender<Transaction>,
}

impl ChannelBroadcaster {
    /// Broadcaster plus the receiving end for the transport task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Transaction>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn broadcast_unconfirmed_transaction(
        &self,
        trs: &Transaction,
    ) -> Result<(), BroadcastError> {
        self.tx
            .send(trs.clone())
            .await
            .map_err(|_| BroadcastError::ChannelClosed)
    }
}

/// Fire-and-forget broadcast. Without a tokio runtime the broadcast is
/// skipped with a warning.
pub fn spawn_broadcast(broadcaster: Arc<dyn Broadcaster>, trs: Transaction) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(id = %trs.id, "no async runtime, skipping broadcast");
        return;
    };
    handle.spawn(async move {
        match broadcaster.broadcast_unconfirmed_transaction(&trs).await {
            Ok(()) => debug!(id = %trs.id, "broadcast unconfirmed transaction"),
            Err(e) => warn!(id = %trs.id, error = %e, "broadcast unconfirmed transaction failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_broadcaster_forwards() {
        let (b, mut rx) = ChannelBroadcaster::new(4);
        let mut trs = Transaction::new(0, "aa");
        trs.id = "t1".into();
        b.broadcast_unconfirmed_transaction(&trs).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, "t1");
    }

    #[tokio::test]
    async fn closed_channel_is_best_effort_error() {
        let (b, rx) = ChannelBroadcaster::new(1);
        drop(rx);
        let err = b
            .broadcast_unconfirmed_transaction(&Transaction::new(0, "aa"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BestEffort);
    }

    #[tokio::test]
    async fn spawned_broadcast_delivers() {
        let (b, mut rx) = ChannelBroadcaster::new(1);
        spawn_broadcast(Arc::new(b), Transaction::new(0, "aa"));
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn spawn_without_runtime_is_noop() {
        spawn_broadcast(Arc::new(NoopBroadcaster), Transaction::new(0, "aa"));
    }
}
