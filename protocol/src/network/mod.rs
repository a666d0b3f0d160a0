//! # Network Module
//!
//! Outbound, best-effort side channels of the transaction core.
//!
//! ```text
//! broadcast.rs - Broadcaster (async), NoopBroadcaster, ChannelBroadcaster,
//!                spawn_broadcast
//! notify.rs    - EventNotifier, NoopNotifier, ChannelNotifier
//! ```
//!
//! Neither channel can fail the operation that uses it. Errors from both
//! classify as [`ErrorKind::BestEffort`](crate::transaction::ErrorKind).

pub mod broadcast;
pub mod notify;

pub use broadcast::{spawn_broadcast, BroadcastError, Broadcaster, ChannelBroadcaster, NoopBroadcaster};
pub use notify::{ChannelNotifier, EventNotifier, NoopNotifier, Notification, NotifyError};
