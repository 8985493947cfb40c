//! Channel transport.
//!
//! A channel carries encoded frames between the client proxy and the
//! execution daemon: point-to-point request/response delivery keyed by the
//! correlation id, and an independent broadcast of notifications.
//!
//! Backends must deliver the response for a given correlation id at most
//! once, and notifications in the order the daemon published them. No
//! ordering is assumed across different correlation ids.

pub mod inproc;
#[cfg(feature = "redis")]
pub mod redis;

pub use inproc::{InProcessChannel, InProcessClient, InProcessServer};
#[cfg(feature = "redis")]
pub use self::redis::{RedisClientChannel, RedisServerChannel};

use crate::error::Result;
use crate::proto::CorrelationId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Stream of raw notification frames.
pub type FrameStream = BoxStream<'static, Vec<u8>>;

/// Client side of a channel.
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Ships one request frame. The response slot for `id` exists once this
    /// returns.
    async fn send_request(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()>;

    /// Waits up to `timeout` for the response to `id`. A zero timeout checks
    /// once without blocking. On timeout the call stays pending and can be
    /// awaited again.
    async fn await_response(&self, id: CorrelationId, timeout: Duration) -> Result<Vec<u8>>;

    /// Gives up on `id`; a response arriving later is discarded.
    fn abandon(&self, id: CorrelationId);

    /// Opens a new subscription to the notification broadcast.
    async fn subscribe_notifications(&self) -> Result<FrameStream>;
}

/// Daemon side of a channel.
#[async_trait]
pub trait ServerChannel: Send + Sync {
    /// Next request frame, `None` once every client is gone.
    async fn recv_request(&self) -> Result<Option<Vec<u8>>>;

    async fn send_response(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()>;

    async fn publish_notification(&self, frame: Vec<u8>) -> Result<()>;
}
