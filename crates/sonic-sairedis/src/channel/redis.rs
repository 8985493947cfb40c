//! Redis channel backend.
//!
//! - requests: `RPUSH <prefix>:REQUESTS`, consumed by the daemon with `BLPOP`
//! - responses: `RPUSH <prefix>:RESPONSE:<id>` with an expiry, consumed by the
//!   caller with `BLPOP` (or a single `LPOP` for a zero timeout)
//! - notifications: `PUBLISH <prefix>:NOTIFICATIONS`
//!
//! A response list is popped once, which gives at-most-once delivery per
//! correlation id. Abandoning a call deletes its response list; a response
//! that arrives later still expires on its own.
//!
//! # NIST Controls
//! - SC-8: Transmission Confidentiality - Database communication
//! - SC-5: Denial of Service Protection - Response lists expire

use super::{ClientChannel, FrameStream, ServerChannel};
use crate::config::RedisChannelConfig;
use crate::error::{Result, SairedisError};
use crate::proto::CorrelationId;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the daemon blocks on the request list per poll.
const REQUEST_POLL_SECS: f64 = 1.0;

fn transport(context: &str, err: redis::RedisError) -> SairedisError {
    SairedisError::Transport(format!("{context}: {err}"))
}

async fn connect(config: &RedisChannelConfig) -> Result<(redis::Client, ConnectionManager)> {
    let client = redis::Client::open(config.url.as_str())
        .map_err(|e| transport(&format!("open {}", config.url), e))?;
    let conn = client
        .get_connection_manager()
        .await
        .map_err(|e| transport("connection manager", e))?;
    info!(url = %config.url, prefix = %config.prefix, "connected redis channel");
    Ok((client, conn))
}

/// Client endpoint over Redis.
#[derive(Clone)]
pub struct RedisClientChannel {
    config: RedisChannelConfig,
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisClientChannel {
    pub async fn connect(config: RedisChannelConfig) -> Result<Self> {
        let (client, conn) = connect(&config).await?;
        Ok(Self {
            config,
            client,
            conn,
        })
    }
}

#[async_trait]
impl ClientChannel for RedisClientChannel {
    async fn send_request(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(self.config.request_key(), frame)
            .await
            .map_err(|e| transport("RPUSH request", e))?;
        debug!(correlation_id = id, "request queued");
        Ok(())
    }

    async fn await_response(&self, id: CorrelationId, timeout: Duration) -> Result<Vec<u8>> {
        let mut conn = self.conn.clone();
        let key = self.config.response_key(id);

        let frame: Option<Vec<u8>> = if timeout.is_zero() {
            conn.lpop(&key, None)
                .await
                .map_err(|e| transport("LPOP response", e))?
        } else {
            let popped: Option<(String, Vec<u8>)> = conn
                .blpop(&key, timeout.as_secs_f64())
                .await
                .map_err(|e| transport("BLPOP response", e))?;
            popped.map(|(_, frame)| frame)
        };

        frame.ok_or(SairedisError::Timeout {
            correlation_id: id,
            timeout,
        })
    }

    fn abandon(&self, id: CorrelationId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(
                correlation_id = id,
                ttl_secs = self.config.response_ttl_secs,
                "abandoned outside the runtime, response list left to expire"
            );
            return;
        };
        let mut conn = self.conn.clone();
        let cmd = discard_response(&self.config, id);
        runtime.spawn(async move {
            match cmd.query_async::<()>(&mut conn).await {
                Ok(()) => debug!(correlation_id = id, "abandoned response list deleted"),
                Err(e) => warn!(correlation_id = id, error = %e, "DEL response failed"),
            }
        });
    }

    async fn subscribe_notifications(&self) -> Result<FrameStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| transport("pubsub connection", e))?;
        pubsub
            .subscribe(self.config.notification_channel())
            .await
            .map_err(|e| transport("SUBSCRIBE", e))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<Vec<u8>>() {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(error = %err, "dropping unreadable notification payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Daemon endpoint over Redis.
pub struct RedisServerChannel {
    config: RedisChannelConfig,
    conn: ConnectionManager,
}

impl RedisServerChannel {
    pub async fn connect(config: RedisChannelConfig) -> Result<Self> {
        let (_, conn) = connect(&config).await?;
        Ok(Self { config, conn })
    }
}

#[async_trait]
impl ServerChannel for RedisServerChannel {
    async fn recv_request(&self) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let key = self.config.request_key();
        loop {
            let popped: Option<(String, Vec<u8>)> = conn
                .blpop(&key, REQUEST_POLL_SECS)
                .await
                .map_err(|e| transport("BLPOP request", e))?;
            if let Some((_, frame)) = popped {
                return Ok(Some(frame));
            }
        }
    }

    async fn send_response(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.config.response_key(id);
        let ttl = i64::try_from(self.config.response_ttl_secs).unwrap_or(i64::MAX);
        redis::pipe()
            .atomic()
            .rpush(&key, frame)
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| transport("RPUSH response", e))?;
        Ok(())
    }

    async fn publish_notification(&self, frame: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(self.config.notification_channel(), frame)
            .await
            .map_err(|e| transport("PUBLISH", e))?;
        Ok(())
    }
}

fn discard_response(config: &RedisChannelConfig, id: CorrelationId) -> redis::Cmd {
    let mut cmd = redis::cmd("DEL");
    cmd.arg(config.response_key(id));
    cmd
}
