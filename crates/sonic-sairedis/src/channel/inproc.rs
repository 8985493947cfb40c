//! In-process channel backend.
//!
//! Requests travel over a tokio `mpsc` queue. Each request gets a one-shot
//! response slot registered before the frame is sent; the server consumes the
//! slot when it answers, so a second answer for the same id finds nothing and
//! is dropped. Notifications use a bounded broadcast; a subscriber that falls
//! behind loses the oldest frames and sees the loss as a sequence gap.

use super::{ClientChannel, FrameStream, ServerChannel};
use crate::error::{Result, SairedisError};
use crate::proto::CorrelationId;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Default number of queued requests.
pub const DEFAULT_REQUEST_CAPACITY: usize = 1024;

/// Default notification broadcast depth.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

struct Shared {
    responders: DashMap<CorrelationId, oneshot::Sender<Vec<u8>>>,
    notifications: broadcast::Sender<Vec<u8>>,
}

enum Slot {
    Ready(Vec<u8>),
    Empty,
    Closed,
}

/// Constructor for connected in-process endpoints.
pub struct InProcessChannel;

impl InProcessChannel {
    pub fn pair() -> (InProcessClient, InProcessServer) {
        Self::with_capacity(DEFAULT_REQUEST_CAPACITY, DEFAULT_NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(
        request_capacity: usize,
        notification_capacity: usize,
    ) -> (InProcessClient, InProcessServer) {
        let (requests_tx, requests_rx) = mpsc::channel(request_capacity.max(1));
        let (notifications, _) = broadcast::channel(notification_capacity.max(1));
        let shared = Arc::new(Shared {
            responders: DashMap::new(),
            notifications,
        });

        let client = InProcessClient {
            requests: requests_tx,
            pending: Arc::new(DashMap::new()),
            shared: shared.clone(),
        };
        let server = InProcessServer {
            requests: Mutex::new(requests_rx),
            shared,
        };
        (client, server)
    }
}

/// Client endpoint.
#[derive(Clone)]
pub struct InProcessClient {
    requests: mpsc::Sender<Vec<u8>>,
    pending: Arc<DashMap<CorrelationId, oneshot::Receiver<Vec<u8>>>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl ClientChannel for InProcessClient {
    async fn send_request(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.shared.responders.insert(id, tx);
        self.pending.insert(id, rx);

        if self.requests.send(frame).await.is_err() {
            self.abandon(id);
            return Err(SairedisError::Transport("daemon endpoint closed".to_string()));
        }
        Ok(())
    }

    async fn await_response(&self, id: CorrelationId, timeout: Duration) -> Result<Vec<u8>> {
        let Some((_, mut rx)) = self.pending.remove(&id) else {
            return Err(SairedisError::InvalidState(format!(
                "no pending call with correlation id {id}"
            )));
        };

        let outcome = if timeout.is_zero() {
            match rx.try_recv() {
                Ok(frame) => Slot::Ready(frame),
                Err(oneshot::error::TryRecvError::Empty) => Slot::Empty,
                Err(oneshot::error::TryRecvError::Closed) => Slot::Closed,
            }
        } else {
            match tokio::time::timeout(timeout, &mut rx).await {
                Ok(Ok(frame)) => Slot::Ready(frame),
                Ok(Err(_)) => Slot::Closed,
                Err(_) => Slot::Empty,
            }
        };

        match outcome {
            Slot::Ready(frame) => Ok(frame),
            Slot::Empty => {
                self.pending.insert(id, rx);
                Err(SairedisError::Timeout {
                    correlation_id: id,
                    timeout,
                })
            }
            Slot::Closed => Err(SairedisError::Transport(format!(
                "response slot for correlation id {id} closed"
            ))),
        }
    }

    fn abandon(&self, id: CorrelationId) {
        self.pending.remove(&id);
        if self.shared.responders.remove(&id).is_some() {
            debug!(correlation_id = id, "abandoned pending call");
        }
    }

    async fn subscribe_notifications(&self) -> Result<FrameStream> {
        let rx = self.shared.notifications.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(error = %err, "notification subscriber fell behind");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Daemon endpoint.
pub struct InProcessServer {
    requests: Mutex<mpsc::Receiver<Vec<u8>>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl ServerChannel for InProcessServer {
    async fn recv_request(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.requests.lock().await.recv().await)
    }

    async fn send_response(&self, id: CorrelationId, frame: Vec<u8>) -> Result<()> {
        match self.shared.responders.remove(&id) {
            Some((_, tx)) => {
                if tx.send(frame).is_err() {
                    debug!(correlation_id = id, "caller gone, response discarded");
                }
            }
            None => debug!(
                correlation_id = id,
                "no open slot, discarding late or duplicate response"
            ),
        }
        Ok(())
    }

    async fn publish_notification(&self, frame: Vec<u8>) -> Result<()> {
        if self.shared.notifications.send(frame).is_err() {
            debug!("notification published with no subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (client, server) = InProcessChannel::pair();
        client.send_request(1, vec![1, 2, 3]).await.unwrap();
        assert_eq!(server.recv_request().await.unwrap(), Some(vec![1, 2, 3]));

        server.send_response(1, vec![9]).await.unwrap();
        let frame = client.await_response(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, vec![9]);
    }

    #[tokio::test]
    async fn test_response_delivered_at_most_once() {
        let (client, server) = InProcessChannel::pair();
        client.send_request(7, vec![0]).await.unwrap();
        server.send_response(7, vec![1]).await.unwrap();
        server.send_response(7, vec![2]).await.unwrap();

        assert_eq!(client.await_response(7, Duration::ZERO).await.unwrap(), vec![1]);
        assert!(matches!(
            client.await_response(7, Duration::ZERO).await,
            Err(SairedisError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_timeout_keeps_call_pending() {
        let (client, server) = InProcessChannel::pair();
        client.send_request(3, vec![0]).await.unwrap();

        let err = client.await_response(3, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SairedisError::Timeout { correlation_id: 3, .. }));

        server.send_response(3, vec![5]).await.unwrap();
        assert_eq!(client.await_response(3, Duration::ZERO).await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_abandoned_response_is_discarded() {
        let (client, server) = InProcessChannel::pair();
        client.send_request(4, vec![0]).await.unwrap();
        client.abandon(4);
        server.send_response(4, vec![1]).await.unwrap();
        assert!(client.await_response(4, Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn test_notifications_fan_out() {
        let (client, server) = InProcessChannel::pair();
        let mut a = client.subscribe_notifications().await.unwrap();
        let mut b = client.subscribe_notifications().await.unwrap();
        server.publish_notification(vec![42]).await.unwrap();
        assert_eq!(a.next().await, Some(vec![42]));
        assert_eq!(b.next().await, Some(vec![42]));
    }

    #[tokio::test]
    async fn test_closed_server_is_transport_error() {
        let (client, server) = InProcessChannel::pair();
        drop(server);
        let err = client.send_request(1, vec![0]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
