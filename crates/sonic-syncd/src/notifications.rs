//! Driver event publishing.
//!
//! Each switch gets an [`EventSink`] that stamps the next sequence number of
//! that switch on the event and queues it without blocking the driver. A
//! pump task drains the queue in order, rewrites RIDs to VIDs and publishes
//! the encoded notification on the channel.
//!
//! The queue is bounded. When it is full the event is dropped but its
//! sequence number stays consumed, so subscribers see the loss as a gap.
//! Stamping and queueing happen under the switch's sequence lock, so events
//! of one switch enter the queue in sequence order whatever thread the
//! driver raises them on.

use crate::driver::EventSink;
use crate::translator::IdTranslator;
use dashmap::DashMap;
use parking_lot::Mutex;
use sonic_sai::ObjectId;
use sonic_sairedis::{Codec, Notification, NotificationKind, ServerChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct QueuedEvent {
    switch_id: ObjectId,
    sequence: u64,
    kind: NotificationKind,
}

/// Per-switch sequencing and the queue in front of the publisher.
pub struct NotificationHub {
    tx: mpsc::Sender<QueuedEvent>,
    sequences: DashMap<ObjectId, Arc<Mutex<u64>>>,
    dropped: Arc<AtomicU64>,
}

impl NotificationHub {
    /// Creates the hub and spawns its pump. The pump stops once `cancel`
    /// fires and the queued events are published.
    pub fn start(
        queue_limit: usize,
        translator: Arc<IdTranslator>,
        codec: Codec,
        channel: Arc<dyn ServerChannel>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_limit.max(1));
        let pump = tokio::spawn(pump(rx, translator, codec, channel, cancel));
        (Self::with_queue(tx), pump)
    }

    fn with_queue(tx: mpsc::Sender<QueuedEvent>) -> Self {
        Self {
            tx,
            sequences: DashMap::new(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink for the events of switch `switch_id` (a VID).
    pub fn sink(&self, switch_id: ObjectId) -> EventSink {
        let counter = self.counter(switch_id);
        let tx = self.tx.clone();
        let dropped = self.dropped.clone();

        Arc::new(move |kind: NotificationKind| {
            let mut last = counter.lock();
            *last = last.wrapping_add(1);
            let sequence = *last;
            let name = kind.name();
            match tx.try_send(QueuedEvent {
                switch_id,
                sequence,
                kind,
            }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(%switch_id, sequence, kind = name, "notification queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%switch_id, sequence, kind = name, "publisher stopped, event dropped");
                }
            }
        })
    }

    /// Continues the sequence of a restored switch after `last`.
    pub fn restore_sequence(&self, switch_id: ObjectId, last: u64) {
        *self.counter(switch_id).lock() = last;
    }

    /// Last sequence number issued for the switch, 0 when none.
    pub fn last_sequence(&self, switch_id: ObjectId) -> u64 {
        self.sequences
            .get(&switch_id)
            .map(|c| *c.lock())
            .unwrap_or(0)
    }

    pub fn forget(&self, switch_id: ObjectId) {
        self.sequences.remove(&switch_id);
    }

    /// Events lost to a full queue since start.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn counter(&self, switch_id: ObjectId) -> Arc<Mutex<u64>> {
        self.sequences
            .entry(switch_id)
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .clone()
    }
}

async fn pump(
    mut rx: mpsc::Receiver<QueuedEvent>,
    translator: Arc<IdTranslator>,
    codec: Codec,
    channel: Arc<dyn ServerChannel>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = cancel.cancelled() => break,
        };
        let Some(event) = event else {
            return;
        };
        publish(event, &translator, &codec, channel.as_ref()).await;
    }

    rx.close();
    let mut drained = 0usize;
    while let Ok(event) = rx.try_recv() {
        publish(event, &translator, &codec, channel.as_ref()).await;
        drained += 1;
    }
    info!(drained, "notification publisher stopped");
}

async fn publish(
    event: QueuedEvent,
    translator: &IdTranslator,
    codec: &Codec,
    channel: &dyn ServerChannel,
) {
    let mut kind = event.kind;
    translator.to_vids(&mut kind);
    let notification = Notification {
        switch_id: event.switch_id,
        sequence: event.sequence,
        kind,
    };

    let frame = match codec.encode_notification(&notification) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(switch_id = %event.switch_id, sequence = event.sequence, error = %e, "cannot encode notification");
            return;
        }
    };
    if let Err(e) = channel.publish_notification(frame).await {
        warn!(switch_id = %event.switch_id, sequence = event.sequence, error = %e, "notification publish failed");
    } else {
        debug!(switch_id = %event.switch_id, sequence = event.sequence, kind = notification.kind.name(), "published");
    }
}
