//! Notification subscription.
//!
//! The daemon stamps every notification with a per-switch sequence number.
//! A subscription decodes the broadcast, keeps the notifications of the
//! switch it asked for and reports any jump in the sequence as a
//! [`NotificationEvent::Gap`] ahead of the notification that revealed it.
//! A sequence that falls back to the start, as after a cold restart of the
//! daemon, is reported as [`NotificationEvent::Restart`] and becomes the new
//! baseline.

use crate::channel::FrameStream;
use crate::codec::Codec;
use crate::proto::Notification;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use sonic_sai::ObjectId;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Item of a [`NotificationStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Notification(Notification),
    /// Notifications `expected..received` were never seen.
    Gap {
        switch_id: ObjectId,
        expected: u64,
        received: u64,
    },
    /// The daemon restarted its sequence for `switch_id`; `received` is the
    /// new baseline.
    Restart {
        switch_id: ObjectId,
        last: u64,
        received: u64,
    },
}

/// Result of feeding one sequence number to a [`SequenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    InOrder,
    Gap { expected: u64 },
    /// The sequence started over; the tracker took it as the new baseline.
    Restart { last: u64 },
    /// Already seen, or slightly older than the last one seen.
    Stale { last: u64 },
}

/// Per-switch sequence tracking.
///
/// The first number seen for a switch is the baseline, so a late subscriber
/// does not report everything it missed before subscribing.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: HashMap<ObjectId, u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, switch_id: ObjectId, sequence: u64) -> Observation {
        let Some(last) = self.last.get_mut(&switch_id) else {
            self.last.insert(switch_id, sequence);
            return Observation::InOrder;
        };

        if sequence <= *last {
            let previous = *last;
            if previous > 1 && (sequence == 1 || sequence < previous / 2) {
                *last = sequence;
                return Observation::Restart { last: previous };
            }
            return Observation::Stale { last: previous };
        }
        let expected = *last + 1;
        *last = sequence;
        if sequence == expected {
            Observation::InOrder
        } else {
            Observation::Gap { expected }
        }
    }

    /// Last sequence number seen for a switch.
    pub fn last(&self, switch_id: ObjectId) -> Option<u64> {
        self.last.get(&switch_id).copied()
    }
}

struct State {
    frames: FrameStream,
    codec: Codec,
    switch_id: Option<ObjectId>,
    tracker: SequenceTracker,
    pending: Option<NotificationEvent>,
}

/// Ordered, cancellable notification subscription. Dropping it unsubscribes.
pub struct NotificationStream {
    inner: BoxStream<'static, NotificationEvent>,
}

impl NotificationStream {
    /// Wraps a raw frame stream; `switch_id` of `None` keeps every switch.
    pub fn new(frames: FrameStream, codec: Codec, switch_id: Option<ObjectId>) -> Self {
        let state = State {
            frames,
            codec,
            switch_id,
            tracker: SequenceTracker::new(),
            pending: None,
        };

        let inner = futures::stream::unfold(state, |mut st| async move {
            if let Some(event) = st.pending.take() {
                return Some((event, st));
            }
            loop {
                let frame = st.frames.next().await?;
                let notification = match st.codec.decode_notification(&frame) {
                    Ok(n) => n,
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable notification");
                        continue;
                    }
                };
                if st.switch_id.is_some_and(|id| id != notification.switch_id) {
                    continue;
                }

                match st.tracker.observe(notification.switch_id, notification.sequence) {
                    Observation::InOrder => {
                        return Some((NotificationEvent::Notification(notification), st));
                    }
                    Observation::Gap { expected } => {
                        warn!(
                            switch_id = %notification.switch_id,
                            expected,
                            received = notification.sequence,
                            "notification sequence gap"
                        );
                        let gap = NotificationEvent::Gap {
                            switch_id: notification.switch_id,
                            expected,
                            received: notification.sequence,
                        };
                        st.pending = Some(NotificationEvent::Notification(notification));
                        return Some((gap, st));
                    }
                    Observation::Restart { last } => {
                        warn!(
                            switch_id = %notification.switch_id,
                            last,
                            received = notification.sequence,
                            "notification sequence restarted"
                        );
                        let restart = NotificationEvent::Restart {
                            switch_id: notification.switch_id,
                            last,
                            received: notification.sequence,
                        };
                        st.pending = Some(NotificationEvent::Notification(notification));
                        return Some((restart, st));
                    }
                    Observation::Stale { last } => {
                        debug!(
                            switch_id = %notification.switch_id,
                            sequence = notification.sequence,
                            last,
                            "dropping stale notification"
                        );
                    }
                }
            }
        })
        .boxed();

        Self { inner }
    }
}

impl Stream for NotificationStream {
    type Item = NotificationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
