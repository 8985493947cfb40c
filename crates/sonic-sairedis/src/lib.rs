//! SAI remote procedure bridge, client side.
//!
//! Every SAI call made through [`RemoteSai`] becomes an immutable
//! [`CallRequest`] with its own correlation id. The request is encoded by the
//! [`Codec`], shipped over a [`ClientChannel`] to the syncd daemon, and settled
//! by exactly one [`CallResponse`] or a timeout. Hardware events come back
//! over the same channel as an ordered, per-switch [`NotificationStream`].
//!
//! # Architecture
//!
//! - [`proto`]: request, response and notification types
//! - [`codec`]: binary wire format
//! - [`channel`]: transport traits, in-process and Redis backends
//! - [`client`]: the client proxy, sync and async invocation
//! - [`view`], [`reconcile`], [`transaction`]: view transactions
//! - [`notify`]: notification subscription with gap detection
//! - [`recorder`], [`replay`]: record tap and replay
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-2: Event Logging - Record tap of every request and response
//! - SC-5: Denial of Service Protection - Bounded waits on every call
//! - SI-10: Information Input Validation - Catalog checks before encoding
//! - CP-10: System Recovery and Reconstitution - Diff-based view reconciliation

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod notify;
pub mod proto;
pub mod reconcile;
pub mod recorder;
pub mod replay;
pub mod transaction;
pub mod view;

pub use channel::{ClientChannel, FrameStream, InProcessChannel, ServerChannel};
pub use client::{Invocation, PendingCall, RemoteSai};
pub use codec::{Codec, CodecError, FrameKind};
pub use config::{ClientConfig, CommunicationMode, RedisChannelConfig};
pub use error::{Result, SairedisError};
pub use notify::{NotificationEvent, NotificationStream, SequenceTracker};
pub use proto::{
    BulkCreateEntry, BulkItemResult, BulkMode, BulkSetEntry, Call, CallRequest, CallResponse,
    CorrelationId, FdbEventData, FdbEventType, Notification, NotificationKind, Operation,
    PortStatusChange, ResponsePayload,
};
pub use reconcile::{FailedOp, PlannedAction, PlannedOp, ReconciliationPlan};
pub use recorder::{Direction, RecordEntry, RecordReader, Recorder};
pub use replay::{ReplayMismatch, ReplayReport, Replayer};
pub use transaction::{ApplyReport, ViewPhase, ViewTransaction};
pub use view::{View, ViewObject};
