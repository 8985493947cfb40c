//! Error types for the sairedis client.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Every failed call surfaces one typed error
//! - AU-3: Content of Audit Records - Errors carry correlation ids and statuses

use crate::codec::CodecError;
use crate::proto::BulkItemResult;
use crate::reconcile::{FailedOp, PlannedOp};
use sonic_sai::{CatalogError, ObjectKey, SaiStatus};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the client proxy and the view transaction manager.
#[derive(Debug, Error)]
pub enum SairedisError {
    /// Malformed wire data; fatal to the single call.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Send or receive plumbing failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the budget. The effect on the driver is unknown.
    #[error("no response for correlation id {correlation_id} within {timeout:?}")]
    Timeout {
        correlation_id: u64,
        timeout: Duration,
    },

    /// The daemon or the driver rejected the call.
    #[error("driver rejected call: {status}")]
    Driver { status: SaiStatus },

    /// A bulk call failed as a whole; per-item statuses are kept.
    #[error("bulk call failed: {status}")]
    BulkFailed {
        status: SaiStatus,
        items: Vec<BulkItemResult>,
    },

    /// View transaction or communication mode misuse.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("dependency cycle among {} objects, first {:?}", .0.len(), .0.first())]
    DependencyCycle(Vec<ObjectKey>),

    /// Reconciliation stopped partway; nothing was rolled back.
    #[error(
        "reconciliation incomplete: {} applied, {} failed, {} not attempted",
        applied.len(),
        failed.len(),
        skipped.len()
    )]
    PartialReconciliation {
        applied: Vec<PlannedOp>,
        failed: Vec<FailedOp>,
        skipped: Vec<PlannedOp>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// Unparseable record log line.
    #[error("record log line {line}: {reason}")]
    Record { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl SairedisError {
    /// Errors a read-only call may be retried on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SairedisError::Transport(_) | SairedisError::Timeout { .. })
    }

    /// Remote status carried by a driver rejection.
    pub fn status(&self) -> Option<SaiStatus> {
        match self {
            SairedisError::Driver { status } | SairedisError::BulkFailed { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<SaiStatus> for SairedisError {
    fn from(status: SaiStatus) -> Self {
        SairedisError::Driver { status }
    }
}

/// Result type alias for sairedis operations.
pub type Result<T> = std::result::Result<T, SairedisError>;
