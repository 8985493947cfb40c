//! Error types for the syncd daemon.
//!
//! Failures of a single request never surface here: they are answered with a
//! SAI status on the channel. These errors cover daemon lifecycle, channel
//! plumbing and warm-restart state.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Lifecycle failures are typed and logged
//! - CP-10: System Recovery and Reconstitution - State store failures are explicit

use sonic_sai::{CatalogError, ObjectId};
use sonic_sairedis::{CodecError, SairedisError};
use std::path::PathBuf;
use thiserror::Error;

/// Daemon errors.
#[derive(Error, Debug)]
pub enum SyncdError {
    /// Channel send/receive failed
    #[error("channel error: {0}")]
    Channel(#[from] SairedisError),

    /// Frame could not be encoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Warm-restart state could not be saved or restored
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// Attribute catalog failed to load
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration file parse error
    #[error("configuration error: {0}")]
    Config(String),

    /// Daemon already stopped or started twice
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The request loop task panicked or was aborted
    #[error("request loop failed: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Warm-restart state store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No saved image for the switch
    #[error("no saved state for switch {0}")]
    NotFound(ObjectId),

    /// File could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not a switch image
    #[error("{}: malformed state: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Image written by an incompatible daemon
    #[error("state version {found} not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Result type alias for syncd operations
pub type Result<T> = std::result::Result<T, SyncdError>;
