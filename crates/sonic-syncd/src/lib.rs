//! syncd: the SAI execution daemon.
//!
//! syncd sits on the far side of the sairedis channel. It decodes every
//! request frame, executes it against a switch [`Driver`] and answers with
//! exactly one response. Objects are addressed by virtual ids on the wire and
//! translated to the driver's real ids here. Driver events are sequenced per
//! switch and published back as notifications.
//!
//! # Architecture
//!
//! - [`syncd`]: request loop, dispatch, view sessions, shutdown
//! - [`driver`]: the driver seam and its request/reply types
//! - [`vs`]: in-memory virtual switch driver
//! - [`translator`]: VID/RID binding and VID allocation
//! - [`shadow`]: temporary views of an open view session
//! - [`notifications`]: event sequencing and publishing
//! - [`warm_restart`]: switch images saved across restarts
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AC-3: Access Enforcement - Clients address objects by virtual id only
//! - AU-12: Audit Record Generation - Failed calls and dropped events are logged
//! - CP-10: System Recovery and Reconstitution - Warm restart images
//! - SI-10: Information Input Validation - Catalog validation of every call

pub mod config;
pub mod driver;
pub mod error;
pub mod notifications;
pub mod shadow;
pub mod syncd;
pub mod translator;
pub mod vs;
pub mod warm_restart;

pub use config::SyncdConfig;
pub use driver::{Driver, DriverCall, DriverReply, DriverRequest, EventSink};
pub use error::{Result, StoreError, SyncdError};
pub use notifications::NotificationHub;
pub use shadow::ShadowSession;
pub use syncd::{ShutdownKind, Syncd, SyncdHandle};
pub use translator::{IdTranslator, VidAllocator};
pub use vs::VirtualSwitch;
pub use warm_restart::{FileStateStore, MemoryStateStore, StateStore, SwitchImage};
