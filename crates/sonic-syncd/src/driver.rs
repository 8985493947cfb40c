//! Switch driver interface.
//!
//! The daemon reaches the vendor SAI library only through [`Driver`]. Every
//! id crossing this interface is a real object id (RID) as issued by the
//! driver; translation from and to virtual ids happens before and after.

use sonic_sai::{AttrId, Attribute, ObjectId, ObjectKey, ObjectType, SaiStatus};
use sonic_sairedis::NotificationKind;
use std::sync::Arc;

/// Callback the driver invokes for every hardware event of one switch.
///
/// Event payloads carry RIDs. The callback may run on any thread and must
/// not block.
pub type EventSink = Arc<dyn Fn(NotificationKind) + Send + Sync>;

/// The call handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Create { attributes: Vec<Attribute> },
    Remove,
    Set { attribute: Attribute },
    Get { attr_ids: Vec<AttrId> },
}

/// One driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRequest {
    /// Owning switch RID, `NULL` when creating a switch.
    pub switch_id: ObjectId,
    pub object_type: ObjectType,
    /// `Oid(NULL)` on creates of id-keyed objects; the driver allocates.
    pub key: ObjectKey,
    pub call: DriverCall,
}

/// What the driver answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReply {
    pub status: SaiStatus,
    /// RID of a newly created object, `NULL` otherwise.
    pub object_id: ObjectId,
    /// Attributes read by a get, in request order.
    pub attributes: Vec<Attribute>,
}

impl DriverReply {
    pub fn success() -> Self {
        Self::failed(SaiStatus::Success)
    }

    pub fn failed(status: SaiStatus) -> Self {
        Self {
            status,
            object_id: ObjectId::NULL,
            attributes: Vec::new(),
        }
    }

    pub fn created(object_id: ObjectId) -> Self {
        Self {
            object_id,
            ..Self::success()
        }
    }

    pub fn attributes(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            ..Self::success()
        }
    }
}

/// A vendor switch driver.
///
/// Calls are synchronous and made from the single request loop, one at a
/// time.
pub trait Driver: Send + Sync {
    fn apply(&self, request: DriverRequest) -> DriverReply;

    /// Routes the hardware events of `switch_id` (a RID) to `sink`,
    /// replacing any earlier sink for that switch.
    fn register_event_sink(&self, switch_id: ObjectId, sink: EventSink);
}
