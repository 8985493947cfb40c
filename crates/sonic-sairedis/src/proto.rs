//! Bridge protocol messages.
//!
//! A [`CallRequest`] is built once per call and never mutated after it has
//! been handed to the channel. Every request is answered by exactly one
//! [`CallResponse`] carrying the same correlation id. [`Notification`]s flow
//! the other way, independently of any request.

use crate::view::View;
use sonic_sai::{
    AttrId, Attribute, FdbEntry, ObjectId, ObjectIdRefs, ObjectKey, ObjectType, SaiStatus,
};
use sonic_types::OperStatus;
use std::fmt;

/// Per-connection token linking a request to its response.
pub type CorrelationId = u64;

/// Flat operation discriminant. The value is the wire tag.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create = 1,
    Remove = 2,
    Set = 3,
    Get = 4,
    BulkCreate = 5,
    BulkRemove = 6,
    BulkSet = 7,
    InitView = 8,
    ApplyView = 9,
    DumpView = 10,
}

impl Operation {
    pub fn from_tag(tag: u8) -> Option<Self> {
        use Operation::*;
        let op = match tag {
            1 => Create,
            2 => Remove,
            3 => Set,
            4 => Get,
            5 => BulkCreate,
            6 => BulkRemove,
            7 => BulkSet,
            8 => InitView,
            9 => ApplyView,
            10 => DumpView,
            _ => return None,
        };
        Some(op)
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Operations that change driver or view state.
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Operation::Get | Operation::DumpView)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Remove => "remove",
            Operation::Set => "set",
            Operation::Get => "get",
            Operation::BulkCreate => "bulk_create",
            Operation::BulkRemove => "bulk_remove",
            Operation::BulkSet => "bulk_set",
            Operation::InitView => "init_view",
            Operation::ApplyView => "apply_view",
            Operation::DumpView => "dump_view",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error policy of a bulk call.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BulkMode {
    /// Items after the first failure are reported as `NotExecuted`.
    #[default]
    StopOnError = 0,
    /// Every item is attempted.
    IgnoreError = 1,
}

impl BulkMode {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BulkMode::StopOnError),
            1 => Some(BulkMode::IgnoreError),
            _ => None,
        }
    }
}

/// One object of a bulk create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCreateEntry {
    pub key: ObjectKey,
    pub attributes: Vec<Attribute>,
}

/// One attribute write of a bulk set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSetEntry {
    pub key: ObjectKey,
    pub attribute: Attribute,
}

/// The call carried by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `key` is `Oid(NULL)` when the daemon should allocate the id.
    Create {
        key: ObjectKey,
        attributes: Vec<Attribute>,
    },
    Remove {
        key: ObjectKey,
    },
    Set {
        key: ObjectKey,
        attribute: Attribute,
    },
    Get {
        key: ObjectKey,
        attr_ids: Vec<AttrId>,
    },
    BulkCreate {
        entries: Vec<BulkCreateEntry>,
        mode: BulkMode,
    },
    BulkRemove {
        keys: Vec<ObjectKey>,
        mode: BulkMode,
    },
    BulkSet {
        entries: Vec<BulkSetEntry>,
        mode: BulkMode,
    },
    InitView,
    ApplyView,
    DumpView,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Create { .. } => Operation::Create,
            Call::Remove { .. } => Operation::Remove,
            Call::Set { .. } => Operation::Set,
            Call::Get { .. } => Operation::Get,
            Call::BulkCreate { .. } => Operation::BulkCreate,
            Call::BulkRemove { .. } => Operation::BulkRemove,
            Call::BulkSet { .. } => Operation::BulkSet,
            Call::InitView => Operation::InitView,
            Call::ApplyView => Operation::ApplyView,
            Call::DumpView => Operation::DumpView,
        }
    }

    /// Key of a single-object call.
    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            Call::Create { key, .. }
            | Call::Remove { key }
            | Call::Set { key, .. }
            | Call::Get { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// A fully constructed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub correlation_id: CorrelationId,
    /// Owning switch, `NULL` for switch creation and view control calls.
    pub switch_id: ObjectId,
    pub object_type: ObjectType,
    /// View-only call made while a view transaction is being built.
    pub shadow: bool,
    pub call: Call,
}

impl CallRequest {
    pub fn operation(&self) -> Operation {
        self.call.operation()
    }

    /// A request for one of the view control calls.
    pub fn view_control(correlation_id: CorrelationId, call: Call) -> Self {
        Self {
            correlation_id,
            switch_id: ObjectId::NULL,
            object_type: ObjectType::NULL,
            shadow: false,
            call,
        }
    }
}

/// Outcome of one item of a bulk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkItemResult {
    pub status: SaiStatus,
    /// Allocated id for bulk creates of id-keyed objects, `NULL` otherwise.
    pub object_id: ObjectId,
}

impl BulkItemResult {
    pub fn new(status: SaiStatus) -> Self {
        Self {
            status,
            object_id: ObjectId::NULL,
        }
    }

    pub fn created(object_id: ObjectId) -> Self {
        Self {
            status: SaiStatus::Success,
            object_id,
        }
    }
}

/// Data returned with a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponsePayload {
    #[default]
    None,
    ObjectId(ObjectId),
    Attributes(Vec<Attribute>),
    Bulk(Vec<BulkItemResult>),
    Views(Vec<View>),
}

impl ResponsePayload {
    pub(crate) const fn tag(&self) -> u8 {
        match self {
            ResponsePayload::None => 0,
            ResponsePayload::ObjectId(_) => 1,
            ResponsePayload::Attributes(_) => 2,
            ResponsePayload::Bulk(_) => 3,
            ResponsePayload::Views(_) => 4,
        }
    }
}

/// Answer to one [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub correlation_id: CorrelationId,
    pub status: SaiStatus,
    pub payload: ResponsePayload,
}

impl CallResponse {
    pub fn new(correlation_id: CorrelationId, status: SaiStatus) -> Self {
        Self {
            correlation_id,
            status,
            payload: ResponsePayload::None,
        }
    }

    pub fn success(correlation_id: CorrelationId, payload: ResponsePayload) -> Self {
        Self {
            correlation_id,
            status: SaiStatus::Success,
            payload,
        }
    }
}

/// Port operational status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatusChange {
    pub port_id: ObjectId,
    pub status: OperStatus,
}

/// `sai_fdb_event_t`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdbEventType {
    Learned = 0,
    Aged = 1,
    Moved = 2,
    Flushed = 3,
}

impl FdbEventType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FdbEventType::Learned),
            1 => Some(FdbEventType::Aged),
            2 => Some(FdbEventType::Moved),
            3 => Some(FdbEventType::Flushed),
            _ => None,
        }
    }
}

/// One FDB event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdbEventData {
    pub event: FdbEventType,
    pub entry: FdbEntry,
    pub attributes: Vec<Attribute>,
}

/// Hardware-originated event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    SwitchStateChange { status: OperStatus },
    SwitchShutdownRequest,
    PortStateChange(Vec<PortStatusChange>),
    FdbEvent(Vec<FdbEventData>),
}

impl NotificationKind {
    pub const fn name(&self) -> &'static str {
        match self {
            NotificationKind::SwitchStateChange { .. } => "switch_state_change",
            NotificationKind::SwitchShutdownRequest => "switch_shutdown_request",
            NotificationKind::PortStateChange(_) => "port_state_change",
            NotificationKind::FdbEvent(_) => "fdb_event",
        }
    }
}

/// Event broadcast by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub switch_id: ObjectId,
    /// Per-switch sequence number, starting at 1.
    pub sequence: u64,
    pub kind: NotificationKind,
}

impl ObjectIdRefs for Call {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        match self {
            Call::Create { key, attributes } => {
                key.visit_object_ids(f);
                attributes.visit_object_ids(f);
            }
            Call::Remove { key } | Call::Get { key, .. } => key.visit_object_ids(f),
            Call::Set { key, attribute } => {
                key.visit_object_ids(f);
                attribute.visit_object_ids(f);
            }
            Call::BulkCreate { entries, .. } => {
                for entry in entries {
                    entry.key.visit_object_ids(f);
                    entry.attributes.visit_object_ids(f);
                }
            }
            Call::BulkRemove { keys, .. } => keys.visit_object_ids(f),
            Call::BulkSet { entries, .. } => {
                for entry in entries {
                    entry.key.visit_object_ids(f);
                    entry.attribute.visit_object_ids(f);
                }
            }
            Call::InitView | Call::ApplyView | Call::DumpView => {}
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        match self {
            Call::Create { key, attributes } => {
                key.try_remap_object_ids(f)?;
                attributes.try_remap_object_ids(f)
            }
            Call::Remove { key } | Call::Get { key, .. } => key.try_remap_object_ids(f),
            Call::Set { key, attribute } => {
                key.try_remap_object_ids(f)?;
                attribute.try_remap_object_ids(f)
            }
            Call::BulkCreate { entries, .. } => {
                for entry in entries {
                    entry.key.try_remap_object_ids(f)?;
                    entry.attributes.try_remap_object_ids(f)?;
                }
                Ok(())
            }
            Call::BulkRemove { keys, .. } => keys.try_remap_object_ids(f),
            Call::BulkSet { entries, .. } => {
                for entry in entries {
                    entry.key.try_remap_object_ids(f)?;
                    entry.attribute.try_remap_object_ids(f)?;
                }
                Ok(())
            }
            Call::InitView | Call::ApplyView | Call::DumpView => Ok(()),
        }
    }
}

impl ObjectIdRefs for CallRequest {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        f(self.switch_id);
        self.call.visit_object_ids(f);
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        self.switch_id = f(self.switch_id)?;
        self.call.try_remap_object_ids(f)
    }
}

impl ObjectIdRefs for ResponsePayload {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        match self {
            ResponsePayload::None => {}
            ResponsePayload::ObjectId(id) => f(*id),
            ResponsePayload::Attributes(attributes) => attributes.visit_object_ids(f),
            ResponsePayload::Bulk(items) => items.iter().for_each(|item| f(item.object_id)),
            ResponsePayload::Views(views) => views.visit_object_ids(f),
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        match self {
            ResponsePayload::None => Ok(()),
            ResponsePayload::ObjectId(id) => {
                *id = f(*id)?;
                Ok(())
            }
            ResponsePayload::Attributes(attributes) => attributes.try_remap_object_ids(f),
            ResponsePayload::Bulk(items) => {
                for item in items {
                    item.object_id = f(item.object_id)?;
                }
                Ok(())
            }
            ResponsePayload::Views(views) => views.try_remap_object_ids(f),
        }
    }
}

impl ObjectIdRefs for CallResponse {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        self.payload.visit_object_ids(f);
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        self.payload.try_remap_object_ids(f)
    }
}

impl ObjectIdRefs for NotificationKind {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        match self {
            NotificationKind::SwitchStateChange { .. } | NotificationKind::SwitchShutdownRequest => {}
            NotificationKind::PortStateChange(changes) => {
                changes.iter().for_each(|c| f(c.port_id));
            }
            NotificationKind::FdbEvent(events) => {
                for event in events {
                    f(event.entry.switch_id);
                    f(event.entry.bv_id);
                    event.attributes.visit_object_ids(f);
                }
            }
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        match self {
            NotificationKind::SwitchStateChange { .. } | NotificationKind::SwitchShutdownRequest => {
                Ok(())
            }
            NotificationKind::PortStateChange(changes) => {
                for change in changes {
                    change.port_id = f(change.port_id)?;
                }
                Ok(())
            }
            NotificationKind::FdbEvent(events) => {
                for event in events {
                    event.entry.switch_id = f(event.entry.switch_id)?;
                    event.entry.bv_id = f(event.entry.bv_id)?;
                    event.attributes.try_remap_object_ids(f)?;
                }
                Ok(())
            }
        }
    }
}

impl ObjectIdRefs for Notification {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        f(self.switch_id);
        self.kind.visit_object_ids(f);
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        self.switch_id = f(self.switch_id)?;
        self.kind.try_remap_object_ids(f)
    }
}
