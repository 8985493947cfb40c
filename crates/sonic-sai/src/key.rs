//! Object keys.
//!
//! Most SAI objects are addressed by an object id. Route, neighbor and FDB
//! entries are addressed by a struct instead; the structs embed object ids
//! (virtual router, router interface, bridge or VLAN) that count as
//! references of the entry.

use crate::attr::ObjectIdRefs;
use crate::types::{ObjectId, ObjectType};
use serde::{Deserialize, Serialize};
use sonic_types::{IpAddress, IpPrefix, MacAddress};
use std::fmt;

/// `sai_route_entry_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteEntry {
    pub switch_id: ObjectId,
    pub vr_id: ObjectId,
    pub destination: IpPrefix,
}

/// `sai_fdb_entry_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FdbEntry {
    pub switch_id: ObjectId,
    pub mac_address: MacAddress,
    /// Bridge or VLAN the entry is learned on.
    pub bv_id: ObjectId,
}

/// `sai_neighbor_entry_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub switch_id: ObjectId,
    pub rif_id: ObjectId,
    pub ip_address: IpAddress,
}

/// Identity of one SAI object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKey {
    Oid(ObjectId),
    Route(RouteEntry),
    Fdb(FdbEntry),
    Neighbor(NeighborEntry),
}

impl ObjectKey {
    /// The object id, for id-keyed objects.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            ObjectKey::Oid(id) => Some(*id),
            _ => None,
        }
    }

    /// Object type implied by the key shape, for entry keys.
    pub fn entry_type(&self) -> Option<ObjectType> {
        match self {
            ObjectKey::Oid(_) => None,
            ObjectKey::Route(_) => Some(ObjectType::ROUTE_ENTRY),
            ObjectKey::Fdb(_) => Some(ObjectType::FDB_ENTRY),
            ObjectKey::Neighbor(_) => Some(ObjectType::NEIGHBOR_ENTRY),
        }
    }

    /// Switch embedded in an entry key.
    pub fn entry_switch_id(&self) -> Option<ObjectId> {
        match self {
            ObjectKey::Oid(_) => None,
            ObjectKey::Route(e) => Some(e.switch_id),
            ObjectKey::Fdb(e) => Some(e.switch_id),
            ObjectKey::Neighbor(e) => Some(e.switch_id),
        }
    }

    /// True for a route entry towards `0.0.0.0/0` or `::/0`.
    pub fn is_default_route(&self) -> bool {
        matches!(self, ObjectKey::Route(e) if e.destination.is_default())
    }
}

impl From<ObjectId> for ObjectKey {
    fn from(id: ObjectId) -> Self {
        ObjectKey::Oid(id)
    }
}

impl From<RouteEntry> for ObjectKey {
    fn from(entry: RouteEntry) -> Self {
        ObjectKey::Route(entry)
    }
}

impl From<FdbEntry> for ObjectKey {
    fn from(entry: FdbEntry) -> Self {
        ObjectKey::Fdb(entry)
    }
}

impl From<NeighborEntry> for ObjectKey {
    fn from(entry: NeighborEntry) -> Self {
        ObjectKey::Neighbor(entry)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Oid(id) => write!(f, "{id}"),
            ObjectKey::Route(e) => write!(f, "route[{} vr={} dest={}]", e.switch_id, e.vr_id, e.destination),
            ObjectKey::Fdb(e) => write!(f, "fdb[{} bv={} mac={}]", e.switch_id, e.bv_id, e.mac_address),
            ObjectKey::Neighbor(e) => {
                write!(f, "neighbor[{} rif={} ip={}]", e.switch_id, e.rif_id, e.ip_address)
            }
        }
    }
}

impl ObjectIdRefs for ObjectKey {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        match self {
            ObjectKey::Oid(id) => f(*id),
            ObjectKey::Route(e) => {
                f(e.switch_id);
                f(e.vr_id);
            }
            ObjectKey::Fdb(e) => {
                f(e.switch_id);
                f(e.bv_id);
            }
            ObjectKey::Neighbor(e) => {
                f(e.switch_id);
                f(e.rif_id);
            }
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        match self {
            ObjectKey::Oid(id) => *id = f(*id)?,
            ObjectKey::Route(e) => {
                e.switch_id = f(e.switch_id)?;
                e.vr_id = f(e.vr_id)?;
            }
            ObjectKey::Fdb(e) => {
                e.switch_id = f(e.switch_id)?;
                e.bv_id = f(e.bv_id)?;
            }
            ObjectKey::Neighbor(e) => {
                e.switch_id = f(e.switch_id)?;
                e.rif_id = f(e.rif_id)?;
            }
        }
        Ok(())
    }
}
