//! Virtual/real object id translation.
//!
//! Clients only ever see virtual ids (VIDs). The daemon binds each VID to the
//! real id (RID) the driver issued for the same object, rewrites outgoing
//! driver calls from VIDs to RIDs and incoming results and events from RIDs
//! to VIDs.

use dashmap::DashMap;
use sonic_sai::{ObjectId, ObjectIdRefs, ObjectType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Two-way VID/RID binding table.
///
/// Shared between the request loop and the notification pump.
#[derive(Debug, Default)]
pub struct IdTranslator {
    vid_to_rid: DashMap<ObjectId, ObjectId>,
    rid_to_vid: DashMap<ObjectId, ObjectId>,
}

impl IdTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, vid: ObjectId, rid: ObjectId) {
        debug!(%vid, %rid, "bound");
        if let Some(old) = self.vid_to_rid.insert(vid, rid) {
            self.rid_to_vid.remove(&old);
        }
        self.rid_to_vid.insert(rid, vid);
    }

    /// Drops the binding of `vid`, returning its RID.
    pub fn unbind(&self, vid: ObjectId) -> Option<ObjectId> {
        let (_, rid) = self.vid_to_rid.remove(&vid)?;
        self.rid_to_vid.remove(&rid);
        Some(rid)
    }

    pub fn rid_of(&self, vid: ObjectId) -> Option<ObjectId> {
        self.vid_to_rid.get(&vid).map(|r| *r)
    }

    pub fn vid_of(&self, rid: ObjectId) -> Option<ObjectId> {
        self.rid_to_vid.get(&rid).map(|v| *v)
    }

    pub fn is_bound(&self, vid: ObjectId) -> bool {
        self.vid_to_rid.contains_key(&vid)
    }

    pub fn len(&self) -> usize {
        self.vid_to_rid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vid_to_rid.is_empty()
    }

    /// Rewrites every VID in `value` to its RID. `NULL` stays `NULL`.
    ///
    /// Fails with the first VID that has no binding.
    pub fn to_rids<T: ObjectIdRefs + ?Sized>(&self, value: &mut T) -> Result<(), ObjectId> {
        value.try_remap_object_ids(&mut |vid| {
            if vid.is_null() {
                return Ok(vid);
            }
            self.rid_of(vid).ok_or(vid)
        })
    }

    /// Rewrites every RID in `value` to its VID. A RID the daemon never
    /// bound becomes `NULL`.
    pub fn to_vids<T: ObjectIdRefs + ?Sized>(&self, value: &mut T) {
        value.remap_object_ids(&mut |rid| {
            if rid.is_null() {
                return rid;
            }
            match self.vid_of(rid) {
                Some(vid) => vid,
                None => {
                    warn!(%rid, "driver returned an id with no virtual binding");
                    ObjectId::NULL
                }
            }
        });
    }

    /// Bindings of every VID carrying `switch_index`.
    pub fn bindings_for(&self, switch_index: u8) -> BTreeMap<ObjectId, ObjectId> {
        self.vid_to_rid
            .iter()
            .filter(|e| e.key().switch_index() == switch_index)
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    /// Drops every binding of `switch_index`.
    pub fn unbind_switch(&self, switch_index: u8) -> usize {
        let vids: Vec<ObjectId> = self
            .vid_to_rid
            .iter()
            .filter(|e| e.key().switch_index() == switch_index)
            .map(|e| *e.key())
            .collect();
        for vid in &vids {
            self.unbind(*vid);
        }
        vids.len()
    }
}

/// Hands out virtual ids.
///
/// One counter per switch index, shared by every object type of that switch,
/// so a VID is never reused while the daemon runs.
#[derive(Debug, Default)]
pub struct VidAllocator {
    counters: BTreeMap<u8, u64>,
    switches: BTreeSet<u8>,
}

impl VidAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next VID of `object_type` on switch `switch_index`; `None` once the
    /// counter space is exhausted.
    pub fn allocate(&mut self, switch_index: u8, object_type: ObjectType) -> Option<ObjectId> {
        let counter = self.counters.entry(switch_index).or_insert(0);
        let vid = ObjectId::compose_virtual(switch_index, object_type, *counter + 1)?;
        *counter += 1;
        Some(vid)
    }

    /// Lowest switch index neither live nor in `reserved`.
    pub fn free_switch_index(&self, reserved: &BTreeSet<u8>) -> Option<u8> {
        (0..=u8::MAX).find(|i| !self.switches.contains(i) && !reserved.contains(i))
    }

    /// Claims the lowest free switch index not in `reserved` and allocates
    /// its switch VID.
    pub fn allocate_switch(&mut self, reserved: &BTreeSet<u8>) -> Option<ObjectId> {
        let index = self.free_switch_index(reserved)?;
        let vid = self.allocate(index, ObjectType::SWITCH)?;
        self.switches.insert(index);
        Some(vid)
    }

    /// Marks the index of `vid` as a live switch.
    pub fn claim_switch(&mut self, vid: ObjectId) {
        self.switches.insert(vid.switch_index());
        self.observe(vid);
    }

    pub fn release_switch(&mut self, switch_index: u8) {
        self.switches.remove(&switch_index);
    }

    pub fn is_switch_in_use(&self, switch_index: u8) -> bool {
        self.switches.contains(&switch_index)
    }

    /// Moves the counter of the VID's switch past it, so restored ids are
    /// not handed out again.
    pub fn observe(&mut self, vid: ObjectId) {
        if vid.is_null() {
            return;
        }
        let counter = self.counters.entry(vid.switch_index()).or_insert(0);
        *counter = (*counter).max(vid.index());
    }
}
