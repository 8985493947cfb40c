//! Virtual switch driver.
//!
//! An in-memory [`Driver`] standing in for vendor hardware: it issues RIDs,
//! stores attributes, refuses to remove objects that are still referenced
//! and lets callers inject hardware events. Used by the `syncd` binary when no
//! vendor library is present and by the test suites.

use crate::driver::{Driver, DriverCall, DriverReply, DriverRequest, EventSink};
use parking_lot::Mutex;
use sonic_sai::{
    AttrId, AttrValue, Attribute, Catalog, ObjectId, ObjectIdRefs, ObjectKey, ObjectType, SaiStatus,
};
use sonic_sairedis::NotificationKind;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// First RID handed out; keeps RIDs visibly apart from VIDs in logs.
const FIRST_RID: u64 = 0x1000;

#[derive(Debug, Clone)]
struct VsObject {
    object_type: ObjectType,
    /// Owning switch RID, the object itself for a switch.
    switch_id: ObjectId,
    attributes: BTreeMap<AttrId, AttrValue>,
}

impl VsObject {
    fn references(&self, key: &ObjectKey) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        if key.object_id().is_none() {
            key.visit_object_ids(&mut |id| ids.push(id));
        }
        for value in self.attributes.values() {
            value.visit_object_ids(&mut |id| ids.push(id));
        }
        let own = key.object_id();
        ids.retain(|id| !id.is_null() && Some(*id) != own && *id != self.switch_id);
        ids
    }
}

#[derive(Default)]
struct VsState {
    next_rid: u64,
    objects: BTreeMap<ObjectKey, VsObject>,
    /// How many objects reference each RID.
    ref_counts: HashMap<ObjectId, usize>,
    sinks: HashMap<ObjectId, EventSink>,
    /// Statuses returned by the next calls instead of executing them.
    injected_failures: Vec<SaiStatus>,
    calls: usize,
}

impl VsState {
    fn allocate(&mut self) -> ObjectId {
        if self.next_rid == 0 {
            self.next_rid = FIRST_RID;
        }
        let rid = ObjectId::from_raw(self.next_rid);
        self.next_rid += 1;
        rid
    }

    fn exists(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&ObjectKey::Oid(id))
    }

    fn retain_refs(&mut self, ids: &[ObjectId]) {
        for id in ids {
            *self.ref_counts.entry(*id).or_insert(0) += 1;
        }
    }

    fn release_refs(&mut self, ids: &[ObjectId]) {
        for id in ids {
            if let Some(count) = self.ref_counts.get_mut(id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.ref_counts.remove(id);
                }
            }
        }
    }

    fn ref_count(&self, id: ObjectId) -> usize {
        self.ref_counts.get(&id).copied().unwrap_or(0)
    }
}

/// In-memory switch driver.
pub struct VirtualSwitch {
    catalog: Option<Arc<Catalog>>,
    state: Mutex<VsState>,
}

impl Default for VirtualSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSwitch {
    pub fn new() -> Self {
        Self {
            catalog: None,
            state: Mutex::new(VsState::default()),
        }
    }

    /// Answers gets of unset attributes with catalog defaults.
    pub fn with_catalog(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog: Some(catalog),
            state: Mutex::new(VsState::default()),
        }
    }

    /// Makes the next driver call fail with `status` without executing.
    pub fn fail_next(&self, status: SaiStatus) {
        self.state.lock().injected_failures.push(status);
    }

    /// Raises a hardware event on `switch_id` (a RID). Returns false when no
    /// sink is registered for the switch.
    pub fn inject_event(&self, switch_id: ObjectId, kind: NotificationKind) -> bool {
        let sink = self.state.lock().sinks.get(&switch_id).cloned();
        match sink {
            Some(sink) => {
                sink(kind);
                true
            }
            None => false,
        }
    }

    /// RIDs of every switch created.
    pub fn switches(&self) -> Vec<ObjectId> {
        self.state
            .lock()
            .objects
            .iter()
            .filter(|(_, o)| o.object_type == ObjectType::SWITCH)
            .filter_map(|(k, _)| k.object_id())
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.state.lock().objects.contains_key(key)
    }

    pub fn attribute(&self, key: &ObjectKey, id: AttrId) -> Option<AttrValue> {
        self.state
            .lock()
            .objects
            .get(key)
            .and_then(|o| o.attributes.get(&id).cloned())
    }

    /// Number of driver calls executed, injected failures included.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    fn create(
        &self,
        state: &mut VsState,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attributes: Vec<Attribute>,
    ) -> DriverReply {
        let (key, switch_id) = match key {
            ObjectKey::Oid(id) if id.is_null() => {
                if object_type != ObjectType::SWITCH && !state.exists(switch_id) {
                    return DriverReply::failed(SaiStatus::InvalidParameter);
                }
                let rid = state.allocate();
                let owner = if object_type == ObjectType::SWITCH {
                    rid
                } else {
                    switch_id
                };
                (ObjectKey::Oid(rid), owner)
            }
            ObjectKey::Oid(_) => return DriverReply::failed(SaiStatus::InvalidParameter),
            entry => {
                if state.objects.contains_key(&entry) {
                    return DriverReply::failed(SaiStatus::ItemAlreadyExists);
                }
                match entry.entry_switch_id() {
                    Some(sw) if state.exists(sw) => (entry, sw),
                    _ => return DriverReply::failed(SaiStatus::InvalidParameter),
                }
            }
        };

        let object = VsObject {
            object_type,
            switch_id,
            attributes: attributes.into_iter().map(|a| (a.id, a.value)).collect(),
        };
        let refs = object.references(&key);
        if let Some(missing) = refs.iter().find(|id| !state.exists(**id)) {
            debug!(rid = %missing, %key, "create references an unknown object");
            return DriverReply::failed(SaiStatus::InvalidObjectId);
        }

        state.retain_refs(&refs);
        state.objects.insert(key, object);
        trace!(%key, %object_type, "created");
        match key {
            ObjectKey::Oid(rid) => DriverReply::created(rid),
            _ => DriverReply::success(),
        }
    }

    fn remove(&self, state: &mut VsState, key: ObjectKey) -> DriverReply {
        let Some(object) = state.objects.get(&key).cloned() else {
            return DriverReply::failed(SaiStatus::ItemNotFound);
        };

        if object.object_type == ObjectType::SWITCH {
            // removing a switch tears down everything it owns
            let Some(sw) = key.object_id() else {
                return DriverReply::failed(SaiStatus::InvalidParameter);
            };
            state.objects.retain(|_, o| o.switch_id != sw);
            state.sinks.remove(&sw);
            let live: Vec<ObjectId> = state.objects.keys().filter_map(|k| k.object_id()).collect();
            state.ref_counts.retain(|id, _| live.contains(id));
            return DriverReply::success();
        }

        if let Some(id) = key.object_id() {
            if state.ref_count(id) > 0 {
                return DriverReply::failed(SaiStatus::ObjectInUse);
            }
        }
        let refs = object.references(&key);
        state.release_refs(&refs);
        state.objects.remove(&key);
        trace!(%key, "removed");
        DriverReply::success()
    }

    fn set(&self, state: &mut VsState, key: ObjectKey, attribute: Attribute) -> DriverReply {
        let Some(object) = state.objects.get(&key).cloned() else {
            return DriverReply::failed(SaiStatus::ItemNotFound);
        };

        let mut updated = object.clone();
        updated.attributes.insert(attribute.id, attribute.value);
        let old_refs = object.references(&key);
        let new_refs = updated.references(&key);
        if let Some(missing) = new_refs.iter().find(|id| !state.exists(**id)) {
            debug!(rid = %missing, %key, "set references an unknown object");
            return DriverReply::failed(SaiStatus::InvalidObjectId);
        }

        state.release_refs(&old_refs);
        state.retain_refs(&new_refs);
        state.objects.insert(key, updated);
        DriverReply::success()
    }

    fn get(&self, state: &VsState, key: ObjectKey, attr_ids: &[AttrId]) -> DriverReply {
        let Some(object) = state.objects.get(&key) else {
            return DriverReply::failed(SaiStatus::ItemNotFound);
        };

        let mut attributes = Vec::with_capacity(attr_ids.len());
        for id in attr_ids {
            let value = object.attributes.get(id).cloned().or_else(|| {
                self.catalog
                    .as_ref()
                    .and_then(|c| c.metadata(object.object_type, *id))
                    .and_then(|m| m.default.clone())
            });
            match value {
                Some(value) => attributes.push(Attribute { id: *id, value }),
                None => return DriverReply::failed(SaiStatus::ItemNotFound),
            }
        }
        DriverReply::attributes(attributes)
    }
}

impl Driver for VirtualSwitch {
    fn apply(&self, request: DriverRequest) -> DriverReply {
        let mut state = self.state.lock();
        state.calls += 1;
        if !state.injected_failures.is_empty() {
            let status = state.injected_failures.remove(0);
            debug!(%status, object_type = %request.object_type, key = %request.key, "injected failure");
            return DriverReply::failed(status);
        }

        let DriverRequest {
            switch_id,
            object_type,
            key,
            call,
        } = request;
        match call {
            DriverCall::Create { attributes } => {
                self.create(&mut state, switch_id, object_type, key, attributes)
            }
            DriverCall::Remove => self.remove(&mut state, key),
            DriverCall::Set { attribute } => self.set(&mut state, key, attribute),
            DriverCall::Get { attr_ids } => self.get(&state, key, &attr_ids),
        }
    }

    fn register_event_sink(&self, switch_id: ObjectId, sink: EventSink) {
        self.state.lock().sinks.insert(switch_id, sink);
    }
}
