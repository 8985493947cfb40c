//! Shadow session of a view transaction.
//!
//! Between INIT_VIEW and APPLY_VIEW the daemon executes nothing on the
//! driver. Shadow calls build a temporary view per switch here instead, so
//! the daemon can validate references, refuse removal of referenced objects
//! and answer gets. A shadow create of an id-keyed object first looks for a
//! *best candidate* in the current view and reuses its VID, which is what
//! lets reconciliation of an unchanged configuration come out empty.
//!
//! Best candidate rules: same object type, not yet claimed in this session,
//! every create-only attribute equal (defaults filled in from the catalog);
//! among those the one with the most equal attributes wins, ties going to
//! the lowest id.

use sonic_sai::{AttrId, AttrValue, Attribute, Catalog, ObjectId, ObjectKey, ObjectType, SaiStatus};
use sonic_sairedis::{View, ViewObject};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Temporary views and VID claims of one open view session.
#[derive(Debug, Default)]
pub struct ShadowSession {
    temp_views: BTreeMap<ObjectId, View>,
    claimed: BTreeSet<ObjectId>,
    /// Switch indexes handed to switches that exist only in this session.
    reserved: BTreeSet<u8>,
}

impl ShadowSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temp_view(&self, switch_id: ObjectId) -> Option<&View> {
        self.temp_views.get(&switch_id)
    }

    pub fn switch_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.temp_views.keys().copied()
    }

    /// Temporary switch carrying `switch_index`.
    pub fn switch_with_index(&self, switch_index: u8) -> Option<ObjectId> {
        self.switch_ids().find(|sw| sw.switch_index() == switch_index)
    }

    pub fn reserved_indexes(&self) -> &BTreeSet<u8> {
        &self.reserved
    }

    pub fn reserve(&mut self, switch_index: u8) {
        self.reserved.insert(switch_index);
    }

    /// True when any temporary view holds the id-keyed object `id`.
    pub fn knows(&self, id: ObjectId) -> bool {
        self.temp_views
            .values()
            .any(|v| v.switch_id == id || v.contains_id(id))
    }

    pub fn is_claimed(&self, id: ObjectId) -> bool {
        self.claimed.contains(&id)
    }

    pub fn claim(&mut self, id: ObjectId) {
        debug!(vid = %id, "claimed current object");
        self.claimed.insert(id);
    }

    /// Starts the temporary view of a switch with the switch object itself.
    pub fn open_switch(&mut self, switch_id: ObjectId, object: ViewObject) -> Result<(), SaiStatus> {
        if self.temp_views.contains_key(&switch_id) {
            return Err(SaiStatus::ItemAlreadyExists);
        }
        let mut view = View::new(switch_id);
        view.insert(ObjectKey::Oid(switch_id), object);
        self.temp_views.insert(switch_id, view);
        Ok(())
    }

    pub fn insert(
        &mut self,
        switch_id: ObjectId,
        key: ObjectKey,
        object: ViewObject,
    ) -> Result<(), SaiStatus> {
        let view = self
            .temp_views
            .get_mut(&switch_id)
            .ok_or(SaiStatus::InvalidParameter)?;
        if view.contains(&key) {
            return Err(SaiStatus::ItemAlreadyExists);
        }
        view.insert(key, object);
        Ok(())
    }

    /// Switch whose temporary view holds `key`.
    pub fn holder_of(&self, key: &ObjectKey) -> Option<ObjectId> {
        self.temp_views
            .values()
            .find(|v| v.contains(key))
            .map(|v| v.switch_id)
    }

    pub fn object(&self, key: &ObjectKey) -> Option<&ViewObject> {
        self.temp_views.values().find_map(|v| v.get(key))
    }

    /// Removes an object from its temporary view. Removing a switch drops
    /// its whole temporary view.
    pub fn remove(&mut self, key: &ObjectKey) -> Result<ViewObject, SaiStatus> {
        let switch_id = self.holder_of(key).ok_or(SaiStatus::ItemNotFound)?;
        if key.object_id() == Some(switch_id) {
            let view = self
                .temp_views
                .remove(&switch_id)
                .ok_or(SaiStatus::ItemNotFound)?;
            self.reserved.remove(&switch_id.switch_index());
            return view
                .get(key)
                .cloned()
                .ok_or(SaiStatus::ItemNotFound);
        }

        let view = self
            .temp_views
            .get_mut(&switch_id)
            .ok_or(SaiStatus::ItemNotFound)?;
        if let Some(id) = key.object_id() {
            let referrers = view.referrers(id);
            if !referrers.is_empty() {
                debug!(%key, referrers = referrers.len(), "shadow remove of a referenced object");
                return Err(SaiStatus::ObjectInUse);
            }
        }
        view.remove(key).ok_or(SaiStatus::ItemNotFound)
    }

    pub fn set(&mut self, key: &ObjectKey, attribute: Attribute) -> Result<(), SaiStatus> {
        let switch_id = self.holder_of(key).ok_or(SaiStatus::ItemNotFound)?;
        match self.temp_views.get_mut(&switch_id) {
            Some(view) => {
                if view.set_attribute(key, attribute) {
                    Ok(())
                } else {
                    Err(SaiStatus::ItemNotFound)
                }
            }
            _ => Err(SaiStatus::ItemNotFound),
        }
    }

    /// Attributes of a temporary object, unset ones taken from the catalog
    /// default. `None` when no temporary view holds `key`.
    pub fn get(
        &self,
        key: &ObjectKey,
        attr_ids: &[AttrId],
        catalog: Option<&Catalog>,
    ) -> Option<Result<Vec<Attribute>, SaiStatus>> {
        let object = self.object(key)?;
        let mut out = Vec::with_capacity(attr_ids.len());
        for id in attr_ids {
            match effective_value(object, *id, catalog) {
                Some(value) => out.push(Attribute { id: *id, value }),
                None => return Some(Err(SaiStatus::ItemNotFound)),
            }
        }
        Some(Ok(out))
    }

    /// Picks the current object a shadow create should take over.
    pub fn best_candidate<'a>(
        &self,
        candidates: impl IntoIterator<Item = (ObjectId, &'a ViewObject)>,
        object_type: ObjectType,
        attributes: &[Attribute],
        catalog: Option<&Catalog>,
    ) -> Option<ObjectId> {
        let wanted = ViewObject::new(object_type, attributes.iter().cloned());
        let mut best: Option<(ObjectId, usize)> = None;

        for (id, candidate) in candidates {
            if candidate.object_type != object_type || self.is_claimed(id) || self.knows(id) {
                continue;
            }
            if !create_only_equal(&wanted, candidate, catalog) {
                continue;
            }
            let score = wanted
                .attributes
                .keys()
                .filter(|attr| {
                    effective_value(&wanted, **attr, catalog)
                        == effective_value(candidate, **attr, catalog)
                })
                .count();
            match best {
                Some((best_id, best_score))
                    if score < best_score || (score == best_score && id > best_id) => {}
                _ => best = Some((id, score)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Closes the session, returning the temporary views.
    pub fn into_views(self) -> BTreeMap<ObjectId, View> {
        self.temp_views
    }
}

/// Attribute value with the catalog default filled in.
fn effective_value(object: &ViewObject, id: AttrId, catalog: Option<&Catalog>) -> Option<AttrValue> {
    object.attribute(id).cloned().or_else(|| {
        catalog
            .and_then(|c| c.metadata(object.object_type, id))
            .and_then(|m| m.default.clone())
    })
}

fn create_only_equal(wanted: &ViewObject, candidate: &ViewObject, catalog: Option<&Catalog>) -> bool {
    let Some(catalog) = catalog else {
        return true;
    };
    catalog
        .attributes(wanted.object_type)
        .filter(|m| m.flags.create_only)
        .all(|m| {
            effective_value(wanted, m.id, Some(catalog))
                == effective_value(candidate, m.id, Some(catalog))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::{AttrMetadata, AttrValueType};

    const SPEED: u32 = 1;
    const LANES: u32 = 2;
    const MTU: u32 = 3;

    fn catalog() -> Catalog {
        Catalog::builder()
            .object_type(ObjectType::SWITCH)
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(LANES, "SAI_PORT_ATTR_HW_LANE_LIST", AttrValueType::U32)
                    .create_only(),
            )
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(SPEED, "SAI_PORT_ATTR_SPEED", AttrValueType::U32),
            )
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(MTU, "SAI_PORT_ATTR_MTU", AttrValueType::U32)
                    .with_default(AttrValue::U32(1514)),
            )
            .build()
            .unwrap()
    }

    fn vid(ot: ObjectType, index: u64) -> ObjectId {
        ObjectId::compose_virtual(0, ot, index).unwrap()
    }

    fn port(attrs: &[(u32, u32)]) -> ViewObject {
        ViewObject::new(
            ObjectType::PORT,
            attrs.iter().map(|(id, v)| Attribute::new(*id, AttrValue::U32(*v))),
        )
    }

    fn attrs(list: &[(u32, u32)]) -> Vec<Attribute> {
        list.iter()
            .map(|(id, v)| Attribute::new(*id, AttrValue::U32(*v)))
            .collect()
    }

    #[test]
    fn test_best_candidate_prefers_most_equal() {
        let catalog = catalog();
        let a = port(&[(LANES, 1), (SPEED, 10)]);
        let b = port(&[(LANES, 1), (SPEED, 40)]);
        let session = ShadowSession::new();
        let candidates = vec![
            (vid(ObjectType::PORT, 2), &a),
            (vid(ObjectType::PORT, 3), &b),
        ];
        let found = session.best_candidate(
            candidates,
            ObjectType::PORT,
            &attrs(&[(LANES, 1), (SPEED, 40)]),
            Some(&catalog),
        );
        assert_eq!(found, Some(vid(ObjectType::PORT, 3)));
    }

    #[test]
    fn test_best_candidate_requires_create_only_match() {
        let catalog = catalog();
        let a = port(&[(LANES, 1), (SPEED, 40)]);
        let session = ShadowSession::new();
        let found = session.best_candidate(
            vec![(vid(ObjectType::PORT, 2), &a)],
            ObjectType::PORT,
            &attrs(&[(LANES, 2), (SPEED, 40)]),
            Some(&catalog),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_best_candidate_tie_goes_to_lowest_id_and_skips_claimed() {
        let catalog = catalog();
        let a = port(&[(LANES, 1)]);
        let b = port(&[(LANES, 1)]);
        let mut session = ShadowSession::new();
        let candidates = || {
            vec![
                (vid(ObjectType::PORT, 5), &b),
                (vid(ObjectType::PORT, 4), &a),
            ]
        };
        let wanted = attrs(&[(LANES, 1)]);
        let first = session.best_candidate(candidates(), ObjectType::PORT, &wanted, Some(&catalog));
        assert_eq!(first, Some(vid(ObjectType::PORT, 4)));

        session.claim(vid(ObjectType::PORT, 4));
        let second = session.best_candidate(candidates(), ObjectType::PORT, &wanted, Some(&catalog));
        assert_eq!(second, Some(vid(ObjectType::PORT, 5)));
    }

    #[test]
    fn test_defaults_count_as_equal() {
        let catalog = catalog();
        let current = port(&[(LANES, 1), (MTU, 1514)]);
        let session = ShadowSession::new();
        let found = session.best_candidate(
            vec![(vid(ObjectType::PORT, 2), &current)],
            ObjectType::PORT,
            &attrs(&[(LANES, 1)]),
            Some(&catalog),
        );
        assert_eq!(found, Some(vid(ObjectType::PORT, 2)));
    }

    #[test]
    fn test_remove_referenced_is_object_in_use() {
        let sw = vid(ObjectType::SWITCH, 1);
        let vr = vid(ObjectType::VIRTUAL_ROUTER, 2);
        let rif = vid(ObjectType::ROUTER_INTERFACE, 3);
        let mut session = ShadowSession::new();
        session
            .open_switch(sw, ViewObject::new(ObjectType::SWITCH, vec![]))
            .unwrap();
        session
            .insert(sw, ObjectKey::Oid(vr), ViewObject::new(ObjectType::VIRTUAL_ROUTER, vec![]))
            .unwrap();
        session
            .insert(
                sw,
                ObjectKey::Oid(rif),
                ViewObject::new(
                    ObjectType::ROUTER_INTERFACE,
                    vec![Attribute::new(0, AttrValue::ObjectId(vr))],
                ),
            )
            .unwrap();

        assert_eq!(session.remove(&ObjectKey::Oid(vr)), Err(SaiStatus::ObjectInUse));
        assert!(session.remove(&ObjectKey::Oid(rif)).is_ok());
        assert!(session.remove(&ObjectKey::Oid(vr)).is_ok());
        assert_eq!(session.remove(&ObjectKey::Oid(vr)), Err(SaiStatus::ItemNotFound));
    }

    #[test]
    fn test_get_and_set() {
        let catalog = catalog();
        let sw = vid(ObjectType::SWITCH, 1);
        let p = vid(ObjectType::PORT, 2);
        let mut session = ShadowSession::new();
        session
            .open_switch(sw, ViewObject::new(ObjectType::SWITCH, vec![]))
            .unwrap();
        session.insert(sw, ObjectKey::Oid(p), port(&[(SPEED, 10)])).unwrap();
        session
            .set(&ObjectKey::Oid(p), Attribute::new(SPEED, AttrValue::U32(25)))
            .unwrap();

        let got = session
            .get(&ObjectKey::Oid(p), &[AttrId(SPEED), AttrId(MTU)], Some(&catalog))
            .unwrap()
            .unwrap();
        assert_eq!(got, attrs(&[(SPEED, 25), (MTU, 1514)]));

        assert_eq!(
            session.get(&ObjectKey::Oid(p), &[AttrId(LANES)], Some(&catalog)),
            Some(Err(SaiStatus::ItemNotFound))
        );
        assert!(session.get(&ObjectKey::Oid(vid(ObjectType::PORT, 9)), &[], None).is_none());
    }

    #[test]
    fn test_remove_switch_drops_view() {
        let sw = vid(ObjectType::SWITCH, 1);
        let mut session = ShadowSession::new();
        session.reserve(0);
        session
            .open_switch(sw, ViewObject::new(ObjectType::SWITCH, vec![]))
            .unwrap();
        assert_eq!(session.switch_with_index(0), Some(sw));
        session.remove(&ObjectKey::Oid(sw)).unwrap();
        assert!(session.temp_view(sw).is_none());
        assert!(session.reserved_indexes().is_empty());
        assert!(session.into_views().is_empty());
    }
}
