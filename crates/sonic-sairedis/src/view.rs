//! Switch views.
//!
//! A [`View`] maps every object of one switch to its attribute set. The daemon
//! keeps the *current* view (what the driver has applied); a view transaction
//! builds a *temporary* view of the intended state and reconciles the two.

use serde::{Deserialize, Serialize};
use sonic_sai::{AttrId, AttrValue, Attribute, ObjectId, ObjectIdRefs, ObjectKey, ObjectType};
use std::collections::{BTreeMap, BTreeSet};

/// One object of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewObject {
    pub object_type: ObjectType,
    pub attributes: BTreeMap<AttrId, AttrValue>,
}

impl ViewObject {
    pub fn new(object_type: ObjectType, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        Self {
            object_type,
            attributes: attributes.into_iter().map(|a| (a.id, a.value)).collect(),
        }
    }

    pub fn attribute(&self, id: AttrId) -> Option<&AttrValue> {
        self.attributes.get(&id)
    }

    /// Attributes as an ordered list.
    pub fn attribute_list(&self) -> Vec<Attribute> {
        self.attributes
            .iter()
            .map(|(id, value)| Attribute {
                id: *id,
                value: value.clone(),
            })
            .collect()
    }

    pub fn set(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.id, attribute.value);
    }
}

impl ObjectIdRefs for ViewObject {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        for value in self.attributes.values() {
            value.visit_object_ids(f);
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        for value in self.attributes.values_mut() {
            value.try_remap_object_ids(f)?;
        }
        Ok(())
    }
}

/// Configuration snapshot of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ViewDocument", from = "ViewDocument")]
pub struct View {
    pub switch_id: ObjectId,
    objects: BTreeMap<ObjectKey, ViewObject>,
}

impl View {
    pub fn new(switch_id: ObjectId) -> Self {
        Self {
            switch_id,
            objects: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ViewObject> {
        self.objects.get(key)
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut ViewObject> {
        self.objects.get_mut(key)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    pub fn contains_id(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&ObjectKey::Oid(id))
    }

    pub fn insert(&mut self, key: ObjectKey, object: ViewObject) -> Option<ViewObject> {
        self.objects.insert(key, object)
    }

    pub fn remove(&mut self, key: &ObjectKey) -> Option<ViewObject> {
        self.objects.remove(key)
    }

    /// Writes one attribute. Returns false when the object is unknown.
    pub fn set_attribute(&mut self, key: &ObjectKey, attribute: Attribute) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.set(attribute);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &ViewObject)> {
        self.objects.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.objects.keys()
    }

    /// Objects of one type, in key order.
    pub fn objects_of_type(
        &self,
        object_type: ObjectType,
    ) -> impl Iterator<Item = (&ObjectKey, &ViewObject)> {
        self.objects
            .iter()
            .filter(move |(_, o)| o.object_type == object_type)
    }

    /// Keys of the objects `key` depends on within this view.
    ///
    /// Ids embedded in the key and in attribute values count; every object
    /// other than the switch also depends on the switch itself. Ids of
    /// objects absent from the view are ignored.
    pub fn dependencies(&self, key: &ObjectKey) -> BTreeSet<ObjectKey> {
        let mut deps = BTreeSet::new();
        let Some(object) = self.objects.get(key) else {
            return deps;
        };

        let own_id = key.object_id();
        let mut add = |id: ObjectId| {
            if !id.is_null() && Some(id) != own_id && self.contains_id(id) {
                deps.insert(ObjectKey::Oid(id));
            }
        };

        if key.object_id().is_none() {
            key.visit_object_ids(&mut add);
        }
        object.visit_object_ids(&mut add);
        add(self.switch_id);
        deps
    }

    /// Keys of the objects referencing `id`, excluding the object itself.
    pub fn referrers(&self, id: ObjectId) -> Vec<ObjectKey> {
        self.objects
            .iter()
            .filter(|(key, object)| {
                if key.object_id() == Some(id) {
                    return false;
                }
                let mut found = false;
                let mut check = |other: ObjectId| found |= other == id;
                if key.object_id().is_none() {
                    key.visit_object_ids(&mut check);
                }
                object.visit_object_ids(&mut check);
                found
            })
            .map(|(key, _)| *key)
            .collect()
    }

    /// Ids of every id-keyed object.
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().filter_map(ObjectKey::object_id)
    }
}

impl ObjectIdRefs for View {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        f(self.switch_id);
        for (key, object) in &self.objects {
            key.visit_object_ids(f);
            object.visit_object_ids(f);
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        self.switch_id = f(self.switch_id)?;
        let objects = std::mem::take(&mut self.objects);
        for (mut key, mut object) in objects {
            key.try_remap_object_ids(f)?;
            object.try_remap_object_ids(f)?;
            self.objects.insert(key, object);
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ViewDocument {
    switch_id: ObjectId,
    objects: Vec<ViewEntry>,
}

#[derive(Serialize, Deserialize)]
struct ViewEntry {
    key: ObjectKey,
    object_type: ObjectType,
    attributes: Vec<Attribute>,
}

impl From<View> for ViewDocument {
    fn from(view: View) -> Self {
        let objects = view
            .objects
            .into_iter()
            .map(|(key, object)| ViewEntry {
                key,
                object_type: object.object_type,
                attributes: object
                    .attributes
                    .into_iter()
                    .map(|(id, value)| Attribute { id, value })
                    .collect(),
            })
            .collect();
        ViewDocument {
            switch_id: view.switch_id,
            objects,
        }
    }
}

impl From<ViewDocument> for View {
    fn from(doc: ViewDocument) -> Self {
        View {
            switch_id: doc.switch_id,
            objects: doc
                .objects
                .into_iter()
                .map(|e| (e.key, ViewObject::new(e.object_type, e.attributes)))
                .collect(),
        }
    }
}
