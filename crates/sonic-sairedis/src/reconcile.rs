//! View reconciliation planning.
//!
//! Compares the current view of a switch with the temporary view built during
//! a view transaction and emits the operations that turn one into the other.
//! Identical objects produce nothing, so reconciling a view against itself is
//! an empty plan.
//!
//! Operation order:
//! 1. removes of objects whose create-only attributes changed, referrers first
//! 2. creates, referents first; among ready route entries default routes first
//! 3. attribute sets
//! 4. removes of objects absent from the temporary view, referrers first

use crate::error::{Result, SairedisError};
use crate::proto::{Call, Operation};
use crate::view::{View, ViewObject};
use sonic_sai::{Attribute, Catalog, ObjectKey, ObjectType, SaiStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What a planned operation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Create(Vec<Attribute>),
    Set(Attribute),
    Remove,
}

/// One operation of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOp {
    pub object_type: ObjectType,
    pub key: ObjectKey,
    pub action: PlannedAction,
}

impl PlannedOp {
    pub fn operation(&self) -> Operation {
        match self.action {
            PlannedAction::Create(_) => Operation::Create,
            PlannedAction::Set(_) => Operation::Set,
            PlannedAction::Remove => Operation::Remove,
        }
    }

    pub fn to_call(&self) -> Call {
        match &self.action {
            PlannedAction::Create(attributes) => Call::Create {
                key: self.key,
                attributes: attributes.clone(),
            },
            PlannedAction::Set(attribute) => Call::Set {
                key: self.key,
                attribute: attribute.clone(),
            },
            PlannedAction::Remove => Call::Remove { key: self.key },
        }
    }
}

impl fmt::Display for PlannedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.operation(), self.object_type, self.key)?;
        if let PlannedAction::Set(attr) = &self.action {
            write!(f, " {}", attr.id)?;
        }
        Ok(())
    }
}

/// A planned operation that failed during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOp {
    pub op: PlannedOp,
    /// Remote status, when the daemon answered.
    pub status: Option<SaiStatus>,
    pub reason: String,
}

/// Ordered operations reconciling one switch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationPlan {
    pub switch_id: sonic_sai::ObjectId,
    pub ops: Vec<PlannedOp>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// `(creates, sets, removes)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.ops.iter().fold((0, 0, 0), |(c, s, r), op| match op.action {
            PlannedAction::Create(_) => (c + 1, s, r),
            PlannedAction::Set(_) => (c, s + 1, r),
            PlannedAction::Remove => (c, s, r + 1),
        })
    }
}

/// Computes the operations that turn `current` into `temporary`.
pub fn plan(current: &View, temporary: &View, catalog: &Catalog) -> Result<ReconciliationPlan> {
    let mut recreate = BTreeSet::new();
    let mut sets = Vec::new();

    for (key, temp_obj) in temporary.iter() {
        let Some(cur_obj) = current.get(key) else {
            continue;
        };
        if cur_obj.object_type != temp_obj.object_type
            || create_only_changed(catalog, cur_obj, temp_obj)
        {
            recreate.insert(*key);
            continue;
        }
        attribute_diff(catalog, key, cur_obj, temp_obj, &mut sets);
    }

    let creates: BTreeSet<ObjectKey> = temporary
        .keys()
        .filter(|k| !current.contains(k) || recreate.contains(k))
        .copied()
        .collect();
    let removes: BTreeSet<ObjectKey> = current
        .keys()
        .filter(|k| !temporary.contains(k))
        .copied()
        .collect();

    let mut ops = Vec::with_capacity(recreate.len() * 2 + creates.len() + sets.len() + removes.len());

    for key in topo_order(current, &recreate)?.into_iter().rev() {
        ops.push(remove_op(current, key));
    }

    for key in topo_order(temporary, &creates)? {
        if let Some(object) = temporary.get(&key) {
            ops.push(PlannedOp {
                object_type: object.object_type,
                key,
                action: PlannedAction::Create(object.attribute_list()),
            });
        }
    }

    ops.extend(sets);

    for key in topo_order(current, &removes)?.into_iter().rev() {
        ops.push(remove_op(current, key));
    }

    Ok(ReconciliationPlan {
        switch_id: temporary.switch_id,
        ops,
    })
}

fn remove_op(view: &View, key: ObjectKey) -> PlannedOp {
    PlannedOp {
        object_type: view
            .get(&key)
            .map(|o| o.object_type)
            .unwrap_or_default(),
        key,
        action: PlannedAction::Remove,
    }
}

fn create_only_changed(catalog: &Catalog, current: &ViewObject, temporary: &ViewObject) -> bool {
    let ot = temporary.object_type;
    let ids: BTreeSet<_> = current
        .attributes
        .keys()
        .chain(temporary.attributes.keys())
        .filter(|id| catalog.is_create_only(ot, **id))
        .copied()
        .collect();

    ids.into_iter().any(|id| {
        let default = catalog.metadata(ot, id).and_then(|m| m.default.as_ref());
        let cur = current.attribute(id).or(default);
        let tmp = temporary.attribute(id).or(default);
        cur != tmp
    })
}

fn attribute_diff(
    catalog: &Catalog,
    key: &ObjectKey,
    current: &ViewObject,
    temporary: &ViewObject,
    out: &mut Vec<PlannedOp>,
) {
    let ot = temporary.object_type;
    let set = |attribute: Attribute| PlannedOp {
        object_type: ot,
        key: *key,
        action: PlannedAction::Set(attribute),
    };

    for (id, value) in &temporary.attributes {
        if catalog.metadata(ot, *id).is_some_and(|m| m.flags.read_only) {
            continue;
        }
        if current.attribute(*id) != Some(value) {
            out.push(set(Attribute {
                id: *id,
                value: value.clone(),
            }));
        }
    }

    for (id, value) in &current.attributes {
        if temporary.attributes.contains_key(id) {
            continue;
        }
        let Some(meta) = catalog.metadata(ot, *id) else {
            continue;
        };
        if meta.flags.read_only || meta.flags.create_only {
            continue;
        }
        if let Some(default) = &meta.default {
            if default != value {
                out.push(set(Attribute {
                    id: *id,
                    value: default.clone(),
                }));
            }
        }
    }
}

/// Orders `subset` so that every object comes after the objects it depends
/// on. Dependencies outside the subset are treated as satisfied.
fn topo_order(view: &View, subset: &BTreeSet<ObjectKey>) -> Result<Vec<ObjectKey>> {
    let mut indegree: BTreeMap<ObjectKey, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<ObjectKey, Vec<ObjectKey>> = BTreeMap::new();

    for key in subset {
        let deps: Vec<ObjectKey> = view
            .dependencies(key)
            .into_iter()
            .filter(|d| subset.contains(d))
            .collect();
        indegree.insert(*key, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(*key);
        }
    }

    let mut ready: BTreeSet<(u8, ObjectKey)> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| (priority(k), *k))
        .collect();

    let mut order = Vec::with_capacity(subset.len());
    while let Some((_, key)) = ready.pop_first() {
        order.push(key);
        for dependent in dependents.get(&key).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert((priority(dependent), *dependent));
                }
            }
        }
    }

    if order.len() < subset.len() {
        let cyclic = indegree
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(k, _)| k)
            .collect();
        return Err(SairedisError::DependencyCycle(cyclic));
    }
    Ok(order)
}

fn priority(key: &ObjectKey) -> u8 {
    if key.is_default_route() {
        0
    } else {
        1
    }
}
