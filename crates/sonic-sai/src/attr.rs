//! SAI attributes.
//!
//! An attribute is an `(id, value)` pair where the value is a tagged union.
//! Which tag a given id must carry is declared by the [`Catalog`](crate::Catalog),
//! not by the attribute itself.

use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use sonic_types::{IpAddress, IpPrefix, MacAddress};
use std::convert::Infallible;
use std::fmt;

/// Attribute id, scoped to an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrId(pub u32);

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr#{}", self.0)
    }
}

/// Type tag of an [`AttrValue`]. The discriminant is the wire tag.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValueType {
    Bool = 1,
    U8 = 2,
    I8 = 3,
    U16 = 4,
    I16 = 5,
    U32 = 6,
    I32 = 7,
    U64 = 8,
    I64 = 9,
    Enum = 10,
    ObjectId = 11,
    ObjectList = 12,
    IpAddress = 13,
    IpPrefix = 14,
    Mac = 15,
    Bytes = 16,
}

impl AttrValueType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        use AttrValueType::*;
        let ty = match tag {
            1 => Bool,
            2 => U8,
            3 => I8,
            4 => U16,
            5 => I16,
            6 => U32,
            7 => I32,
            8 => U64,
            9 => I64,
            10 => Enum,
            11 => ObjectId,
            12 => ObjectList,
            13 => IpAddress,
            14 => IpPrefix,
            15 => Mac,
            16 => Bytes,
            _ => return None,
        };
        Some(ty)
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// True for tags that can hold object id references.
    pub const fn holds_object_ids(self) -> bool {
        matches!(self, AttrValueType::ObjectId | AttrValueType::ObjectList)
    }
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    Enum(i32),
    ObjectId(ObjectId),
    ObjectList(Vec<ObjectId>),
    IpAddress(IpAddress),
    IpPrefix(IpPrefix),
    Mac(MacAddress),
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn value_type(&self) -> AttrValueType {
        match self {
            AttrValue::Bool(_) => AttrValueType::Bool,
            AttrValue::U8(_) => AttrValueType::U8,
            AttrValue::I8(_) => AttrValueType::I8,
            AttrValue::U16(_) => AttrValueType::U16,
            AttrValue::I16(_) => AttrValueType::I16,
            AttrValue::U32(_) => AttrValueType::U32,
            AttrValue::I32(_) => AttrValueType::I32,
            AttrValue::U64(_) => AttrValueType::U64,
            AttrValue::I64(_) => AttrValueType::I64,
            AttrValue::Enum(_) => AttrValueType::Enum,
            AttrValue::ObjectId(_) => AttrValueType::ObjectId,
            AttrValue::ObjectList(_) => AttrValueType::ObjectList,
            AttrValue::IpAddress(_) => AttrValueType::IpAddress,
            AttrValue::IpPrefix(_) => AttrValueType::IpPrefix,
            AttrValue::Mac(_) => AttrValueType::Mac,
            AttrValue::Bytes(_) => AttrValueType::Bytes,
        }
    }
}

impl ObjectIdRefs for AttrValue {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        match self {
            AttrValue::ObjectId(id) => f(*id),
            AttrValue::ObjectList(ids) => ids.iter().copied().for_each(f),
            _ => {}
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        match self {
            AttrValue::ObjectId(id) => *id = f(*id)?,
            AttrValue::ObjectList(ids) => {
                for id in ids.iter_mut() {
                    *id = f(*id)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One attribute of a SAI object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttrId,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(id: impl Into<AttrId>, value: AttrValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

impl From<u32> for AttrId {
    fn from(raw: u32) -> Self {
        AttrId(raw)
    }
}

impl ObjectIdRefs for Attribute {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        self.value.visit_object_ids(f);
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        self.value.try_remap_object_ids(f)
    }
}

impl<T: ObjectIdRefs> ObjectIdRefs for [T] {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId)) {
        for item in self {
            item.visit_object_ids(f);
        }
    }

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E> {
        for item in self.iter_mut() {
            item.try_remap_object_ids(f)?;
        }
        Ok(())
    }
}

/// Access to every object id embedded in a value.
///
/// Used for dependency extraction, virtual/real id translation and replay id
/// rewriting. Null ids are visited too; callers decide what null means.
pub trait ObjectIdRefs {
    fn visit_object_ids(&self, f: &mut dyn FnMut(ObjectId));

    fn try_remap_object_ids<E>(
        &mut self,
        f: &mut dyn FnMut(ObjectId) -> Result<ObjectId, E>,
    ) -> Result<(), E>;

    fn remap_object_ids(&mut self, f: &mut dyn FnMut(ObjectId) -> ObjectId) {
        let result: Result<(), Infallible> = self.try_remap_object_ids(&mut |id| Ok(f(id)));
        if let Err(never) = result {
            match never {}
        }
    }

    /// Non-null ids referenced by the value, in visit order.
    fn referenced_ids(&self) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        self.visit_object_ids(&mut |id| {
            if !id.is_null() {
                ids.push(id);
            }
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tag_roundtrip() {
        for tag in 1..=16u8 {
            let ty = AttrValueType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
        assert!(AttrValueType::from_tag(0).is_none());
        assert!(AttrValueType::from_tag(17).is_none());
    }

    #[test]
    fn test_referenced_ids_skip_null() {
        let attrs = vec![
            Attribute::new(1, AttrValue::ObjectId(ObjectId::from_raw(7))),
            Attribute::new(2, AttrValue::ObjectList(vec![ObjectId::NULL, ObjectId::from_raw(9)])),
            Attribute::new(3, AttrValue::U32(7)),
        ];
        assert_eq!(
            attrs.referenced_ids(),
            vec![ObjectId::from_raw(7), ObjectId::from_raw(9)]
        );
    }

    #[test]
    fn test_remap_object_ids() {
        let mut value = AttrValue::ObjectList(vec![ObjectId::from_raw(1), ObjectId::from_raw(2)]);
        value.remap_object_ids(&mut |id| ObjectId::from_raw(id.as_raw() + 100));
        assert_eq!(
            value,
            AttrValue::ObjectList(vec![ObjectId::from_raw(101), ObjectId::from_raw(102)])
        );

        let mut single = AttrValue::ObjectId(ObjectId::from_raw(5));
        let err = single.try_remap_object_ids(&mut |_| Err("unknown"));
        assert_eq!(err, Err("unknown"));
    }

    #[test]
    fn test_value_serde_is_tagged() {
        let value = AttrValue::U32(9100);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"u32":9100}"#);
    }
}
