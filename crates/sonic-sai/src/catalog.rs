//! Attribute catalog.
//!
//! The catalog is the externally supplied description of which attributes
//! exist per object type, which value tag each one carries, and how it may be
//! used (mandatory on create, create-only, read-only). The codec uses it to
//! reject mistyped attributes before they reach the wire, and syncd uses it
//! to validate calls and to compute view reconciliation.
//!
//! Catalogs are either assembled with [`CatalogBuilder`] or loaded from YAML:
//!
//! ```yaml
//! object_types:
//!   - object_type: ROUTER_INTERFACE
//!     attributes:
//!       - { id: 0, name: SAI_ROUTER_INTERFACE_ATTR_VIRTUAL_ROUTER_ID, value_type: object_id,
//!           flags: { mandatory_on_create: true, create_only: true } }
//!       - { id: 5, name: SAI_ROUTER_INTERFACE_ATTR_MTU, value_type: u32, default: { u32: 1514 } }
//! ```

use crate::attr::{AttrId, AttrValue, AttrValueType, Attribute};
use crate::status::SaiStatus;
use crate::types::ObjectType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Usage flags of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttrFlags {
    #[serde(default)]
    pub mandatory_on_create: bool,
    #[serde(default)]
    pub create_only: bool,
    #[serde(default)]
    pub read_only: bool,
}

/// Metadata of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrMetadata {
    pub id: AttrId,
    pub name: String,
    pub value_type: AttrValueType,
    #[serde(default)]
    pub flags: AttrFlags,
    /// Value the attribute takes when not given on create.
    #[serde(default)]
    pub default: Option<AttrValue>,
}

impl AttrMetadata {
    pub fn new(id: impl Into<AttrId>, name: impl Into<String>, value_type: AttrValueType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value_type,
            flags: AttrFlags::default(),
            default: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.flags.mandatory_on_create = true;
        self
    }

    pub fn create_only(mut self) -> Self {
        self.flags.create_only = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.read_only = true;
        self
    }

    pub fn with_default(mut self, value: AttrValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Catalog validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown object type {0}")]
    UnknownObjectType(ObjectType),

    #[error("unknown attribute {attr} for {object_type}")]
    UnknownAttribute { object_type: ObjectType, attr: AttrId },

    #[error("{name}: expected {expected:?} value, got {actual:?}")]
    TypeMismatch {
        name: String,
        expected: AttrValueType,
        actual: AttrValueType,
    },

    #[error("{0} is read-only")]
    ReadOnly(String),

    #[error("{0} is create-only and cannot be set")]
    CreateOnly(String),

    #[error("mandatory attribute {0} missing on create")]
    MandatoryMissing(String),

    #[error("attribute {0} given more than once")]
    Duplicate(AttrId),

    #[error("catalog document error: {0}")]
    Document(String),
}

impl CatalogError {
    /// SAI status reported back to the caller for this failure.
    pub fn status(&self) -> SaiStatus {
        match self {
            CatalogError::UnknownObjectType(_) => SaiStatus::InvalidObjectType,
            CatalogError::UnknownAttribute { .. } => SaiStatus::UnknownAttribute,
            CatalogError::TypeMismatch { .. } | CatalogError::Duplicate(_) => {
                SaiStatus::InvalidParameter
            }
            CatalogError::ReadOnly(_) | CatalogError::CreateOnly(_) => SaiStatus::InvalidAttribute,
            CatalogError::MandatoryMissing(_) => SaiStatus::MandatoryAttributeMissing,
            CatalogError::Document(_) => SaiStatus::Failure,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    object_types: Vec<ObjectTypeDocument>,
}

#[derive(Debug, Deserialize)]
struct ObjectTypeDocument {
    object_type: ObjectType,
    #[serde(default)]
    attributes: Vec<AttrMetadata>,
}

/// Static attribute catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    attrs: BTreeMap<ObjectType, BTreeMap<AttrId, AttrMetadata>>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Parses a YAML catalog document.
    pub fn from_yaml_str(document: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_yaml::from_str(document).map_err(|e| CatalogError::Document(e.to_string()))?;

        let mut builder = Catalog::builder();
        for object in doc.object_types {
            builder = builder.object_type(object.object_type);
            for attr in object.attributes {
                builder = builder.attribute(object.object_type, attr);
            }
        }
        builder.build()
    }

    /// Reads and parses a YAML catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Document(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), object_types = catalog.attrs.len(), "loaded attribute catalog");
        Ok(catalog)
    }

    pub fn knows(&self, object_type: ObjectType) -> bool {
        self.attrs.contains_key(&object_type)
    }

    pub fn object_types(&self) -> impl Iterator<Item = ObjectType> + '_ {
        self.attrs.keys().copied()
    }

    pub fn metadata(&self, object_type: ObjectType, attr: AttrId) -> Option<&AttrMetadata> {
        self.attrs.get(&object_type)?.get(&attr)
    }

    /// All attributes of an object type, ordered by id.
    pub fn attributes(&self, object_type: ObjectType) -> impl Iterator<Item = &AttrMetadata> + '_ {
        self.attrs.get(&object_type).into_iter().flat_map(|m| m.values())
    }

    /// Looks up an attribute and checks its value tag.
    pub fn check_value(
        &self,
        object_type: ObjectType,
        attr: &Attribute,
    ) -> Result<&AttrMetadata, CatalogError> {
        let per_type = self
            .attrs
            .get(&object_type)
            .ok_or(CatalogError::UnknownObjectType(object_type))?;
        let meta = per_type.get(&attr.id).ok_or(CatalogError::UnknownAttribute {
            object_type,
            attr: attr.id,
        })?;
        let actual = attr.value.value_type();
        if actual != meta.value_type {
            return Err(CatalogError::TypeMismatch {
                name: meta.name.clone(),
                expected: meta.value_type,
                actual,
            });
        }
        Ok(meta)
    }

    pub fn validate_create(
        &self,
        object_type: ObjectType,
        attrs: &[Attribute],
    ) -> Result<(), CatalogError> {
        let mut seen = HashSet::with_capacity(attrs.len());
        for attr in attrs {
            let meta = self.check_value(object_type, attr)?;
            if meta.flags.read_only {
                return Err(CatalogError::ReadOnly(meta.name.clone()));
            }
            if !seen.insert(attr.id) {
                return Err(CatalogError::Duplicate(attr.id));
            }
        }

        if let Some(missing) = self
            .attributes(object_type)
            .find(|m| m.flags.mandatory_on_create && !seen.contains(&m.id))
        {
            return Err(CatalogError::MandatoryMissing(missing.name.clone()));
        }
        Ok(())
    }

    pub fn validate_set(&self, object_type: ObjectType, attr: &Attribute) -> Result<(), CatalogError> {
        let meta = self.check_value(object_type, attr)?;
        if meta.flags.read_only {
            return Err(CatalogError::ReadOnly(meta.name.clone()));
        }
        if meta.flags.create_only {
            return Err(CatalogError::CreateOnly(meta.name.clone()));
        }
        Ok(())
    }

    pub fn validate_get(&self, object_type: ObjectType, ids: &[AttrId]) -> Result<(), CatalogError> {
        let per_type = self
            .attrs
            .get(&object_type)
            .ok_or(CatalogError::UnknownObjectType(object_type))?;
        match ids.iter().find(|id| !per_type.contains_key(id)) {
            Some(id) => Err(CatalogError::UnknownAttribute {
                object_type,
                attr: *id,
            }),
            None => Ok(()),
        }
    }

    pub fn is_create_only(&self, object_type: ObjectType, attr: AttrId) -> bool {
        self.metadata(object_type, attr)
            .is_some_and(|m| m.flags.create_only)
    }
}

/// Incremental catalog construction.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    attrs: BTreeMap<ObjectType, BTreeMap<AttrId, AttrMetadata>>,
    duplicates: Vec<(ObjectType, AttrId)>,
}

impl CatalogBuilder {
    /// Declares an object type, with or without attributes.
    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.attrs.entry(object_type).or_default();
        self
    }

    pub fn attribute(mut self, object_type: ObjectType, meta: AttrMetadata) -> Self {
        let per_type = self.attrs.entry(object_type).or_default();
        if per_type.contains_key(&meta.id) {
            self.duplicates.push((object_type, meta.id));
        }
        per_type.insert(meta.id, meta);
        self
    }

    /// Fails on duplicate declarations and on defaults whose tag disagrees
    /// with the declared value type.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        if let Some((object_type, attr)) = self.duplicates.first() {
            return Err(CatalogError::Document(format!(
                "attribute {attr} declared twice for {object_type}"
            )));
        }

        for meta in self.attrs.values().flat_map(|m| m.values()) {
            if let Some(default) = &meta.default {
                if default.value_type() != meta.value_type {
                    return Err(CatalogError::TypeMismatch {
                        name: meta.name.clone(),
                        expected: meta.value_type,
                        actual: default.value_type(),
                    });
                }
            }
        }

        Ok(Catalog { attrs: self.attrs })
    }
}

/// Index from attribute name to `(object type, id)`, for tooling.
pub fn name_index(catalog: &Catalog) -> HashMap<&str, (ObjectType, AttrId)> {
    catalog
        .attrs
        .iter()
        .flat_map(|(ot, attrs)| attrs.values().map(move |m| (m.name.as_str(), (*ot, m.id))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;
    use pretty_assertions::assert_eq;

    const RIF_VR: u32 = 0;
    const RIF_TYPE: u32 = 1;
    const RIF_MTU: u32 = 5;
    const RIF_OPER: u32 = 9;

    fn catalog() -> Catalog {
        Catalog::builder()
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_VR, "VIRTUAL_ROUTER_ID", AttrValueType::ObjectId)
                    .mandatory()
                    .create_only(),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_TYPE, "TYPE", AttrValueType::Enum).mandatory().create_only(),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_MTU, "MTU", AttrValueType::U32).with_default(AttrValue::U32(1514)),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_OPER, "OPER_STATUS", AttrValueType::Enum).read_only(),
            )
            .build()
            .unwrap()
    }

    fn vr_attr() -> Attribute {
        Attribute::new(RIF_VR, AttrValue::ObjectId(ObjectId::from_raw(1)))
    }

    #[test]
    fn test_validate_create() {
        let catalog = catalog();
        let ot = ObjectType::ROUTER_INTERFACE;

        let ok = [vr_attr(), Attribute::new(RIF_TYPE, AttrValue::Enum(1))];
        assert!(catalog.validate_create(ot, &ok).is_ok());

        let missing = [vr_attr()];
        assert_eq!(
            catalog.validate_create(ot, &missing),
            Err(CatalogError::MandatoryMissing("TYPE".to_string()))
        );

        let read_only = [
            vr_attr(),
            Attribute::new(RIF_TYPE, AttrValue::Enum(1)),
            Attribute::new(RIF_OPER, AttrValue::Enum(1)),
        ];
        assert!(matches!(catalog.validate_create(ot, &read_only), Err(CatalogError::ReadOnly(_))));

        let dup = [vr_attr(), vr_attr(), Attribute::new(RIF_TYPE, AttrValue::Enum(1))];
        assert_eq!(catalog.validate_create(ot, &dup), Err(CatalogError::Duplicate(AttrId(RIF_VR))));
    }

    #[test]
    fn test_validate_set_rejects_create_only_and_mistyped() {
        let catalog = catalog();
        let ot = ObjectType::ROUTER_INTERFACE;

        assert!(catalog.validate_set(ot, &Attribute::new(RIF_MTU, AttrValue::U32(9100))).is_ok());
        assert!(matches!(catalog.validate_set(ot, &vr_attr()), Err(CatalogError::CreateOnly(_))));

        let err = catalog
            .validate_set(ot, &Attribute::new(RIF_MTU, AttrValue::U16(9100)))
            .unwrap_err();
        assert_eq!(err.status(), SaiStatus::InvalidParameter);
    }

    #[test]
    fn test_unknown_type_and_attribute() {
        let catalog = catalog();
        let err = catalog.validate_get(ObjectType::PORT, &[AttrId(0)]).unwrap_err();
        assert_eq!(err.status(), SaiStatus::InvalidObjectType);

        let err = catalog
            .validate_get(ObjectType::ROUTER_INTERFACE, &[AttrId(77)])
            .unwrap_err();
        assert_eq!(err.status(), SaiStatus::UnknownAttribute);
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
object_types:
  - object_type: SWITCH
  - object_type: ROUTER_INTERFACE
    attributes:
      - id: 0
        name: SAI_ROUTER_INTERFACE_ATTR_VIRTUAL_ROUTER_ID
        value_type: object_id
        flags: { mandatory_on_create: true, create_only: true }
      - id: 5
        name: SAI_ROUTER_INTERFACE_ATTR_MTU
        value_type: u32
        default: { u32: 1514 }
"#;
        let catalog = Catalog::from_yaml_str(yaml).unwrap();
        assert!(catalog.knows(ObjectType::SWITCH));
        assert!(catalog.is_create_only(ObjectType::ROUTER_INTERFACE, AttrId(0)));
        let mtu = catalog.metadata(ObjectType::ROUTER_INTERFACE, AttrId(5)).unwrap();
        assert_eq!(mtu.default, Some(AttrValue::U32(1514)));

        let index = name_index(&catalog);
        assert_eq!(
            index.get("SAI_ROUTER_INTERFACE_ATTR_MTU"),
            Some(&(ObjectType::ROUTER_INTERFACE, AttrId(5)))
        );
    }

    #[test]
    fn test_builder_rejects_bad_default() {
        let result = Catalog::builder()
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(1, "SPEED", AttrValueType::U32).with_default(AttrValue::Bool(true)),
            )
            .build();
        assert!(matches!(result, Err(CatalogError::TypeMismatch { .. })));
    }
}
