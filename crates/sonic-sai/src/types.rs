//! SAI object ids and object types.
//!
//! Ids handed out by syncd are *virtual* object ids (VIDs). A VID packs the
//! switch index and the object type next to a per-daemon counter so that both
//! can be recovered without a lookup:
//!
//! ```text
//!  63      56 55      48 47                                   0
//! +----------+----------+--------------------------------------+
//! |  switch  |  object  |                index                 |
//! |  index   |   type   |                                      |
//! +----------+----------+--------------------------------------+
//! ```
//!
//! Ids issued by the vendor driver (RIDs) use the same `ObjectId` type but
//! carry no layout; they never leave syncd.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw SAI object id (`sai_object_id_t`).
pub type RawObjectId = u64;

const INDEX_BITS: u32 = 48;
const OBJECT_TYPE_SHIFT: u32 = 48;
const SWITCH_INDEX_SHIFT: u32 = 56;

/// Largest counter value a VID can carry.
pub const MAX_VID_INDEX: u64 = (1 << INDEX_BITS) - 1;

/// A SAI object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(RawObjectId);

impl ObjectId {
    /// `SAI_NULL_OBJECT_ID`.
    pub const NULL: ObjectId = ObjectId(0);

    pub const fn from_raw(raw: RawObjectId) -> Self {
        ObjectId(raw)
    }

    pub const fn as_raw(&self) -> RawObjectId {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Composes a virtual id.
    ///
    /// Returns `None` when `index` does not fit the counter field or the
    /// object type does not fit its byte.
    pub fn compose_virtual(switch_index: u8, object_type: ObjectType, index: u64) -> Option<Self> {
        if index == 0 || index > MAX_VID_INDEX || object_type.as_raw() > 0xff {
            return None;
        }
        let raw = (u64::from(switch_index) << SWITCH_INDEX_SHIFT)
            | (u64::from(object_type.as_raw()) << OBJECT_TYPE_SHIFT)
            | index;
        Some(ObjectId(raw))
    }

    /// Object type encoded in a virtual id.
    pub const fn virtual_object_type(&self) -> ObjectType {
        ObjectType(((self.0 >> OBJECT_TYPE_SHIFT) & 0xff) as u32)
    }

    /// Switch index encoded in a virtual id.
    pub const fn switch_index(&self) -> u8 {
        (self.0 >> SWITCH_INDEX_SHIFT) as u8
    }

    /// Counter value encoded in a virtual id.
    pub const fn index(&self) -> u64 {
        self.0 & MAX_VID_INDEX
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:0x{:x}", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:0x{:x}", self.0)
    }
}

/// Error for object id / object type text parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what}: {input}")]
pub struct IdParseError {
    what: &'static str,
    input: String,
}

impl FromStr for ObjectId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdParseError {
            what: "object id",
            input: s.to_string(),
        };
        let hex = s
            .strip_prefix("oid:0x")
            .or_else(|| s.strip_prefix("0x"))
            .ok_or_else(invalid)?;
        u64::from_str_radix(hex, 16).map(ObjectId).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ObjectId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_string()
    }
}

/// A SAI object type (`sai_object_type_t`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectType(u32);

macro_rules! define_object_types {
    ($($name:ident = $value:literal,)*) => {
        impl ObjectType {
            $(
                #[doc = concat!("`SAI_OBJECT_TYPE_", stringify!($name), "`")]
                pub const $name: ObjectType = ObjectType($value);
            )*

            /// Symbolic name, if the type is one of the well-known types.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }

            /// Looks up a well-known type by its symbolic name.
            pub fn from_name(name: &str) -> Option<ObjectType> {
                let name = name.strip_prefix("SAI_OBJECT_TYPE_").unwrap_or(name);
                match name {
                    $(stringify!($name) => Some(ObjectType::$name),)*
                    _ => None,
                }
            }
        }
    };
}

define_object_types! {
    NULL = 0,
    PORT = 1,
    LAG = 2,
    VIRTUAL_ROUTER = 3,
    NEXT_HOP = 4,
    NEXT_HOP_GROUP = 5,
    ROUTER_INTERFACE = 6,
    ACL_TABLE = 7,
    ACL_ENTRY = 8,
    ACL_COUNTER = 9,
    HOSTIF = 13,
    MIRROR_SESSION = 14,
    POLICER = 18,
    QUEUE = 21,
    SCHEDULER = 22,
    BUFFER_POOL = 24,
    BUFFER_PROFILE = 25,
    LAG_MEMBER = 27,
    FDB_ENTRY = 32,
    SWITCH = 33,
    HOSTIF_TRAP = 34,
    NEIGHBOR_ENTRY = 36,
    ROUTE_ENTRY = 37,
    VLAN = 38,
    VLAN_MEMBER = 39,
    NEXT_HOP_GROUP_MEMBER = 45,
    BRIDGE = 57,
    BRIDGE_PORT = 58,
}

impl ObjectType {
    pub const fn from_raw(raw: u32) -> Self {
        ObjectType(raw)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Entry types are keyed by a struct instead of an object id.
    pub const fn is_entry(&self) -> bool {
        matches!(self.0, 32 | 36 | 37)
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "OBJECT_TYPE_{}", self.0),
        }
    }
}

impl FromStr for ObjectType {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(ot) = ObjectType::from_name(s) {
            return Ok(ot);
        }
        s.strip_prefix("OBJECT_TYPE_")
            .unwrap_or(s)
            .parse::<u32>()
            .map(ObjectType)
            .map_err(|_| IdParseError {
                what: "object type",
                input: s.to_string(),
            })
    }
}

impl TryFrom<String> for ObjectType {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectType> for String {
    fn from(ot: ObjectType) -> Self {
        ot.to_string()
    }
}
