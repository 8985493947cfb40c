//! SAI object model shared by the sairedis client and the syncd daemon.
//!
//! # Architecture
//!
//! - [`types`]: object ids (with the virtual id layout) and object types
//! - [`status`]: `sai_status_t` codes
//! - [`attr`]: attribute ids, tagged attribute values, object id traversal
//! - [`key`]: object keys, including route/FDB/neighbor entry structs
//! - [`catalog`]: attribute metadata and call validation
//!
//! # Example
//!
//! ```
//! use sonic_sai::{AttrValue, Attribute, ObjectId, ObjectIdRefs};
//!
//! let attrs = vec![Attribute::new(0, AttrValue::ObjectId(ObjectId::from_raw(0x10)))];
//! assert_eq!(attrs.referenced_ids(), vec![ObjectId::from_raw(0x10)]);
//! ```

pub mod attr;
pub mod catalog;
pub mod key;
pub mod status;
pub mod types;

pub use attr::{AttrId, AttrValue, AttrValueType, Attribute, ObjectIdRefs};
pub use catalog::{AttrFlags, AttrMetadata, Catalog, CatalogBuilder, CatalogError};
pub use key::{FdbEntry, NeighborEntry, ObjectKey, RouteEntry};
pub use status::SaiStatus;
pub use types::{IdParseError, ObjectId, ObjectType, RawObjectId, MAX_VID_INDEX};
