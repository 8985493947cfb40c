//! Network value types carried inside SAI attribute values.
//!
//! These are the leaf types of the attribute model shared by the sairedis
//! client and the syncd daemon:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`OperStatus`]: operational status reported by switch and port notifications
//!
//! Every type has a textual form (used by YAML catalogs and JSON warm-restart
//! images) and a fixed binary form (used by the wire codec).

mod ip;
mod mac;
mod status;

pub use ip::{AddressFamily, IpAddress, IpPrefix};
pub use mac::MacAddress;
pub use status::OperStatus;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("unknown address family: {0}")]
    UnknownAddressFamily(u8),

    #[error("invalid oper status: {0}")]
    InvalidOperStatus(String),
}
