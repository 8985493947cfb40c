//! IP address and prefix types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// SAI address family discriminant (`sai_ip_addr_family_t`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    Ipv4 = 0,
    Ipv6 = 1,
}

impl AddressFamily {
    pub fn from_raw(raw: u8) -> Result<Self, ParseError> {
        match raw {
            0 => Ok(AddressFamily::Ipv4),
            1 => Ok(AddressFamily::Ipv6),
            other => Err(ParseError::UnknownAddressFamily(other)),
        }
    }

    /// Number of address octets for this family.
    pub const fn octet_len(self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Ipv6 => 16,
        }
    }

    /// Longest valid prefix length for this family.
    pub const fn max_prefix_len(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }
}

/// An IPv4 or IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const fn family(&self) -> AddressFamily {
        match self {
            IpAddress::V4(_) => AddressFamily::Ipv4,
            IpAddress::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Address octets in network order (4 or 16 bytes).
    pub fn octets(&self) -> Vec<u8> {
        match self {
            IpAddress::V4(addr) => addr.octets().to_vec(),
            IpAddress::V6(addr) => addr.octets().to_vec(),
        }
    }

    /// Rebuilds an address from its family and octets.
    ///
    /// Fails when the octet count does not match the family.
    pub fn from_octets(family: AddressFamily, octets: &[u8]) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidIpAddress(format!("{} octets for {:?}", octets.len(), family));
        match family {
            AddressFamily::Ipv4 => {
                let raw: [u8; 4] = octets.try_into().map_err(|_| invalid())?;
                Ok(IpAddress::V4(Ipv4Addr::from(raw)))
            }
            AddressFamily::Ipv6 => {
                let raw: [u8; 16] = octets.try_into().map_err(|_| invalid())?;
                Ok(IpAddress::V6(Ipv6Addr::from(raw)))
            }
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::V4(v4),
            IpAddr::V6(v6) => IpAddress::V6(v6),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

impl TryFrom<String> for IpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(addr: IpAddress) -> Self {
        addr.to_string()
    }
}

/// An IP prefix in CIDR notation (e.g. `10.0.0.0/24` or `2001:db8::/32`).
///
/// Ordered by address, then by length; route entries keyed by prefix sort
/// deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddress,
    len: u8,
}

impl IpPrefix {
    /// Fails if `len` exceeds the maximum for the address family.
    pub fn new(address: IpAddress, len: u8) -> Result<Self, ParseError> {
        let max = address.family().max_prefix_len();
        if len > max {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{address}/{len}: length exceeds {max}"
            )));
        }
        Ok(IpPrefix { address, len })
    }

    pub const fn address(&self) -> IpAddress {
        self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.len
    }

    pub const fn family(&self) -> AddressFamily {
        self.address.family()
    }

    /// `0.0.0.0/0` or `::/0`.
    pub const fn is_default(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;
        let address: IpAddress = addr
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        let len: u8 = len
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        IpPrefix::new(address, len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> Self {
        prefix.to_string()
    }
}
