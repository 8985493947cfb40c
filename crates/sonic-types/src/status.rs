//! Operational status reported by switch and port state notifications.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational status values shared by `sai_switch_oper_status_t` and
/// `sai_port_oper_status_t`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperStatus {
    #[default]
    Unknown = 0,
    Up = 1,
    Down = 2,
    Testing = 3,
    NotPresent = 4,
}

impl OperStatus {
    /// Unrecognized values map to `Unknown`, matching how vendor SAIs report
    /// states newer than the headers the daemon was built against.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => OperStatus::Up,
            2 => OperStatus::Down,
            3 => OperStatus::Testing,
            4 => OperStatus::NotPresent,
            _ => OperStatus::Unknown,
        }
    }

    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    pub const fn is_up(self) -> bool {
        matches!(self, OperStatus::Up)
    }
}

impl fmt::Display for OperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperStatus::Unknown => "unknown",
            OperStatus::Up => "up",
            OperStatus::Down => "down",
            OperStatus::Testing => "testing",
            OperStatus::NotPresent => "not_present",
        };
        f.write_str(s)
    }
}

impl FromStr for OperStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(OperStatus::Unknown),
            "up" => Ok(OperStatus::Up),
            "down" => Ok(OperStatus::Down),
            "testing" => Ok(OperStatus::Testing),
            "not_present" => Ok(OperStatus::NotPresent),
            _ => Err(ParseError::InvalidOperStatus(s.to_string())),
        }
    }
}
