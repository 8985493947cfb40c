//! SAI status codes.
//!
//! Every call that crosses the bridge is answered with one of these codes.
//! Codes are carried on the wire as their raw `i32` value.

use std::fmt;

macro_rules! sai_statuses {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// `sai_status_t` values.
        #[repr(i32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SaiStatus {
            $($variant = $code,)*
        }

        impl SaiStatus {
            /// Unrecognized codes collapse to `Failure`.
            pub fn from_raw(raw: i32) -> Self {
                match raw {
                    $($code => SaiStatus::$variant,)*
                    _ => SaiStatus::Failure,
                }
            }

            /// `SAI_STATUS_*` name of the code.
            pub const fn name(self) -> &'static str {
                match self {
                    $(SaiStatus::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(SaiStatus::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

sai_statuses! {
    Success = 0 => "SAI_STATUS_SUCCESS",
    Failure = -1 => "SAI_STATUS_FAILURE",
    NotSupported = -2 => "SAI_STATUS_NOT_SUPPORTED",
    NoMemory = -3 => "SAI_STATUS_NO_MEMORY",
    InsufficientResources = -4 => "SAI_STATUS_INSUFFICIENT_RESOURCES",
    InvalidParameter = -5 => "SAI_STATUS_INVALID_PARAMETER",
    ItemAlreadyExists = -6 => "SAI_STATUS_ITEM_ALREADY_EXISTS",
    ItemNotFound = -7 => "SAI_STATUS_ITEM_NOT_FOUND",
    BufferOverflow = -8 => "SAI_STATUS_BUFFER_OVERFLOW",
    Uninitialized = -12 => "SAI_STATUS_UNINITIALIZED",
    TableFull = -13 => "SAI_STATUS_TABLE_FULL",
    MandatoryAttributeMissing = -14 => "SAI_STATUS_MANDATORY_ATTRIBUTE_MISSING",
    NotImplemented = -15 => "SAI_STATUS_NOT_IMPLEMENTED",
    ObjectInUse = -17 => "SAI_STATUS_OBJECT_IN_USE",
    InvalidObjectType = -18 => "SAI_STATUS_INVALID_OBJECT_TYPE",
    InvalidObjectId = -19 => "SAI_STATUS_INVALID_OBJECT_ID",
    NotExecuted = -23 => "SAI_STATUS_NOT_EXECUTED",
    InvalidAttribute = -65536 => "SAI_STATUS_INVALID_ATTRIBUTE_0",
    AttrNotImplemented = -131072 => "SAI_STATUS_ATTR_NOT_IMPLEMENTED_0",
    UnknownAttribute = -196608 => "SAI_STATUS_UNKNOWN_ATTRIBUTE_0",
    AttrNotSupported = -262144 => "SAI_STATUS_ATTR_NOT_SUPPORTED_0",
}

impl SaiStatus {
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == SaiStatus::Success
    }

    /// `Ok(())` for success, the status itself otherwise.
    pub fn into_result(self) -> Result<(), SaiStatus> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for SaiStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for status in [
            SaiStatus::Success,
            SaiStatus::ItemNotFound,
            SaiStatus::ObjectInUse,
            SaiStatus::InvalidAttribute,
            SaiStatus::AttrNotSupported,
        ] {
            assert_eq!(SaiStatus::from_raw(status.as_raw()), status);
            assert_eq!(SaiStatus::from_name(status.name()), Some(status));
        }
    }

    #[test]
    fn test_unknown_code_is_failure() {
        assert_eq!(SaiStatus::from_raw(-999), SaiStatus::Failure);
        assert_eq!(SaiStatus::from_name("SAI_STATUS_BOGUS"), None);
    }

    #[test]
    fn test_into_result() {
        assert!(SaiStatus::Success.into_result().is_ok());
        assert_eq!(SaiStatus::TableFull.into_result(), Err(SaiStatus::TableFull));
        assert_eq!(SaiStatus::TableFull.to_string(), "SAI_STATUS_TABLE_FULL");
    }
}
