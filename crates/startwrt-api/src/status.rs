// ubus status codes
//
// Mirrors `enum ubus_msg_status` from libubus. Every `call` reply carries
// one of these as the first element of its result array.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Numeric status returned by a ubus method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UbusStatus {
    Ok,
    InvalidCommand,
    InvalidArgument,
    MethodNotFound,
    NotFound,
    NoData,
    PermissionDenied,
    Timeout,
    NotSupported,
    UnknownError,
    ConnectionFailed,
    /// A code outside the range libubus defines.
    Other(i64),
}

impl UbusStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidCommand,
            2 => Self::InvalidArgument,
            3 => Self::MethodNotFound,
            4 => Self::NotFound,
            5 => Self::NoData,
            6 => Self::PermissionDenied,
            7 => Self::Timeout,
            8 => Self::NotSupported,
            9 => Self::UnknownError,
            10 => Self::ConnectionFailed,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::InvalidCommand => 1,
            Self::InvalidArgument => 2,
            Self::MethodNotFound => 3,
            Self::NotFound => 4,
            Self::NoData => 5,
            Self::PermissionDenied => 6,
            Self::Timeout => 7,
            Self::NotSupported => 8,
            Self::UnknownError => 9,
            Self::ConnectionFailed => 10,
            Self::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Human readable description, matching the texts the LuCI web UI shows.
    pub fn text(self) -> &'static str {
        match self {
            Self::Ok => "Command OK",
            Self::InvalidCommand => "Invalid command",
            Self::InvalidArgument => "Invalid argument",
            Self::MethodNotFound => "Method not found",
            Self::NotFound => "Resource not found",
            Self::NoData => "No data received",
            Self::PermissionDenied => "Permission denied",
            Self::Timeout => "Request timeout",
            Self::NotSupported => "Not supported",
            Self::UnknownError => "Unspecified error",
            Self::ConnectionFailed => "Connection lost",
            Self::Other(_) => "Unknown error code",
        }
    }
}

impl fmt::Display for UbusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.text(), self.code())
    }
}

impl Serialize for UbusStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for UbusStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_code)
    }
}
