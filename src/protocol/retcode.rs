//! Action return codes.
//!
//! The server tags every action response with an integer `retcode`. Only
//! `0` has a fixed meaning; every other value is carried through as
//! [`Retcode::Unknown`] so callers can still inspect it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Classified return code of an action response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retcode {
    /// Action succeeded.
    Ok,
    /// Any code outside the known table, with its raw value.
    Unknown(i64),
}

impl Retcode {
    /// Classifies a raw return code.
    #[inline]
    #[must_use]
    pub const fn of(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw integer code.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::Unknown(code) => *code,
        }
    }

    /// Returns the symbolic name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Returns `true` for [`Retcode::Ok`].
    #[inline]
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Default for Retcode {
    fn default() -> Self {
        Self::Unknown(-1)
    }
}

impl fmt::Display for Retcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

impl Serialize for Retcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for Retcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::of)
    }
}
