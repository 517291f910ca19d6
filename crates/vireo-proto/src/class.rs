//! DNS record classes.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Record class. Everything the stub resolver sends is `IN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum RecordClass {
    /// Internet.
    IN = 1,
    /// Chaos.
    CH = 3,
    /// Hesiod.
    HS = 4,
    /// Any class (query only).
    ANY = 255,
}

impl RecordClass {
    /// Returns the numeric class code.
    #[inline]
    pub fn to_u16(self) -> u16 {
        self.into()
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IN => "IN",
            Self::CH => "CH",
            Self::HS => "HS",
            Self::ANY => "ANY",
        };
        f.write_str(s)
    }
}
