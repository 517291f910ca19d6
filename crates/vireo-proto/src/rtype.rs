//! Record types handled by the stub path.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Record types the resolver understands.
///
/// Anything else travels through the codec as opaque rdata; questions
/// and records store the raw `u16` and expose it through
/// `record_type()` accessors, so unknown types are carried, not
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 host address.
    A = 1,
    /// Authoritative name server.
    NS = 2,
    /// Canonical name alias.
    CNAME = 5,
    /// Start of authority.
    SOA = 6,
    /// Domain name pointer (reverse lookups).
    PTR = 12,
    /// IPv6 host address.
    AAAA = 28,
    /// EDNS0 pseudo-record.
    OPT = 41,
}

impl RecordType {
    /// Returns the numeric type code.
    #[inline]
    pub fn to_u16(self) -> u16 {
        self.into()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::NS => "NS",
            Self::CNAME => "CNAME",
            Self::SOA => "SOA",
            Self::PTR => "PTR",
            Self::AAAA => "AAAA",
            Self::OPT => "OPT",
        };
        f.write_str(s)
    }
}
