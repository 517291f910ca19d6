//! DNS response codes.

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

/// Response code from the 4-bit RCODE header field.
///
/// Codes outside the RFC 1035/2136 range are preserved verbatim in
/// [`ResponseCode::Unknown`]; the server ranking logic treats them as
/// errors, so they must not be lost in translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ResponseCode {
    /// No error condition.
    NoError = 0,
    /// The server was unable to interpret the query.
    FormErr = 1,
    /// The server failed to process the query.
    ServFail = 2,
    /// The queried name does not exist.
    NXDomain = 3,
    /// The server does not implement the requested query kind.
    NotImp = 4,
    /// The server refused the query for policy reasons.
    Refused = 5,
    /// Name exists when it should not (RFC 2136).
    YXDomain = 6,
    /// RR set exists when it should not (RFC 2136).
    YXRRSet = 7,
    /// RR set that should exist does not (RFC 2136).
    NXRRSet = 8,
    /// Server not authoritative / not authorized.
    NotAuth = 9,
    /// Name not contained in zone (RFC 2136).
    NotZone = 10,
    /// Any other code, preserved as received.
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ResponseCode {
    /// Returns the raw 4-bit code value.
    #[inline]
    pub fn to_u8(self) -> u8 {
        self.into()
    }

    /// Returns true for NOERROR.
    #[inline]
    pub fn is_no_error(self) -> bool {
        self == Self::NoError
    }

    /// Returns true for NXDOMAIN.
    #[inline]
    pub fn is_nxdomain(self) -> bool {
        self == Self::NXDomain
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => f.write_str("NOERROR"),
            Self::FormErr => f.write_str("FORMERR"),
            Self::ServFail => f.write_str("SERVFAIL"),
            Self::NXDomain => f.write_str("NXDOMAIN"),
            Self::NotImp => f.write_str("NOTIMP"),
            Self::Refused => f.write_str("REFUSED"),
            Self::YXDomain => f.write_str("YXDOMAIN"),
            Self::YXRRSet => f.write_str("YXRRSET"),
            Self::NXRRSet => f.write_str("NXRRSET"),
            Self::NotAuth => f.write_str("NOTAUTH"),
            Self::NotZone => f.write_str("NOTZONE"),
            Self::Unknown(code) => write!(f, "RCODE{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        assert_eq!(ResponseCode::from(0u8), ResponseCode::NoError);
        assert_eq!(ResponseCode::from(3u8), ResponseCode::NXDomain);
        assert_eq!(ResponseCode::NXDomain.to_u8(), 3);
    }

    #[test]
    fn unknown_preserved() {
        let code = ResponseCode::from(13u8);
        assert_eq!(code, ResponseCode::Unknown(13));
        assert_eq!(code.to_u8(), 13);
    }
}
