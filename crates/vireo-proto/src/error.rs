//! Wire format errors.

use thiserror::Error;

/// Error produced while encoding or decoding a DNS message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Ran off the end of the message buffer.
    #[error("unexpected end of message at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more data was required.
        offset: usize,
    },

    /// A label exceeded the 63-octet limit.
    #[error("label of {length} octets exceeds the 63 octet limit")]
    LabelTooLong {
        /// Offending label length.
        length: usize,
    },

    /// A name exceeded the 255-octet wire limit.
    #[error("name of {length} octets exceeds the 255 octet limit")]
    NameTooLong {
        /// Offending name length.
        length: usize,
    },

    /// A compression pointer did not point strictly backwards.
    ///
    /// Forward (or self-referential) pointers are how compression
    /// loops are built, so they are rejected outright.
    #[error("compression pointer at offset {offset} targets {target} (not backwards)")]
    BadCompressionPointer {
        /// Offset of the pointer.
        offset: usize,
        /// Target the pointer named.
        target: usize,
    },

    /// Reserved label type bits (0x40/0x80) were set.
    #[error("invalid label type 0x{value:02x} at offset {offset}")]
    BadLabelType {
        /// Offset of the length octet.
        offset: usize,
        /// The offending length octet.
        value: u8,
    },

    /// A textual name could not be converted to wire format.
    #[error("invalid domain name {0:?}")]
    BadName(String),

    /// The message is shorter than its header claims.
    #[error("message truncated: need {needed} octets, have {available}")]
    Truncated {
        /// Octets required.
        needed: usize,
        /// Octets present.
        available: usize,
    },
}

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
