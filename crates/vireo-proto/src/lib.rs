//! # Vireo DNS wire format
//!
//! Message types and wire codec for the stub resolver: query
//! construction, response parsing with RFC 1035 name compression, and
//! the record types a stub path actually touches (A, AAAA, CNAME, PTR,
//! SOA, OPT).
//!
//! This crate deliberately implements only what the resolution
//! pipeline consumes. It is not a general-purpose DNS library.

#![warn(missing_docs)]

pub mod class;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rcode;
pub mod record;
pub mod rtype;

pub use class::RecordClass;
pub use error::{Error, Result};
pub use header::{Header, HeaderFlags};
pub use message::{set_wire_id, wire_id, Message};
pub use name::Name;
pub use question::Question;
pub use rcode::ResponseCode;
pub use record::{RData, ResourceRecord, Soa};
pub use rtype::RecordType;

/// Maximum length of a single label (RFC 1035).
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum wire length of a domain name (RFC 1035).
pub const MAX_NAME_LENGTH: usize = 255;

/// Largest answer the resolver will accept from an upstream.
pub const MAX_PACKET_SIZE: usize = 8 * 1024;

/// Plain DNS port.
pub const DNS_PORT: u16 = 53;

/// DNS-over-TLS port (RFC 7858).
pub const DOT_PORT: u16 = 853;

/// EDNS0 payload size advertised on stream transports.
pub const EDNS_PAYLOAD_SIZE: u16 = 4096;
