//! The fixed 12-octet message header.

use crate::error::{Error, Result};
use crate::rcode::ResponseCode;
use bitflags::bitflags;
use bytes::BytesMut;

/// Header size on the wire.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// Header flag bits (QR through CD).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u16 {
        /// Response (vs. query).
        const QR = 0x8000;
        /// Authoritative answer.
        const AA = 0x0400;
        /// Truncated.
        const TC = 0x0200;
        /// Recursion desired.
        const RD = 0x0100;
        /// Recursion available.
        const RA = 0x0080;
        /// Authentic data (DNSSEC).
        const AD = 0x0020;
        /// Checking disabled (DNSSEC).
        const CD = 0x0010;
    }
}

/// Parsed message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Message id, matched between query and response.
    pub id: u16,
    /// Flag bits.
    pub flags: HeaderFlags,
    /// Operation code (only QUERY = 0 is ever sent).
    pub opcode: u8,
    /// Response code.
    pub rcode: ResponseCode,
    /// Question count.
    pub qd_count: u16,
    /// Answer count.
    pub an_count: u16,
    /// Authority count.
    pub ns_count: u16,
    /// Additional count.
    pub ar_count: u16,
}

impl Header {
    /// Creates a query header with the given id and RD set.
    pub fn query(id: u16) -> Self {
        Self {
            id,
            flags: HeaderFlags::RD,
            opcode: 0,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Creates a response header answering `query`.
    pub fn response_from(query: &Header) -> Self {
        Self {
            id: query.id,
            flags: HeaderFlags::QR | HeaderFlags::RA | (query.flags & HeaderFlags::RD),
            opcode: query.opcode,
            rcode: ResponseCode::NoError,
            qd_count: query.qd_count,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Parses the header from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }
        let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let raw_flags = word(2);
        Ok(Self {
            id: word(0),
            flags: HeaderFlags::from_bits_truncate(raw_flags),
            opcode: ((raw_flags >> 11) & 0x0F) as u8,
            rcode: ResponseCode::from((raw_flags & 0x0F) as u8),
            qd_count: word(4),
            an_count: word(6),
            ns_count: word(8),
            ar_count: word(10),
        })
    }

    /// Writes the header to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let raw_flags = self.flags.bits()
            | (u16::from(self.opcode & 0x0F) << 11)
            | u16::from(self.rcode.to_u8() & 0x0F);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&raw_flags.to_be_bytes());
        buf.extend_from_slice(&self.qd_count.to_be_bytes());
        buf.extend_from_slice(&self.an_count.to_be_bytes());
        buf.extend_from_slice(&self.ns_count.to_be_bytes());
        buf.extend_from_slice(&self.ar_count.to_be_bytes());
    }

    /// Returns true if this header marks a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(HeaderFlags::QR)
    }

    /// Returns true if the TC bit is set.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.contains(HeaderFlags::TC)
    }
}
