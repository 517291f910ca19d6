//! The question section.

use crate::class::RecordClass;
use crate::error::{Error, Result};
use crate::name::Name;
use crate::rtype::RecordType;
use bytes::BytesMut;
use std::fmt;

/// A single question entry.
///
/// Type and class are stored as raw `u16` so that unknown values pass
/// through the codec untouched; `record_type()` decodes the ones the
/// resolver acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    /// Name being queried.
    pub qname: Name,
    /// Query type code.
    pub qtype: u16,
    /// Query class code.
    pub qclass: u16,
}

impl Question {
    /// Creates an IN-class question of the given type.
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self {
            qname,
            qtype: qtype.to_u16(),
            qclass: RecordClass::IN.to_u16(),
        }
    }

    /// Creates a question from raw type and class codes.
    pub fn from_raw(qname: Name, qtype: u16, qclass: u16) -> Self {
        Self {
            qname,
            qtype,
            qclass,
        }
    }

    /// Decodes the type if it is one the resolver understands.
    #[inline]
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::try_from(self.qtype).ok()
    }

    /// Parses a question at `offset`, returning it and the octets
    /// consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;
        if fixed + 4 > message.len() {
            return Err(Error::UnexpectedEof { offset: fixed + 4 });
        }
        let qtype = u16::from_be_bytes([message[fixed], message[fixed + 1]]);
        let qclass = u16::from_be_bytes([message[fixed + 2], message[fixed + 3]]);
        Ok((
            Self {
                qname,
                qtype,
                qclass,
            },
            name_len + 4,
        ))
    }

    /// Writes the question to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.qname.write_to(buf);
        buf.extend_from_slice(&self.qtype.to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_be_bytes());
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record_type() {
            Some(rtype) => write!(f, "{} {}", self.qname, rtype),
            None => write!(f, "{} TYPE{}", self.qname, self.qtype),
        }
    }
}
