//! Resource records and rdata.

use crate::error::{Error, Result};
use crate::name::Name;
use crate::rtype::RecordType;
use bytes::{Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Decoded rdata for the record types the resolver acts on; anything
/// else is carried as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Alias target.
    Cname(Name),
    /// Reverse-lookup target.
    Ptr(Name),
    /// Start of authority (used for negative-answer TTLs).
    Soa(Soa),
    /// Unparsed rdata, preserved verbatim.
    Other(Bytes),
}

/// SOA rdata. Only `minimum` matters to the cache, but the full record
/// has to be decoded to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    /// Primary name server.
    pub mname: Name,
    /// Responsible mailbox.
    pub rname: Name,
    /// Zone serial.
    pub serial: u32,
    /// Refresh interval.
    pub refresh: u32,
    /// Retry interval.
    pub retry: u32,
    /// Expire limit.
    pub expire: u32,
    /// Minimum TTL / negative-caching TTL (RFC 2308).
    pub minimum: u32,
}

/// A resource record from any message section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name.
    pub name: Name,
    /// Raw type code.
    pub rtype: u16,
    /// Raw class code.
    pub rclass: u16,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Record data.
    pub rdata: RData,
}

impl ResourceRecord {
    /// Creates an A record.
    pub fn a(name: Name, ttl: u32, addr: Ipv4Addr) -> Self {
        Self {
            name,
            rtype: RecordType::A.to_u16(),
            rclass: 1,
            ttl,
            rdata: RData::A(addr),
        }
    }

    /// Creates an AAAA record.
    pub fn aaaa(name: Name, ttl: u32, addr: Ipv6Addr) -> Self {
        Self {
            name,
            rtype: RecordType::AAAA.to_u16(),
            rclass: 1,
            ttl,
            rdata: RData::Aaaa(addr),
        }
    }

    /// Creates a CNAME record.
    pub fn cname(name: Name, ttl: u32, target: Name) -> Self {
        Self {
            name,
            rtype: RecordType::CNAME.to_u16(),
            rclass: 1,
            ttl,
            rdata: RData::Cname(target),
        }
    }

    /// Creates a PTR record.
    pub fn ptr(name: Name, ttl: u32, target: Name) -> Self {
        Self {
            name,
            rtype: RecordType::PTR.to_u16(),
            rclass: 1,
            ttl,
            rdata: RData::Ptr(target),
        }
    }

    /// Creates an SOA record.
    pub fn soa(name: Name, ttl: u32, soa: Soa) -> Self {
        Self {
            name,
            rtype: RecordType::SOA.to_u16(),
            rclass: 1,
            ttl,
            rdata: RData::Soa(soa),
        }
    }

    /// Creates the EDNS0 OPT pseudo-record.
    pub fn opt(payload_size: u16) -> Self {
        Self {
            name: Name::root(),
            rtype: RecordType::OPT.to_u16(),
            // For OPT the class field carries the UDP payload size.
            rclass: payload_size,
            ttl: 0,
            rdata: RData::Other(Bytes::new()),
        }
    }

    /// Decodes the type if known.
    #[inline]
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::try_from(self.rtype).ok()
    }

    /// Parses a record at `offset`, returning it and octets consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;
        if fixed + 10 > message.len() {
            return Err(Error::UnexpectedEof { offset: fixed + 10 });
        }
        let rtype = u16::from_be_bytes([message[fixed], message[fixed + 1]]);
        let rclass = u16::from_be_bytes([message[fixed + 2], message[fixed + 3]]);
        let ttl = u32::from_be_bytes([
            message[fixed + 4],
            message[fixed + 5],
            message[fixed + 6],
            message[fixed + 7],
        ]);
        let rdlength = usize::from(u16::from_be_bytes([message[fixed + 8], message[fixed + 9]]));
        let rdata_start = fixed + 10;
        let rdata_end = rdata_start + rdlength;
        if rdata_end > message.len() {
            return Err(Error::UnexpectedEof { offset: rdata_end });
        }

        let rdata = Self::parse_rdata(message, rtype, rdata_start, rdlength)?;
        Ok((
            Self {
                name,
                rtype,
                rclass,
                ttl,
                rdata,
            },
            name_len + 10 + rdlength,
        ))
    }

    fn parse_rdata(message: &[u8], rtype: u16, start: usize, len: usize) -> Result<RData> {
        let slice = &message[start..start + len];
        match RecordType::try_from(rtype) {
            Ok(RecordType::A) if len == 4 => {
                let octets: [u8; 4] = slice.try_into().expect("length checked");
                Ok(RData::A(Ipv4Addr::from(octets)))
            }
            Ok(RecordType::AAAA) if len == 16 => {
                let octets: [u8; 16] = slice.try_into().expect("length checked");
                Ok(RData::Aaaa(Ipv6Addr::from(octets)))
            }
            // Name-bearing rdata may use compression into the message.
            Ok(RecordType::CNAME) => {
                let (target, _) = Name::parse(message, start)?;
                Ok(RData::Cname(target))
            }
            Ok(RecordType::PTR) => {
                let (target, _) = Name::parse(message, start)?;
                Ok(RData::Ptr(target))
            }
            Ok(RecordType::SOA) => {
                let (mname, mname_len) = Name::parse(message, start)?;
                let (rname, rname_len) = Name::parse(message, start + mname_len)?;
                let fields = start + mname_len + rname_len;
                if fields + 20 > message.len() {
                    return Err(Error::UnexpectedEof {
                        offset: fields + 20,
                    });
                }
                let long = |i: usize| {
                    u32::from_be_bytes([
                        message[i],
                        message[i + 1],
                        message[i + 2],
                        message[i + 3],
                    ])
                };
                Ok(RData::Soa(Soa {
                    mname,
                    rname,
                    serial: long(fields),
                    refresh: long(fields + 4),
                    retry: long(fields + 8),
                    expire: long(fields + 12),
                    minimum: long(fields + 16),
                }))
            }
            _ => Ok(RData::Other(Bytes::copy_from_slice(slice))),
        }
    }

    /// Writes the record to `buf` (names uncompressed).
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.name.write_to(buf);
        buf.extend_from_slice(&self.rtype.to_be_bytes());
        buf.extend_from_slice(&self.rclass.to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());

        let mut rdata = BytesMut::new();
        match &self.rdata {
            RData::A(addr) => rdata.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => rdata.extend_from_slice(&addr.octets()),
            RData::Cname(target) | RData::Ptr(target) => target.write_to(&mut rdata),
            RData::Soa(soa) => {
                soa.mname.write_to(&mut rdata);
                soa.rname.write_to(&mut rdata);
                rdata.extend_from_slice(&soa.serial.to_be_bytes());
                rdata.extend_from_slice(&soa.refresh.to_be_bytes());
                rdata.extend_from_slice(&soa.retry.to_be_bytes());
                rdata.extend_from_slice(&soa.expire.to_be_bytes());
                rdata.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            RData::Other(bytes) => rdata.extend_from_slice(bytes),
        }
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn a_record_roundtrip() {
        let rr = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(1, 2, 3, 4),
        );
        let mut buf = BytesMut::new();
        rr.write_to(&mut buf);

        let (parsed, consumed) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, rr);
    }

    #[test]
    fn ptr_record_roundtrip() {
        let rr = ResourceRecord::ptr(
            Name::from_str("4.3.2.1.in-addr.arpa").unwrap(),
            60,
            Name::from_str("host.example.com").unwrap(),
        );
        let mut buf = BytesMut::new();
        rr.write_to(&mut buf);

        let (parsed, _) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(parsed.rdata, rr.rdata);
    }

    #[test]
    fn soa_minimum_decoded() {
        let soa = Soa {
            mname: Name::from_str("ns.example.com").unwrap(),
            rname: Name::from_str("admin.example.com").unwrap(),
            serial: 2024010101,
            refresh: 7200,
            retry: 3600,
            expire: 1209600,
            minimum: 300,
        };
        let rr = ResourceRecord::soa(Name::from_str("example.com").unwrap(), 3600, soa.clone());
        let mut buf = BytesMut::new();
        rr.write_to(&mut buf);

        let (parsed, _) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(parsed.rdata, RData::Soa(soa));
    }

    #[test]
    fn unknown_rdata_preserved() {
        let rr = ResourceRecord {
            name: Name::from_str("example.com").unwrap(),
            rtype: 16, // TXT, not decoded
            rclass: 1,
            ttl: 60,
            rdata: RData::Other(Bytes::from_static(b"\x05hello")),
        };
        let mut buf = BytesMut::new();
        rr.write_to(&mut buf);

        let (parsed, _) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(parsed.rdata, rr.rdata);
    }
}
