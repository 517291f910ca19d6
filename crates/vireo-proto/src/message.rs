//! Complete DNS messages.

use crate::error::{Error, Result};
use crate::header::{Header, HeaderFlags, HEADER_SIZE};
use crate::question::Question;
use crate::rcode::ResponseCode;
use crate::record::{RData, ResourceRecord};
use crate::rtype::RecordType;
use crate::EDNS_PAYLOAD_SIZE;
use bytes::{Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A parsed or under-construction DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
    additional: Vec<ResourceRecord>,
}

impl Message {
    /// Builds a query with the caller's id and RD set.
    pub fn query(id: u16, question: Question) -> Self {
        let mut header = Header::query(id);
        header.qd_count = 1;
        Self {
            header,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Appends an EDNS0 OPT record advertising the stream payload
    /// size. Never used on cleartext UDP.
    pub fn with_edns(mut self) -> Self {
        self.additional.push(ResourceRecord::opt(EDNS_PAYLOAD_SIZE));
        self.header.ar_count = self.additional.len() as u16;
        self
    }

    /// Returns true if an OPT record is attached.
    pub fn has_edns(&self) -> bool {
        self.additional
            .iter()
            .any(|rr| rr.record_type() == Some(RecordType::OPT))
    }

    /// Builds an empty response answering `query`.
    pub fn response_from(query: &Message) -> Self {
        Self {
            header: Header::response_from(&query.header),
            questions: query.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Message id.
    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Overwrites the message id.
    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    /// Response code.
    #[inline]
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Sets the response code.
    #[inline]
    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode;
    }

    /// Sets the TC bit.
    pub fn set_truncated(&mut self, truncated: bool) {
        self.header.flags.set(HeaderFlags::TC, truncated);
    }

    /// Returns true if the TC bit is set.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.header.is_truncated()
    }

    /// Returns true if the QR bit is set.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// The first (and for this resolver, only) question.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Answer section.
    #[inline]
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    /// Authority section.
    #[inline]
    pub fn authority(&self) -> &[ResourceRecord] {
        &self.authority
    }

    /// Appends an answer record.
    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
        self.header.an_count = self.answers.len() as u16;
    }

    /// Appends an authority record.
    pub fn add_authority(&mut self, record: ResourceRecord) {
        self.authority.push(record);
        self.header.ns_count = self.authority.len() as u16;
    }

    /// Returns true for a NOERROR response with an empty answer
    /// section (no data of the requested type).
    pub fn is_nodata(&self) -> bool {
        self.header.rcode == ResponseCode::NoError && self.answers.is_empty()
    }

    /// Returns true for NXDOMAIN.
    pub fn is_nxdomain(&self) -> bool {
        self.header.rcode == ResponseCode::NXDomain
    }

    /// IPv4 addresses from the answer section.
    pub fn a_records(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.answers.iter().filter_map(|rr| match rr.rdata {
            RData::A(addr) => Some(addr),
            _ => None,
        })
    }

    /// IPv6 addresses from the answer section.
    pub fn aaaa_records(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.answers.iter().filter_map(|rr| match rr.rdata {
            RData::Aaaa(addr) => Some(addr),
            _ => None,
        })
    }

    /// PTR targets from the answer section.
    pub fn ptr_records(&self) -> impl Iterator<Item = &crate::Name> + '_ {
        self.answers.iter().filter_map(|rr| match &rr.rdata {
            RData::Ptr(target) => Some(target),
            _ => None,
        })
    }

    /// Smallest TTL across the answer section, if any answers exist.
    pub fn min_answer_ttl(&self) -> Option<u32> {
        self.answers.iter().map(|rr| rr.ttl).min()
    }

    /// The SOA minimum from the authority section, used for
    /// negative-answer caching (RFC 2308).
    pub fn soa_minimum(&self) -> Option<u32> {
        self.authority.iter().find_map(|rr| match &rr.rdata {
            RData::Soa(soa) => Some(soa.minimum.min(rr.ttl)),
            _ => None,
        })
    }

    /// Parses a message from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let mut offset = HEADER_SIZE;

        let mut questions = Vec::with_capacity(header.qd_count as usize);
        for _ in 0..header.qd_count {
            let (q, consumed) = Question::parse(data, offset)?;
            offset += consumed;
            questions.push(q);
        }

        let mut parse_section = |count: u16, offset: &mut usize| -> Result<Vec<ResourceRecord>> {
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (rr, consumed) = ResourceRecord::parse(data, *offset)?;
                *offset += consumed;
                records.push(rr);
            }
            Ok(records)
        };

        let answers = parse_section(header.an_count, &mut offset)?;
        let authority = parse_section(header.ns_count, &mut offset)?;
        let additional = parse_section(header.ar_count, &mut offset)?;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// Serializes to wire format with uncompressed names.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(512);
        let mut header = self.header.clone();
        header.qd_count = self.questions.len() as u16;
        header.an_count = self.answers.len() as u16;
        header.ns_count = self.authority.len() as u16;
        header.ar_count = self.additional.len() as u16;
        header.write_to(&mut buf);

        for q in &self.questions {
            q.write_to(&mut buf);
        }
        for rr in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            rr.write_to(&mut buf);
        }
        buf.freeze()
    }
}

/// Reads the message id out of raw wire bytes without a full parse.
pub fn wire_id(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Overwrites the message id in raw wire bytes.
pub fn set_wire_id(data: &mut [u8], id: u16) {
    if data.len() >= 2 {
        data[..2].copy_from_slice(&id.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use std::str::FromStr;

    fn question(name: &str, rtype: RecordType) -> Question {
        Question::new(Name::from_str(name).unwrap(), rtype)
    }

    #[test]
    fn query_roundtrip() {
        let query = Message::query(0x2B2B, question("howdy.example.com", RecordType::A));
        let wire = query.to_wire();

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.id(), 0x2B2B);
        assert!(!parsed.is_response());
        assert_eq!(parsed.question(), query.question());
    }

    #[test]
    fn response_with_answers() {
        let query = Message::query(7, question("howdy.example.com", RecordType::A));
        let mut response = Message::response_from(&query);
        response.add_answer(ResourceRecord::a(
            Name::from_str("howdy.example.com").unwrap(),
            300,
            Ipv4Addr::new(1, 2, 3, 4),
        ));

        let wire = response.to_wire();
        let parsed = Message::parse(&wire).unwrap();
        assert!(parsed.is_response());
        assert_eq!(parsed.id(), 7);
        assert_eq!(parsed.a_records().collect::<Vec<_>>(), vec![Ipv4Addr::new(1, 2, 3, 4)]);
        assert_eq!(parsed.min_answer_ttl(), Some(300));
    }

    #[test]
    fn edns_only_when_requested() {
        let bare = Message::query(1, question("example.com", RecordType::A));
        assert!(!bare.has_edns());

        let with_opt = bare.clone().with_edns();
        assert!(with_opt.has_edns());

        let parsed = Message::parse(&with_opt.to_wire()).unwrap();
        assert!(parsed.has_edns());
    }

    #[test]
    fn nodata_and_nxdomain() {
        let query = Message::query(1, question("gone.example.com", RecordType::A));
        let mut response = Message::response_from(&query);
        assert!(response.is_nodata());

        response.set_rcode(ResponseCode::NXDomain);
        assert!(response.is_nxdomain());
        assert!(!response.is_nodata());
    }

    #[test]
    fn soa_minimum_from_authority() {
        let query = Message::query(1, question("gone.example.com", RecordType::A));
        let mut response = Message::response_from(&query);
        response.set_rcode(ResponseCode::NXDomain);
        response.add_authority(ResourceRecord::soa(
            Name::from_str("example.com").unwrap(),
            600,
            crate::record::Soa {
                mname: Name::from_str("ns.example.com").unwrap(),
                rname: Name::from_str("admin.example.com").unwrap(),
                serial: 1,
                refresh: 1,
                retry: 1,
                expire: 1,
                minimum: 30,
            },
        ));
        assert_eq!(response.soa_minimum(), Some(30));
    }

    #[test]
    fn raw_id_helpers() {
        let query = Message::query(0xABCD, question("example.com", RecordType::A));
        let mut wire = query.to_wire().to_vec();
        assert_eq!(wire_id(&wire), Some(0xABCD));

        set_wire_id(&mut wire, 0x0001);
        assert_eq!(wire_id(&wire), Some(1));
        assert_eq!(Message::parse(&wire).unwrap().id(), 1);
    }
}
