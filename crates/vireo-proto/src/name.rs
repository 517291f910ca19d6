//! Domain names with RFC 1035 compression support.
//!
//! Names are stored in uncompressed wire format (length-prefixed
//! labels ending in the root label). Comparison and hashing are
//! case-insensitive per DNS semantics.

use crate::error::{Error, Result};
use crate::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use bytes::BytesMut;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Upper bound on compression pointer jumps while decompressing one
/// name. A legitimate message cannot need anywhere near this many.
const MAX_POINTER_JUMPS: usize = 64;

/// A domain name in uncompressed wire format.
#[derive(Clone)]
pub struct Name {
    wire: SmallVec<[u8; 64]>,
}

impl Name {
    /// The root name.
    pub fn root() -> Self {
        let mut wire = SmallVec::new();
        wire.push(0);
        Self { wire }
    }

    /// Returns the uncompressed wire representation, including the
    /// terminating root label.
    #[inline]
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Wire length in octets.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Returns true if this is the root name.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Iterates over the labels, excluding the root label.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        LabelIter {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Parses a name starting at `offset` inside `message`, following
    /// compression pointers (RFC 1035 §4.1.4).
    ///
    /// Returns the name and the number of octets consumed at the
    /// original position (a pointer consumes two octets regardless of
    /// where it leads). Pointers must target a strictly earlier offset,
    /// which makes cyclic compression unrepresentable.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut wire = SmallVec::new();
        let mut pos = offset;
        let mut consumed = 0usize;
        let mut jumped = false;
        let mut jumps = 0usize;

        loop {
            let len_byte = *message
                .get(pos)
                .ok_or(Error::UnexpectedEof { offset: pos })?;

            if len_byte & 0xC0 == 0xC0 {
                let low = *message
                    .get(pos + 1)
                    .ok_or(Error::UnexpectedEof { offset: pos + 1 })?;
                let target = (usize::from(len_byte & 0x3F) << 8) | usize::from(low);
                if target >= pos {
                    return Err(Error::BadCompressionPointer {
                        offset: pos,
                        target,
                    });
                }
                if !jumped {
                    consumed = pos + 2 - offset;
                    jumped = true;
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    // Backwards-only pointers cannot loop, but a chain
                    // this deep is hostile input all the same.
                    return Err(Error::BadCompressionPointer {
                        offset: pos,
                        target,
                    });
                }
                pos = target;
                continue;
            }

            if len_byte & 0xC0 != 0 {
                return Err(Error::BadLabelType {
                    offset: pos,
                    value: len_byte,
                });
            }

            let len = usize::from(len_byte);
            if len == 0 {
                wire.push(0);
                if !jumped {
                    consumed = pos + 1 - offset;
                }
                break;
            }

            let end = pos + 1 + len;
            if end > message.len() {
                return Err(Error::UnexpectedEof { offset: end });
            }
            if wire.len() + 1 + len + 1 > MAX_NAME_LENGTH {
                return Err(Error::NameTooLong {
                    length: wire.len() + 1 + len + 1,
                });
            }

            wire.push(len_byte);
            wire.extend_from_slice(&message[pos + 1..end]);
            pos = end;
        }

        Ok((Self { wire }, consumed))
    }

    /// Skips a (possibly compressed) name, returning octets consumed.
    pub fn skip(message: &[u8], offset: usize) -> Result<usize> {
        let mut pos = offset;
        loop {
            let len_byte = *message
                .get(pos)
                .ok_or(Error::UnexpectedEof { offset: pos })?;
            if len_byte & 0xC0 == 0xC0 {
                if pos + 2 > message.len() {
                    return Err(Error::UnexpectedEof { offset: pos + 2 });
                }
                return Ok(pos + 2 - offset);
            }
            if len_byte & 0xC0 != 0 {
                return Err(Error::BadLabelType {
                    offset: pos,
                    value: len_byte,
                });
            }
            if len_byte == 0 {
                return Ok(pos + 1 - offset);
            }
            pos += 1 + usize::from(len_byte);
        }
    }

    /// Writes the name, uncompressed, to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.wire);
    }

    /// Returns the name as a lowercase dotted string without a
    /// trailing dot (the root name renders as `"."`). This is the
    /// canonical form used for cache keys.
    pub fn to_lowercase_string(&self) -> String {
        let mut s = self.to_string();
        s.make_ascii_lowercase();
        s
    }
}

struct LabelIter<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = usize::from(*self.wire.get(self.pos)?);
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        self.pos = start + len;
        Some(&self.wire[start..start + len])
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Converts a dotted name to wire format. A trailing dot is
    /// accepted; an empty string or `"."` is the root.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut wire = SmallVec::new();
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(Error::BadName(s.to_string()));
            }
            if label.len() > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }
        wire.push(0);

        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }
        Ok(Self { wire })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut first = true;
        for label in self.labels() {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            for &byte in label {
                if byte.is_ascii_graphic() && byte != b'.' {
                    write!(f, "{}", byte as char)?;
                } else {
                    write!(f, "\\{:03}", byte)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.len() == other.wire.len()
            && self
                .wire
                .iter()
                .zip(other.wire.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &byte in self.wire.iter() {
            byte.to_ascii_lowercase().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_roundtrip() {
        let name = Name::from_str("www.example.com").unwrap();
        assert_eq!(name.to_string(), "www.example.com");
        assert_eq!(name.wire_len(), 17);
        assert_eq!(name.labels().count(), 3);

        let fqdn = Name::from_str("www.example.com.").unwrap();
        assert_eq!(name, fqdn);
    }

    #[test]
    fn root_name() {
        assert!(Name::from_str("").unwrap().is_root());
        assert!(Name::from_str(".").unwrap().is_root());
        assert_eq!(Name::root().to_string(), ".");
    }

    #[test]
    fn case_insensitive_eq() {
        let a = Name::from_str("Example.COM").unwrap();
        let b = Name::from_str("example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_lowercase_string(), "example.com");
    }

    #[test]
    fn rejects_oversized_label() {
        let long = "a".repeat(64);
        assert!(Name::from_str(&long).is_err());
    }

    #[test]
    fn rejects_empty_label() {
        assert!(Name::from_str("a..b").is_err());
    }

    #[test]
    fn parse_plain() {
        let wire = [
            3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm',
            0,
        ];
        let (name, consumed) = Name::parse(&wire, 0).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(name.to_string(), "www.example.com");
    }

    #[test]
    fn parse_compressed() {
        // example.com at 0, www.<ptr 0> at 13
        let wire = [
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0, 3, b'w', b'w',
            b'w', 0xC0, 0x00,
        ];
        let (name, consumed) = Name::parse(&wire, 13).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(name.to_string(), "www.example.com");
    }

    #[test]
    fn rejects_pointer_cycle() {
        // A self-referential pointer is a forward pointer by our rule.
        let wire = [0xC0, 0x00];
        assert!(matches!(
            Name::parse(&wire, 0),
            Err(Error::BadCompressionPointer { .. })
        ));
    }

    #[test]
    fn rejects_forward_pointer() {
        let wire = [3, b'f', b'o', b'o', 0xC0, 0x08, 0, 0, 0];
        assert!(matches!(
            Name::parse(&wire, 0),
            Err(Error::BadCompressionPointer { .. })
        ));
    }

    #[test]
    fn label_ending_with_pointer() {
        // com at 0; example.<ptr com> at 5; www.<ptr example> at 15
        let mut wire = vec![3, b'c', b'o', b'm', 0];
        wire.extend_from_slice(&[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0xC0, 0x00]);
        wire.extend_from_slice(&[3, b'w', b'w', b'w', 0xC0, 0x05]);
        let (name, consumed) = Name::parse(&wire, 15).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(name.to_string(), "www.example.com");
    }

    #[test]
    fn skip_matches_parse() {
        let wire = [3, b'w', b'w', b'w', 0xC0, 0x10, 0xFF];
        assert_eq!(Name::skip(&wire, 0).unwrap(), 6);
    }
}
