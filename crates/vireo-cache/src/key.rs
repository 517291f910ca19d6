//! Cache keys.

use std::fmt;
use vireo_proto::Question;

/// Key for one cached answer: the question with the name folded to
/// lowercase, so `HOWDY.example.com` and `howdy.example.com` share an
/// entry. The network id is not part of the key — each network owns
/// its own cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    qtype: u16,
    qclass: u16,
}

impl CacheKey {
    /// Builds the key for a question.
    pub fn from_question(question: &Question) -> Self {
        Self {
            name: question.qname.to_lowercase_string(),
            qtype: question.qtype,
            qclass: question.qclass,
        }
    }

    /// The lowercased query name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The query type code.
    pub fn qtype(&self) -> u16 {
        self.qtype
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.qtype, self.qclass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use vireo_proto::{Name, RecordType};

    #[test]
    fn case_folded() {
        let a = CacheKey::from_question(&Question::new(
            Name::from_str("HOWDY.Example.COM").unwrap(),
            RecordType::A,
        ));
        let b = CacheKey::from_question(&Question::new(
            Name::from_str("howdy.example.com").unwrap(),
            RecordType::A,
        ));
        assert_eq!(a, b);
    }

    #[test]
    fn type_distinguishes() {
        let name = Name::from_str("howdy.example.com").unwrap();
        let a = CacheKey::from_question(&Question::new(name.clone(), RecordType::A));
        let aaaa = CacheKey::from_question(&Question::new(name, RecordType::AAAA));
        assert_ne!(a, aaaa);
    }
}
