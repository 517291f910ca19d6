//! Local short-circuits: numeric literals and the hosts table.
//!
//! Names resolved here never reach the wire codec or the network.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Parses `name` as a bare address literal.
pub fn numeric_literal(name: &str) -> Option<IpAddr> {
    IpAddr::from_str(name).ok()
}

/// In-memory hosts table, seeded with the loopback names every system
/// image ships.
pub struct HostsTable {
    entries: RwLock<HashMap<String, Vec<IpAddr>>>,
}

impl Default for HostsTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "localhost".to_string(),
            vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
        );
        entries.insert(
            "ip6-localhost".to_string(),
            vec![IpAddr::V6(Ipv6Addr::LOCALHOST)],
        );
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl HostsTable {
    /// Creates the default table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Option<Vec<IpAddr>> {
        let key = name.trim_end_matches('.').to_ascii_lowercase();
        self.entries.read().get(&key).cloned()
    }

    /// Adds or replaces an entry.
    pub fn insert(&self, name: &str, addrs: Vec<IpAddr>) {
        self.entries
            .write()
            .insert(name.trim_end_matches('.').to_ascii_lowercase(), addrs);
    }
}
