//! # Vireo resolver core
//!
//! The per-network heart of the stub resolver:
//!
//! - [`stats`]: sliding-window sample rings deciding which upstreams
//!   are currently worth querying.
//! - [`private_dns`]: per-network encrypted-DNS configuration and the
//!   validation state machine with its observer contract.
//! - [`nat64`]: prefix discovery, AAAA synthesis and reverse-lookup
//!   unmapping for IPv6-only networks.
//! - [`network`]: the registry mapping network ids to their servers,
//!   search domains, tunables, statistics and cache.
//! - [`pipeline`]: the resolution path tying all of it together.

pub mod hosts;
pub mod nat64;
pub mod network;
pub mod params;
pub mod pipeline;
pub mod private_dns;
pub mod stats;

pub use nat64::Nat64Prefix;
pub use network::{Network, NetworkConfig, Registry};
pub use params::ResolverParams;
pub use pipeline::{AddressFamily, Resolver};
pub use private_dns::{
    parse_server_literals, PrivateDnsConfiguration, PrivateDnsMode, PrivateDnsStatus,
    ValidationObserver, ValidationState,
};
pub use stats::{Aggregate, Sample, SampleOutcome, ServerStats};

use bitflags::bitflags;
use thiserror::Error;

/// Maximum number of cleartext upstream servers per network.
pub const MAXNS: usize = 4;

/// Maximum number of search domains per network.
pub const MAXDNSRCH: usize = 6;

/// Resolution failure as seen by callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Malformed input (address literal, name, parameter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The network id is already registered.
    #[error("network {0} already exists")]
    AlreadyExists(u32),

    /// The network id is not registered.
    #[error("network {0} is not configured")]
    NoSuchNetwork(u32),

    /// No upstream answered within the per-attempt deadline.
    #[error("query timed out")]
    Timeout,

    /// Transport failure after exhausting retries.
    #[error("network failure talking to upstream")]
    Network,

    /// The answer exceeds the caller's buffer.
    #[error("answer of {size} octets exceeds caller limit of {limit}")]
    Limit {
        /// Answer size.
        size: usize,
        /// Caller's limit.
        limit: usize,
    },

    /// The name exists but has no records of the requested type.
    #[error("no data of the requested type")]
    NoData,

    /// The name does not exist.
    #[error("host not found")]
    HostNotFound,

    /// Resource exhaustion inside the resolver.
    #[error("internal resolver limit reached")]
    Internal,
}

/// Result alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

bitflags! {
    /// Per-query flags, forwarded from the application surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: u32 {
        /// Do not store the computed answer in the cache.
        const NO_CACHE_STORE = 1 << 0;
        /// Skip the cache probe and single-flight coalescing.
        const NO_CACHE_LOOKUP = 1 << 1;
        /// One attempt per server, no retry rounds.
        const NO_RETRY = 1 << 2;
        /// Route over cleartext even when private DNS is configured.
        /// Internal: prefix discovery probes must not ride the
        /// encrypted transport.
        const BYPASS_PRIVATE_DNS = 1 << 3;
    }
}
