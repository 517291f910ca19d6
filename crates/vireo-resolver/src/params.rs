//! Per-network resolver tunables.

use std::time::Duration;

/// Tunable parameters for one network, in the order the configuration
/// surface delivers them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverParams {
    /// How long stored samples stay relevant; older rings are cleared
    /// and the server retried.
    pub sample_validity: Duration,

    /// Minimum success percentage below which a server is skipped.
    pub success_threshold: u8,

    /// Samples required before ranking kicks in at all.
    pub min_samples: u8,

    /// Ring capacity per server.
    pub max_samples: u8,

    /// Per-attempt upstream deadline.
    pub base_timeout: Duration,

    /// Retry rounds across the usable server list.
    pub retry_count: u8,

    /// Dots threshold for search-domain expansion.
    pub ndots: u8,
}

impl Default for ResolverParams {
    fn default() -> Self {
        Self {
            sample_validity: Duration::from_secs(1800),
            success_threshold: 75,
            min_samples: 8,
            max_samples: 64,
            base_timeout: Duration::from_millis(1000),
            retry_count: 2,
            ndots: 1,
        }
    }
}

impl ResolverParams {
    /// Builds params from the six-slot wire layout
    /// `[sample_validity_s, success_threshold, min_samples,
    /// max_samples, base_timeout_ms, retry_count]`. A zero in the last
    /// two slots selects the default, matching the configuration
    /// surface contract.
    pub fn from_wire(params: &[u32]) -> Self {
        let defaults = Self::default();
        let get = |i: usize| params.get(i).copied();
        Self {
            sample_validity: get(0)
                .map(|s| Duration::from_secs(u64::from(s)))
                .unwrap_or(defaults.sample_validity),
            success_threshold: get(1).map(|v| v as u8).unwrap_or(defaults.success_threshold),
            min_samples: get(2).map(|v| v as u8).unwrap_or(defaults.min_samples),
            max_samples: get(3).map(|v| v as u8).unwrap_or(defaults.max_samples),
            base_timeout: match get(4) {
                Some(0) | None => defaults.base_timeout,
                Some(ms) => Duration::from_millis(u64::from(ms)),
            },
            retry_count: match get(5) {
                Some(0) | None => defaults.retry_count,
                Some(n) => n as u8,
            },
            ndots: defaults.ndots,
        }
    }
}
