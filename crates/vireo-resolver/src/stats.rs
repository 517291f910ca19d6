//! Per-server reachability statistics.
//!
//! Every upstream query outcome becomes a sample in a fixed-size ring.
//! Ranking aggregates the ring: servers whose recent success rate sank
//! below the threshold are skipped, unless their samples have gone
//! stale, in which case the ring is cleared and the server retried.
//! If ranking would leave no candidates at all, every server is
//! considered usable — the caller must never be left empty-handed.

use crate::params::ResolverParams;
use std::time::{Duration, Instant};
use vireo_proto::ResponseCode;

/// Outcome of one upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// A response arrived with this code.
    Rcode(ResponseCode),
    /// The per-attempt deadline expired.
    Timeout,
    /// The resolver itself failed (resource limits).
    InternalError,
}

/// One recorded outcome.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// When the sample was taken.
    pub at: Instant,
    /// What happened.
    pub outcome: SampleOutcome,
    /// Round-trip time (meaningful for responses only).
    pub rtt: Duration,
}

impl Sample {
    /// Creates a sample stamped now.
    pub fn now(outcome: SampleOutcome, rtt: Duration) -> Self {
        Self {
            at: Instant::now(),
            outcome,
            rtt,
        }
    }
}

/// Aggregated view over one server's ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// NOERROR, NXDOMAIN, NOTAUTH responses.
    pub successes: u32,
    /// Rejections: SERVFAIL, NOTIMP, REFUSED, FORMERR, unknown codes.
    pub errors: u32,
    /// Per-attempt deadline expiries.
    pub timeouts: u32,
    /// Internal resolver failures.
    pub internal_errors: u32,
    /// Average RTT over the successful samples, if any succeeded.
    pub rtt_avg: Option<Duration>,
}

/// Fixed-size circular sample buffer plus per-server sticky state.
#[derive(Debug, Default)]
pub struct ServerStats {
    samples: Vec<Sample>,
    next: usize,
    /// Server answered FORMERR to an EDNS0 query; stop sending OPT.
    edns_broken: bool,
}

impl ServerStats {
    /// Creates an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample, overwriting the oldest once `max_samples`
    /// entries are stored.
    pub fn record(&mut self, max_samples: usize, sample: Sample) {
        let cap = max_samples.max(1);
        if self.samples.len() >= cap {
            self.samples.truncate(cap);
            if self.next >= cap {
                self.next = 0;
            }
            self.samples[self.next] = sample;
            self.next = (self.next + 1) % cap;
        } else {
            self.samples.push(sample);
            self.next = self.samples.len() % cap;
        }
    }

    /// Clears all samples (stale ring, or reconfiguration).
    pub fn clear(&mut self) {
        self.samples.clear();
        self.next = 0;
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the most recently written sample.
    pub fn last_sample_at(&self) -> Option<Instant> {
        if self.samples.is_empty() {
            return None;
        }
        let index = if self.next > 0 {
            self.next - 1
        } else {
            self.samples.len() - 1
        };
        Some(self.samples[index].at)
    }

    /// Aggregates the ring into success/error/timeout buckets.
    ///
    /// NXDOMAIN and NOTAUTH occur for ordinary user queries and count
    /// as proof of life; SERVFAIL, NOTIMP and REFUSED are rejections.
    /// FORMERR and unknown codes are treated as rejections too.
    pub fn aggregate(&self) -> Aggregate {
        let mut agg = Aggregate::default();
        let mut rtt_sum = Duration::ZERO;
        let mut rtt_count = 0u32;

        for sample in &self.samples {
            match sample.outcome {
                SampleOutcome::Rcode(
                    ResponseCode::NoError | ResponseCode::NXDomain | ResponseCode::NotAuth,
                ) => {
                    agg.successes += 1;
                    rtt_sum += sample.rtt;
                    rtt_count += 1;
                }
                SampleOutcome::Timeout => agg.timeouts += 1,
                SampleOutcome::InternalError => agg.internal_errors += 1,
                SampleOutcome::Rcode(_) => agg.errors += 1,
            }
        }

        if rtt_count > 0 {
            agg.rtt_avg = Some(rtt_sum / rtt_count);
        }
        agg
    }

    /// Sticky EDNS state: true once the server has rejected an EDNS0
    /// query with FORMERR.
    pub fn edns_broken(&self) -> bool {
        self.edns_broken
    }

    /// Marks the server as EDNS-intolerant.
    pub fn set_edns_broken(&mut self) {
        self.edns_broken = true;
    }

    fn is_usable(&mut self, params: &ResolverParams) -> bool {
        let agg = self.aggregate();
        let total = agg.successes + agg.errors + agg.timeouts;

        if total >= u32::from(params.min_samples) && (agg.errors > 0 || agg.timeouts > 0) {
            let success_rate = agg.successes * 100 / total;
            if success_rate < u32::from(params.success_threshold) {
                let stale = self
                    .last_sample_at()
                    .map(|at| at.elapsed() > params.sample_validity)
                    .unwrap_or(true);
                if stale {
                    // Give the server another chance rather than
                    // keeping it blacklisted on ancient data.
                    self.clear();
                } else {
                    return false;
                }
            }
        }
        true
    }
}

/// Computes the usable-server set.
///
/// Post-condition: never all-false. When every server flunks the
/// ranking, the whole list is returned as usable.
pub fn usable_servers(params: &ResolverParams, stats: &mut [ServerStats]) -> Vec<bool> {
    let mut usable: Vec<bool> = stats
        .iter_mut()
        .map(|stats| stats.is_usable(params))
        .collect();

    if !usable.iter().any(|&u| u) {
        usable.iter_mut().for_each(|u| *u = true);
    }
    usable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success() -> Sample {
        Sample::now(
            SampleOutcome::Rcode(ResponseCode::NoError),
            Duration::from_millis(10),
        )
    }

    fn timeout() -> Sample {
        Sample::now(SampleOutcome::Timeout, Duration::ZERO)
    }

    fn params() -> ResolverParams {
        ResolverParams {
            min_samples: 4,
            max_samples: 8,
            success_threshold: 75,
            ..ResolverParams::default()
        }
    }

    #[test]
    fn ring_is_bounded() {
        let mut stats = ServerStats::new();
        for _ in 0..100 {
            stats.record(8, success());
        }
        assert_eq!(stats.len(), 8);
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut stats = ServerStats::new();
        for _ in 0..8 {
            stats.record(8, timeout());
        }
        for _ in 0..8 {
            stats.record(8, success());
        }
        let agg = stats.aggregate();
        assert_eq!(agg.successes, 8);
        assert_eq!(agg.timeouts, 0);
    }

    #[test]
    fn aggregate_buckets() {
        let mut stats = ServerStats::new();
        stats.record(8, success());
        stats.record(
            8,
            Sample::now(SampleOutcome::Rcode(ResponseCode::NXDomain), Duration::from_millis(20)),
        );
        stats.record(
            8,
            Sample::now(SampleOutcome::Rcode(ResponseCode::ServFail), Duration::ZERO),
        );
        stats.record(
            8,
            Sample::now(SampleOutcome::Rcode(ResponseCode::Unknown(13)), Duration::ZERO),
        );
        stats.record(8, timeout());
        stats.record(8, Sample::now(SampleOutcome::InternalError, Duration::ZERO));

        let agg = stats.aggregate();
        assert_eq!(agg.successes, 2);
        assert_eq!(agg.errors, 2);
        assert_eq!(agg.timeouts, 1);
        assert_eq!(agg.internal_errors, 1);
        assert_eq!(agg.rtt_avg, Some(Duration::from_millis(15)));
    }

    #[test]
    fn failing_server_becomes_unusable() {
        let mut stats = vec![ServerStats::new(), ServerStats::new()];
        for _ in 0..8 {
            stats[0].record(8, timeout());
            stats[1].record(8, success());
        }
        assert_eq!(usable_servers(&params(), &mut stats), vec![false, true]);
    }

    #[test]
    fn too_few_samples_is_usable() {
        let mut stats = vec![ServerStats::new()];
        stats[0].record(8, timeout());
        stats[0].record(8, timeout());
        assert_eq!(usable_servers(&params(), &mut stats), vec![true]);
    }

    #[test]
    fn permissive_fallback_when_all_fail() {
        let mut stats = vec![ServerStats::new(), ServerStats::new()];
        for ring in stats.iter_mut() {
            for _ in 0..8 {
                ring.record(8, timeout());
            }
        }
        assert_eq!(usable_servers(&params(), &mut stats), vec![true, true]);
    }

    #[test]
    fn stale_ring_cleared_and_retried() {
        let stale_params = ResolverParams {
            sample_validity: Duration::from_millis(1),
            ..params()
        };
        let mut stats = vec![ServerStats::new(), ServerStats::new()];
        for _ in 0..8 {
            stats[0].record(8, timeout());
            stats[1].record(8, success());
        }
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(usable_servers(&stale_params, &mut stats), vec![true, true]);
        assert!(stats[0].is_empty());
    }

    #[test]
    fn pure_successes_never_ranked_out() {
        let mut stats = vec![ServerStats::new()];
        for _ in 0..64 {
            stats[0].record(64, success());
        }
        assert_eq!(usable_servers(&params(), &mut stats), vec![true]);
    }
}
