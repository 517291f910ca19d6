//! The service facade.
//!
//! These are the in-process equivalents of the platform's control and
//! application surfaces. The RPC glue (out of scope here) maps
//! [`ResolverError`] onto its integer contract via [`error_code`].

use crate::events::{EventListener, EventReporter, QueryEvent};
use crate::log::{self, LogSeverity};
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use vireo_proto::{Name, Question, ResponseCode, DNS_PORT, DOT_PORT};
use vireo_resolver::{
    AddressFamily, Nat64Prefix, NetworkConfig, PrivateDnsStatus, QueryFlags, Resolver,
    ResolverError, ResolverParams, Result, ValidationObserver,
};

/// High bit of a netid: bypass private DNS and use the network's
/// cleartext servers directly.
pub const NETID_USE_LOCAL_NAMESERVERS: u32 = 0x8000_0000;

/// Integers per server record in [`ResolverInfo::stats`]:
/// successes, errors, timeouts, internal errors, average RTT in ms
/// (-1 when no success has been recorded).
pub const STATS_RECORD_LEN: usize = 5;

/// One `set_resolver_configuration` call.
///
/// Server literals are bare IPs (default ports: 53 cleartext, 853
/// TLS) or explicit `ip:port` pairs. `ca_certificate` carries a PEM
/// trust anchor for private-CA deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct SetConfigurationRequest {
    /// Target network.
    pub netid: u32,
    /// Routing mark for this network's sockets.
    pub mark: u32,
    /// Cleartext servers.
    pub servers: Vec<String>,
    /// Search domains.
    pub domains: Vec<String>,
    /// Tunables: `[sample_validity_s, success_threshold, min_samples,
    /// max_samples, base_timeout_ms, retry_count]`; zero in the last
    /// two slots selects defaults.
    pub params: Vec<u32>,
    /// Private DNS hostname; non-empty selects strict mode.
    pub tls_name: String,
    /// Encrypted servers.
    pub tls_servers: Vec<String>,
    /// Additional CA bundle (PEM).
    pub ca_certificate: String,
}

/// Snapshot returned by `get_resolver_info`.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// Configured cleartext servers.
    pub servers: Vec<String>,
    /// Configured search domains.
    pub domains: Vec<String>,
    /// Configured encrypted servers.
    pub tls_servers: Vec<String>,
    /// Effective tunables.
    pub params: ResolverParams,
    /// Flat per-server statistics, [`STATS_RECORD_LEN`] ints each.
    pub stats: Vec<i64>,
    /// Lookups that gave up waiting on a pending cache entry.
    pub pending_request_timeouts: u32,
}

/// The resolver service.
pub struct ResolverService {
    resolver: Arc<Resolver>,
    events: EventReporter,
}

impl Default for ResolverService {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverService {
    /// Creates the service. Installs the process-default TLS crypto
    /// provider on first use.
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            resolver: Arc::new(Resolver::new()),
            events: EventReporter::default(),
        }
    }

    /// Access to the underlying resolver (tests, platform glue).
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    // =====================================================================
    // Control surface
    // =====================================================================

    /// Registers a network. Fails with `AlreadyExists` on a duplicate
    /// netid.
    pub fn create_network_cache(&self, netid: u32) -> Result<()> {
        self.resolver.registry().create(netid & !NETID_USE_LOCAL_NAMESERVERS)
    }

    /// Destroys a network: drops its cache and stats and aborts its
    /// validations (their workers still report `Fail`). Idempotent.
    pub fn destroy_network_cache(&self, netid: u32) -> Result<()> {
        let netid = netid & !NETID_USE_LOCAL_NAMESERVERS;
        self.resolver.registry().destroy(netid);
        self.resolver.private_dns().clear(netid);
        Ok(())
    }

    /// Applies a resolver configuration. Every literal is validated
    /// before any state changes; one bad literal rejects the call.
    pub fn set_resolver_configuration(&self, request: &SetConfigurationRequest) -> Result<()> {
        let netid = request.netid & !NETID_USE_LOCAL_NAMESERVERS;

        let servers = parse_addr_list(&request.servers, DNS_PORT)?;
        let tls_servers = parse_addr_list(&request.tls_servers, DOT_PORT)?;

        let network = self.resolver.registry().get(netid)?;
        network.set_config(NetworkConfig {
            servers,
            search_domains: request.domains.clone(),
            params: ResolverParams::from_wire(&request.params),
            mark: request.mark,
        })?;

        let hostname = (!request.tls_name.is_empty()).then_some(request.tls_name.as_str());
        let ca_pem = (!request.ca_certificate.is_empty()).then_some(request.ca_certificate.as_str());
        self.resolver
            .private_dns()
            .set(netid, request.mark, &tls_servers, hostname, ca_pem)?;

        info!(netid, servers = request.servers.len(), tls = request.tls_servers.len(),
              "resolver configuration applied");
        Ok(())
    }

    /// Snapshot of one network's configuration and statistics.
    pub fn get_resolver_info(&self, netid: u32) -> Result<ResolverInfo> {
        let netid = netid & !NETID_USE_LOCAL_NAMESERVERS;
        let network = self.resolver.registry().get(netid)?;
        let (_, config) = network.snapshot();

        let stats = network
            .stats_snapshot()
            .into_iter()
            .flat_map(|agg| {
                [
                    i64::from(agg.successes),
                    i64::from(agg.errors),
                    i64::from(agg.timeouts),
                    i64::from(agg.internal_errors),
                    agg.rtt_avg.map(|rtt| rtt.as_millis() as i64).unwrap_or(-1),
                ]
            })
            .collect();

        let status = self.resolver.private_dns().status(netid);
        Ok(ResolverInfo {
            servers: config.servers.iter().map(|s| s.to_string()).collect(),
            domains: config.search_domains.clone(),
            tls_servers: status
                .servers
                .iter()
                .map(|(identity, _)| identity.to_string())
                .collect(),
            params: config.params.clone(),
            stats,
            pending_request_timeouts: network.cache().pending_timeout_count(),
        })
    }

    /// Private DNS status for a network.
    pub fn get_private_dns_status(&self, netid: u32) -> PrivateDnsStatus {
        self.resolver
            .private_dns()
            .status(netid & !NETID_USE_LOCAL_NAMESERVERS)
    }

    /// Installs the validation observer.
    pub fn set_private_dns_observer(&self, observer: Arc<dyn ValidationObserver>) {
        self.resolver.private_dns().set_observer(observer);
    }

    /// Starts NAT64 prefix discovery on a network.
    pub fn start_prefix64_discovery(&self, netid: u32) -> Result<()> {
        Arc::clone(&self.resolver).start_prefix64_discovery(netid & !NETID_USE_LOCAL_NAMESERVERS)
    }

    /// Stops discovery and clears the prefix.
    pub fn stop_prefix64_discovery(&self, netid: u32) -> Result<()> {
        self.resolver
            .stop_prefix64_discovery(netid & !NETID_USE_LOCAL_NAMESERVERS)
    }

    /// Currently discovered prefix, if any.
    pub fn get_prefix64(&self, netid: u32) -> Result<Option<Nat64Prefix>> {
        self.resolver.prefix64(netid & !NETID_USE_LOCAL_NAMESERVERS)
    }

    /// Adjusts the process log severity.
    pub fn set_log_severity(&self, level: &str) -> Result<()> {
        let severity = LogSeverity::from_str(level)
            .map_err(|()| ResolverError::InvalidArgument(format!("unknown severity {level:?}")))?;
        log::set_severity(severity);
        debug!(?severity, "log severity updated");
        Ok(())
    }

    /// Registers a query-event listener. `None` is rejected; the same
    /// listener instance can be registered once.
    pub fn register_event_listener(
        &self,
        listener: Option<Arc<dyn EventListener>>,
    ) -> Result<()> {
        self.events.register(listener)
    }

    // =====================================================================
    // Application surface
    // =====================================================================

    /// Resolves a hostname to addresses.
    pub async fn lookup_host(
        &self,
        netid: u32,
        name: &str,
        family: AddressFamily,
        flags: QueryFlags,
    ) -> Result<Vec<IpAddr>> {
        let (netid, flags) = self.effective(netid, flags);
        let started = Instant::now();
        let result = self.resolver.lookup_host(netid, name, family, flags).await;
        self.report(netid, name, 0, result_code(&result), started);
        result
    }

    /// Reverse-resolves an address, applying NAT64 unmapping.
    pub async fn lookup_addr(
        &self,
        netid: u32,
        addr: IpAddr,
        flags: QueryFlags,
    ) -> Result<(String, IpAddr)> {
        let (netid, flags) = self.effective(netid, flags);
        self.resolver.lookup_addr(netid, addr, flags).await
    }

    /// Resolves one raw question and returns `(rcode, wire bytes)`.
    /// An answer larger than `answer_limit` is discarded and reported
    /// as a limit error; the caller re-queries with a bigger buffer.
    pub async fn query_raw(
        &self,
        netid: u32,
        name: &str,
        qclass: u16,
        qtype: u16,
        flags: QueryFlags,
        answer_limit: usize,
    ) -> Result<(ResponseCode, Bytes)> {
        let (netid, flags) = self.effective(netid, flags);
        let qname = Name::from_str(name)
            .map_err(|e| ResolverError::InvalidArgument(e.to_string()))?;
        let question = Question::from_raw(qname, qtype, qclass);

        let started = Instant::now();
        let result = self.resolver.resolve(netid, question, flags).await;
        self.report(netid, name, qtype, raw_code(&result), started);

        let message = result?;
        let wire = message.to_wire();
        if wire.len() > answer_limit {
            return Err(ResolverError::Limit {
                size: wire.len(),
                limit: answer_limit,
            });
        }
        Ok((message.rcode(), wire))
    }

    fn effective(&self, netid: u32, mut flags: QueryFlags) -> (u32, QueryFlags) {
        if netid & NETID_USE_LOCAL_NAMESERVERS != 0 {
            flags |= QueryFlags::BYPASS_PRIVATE_DNS;
        }
        (netid & !NETID_USE_LOCAL_NAMESERVERS, flags)
    }

    fn report(&self, netid: u32, name: &str, qtype: u16, rcode: i32, started: Instant) {
        if self.events.is_empty() {
            return;
        }
        self.events.emit(&QueryEvent {
            netid,
            name: name.to_string(),
            qtype,
            rcode,
            latency: started.elapsed(),
        });
    }
}

fn result_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => error_code(e),
    }
}

fn raw_code(result: &Result<vireo_proto::Message>) -> i32 {
    match result {
        Ok(message) => i32::from(message.rcode().to_u8()),
        Err(e) => error_code(e),
    }
}

/// Maps resolver errors onto the wire contract's negative errno
/// values.
pub fn error_code(error: &ResolverError) -> i32 {
    match error {
        ResolverError::InvalidArgument(_) => -22, // EINVAL
        ResolverError::AlreadyExists(_) => -17,   // EEXIST
        ResolverError::NoSuchNetwork(_) => -64,   // ENONET
        ResolverError::Timeout => -110,           // ETIMEDOUT
        ResolverError::Network => -5,             // EIO
        ResolverError::Limit { .. } => -90,       // EMSGSIZE
        ResolverError::NoData => -2,              // ENOENT
        ResolverError::HostNotFound => -2,        // ENOENT
        ResolverError::Internal => -12,           // ENOMEM
    }
}

fn parse_addr_list(literals: &[String], default_port: u16) -> Result<Vec<SocketAddr>> {
    literals
        .iter()
        .map(|literal| parse_addr(literal, default_port))
        .collect()
}

fn parse_addr(literal: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = SocketAddr::from_str(literal) {
        return Ok(addr);
    }
    IpAddr::from_str(literal)
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| ResolverError::InvalidArgument(format!("bad address literal {literal:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_literal_parsing() {
        assert_eq!(
            parse_addr("127.0.0.4", 53).unwrap(),
            "127.0.0.4:53".parse().unwrap()
        );
        assert_eq!(
            parse_addr("127.0.0.4:5353", 53).unwrap(),
            "127.0.0.4:5353".parse().unwrap()
        );
        assert_eq!(
            parse_addr("::1", 853).unwrap(),
            "[::1]:853".parse().unwrap()
        );
        assert!(parse_addr("invalid_addr", 53).is_err());
    }

    #[test]
    fn create_and_destroy() {
        let service = ResolverService::new();
        assert!(service.create_network_cache(30).is_ok());
        assert_eq!(
            service.create_network_cache(30),
            Err(ResolverError::AlreadyExists(30))
        );
        assert!(service.destroy_network_cache(30).is_ok());
        assert!(service.destroy_network_cache(30).is_ok());
    }

    #[test]
    fn bad_literal_rejects_whole_call_without_mutation() {
        let service = ResolverService::new();
        service.create_network_cache(30).unwrap();

        let request = SetConfigurationRequest {
            netid: 30,
            servers: vec!["127.0.0.4".into(), "invalid_addr".into()],
            ..SetConfigurationRequest::default()
        };
        assert!(matches!(
            service.set_resolver_configuration(&request),
            Err(ResolverError::InvalidArgument(_))
        ));

        let info = service.get_resolver_info(30).unwrap();
        assert!(info.servers.is_empty());
    }

    #[test]
    fn netid_flag_masked() {
        let service = ResolverService::new();
        service
            .create_network_cache(30 | NETID_USE_LOCAL_NAMESERVERS)
            .unwrap();
        assert!(service.get_resolver_info(30).is_ok());
    }

    #[test]
    fn unknown_severity_rejected() {
        let service = ResolverService::new();
        assert!(service.set_log_severity("WARNING").is_ok());
        assert!(matches!(
            service.set_log_severity("LOUD"),
            Err(ResolverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn error_code_contract() {
        assert_eq!(error_code(&ResolverError::InvalidArgument("x".into())), -22);
        assert_eq!(error_code(&ResolverError::AlreadyExists(1)), -17);
    }
}
