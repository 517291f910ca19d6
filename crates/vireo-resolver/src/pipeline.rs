//! The resolution pipeline.
//!
//! One [`Resolver`] serves the whole process. A hostname query walks:
//! numeric-literal and hosts-table short-circuits, search-domain
//! expansion, the per-network cache, server selection by ranking, then
//! the wire — UDP with TCP fallback on truncation, or the encrypted
//! dispatcher when private DNS demands it — and finally NAT64
//! post-processing.

use crate::hosts::{self, HostsTable};
use crate::nat64::{self, Nat64Prefix, IPV4_ONLY_NAME};
use crate::network::{Network, NetworkConfig, Registry};
use crate::private_dns::{PrivateDnsConfiguration, PrivateDnsMode};
use crate::stats::{Sample, SampleOutcome};
use crate::{QueryFlags, Result, ResolverError};
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use vireo_cache::{CacheKey, Lookup};
use vireo_proto::{Message, Name, Question, RecordType, ResponseCode, MAX_PACKET_SIZE};
use vireo_transport::{Dispatcher, DotServerConfig, QueryResult};

/// How long to wait before re-probing for a prefix that was not found.
const PREFIX_RETRY_INTERVAL: Duration = Duration::from_secs(120);

/// How often a discovered prefix is re-checked.
const PREFIX_RECHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Negative answers with no SOA minimum get this TTL.
const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(5);

/// Address family requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4 only.
    V4,
    /// IPv6 only (NAT64 synthesis may apply).
    V6,
    /// Both; IPv6 answers sort first.
    Unspec,
}

impl AddressFamily {
    fn wants_v4(self) -> bool {
        matches!(self, Self::V4 | Self::Unspec)
    }

    fn wants_v6(self) -> bool {
        matches!(self, Self::V6 | Self::Unspec)
    }
}

/// The process-wide resolver.
pub struct Resolver {
    registry: Registry,
    private_dns: Arc<PrivateDnsConfiguration>,
    dispatcher: Arc<Dispatcher>,
    hosts: HostsTable,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Creates a resolver with no networks configured.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            private_dns: Arc::new(PrivateDnsConfiguration::default()),
            dispatcher: Arc::new(Dispatcher::default()),
            hosts: HostsTable::new(),
        }
    }

    /// The network registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The private DNS configuration store.
    pub fn private_dns(&self) -> &Arc<PrivateDnsConfiguration> {
        &self.private_dns
    }

    /// The transport dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The hosts table.
    pub fn hosts(&self) -> &HostsTable {
        &self.hosts
    }

    // =====================================================================
    // Raw message resolution
    // =====================================================================

    /// Resolves one question on `netid`, honoring the cache and the
    /// network's private DNS mode. Returns the parsed answer; NXDOMAIN
    /// and NODATA come back as successful messages for the caller to
    /// classify.
    pub async fn resolve(
        &self,
        netid: u32,
        question: Question,
        flags: QueryFlags,
    ) -> Result<Message> {
        let network = self.registry.get(netid)?;
        let key = CacheKey::from_question(&question);

        let guard = if flags.contains(QueryFlags::NO_CACHE_LOOKUP) {
            network.cache().bypass(&key)
        } else {
            match network.cache().lookup(&key).await {
                Lookup::Hit(bytes) => {
                    return Message::parse(&bytes).map_err(|_| ResolverError::Internal);
                }
                Lookup::Build(guard) => guard,
            }
        };

        match self.query_upstream(&network, &question, flags).await {
            Ok((message, bytes)) => {
                if flags.contains(QueryFlags::NO_CACHE_STORE) {
                    guard.abandon();
                } else {
                    guard.insert(bytes, answer_ttl(&message));
                }
                Ok(message)
            }
            Err(e) => {
                guard.abandon();
                Err(e)
            }
        }
    }

    async fn query_upstream(
        &self,
        network: &Network,
        question: &Question,
        flags: QueryFlags,
    ) -> Result<(Message, Bytes)> {
        let (revision, config) = network.snapshot();

        let (mode, encrypted) = if flags.contains(QueryFlags::BYPASS_PRIVATE_DNS) {
            (PrivateDnsMode::Off, Vec::new())
        } else {
            self.private_dns.validated_servers(network.netid())
        };

        match mode {
            PrivateDnsMode::Strict => {
                if encrypted.is_empty() {
                    // No server has validated: fail fast, never leak
                    // the query onto cleartext.
                    debug!(netid = network.netid(), "strict mode with no validated server");
                    return Err(ResolverError::HostNotFound);
                }
                self.query_encrypted(&config, &encrypted, question).await
            }
            PrivateDnsMode::Opportunistic if !encrypted.is_empty() => {
                match self.query_encrypted(&config, &encrypted, question).await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        debug!(
                            netid = network.netid(),
                            error = %e,
                            "encrypted path failed, falling back to cleartext"
                        );
                        self.query_cleartext(network, revision, &config, question, flags)
                            .await
                    }
                }
            }
            _ => {
                self.query_cleartext(network, revision, &config, question, flags)
                    .await
            }
        }
    }

    async fn query_encrypted(
        &self,
        config: &NetworkConfig,
        servers: &[DotServerConfig],
        question: &Question,
    ) -> Result<(Message, Bytes)> {
        // The session retries internally; budget one base timeout per
        // attempt so a hung handshake cannot stall the caller forever.
        let deadline = config.params.base_timeout * u32::from(vireo_transport::MAX_TRIES);

        for server in servers {
            let session = self.dispatcher.session(config.mark, server);
            let query = Message::query(rand::random(), question.clone()).with_edns();
            let query_id = query.id();

            match timeout(deadline, session.query(query.to_wire())).await {
                Ok(QueryResult::Success(bytes)) => {
                    let message = match Message::parse(&bytes) {
                        Ok(message) if message.id() == query_id => message,
                        _ => {
                            warn!(server = %server.identity(), "bad answer over encrypted transport");
                            continue;
                        }
                    };
                    return Ok((message, bytes));
                }
                Ok(QueryResult::InternalError) => return Err(ResolverError::Internal),
                Ok(QueryResult::NetworkError) => continue,
                Err(_) => {
                    trace!(server = %server.identity(), "encrypted query timed out");
                    continue;
                }
            }
        }
        Err(ResolverError::Network)
    }

    async fn query_cleartext(
        &self,
        network: &Network,
        revision: u32,
        config: &NetworkConfig,
        question: &Question,
        flags: QueryFlags,
    ) -> Result<(Message, Bytes)> {
        if config.servers.is_empty() {
            return Err(ResolverError::Network);
        }

        let usable = network.usable_servers();
        // The base timeout budgets the whole server list; each attempt
        // gets its share of one round.
        let usable_count = usable.iter().filter(|&&u| u).count().max(1) as u32;
        let attempt_timeout = config.params.base_timeout / usable_count;

        let rounds = if flags.contains(QueryFlags::NO_RETRY) {
            1
        } else {
            config.params.retry_count.max(1)
        };
        let mut saw_timeout = false;

        for round in 0..rounds {
            for (index, server) in config.servers.iter().enumerate() {
                if !usable.get(index).copied().unwrap_or(true) {
                    continue;
                }
                trace!(%question, %server, round, "cleartext attempt");

                match self
                    .attempt_server(
                        network,
                        revision,
                        index,
                        *server,
                        config,
                        question,
                        attempt_timeout,
                    )
                    .await
                {
                    Ok(Some(result)) => return Ok(result),
                    Ok(None) => {}
                    Err(ResolverError::Timeout) => saw_timeout = true,
                    Err(_) => {}
                }
            }
        }

        Err(if saw_timeout {
            ResolverError::Timeout
        } else {
            ResolverError::Network
        })
    }

    /// One UDP attempt against one server, with TCP fallback on
    /// truncation. `Ok(None)` means "answer unusable, try the next
    /// server".
    #[allow(clippy::too_many_arguments)]
    async fn attempt_server(
        &self,
        network: &Network,
        revision: u32,
        index: usize,
        server: SocketAddr,
        config: &NetworkConfig,
        question: &Question,
        attempt_timeout: Duration,
    ) -> Result<Option<(Message, Bytes)>> {
        // EDNS0 never goes out on cleartext UDP; some middle-boxes
        // answer FORMERR to OPT.
        let query = Message::query(rand::random(), question.clone());
        let wire = query.to_wire();
        let started = Instant::now();

        let bytes = match udp_exchange(config.mark, server, &wire, attempt_timeout).await {
            Ok(bytes) => bytes,
            Err(ResolverError::Timeout) => {
                network.record_sample(
                    revision,
                    index,
                    Sample::now(SampleOutcome::Timeout, started.elapsed()),
                );
                return Err(ResolverError::Timeout);
            }
            Err(e) => return Err(e),
        };

        let message = match Message::parse(&bytes) {
            Ok(message) => message,
            Err(e) => {
                trace!(%server, error = %e, "unparseable answer");
                return Ok(None);
            }
        };
        if message.id() != query.id() {
            trace!(%server, "answer id mismatch");
            return Ok(None);
        }

        let (message, bytes) = if message.is_truncated() {
            trace!(%server, "truncated answer, retrying over TCP");
            self.tcp_exchange(network, index, server, config, question)
                .await?
        } else {
            (message, Bytes::from(bytes))
        };

        network.record_sample(
            revision,
            index,
            Sample::now(SampleOutcome::Rcode(message.rcode()), started.elapsed()),
        );

        match message.rcode() {
            ResponseCode::NoError | ResponseCode::NXDomain => Ok(Some((message, bytes))),
            rcode => {
                trace!(%server, %rcode, "server rejected query");
                Ok(None)
            }
        }
    }

    /// TCP retry for a truncated answer, with the EDNS0 discipline:
    /// OPT is attached unless the server is known to choke on it, and
    /// a FORMERR answer to an EDNS0 query earns one EDNS-less retry
    /// plus a sticky flag.
    async fn tcp_exchange(
        &self,
        network: &Network,
        index: usize,
        server: SocketAddr,
        config: &NetworkConfig,
        question: &Question,
    ) -> Result<(Message, Bytes)> {
        let mut use_edns = !network.edns_broken(index);

        loop {
            let mut query = Message::query(rand::random(), question.clone());
            if use_edns {
                query = query.with_edns();
            }
            let bytes = tcp_roundtrip(
                config.mark,
                server,
                &query.to_wire(),
                config.params.base_timeout,
            )
            .await?;

            let message =
                Message::parse(&bytes).map_err(|_| ResolverError::Network)?;
            if message.id() != query.id() {
                return Err(ResolverError::Network);
            }

            if message.rcode() == ResponseCode::FormErr && use_edns {
                debug!(%server, "FORMERR to EDNS0 query, retrying without");
                network.set_edns_broken(index);
                use_edns = false;
                continue;
            }
            return Ok((message, Bytes::from(bytes)));
        }
    }

    // =====================================================================
    // Hostname lookup
    // =====================================================================

    /// Resolves a hostname to addresses, applying the short-circuits,
    /// search-domain expansion and NAT64 synthesis.
    pub async fn lookup_host(
        &self,
        netid: u32,
        name: &str,
        family: AddressFamily,
        flags: QueryFlags,
    ) -> Result<Vec<IpAddr>> {
        if let Some(ip) = hosts::numeric_literal(name) {
            return if family_matches(family, ip) {
                Ok(vec![ip])
            } else {
                Err(ResolverError::HostNotFound)
            };
        }

        if let Some(addrs) = self.hosts.lookup(name) {
            let filtered: Vec<IpAddr> = addrs
                .into_iter()
                .filter(|ip| family_matches(family, *ip))
                .collect();
            if !filtered.is_empty() {
                return Ok(filtered);
            }
        }

        let network = self.registry.get(netid)?;
        let (_, config) = network.snapshot();

        let mut last_error = ResolverError::HostNotFound;
        for candidate in search_candidates(name, &config.search_domains, config.params.ndots) {
            match self
                .lookup_candidate(netid, &network, &candidate, family, flags)
                .await
            {
                Ok(addrs) if !addrs.is_empty() => return Ok(addrs),
                Ok(_) => last_error = ResolverError::NoData,
                Err(e @ (ResolverError::HostNotFound | ResolverError::NoData)) => {
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn lookup_candidate(
        &self,
        netid: u32,
        network: &Network,
        name: &str,
        family: AddressFamily,
        flags: QueryFlags,
    ) -> Result<Vec<IpAddr>> {
        let qname = Name::from_str(name)
            .map_err(|e| ResolverError::InvalidArgument(e.to_string()))?;

        let mut v6: Vec<IpAddr> = Vec::new();
        let mut v4: Vec<IpAddr> = Vec::new();
        let mut v6_missing = false;
        let mut nxdomain = true;

        // AAAA first: NAT64 synthesis is only consulted once the
        // native IPv6 answer is known to be empty, and issues at most
        // one extra A query.
        if family.wants_v6() {
            match self
                .resolve(netid, Question::new(qname.clone(), RecordType::AAAA), flags)
                .await
            {
                Ok(message) if message.is_nxdomain() => v6_missing = true,
                Ok(message) => {
                    nxdomain = false;
                    v6.extend(message.aaaa_records().map(IpAddr::V6));
                    v6_missing = v6.is_empty();
                }
                Err(ResolverError::HostNotFound) => v6_missing = true,
                Err(ResolverError::NoData) => {
                    nxdomain = false;
                    v6_missing = true;
                }
                Err(e) => return Err(e),
            }
        }

        let want_a = family.wants_v4()
            || (family == AddressFamily::V6 && v6_missing && network.prefix().is_some());
        if want_a {
            match self
                .resolve(netid, Question::new(qname, RecordType::A), flags)
                .await
            {
                Ok(message) if message.is_nxdomain() => {}
                Ok(message) => {
                    nxdomain = false;
                    v4.extend(message.a_records().map(IpAddr::V4));
                }
                Err(ResolverError::HostNotFound) => {}
                Err(ResolverError::NoData) => nxdomain = false,
                Err(e) => return Err(e),
            }
        }

        // NAT64: synthesize when the caller can take IPv6, no native
        // IPv6 exists, and a prefix is present.
        let mut addrs: Vec<IpAddr> = Vec::new();
        if family.wants_v6() && v6.is_empty() && !v4.is_empty() {
            if let Some(prefix) = network.prefix() {
                addrs.extend(synthesize_all(&prefix, &v4));
            }
        }
        addrs.extend(v6);
        if family.wants_v4() {
            addrs.extend(v4);
        }

        if addrs.is_empty() && nxdomain {
            return Err(ResolverError::HostNotFound);
        }
        Ok(addrs)
    }

    // =====================================================================
    // Reverse lookup
    // =====================================================================

    /// Resolves an address to a hostname. For synthesized IPv6
    /// addresses inside the NAT64 prefix, the IPv6 PTR is tried first
    /// and the query falls back to the embedded IPv4 PTR; the answer
    /// reports the synthesized address the caller asked about.
    pub async fn lookup_addr(
        &self,
        netid: u32,
        addr: IpAddr,
        flags: QueryFlags,
    ) -> Result<(String, IpAddr)> {
        let network = self.registry.get(netid)?;

        if let IpAddr::V6(v6) = addr {
            if let Some(prefix) = network.prefix() {
                if prefix.contains(v6) {
                    match self
                        .ptr_query(netid, &nat64::reverse_v6_name(v6), flags)
                        .await
                    {
                        Ok(name) => return Ok((name, addr)),
                        Err(ResolverError::HostNotFound | ResolverError::NoData) => {
                            let v4 = prefix.extract(v6);
                            trace!(%v4, "synthesized PTR missing, trying IPv4 side");
                            let name = self
                                .ptr_query(netid, &nat64::reverse_v4_name(v4), flags)
                                .await?;
                            return Ok((name, addr));
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let reverse = match addr {
            IpAddr::V4(v4) => nat64::reverse_v4_name(v4),
            IpAddr::V6(v6) => nat64::reverse_v6_name(v6),
        };
        let name = self.ptr_query(netid, &reverse, flags).await?;
        Ok((name, addr))
    }

    async fn ptr_query(&self, netid: u32, reverse: &str, flags: QueryFlags) -> Result<String> {
        let qname = Name::from_str(reverse)
            .map_err(|e| ResolverError::InvalidArgument(e.to_string()))?;
        let message = self
            .resolve(netid, Question::new(qname, RecordType::PTR), flags)
            .await?;

        if message.is_nxdomain() {
            return Err(ResolverError::HostNotFound);
        }
        let result = message
            .ptr_records()
            .next()
            .map(|name| name.to_string())
            .ok_or(ResolverError::NoData);
        result
    }

    // =====================================================================
    // NAT64 prefix discovery
    // =====================================================================

    /// Starts (or restarts) periodic prefix discovery for `netid`.
    ///
    /// The probe always travels cleartext — even in strict mode — and
    /// bypasses the cache.
    pub fn start_prefix64_discovery(self: &Arc<Self>, netid: u32) -> Result<()> {
        let network = self.registry.get(netid)?;
        let resolver = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                match resolver.discover_prefix_once(netid).await {
                    Some(prefix) => {
                        match resolver.registry.get(netid) {
                            Ok(network) => network.set_prefix(prefix),
                            Err(_) => return,
                        }
                        tokio::time::sleep(PREFIX_RECHECK_INTERVAL).await;
                    }
                    None => tokio::time::sleep(PREFIX_RETRY_INTERVAL).await,
                }
            }
        });

        network.set_discovery_task(Some(handle));
        Ok(())
    }

    /// Stops discovery and forgets the prefix.
    pub fn stop_prefix64_discovery(&self, netid: u32) -> Result<()> {
        let network = self.registry.get(netid)?;
        network.set_discovery_task(None);
        network.clear_prefix();
        Ok(())
    }

    /// Current prefix for `netid`, if any.
    pub fn prefix64(&self, netid: u32) -> Result<Option<Nat64Prefix>> {
        Ok(self.registry.get(netid)?.prefix())
    }

    async fn discover_prefix_once(&self, netid: u32) -> Option<Nat64Prefix> {
        let qname = Name::from_str(IPV4_ONLY_NAME).ok()?;
        let flags = QueryFlags::NO_CACHE_LOOKUP
            | QueryFlags::NO_CACHE_STORE
            | QueryFlags::BYPASS_PRIVATE_DNS;

        let message = self
            .resolve(netid, Question::new(qname, RecordType::AAAA), flags)
            .await
            .ok()?;
        let aaaa = message.aaaa_records().next()?;
        Some(Nat64Prefix::from_discovered(aaaa))
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn family_matches(family: AddressFamily, ip: IpAddr) -> bool {
    match family {
        AddressFamily::Unspec => true,
        AddressFamily::V4 => ip.is_ipv4(),
        AddressFamily::V6 => ip.is_ipv6(),
    }
}

fn synthesize_all(prefix: &Nat64Prefix, v4: &[IpAddr]) -> Vec<IpAddr> {
    v4.iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if nat64::synthesis_allowed(*v4) => {
                Some(IpAddr::V6(prefix.synthesize(*v4)))
            }
            _ => None,
        })
        .collect()
}

/// Builds the candidate list for search-domain expansion: absolute
/// names and names with enough dots go out as-is; everything else
/// tries the search domains first and the bare name last.
fn search_candidates(name: &str, domains: &[String], ndots: u8) -> Vec<String> {
    if name.ends_with('.') {
        return vec![name.trim_end_matches('.').to_string()];
    }
    let dots = name.matches('.').count();
    if dots >= usize::from(ndots) || domains.is_empty() {
        return vec![name.to_string()];
    }

    let mut candidates: Vec<String> = domains
        .iter()
        .map(|domain| format!("{name}.{domain}"))
        .collect();
    candidates.push(name.to_string());
    candidates
}

fn answer_ttl(message: &Message) -> Duration {
    match message.min_answer_ttl() {
        Some(ttl) => Duration::from_secs(u64::from(ttl)),
        None => message
            .soa_minimum()
            .map(|ttl| Duration::from_secs(u64::from(ttl)))
            .unwrap_or(DEFAULT_NEGATIVE_TTL),
    }
}

fn bind_addr_for(server: SocketAddr) -> SocketAddr {
    if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16, 0, 0, 0, 0, 0, 0, 0], 0))
    }
}

#[cfg(target_os = "linux")]
fn mark_socket<S: std::os::fd::AsFd>(socket: &S, mark: u32) -> std::io::Result<()> {
    if mark != 0 {
        socket2::SockRef::from(socket).set_mark(mark)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn mark_socket<S>(_socket: &S, _mark: u32) -> std::io::Result<()> {
    Ok(())
}

async fn udp_exchange(
    mark: u32,
    server: SocketAddr,
    wire: &[u8],
    deadline: Duration,
) -> Result<Vec<u8>> {
    let socket = UdpSocket::bind(bind_addr_for(server))
        .await
        .map_err(|_| ResolverError::Network)?;
    mark_socket(&socket, mark).map_err(|_| ResolverError::Network)?;
    socket
        .connect(server)
        .await
        .map_err(|_| ResolverError::Network)?;
    socket.send(wire).await.map_err(|_| ResolverError::Network)?;

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let len = timeout(deadline, socket.recv(&mut buf))
        .await
        .map_err(|_| ResolverError::Timeout)?
        .map_err(|_| ResolverError::Network)?;
    buf.truncate(len);
    Ok(buf)
}

async fn tcp_roundtrip(
    mark: u32,
    server: SocketAddr,
    wire: &[u8],
    deadline: Duration,
) -> Result<Vec<u8>> {
    let socket = if server.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|_| ResolverError::Network)?;
    mark_socket(&socket, mark).map_err(|_| ResolverError::Network)?;

    let mut stream: TcpStream = timeout(deadline, socket.connect(server))
        .await
        .map_err(|_| ResolverError::Timeout)?
        .map_err(|_| ResolverError::Network)?;

    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    framed.extend_from_slice(wire);
    stream
        .write_all(&framed)
        .await
        .map_err(|_| ResolverError::Network)?;

    let mut len_buf = [0u8; 2];
    timeout(deadline, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| ResolverError::Timeout)?
        .map_err(|_| ResolverError::Network)?;
    let len = usize::from(u16::from_be_bytes(len_buf));

    let mut buf = vec![0u8; len];
    timeout(deadline, stream.read_exact(&mut buf))
        .await
        .map_err(|_| ResolverError::Timeout)?
        .map_err(|_| ResolverError::Network)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_expansion_order() {
        let domains = vec!["corp.example.com".to_string(), "example.com".to_string()];

        // Fewer dots than ndots: domains first, bare name last.
        assert_eq!(
            search_candidates("ohayou", &domains, 1),
            vec![
                "ohayou.corp.example.com".to_string(),
                "ohayou.example.com".to_string(),
                "ohayou".to_string(),
            ]
        );

        // Enough dots: bare name only.
        assert_eq!(
            search_candidates("howdy.example.com", &domains, 1),
            vec!["howdy.example.com".to_string()]
        );

        // Absolute names never expand.
        assert_eq!(
            search_candidates("ohayou.", &domains, 1),
            vec!["ohayou".to_string()]
        );
    }

    #[test]
    fn family_filters() {
        let v4: IpAddr = "1.2.3.4".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert!(family_matches(AddressFamily::Unspec, v4));
        assert!(family_matches(AddressFamily::V4, v4));
        assert!(!family_matches(AddressFamily::V4, v6));
        assert!(family_matches(AddressFamily::V6, v6));
        assert!(!family_matches(AddressFamily::V6, v4));
    }

    #[test]
    fn synthesis_skips_reserved() {
        let prefix = Nat64Prefix::from_discovered("64:ff9b::1".parse().unwrap());
        let addrs = vec![
            "1.2.3.4".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            "224.0.0.1".parse().unwrap(),
        ];
        let synthesized = synthesize_all(&prefix, &addrs);
        assert_eq!(synthesized, vec!["64:ff9b::102:304".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn numeric_literals_short_circuit() {
        let resolver = Resolver::new();
        // No network 99 exists; literals never reach the registry.
        let addrs = resolver
            .lookup_host(99, "1.2.3.4", AddressFamily::Unspec, QueryFlags::empty())
            .await
            .unwrap();
        assert_eq!(addrs, vec!["1.2.3.4".parse::<IpAddr>().unwrap()]);

        let err = resolver
            .lookup_host(99, "1.2.3.4", AddressFamily::V6, QueryFlags::empty())
            .await
            .unwrap_err();
        assert_eq!(err, ResolverError::HostNotFound);
    }

    #[tokio::test]
    async fn hosts_table_short_circuits() {
        let resolver = Resolver::new();
        let addrs = resolver
            .lookup_host(99, "localhost", AddressFamily::V4, QueryFlags::empty())
            .await
            .unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn unknown_network_rejected() {
        let resolver = Resolver::new();
        let err = resolver
            .lookup_host(7, "example.com", AddressFamily::Unspec, QueryFlags::empty())
            .await
            .unwrap_err();
        assert_eq!(err, ResolverError::NoSuchNetwork(7));
    }
}
