//! Per-network state and the network registry.

use crate::params::ResolverParams;
use crate::stats::{self, Aggregate, Sample, ServerStats};
use crate::nat64::Nat64Prefix;
use crate::{Result, ResolverError, MAXDNSRCH, MAXNS};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Configuration applied to one network by the control surface.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Cleartext upstream servers, in preference order (≤ MAXNS).
    pub servers: Vec<SocketAddr>,
    /// Search domains for unqualified names (≤ MAXDNSRCH, deduped).
    pub search_domains: Vec<String>,
    /// Tunables.
    pub params: ResolverParams,
    /// Routing mark applied to every outgoing socket.
    pub mark: u32,
}

impl NetworkConfig {
    fn sanitize(mut self) -> Result<Self> {
        if self.servers.len() > MAXNS {
            self.servers.truncate(MAXNS);
        }
        let mut seen = Vec::new();
        for domain in std::mem::take(&mut self.search_domains) {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain.len() > 255 {
                return Err(ResolverError::InvalidArgument(format!(
                    "search domain too long: {domain:?}"
                )));
            }
            if !domain.is_empty() && !seen.contains(&domain) {
                seen.push(domain);
            }
        }
        if seen.len() > MAXDNSRCH {
            seen.truncate(MAXDNSRCH);
        }
        self.search_domains = seen;
        Ok(self)
    }
}

/// Everything the resolver knows about one network.
#[derive(Debug)]
pub struct Network {
    netid: u32,
    config: RwLock<(u32, Arc<NetworkConfig>)>, // (revision, config)
    stats: Mutex<Vec<ServerStats>>,
    cache: vireo_cache::ResolvCache,
    prefix: Mutex<Option<Nat64Prefix>>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl Network {
    fn new(netid: u32) -> Self {
        Self {
            netid,
            config: RwLock::new((0, Arc::new(NetworkConfig::default()))),
            stats: Mutex::new(Vec::new()),
            cache: vireo_cache::ResolvCache::new(vireo_cache::CacheConfig::default()),
            prefix: Mutex::new(None),
            discovery: Mutex::new(None),
        }
    }

    /// The network id.
    pub fn netid(&self) -> u32 {
        self.netid
    }

    /// Replaces the configuration. Stats rings are reset and the
    /// revision bumped so samples from the old server list are not
    /// attributed to the new one.
    pub fn set_config(&self, config: NetworkConfig) -> Result<()> {
        let config = config.sanitize()?;
        let server_count = config.servers.len();

        let mut guard = self.config.write();
        let revision = guard.0.wrapping_add(1);
        *guard = (revision, Arc::new(config));

        let mut stats = self.stats.lock();
        stats.clear();
        stats.resize_with(server_count, ServerStats::new);
        debug!(netid = self.netid, revision, servers = server_count, "network configured");
        Ok(())
    }

    /// Snapshot of (revision, config) for one resolution pass.
    pub fn snapshot(&self) -> (u32, Arc<NetworkConfig>) {
        let guard = self.config.read();
        (guard.0, guard.1.clone())
    }

    /// Records a sample against server `index`, provided the server
    /// list has not been swapped since the snapshot was taken.
    pub fn record_sample(&self, revision: u32, index: usize, sample: Sample) {
        let max_samples = {
            let guard = self.config.read();
            if guard.0 != revision {
                return;
            }
            usize::from(guard.1.params.max_samples)
        };
        let mut stats = self.stats.lock();
        if let Some(server_stats) = stats.get_mut(index) {
            server_stats.record(max_samples, sample);
        }
    }

    /// Usable-server mask for the current server list.
    pub fn usable_servers(&self) -> Vec<bool> {
        let params = self.config.read().1.params.clone();
        let mut stats = self.stats.lock();
        stats::usable_servers(&params, &mut stats)
    }

    /// Sticky EDNS flag for server `index`.
    pub fn edns_broken(&self, index: usize) -> bool {
        self.stats
            .lock()
            .get(index)
            .map(|s| s.edns_broken())
            .unwrap_or(false)
    }

    /// Marks server `index` as EDNS-intolerant.
    pub fn set_edns_broken(&self, index: usize) {
        if let Some(stats) = self.stats.lock().get_mut(index) {
            stats.set_edns_broken();
        }
    }

    /// Aggregated per-server statistics, for the info surface.
    pub fn stats_snapshot(&self) -> Vec<Aggregate> {
        self.stats.lock().iter().map(|s| s.aggregate()).collect()
    }

    /// The network's answer cache.
    pub fn cache(&self) -> &vireo_cache::ResolvCache {
        &self.cache
    }

    /// Current NAT64 prefix, if discovered.
    pub fn prefix(&self) -> Option<Nat64Prefix> {
        *self.prefix.lock()
    }

    /// Installs a discovered prefix.
    pub fn set_prefix(&self, prefix: Nat64Prefix) {
        debug!(netid = self.netid, %prefix, "NAT64 prefix installed");
        *self.prefix.lock() = Some(prefix);
    }

    /// Clears the prefix (discovery stopped).
    pub fn clear_prefix(&self) {
        *self.prefix.lock() = None;
    }

    /// Replaces the running discovery task, aborting its predecessor.
    pub fn set_discovery_task(&self, handle: Option<JoinHandle<()>>) {
        let mut guard = self.discovery.lock();
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = handle;
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if let Some(handle) = self.discovery.lock().take() {
            handle.abort();
        }
    }
}

/// Registry of configured networks, keyed by netid.
#[derive(Default)]
pub struct Registry {
    networks: RwLock<HashMap<u32, Arc<Network>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a network. Fails if the id is taken.
    pub fn create(&self, netid: u32) -> Result<()> {
        let mut networks = self.networks.write();
        if networks.contains_key(&netid) {
            return Err(ResolverError::AlreadyExists(netid));
        }
        networks.insert(netid, Arc::new(Network::new(netid)));
        debug!(netid, "network cache created");
        Ok(())
    }

    /// Removes a network, returning it so the caller can finish
    /// teardown (abort validations, flush caches).
    pub fn destroy(&self, netid: u32) -> Option<Arc<Network>> {
        let network = self.networks.write().remove(&netid);
        if let Some(network) = &network {
            network.set_discovery_task(None);
            network.clear_prefix();
            network.cache().flush();
            debug!(netid, "network cache destroyed");
        }
        network
    }

    /// Looks up a network.
    pub fn get(&self, netid: u32) -> Result<Arc<Network>> {
        self.networks
            .read()
            .get(&netid)
            .cloned()
            .ok_or(ResolverError::NoSuchNetwork(netid))
    }

    /// Returns true if the netid is registered.
    pub fn contains(&self, netid: u32) -> bool {
        self.networks.read().contains_key(&netid)
    }
}
