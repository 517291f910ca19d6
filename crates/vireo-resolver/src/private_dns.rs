//! Private DNS configuration and validation.
//!
//! Each network carries a private-DNS mode and a set of encrypted
//! servers. Newly configured servers are probed over the encrypted
//! transport by one validation worker each; the observer sees exactly
//! one `InProcess` and exactly one terminal state per validation
//! episode. Servers that are de-configured while their worker is still
//! running keep their entry until the worker finishes; the terminal
//! report for such a server is always `Fail`, after which the entry is
//! dropped.

use crate::{Result, ResolverError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};
use vireo_proto::{Message, Name, Question, RecordType, ResponseCode};
use vireo_transport::{DotServerConfig, DotSession, QueryResult, ServerIdentity};

/// Name queried by the validation probe.
const PROBE_HOSTNAME: &str = "dns-tls-probe.vireo.invalid";

/// Deadline for one validation probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Private DNS operating mode for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateDnsMode {
    /// No encrypted transport.
    Off,
    /// Use encrypted transport to servers that validate, cleartext
    /// otherwise.
    Opportunistic,
    /// Encrypted transport with hostname verification only; no
    /// cleartext fallback.
    Strict,
}

/// Validation lifecycle of one (network, server) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// A worker is probing the server.
    InProcess,
    /// The probe succeeded.
    Success,
    /// The probe failed, or the server was abandoned mid-probe.
    Fail,
}

/// Receives validation state transitions.
///
/// Calls for one server never overlap; calls for different servers may
/// interleave. The observer must not call back into
/// [`PrivateDnsConfiguration`] from the callback.
pub trait ValidationObserver: Send + Sync {
    /// Exactly one call per state transition.
    fn on_validation_state_update(&self, server: IpAddr, state: ValidationState, netid: u32);
}

/// Read-only view of one network's private DNS state.
#[derive(Debug, Clone)]
pub struct PrivateDnsStatus {
    /// Current mode.
    pub mode: PrivateDnsMode,
    /// Validation state per currently configured server.
    pub servers: Vec<(ServerIdentity, ValidationState)>,
}

impl PrivateDnsStatus {
    fn off() -> Self {
        Self {
            mode: PrivateDnsMode::Off,
            servers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct NetworkState {
    mode: PrivateDnsMode,
    configured: Vec<ServerIdentity>,
    states: HashMap<ServerIdentity, ValidationState>,
    configs: HashMap<ServerIdentity, DotServerConfig>,
}

impl Default for PrivateDnsMode {
    fn default() -> Self {
        Self::Off
    }
}

/// Process-wide private DNS state, keyed by netid.
pub struct PrivateDnsConfiguration {
    inner: Mutex<HashMap<u32, NetworkState>>,
    observer: Mutex<Option<Arc<dyn ValidationObserver>>>,
    probe_timeout: Duration,
}

impl Default for PrivateDnsConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl PrivateDnsConfiguration {
    /// Creates the configuration store.
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            observer: Mutex::new(None),
            probe_timeout,
        }
    }

    /// Installs the observer. Transitions that happen before an
    /// observer is installed are not replayed.
    pub fn set_observer(&self, observer: Arc<dyn ValidationObserver>) {
        *self.observer.lock() = Some(observer);
    }

    /// Applies a private DNS configuration to `netid`.
    ///
    /// An empty server list turns the mode `Off` and clears the
    /// configured set. A non-empty `hostname` selects `Strict`.
    /// Servers already validating or validated are left alone; new
    /// (and previously failed) servers each get a fresh validation
    /// worker.
    pub fn set(
        self: &Arc<Self>,
        netid: u32,
        mark: u32,
        tls_servers: &[SocketAddr],
        hostname: Option<&str>,
        ca_pem: Option<&str>,
    ) -> Result<()> {
        let hostname = hostname.filter(|h| !h.is_empty());
        let mode = if tls_servers.is_empty() {
            PrivateDnsMode::Off
        } else if hostname.is_some() {
            PrivateDnsMode::Strict
        } else {
            PrivateDnsMode::Opportunistic
        };

        let mut configs: Vec<DotServerConfig> = Vec::with_capacity(tls_servers.len());
        for addr in tls_servers {
            let mut config = match hostname {
                Some(name) => DotServerConfig::strict(addr.ip(), name),
                None => DotServerConfig::opportunistic(addr.ip()),
            }
            .with_port(addr.port());
            if let Some(pem) = ca_pem {
                config = config.with_ca_pem(pem);
            }
            configs.push(config);
        }

        let mut inner = self.inner.lock();
        let state = inner.entry(netid).or_default();
        state.mode = mode;
        state.configured = configs.iter().map(|c| c.identity()).collect();
        state.configs = configs
            .iter()
            .map(|c| (c.identity(), c.clone()))
            .collect();

        // Keep entries for configured servers and for still-running
        // workers; everything else is stale bookkeeping.
        let configured = state.configured.clone();
        state
            .states
            .retain(|id, st| configured.contains(id) || *st == ValidationState::InProcess);

        for config in configs {
            let identity = config.identity();
            match state.states.get(&identity) {
                Some(ValidationState::InProcess) | Some(ValidationState::Success) => {
                    trace!(netid, server = %identity, "validation already underway or done");
                }
                _ => {
                    state.states.insert(identity.clone(), ValidationState::InProcess);
                    self.notify(identity.addr, ValidationState::InProcess, netid);
                    self.spawn_worker(netid, mark, config);
                }
            }
        }

        if state.mode == PrivateDnsMode::Off && state.states.is_empty() {
            inner.remove(&netid);
        }
        Ok(())
    }

    /// Network destroyed: every configured server becomes
    /// no-longer-present. Running workers still report a terminal
    /// `Fail` before their entries disappear.
    pub fn clear(&self, netid: u32) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.get_mut(&netid) {
            state.mode = PrivateDnsMode::Off;
            state.configured.clear();
            state.configs.clear();
            state
                .states
                .retain(|_, st| *st == ValidationState::InProcess);
            if state.states.is_empty() {
                inner.remove(&netid);
            }
            debug!(netid, "private DNS cleared");
        }
    }

    /// Current mode and per-server validation states for `netid`.
    pub fn status(&self, netid: u32) -> PrivateDnsStatus {
        let inner = self.inner.lock();
        match inner.get(&netid) {
            None => PrivateDnsStatus::off(),
            Some(state) => PrivateDnsStatus {
                mode: state.mode,
                servers: state
                    .configured
                    .iter()
                    .filter_map(|id| {
                        state.states.get(id).map(|st| (id.clone(), *st))
                    })
                    .collect(),
            },
        }
    }

    /// Transport configurations for the validated servers of `netid`,
    /// in configured order. Empty unless the mode demands encryption.
    pub fn validated_servers(&self, netid: u32) -> (PrivateDnsMode, Vec<DotServerConfig>) {
        let inner = self.inner.lock();
        match inner.get(&netid) {
            None => (PrivateDnsMode::Off, Vec::new()),
            Some(state) => {
                let servers = state
                    .configured
                    .iter()
                    .filter(|id| {
                        state.states.get(*id) == Some(&ValidationState::Success)
                    })
                    .filter_map(|id| state.configs.get(id).cloned())
                    .collect();
                (state.mode, servers)
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, netid: u32, mark: u32, config: DotServerConfig) {
        let this = self.clone();
        let probe_timeout = self.probe_timeout;
        tokio::spawn(async move {
            let identity = config.identity();
            debug!(netid, server = %identity, "validation started");
            let ok = probe(config, mark, probe_timeout).await;
            this.finish_validation(netid, identity, ok);
        });
    }

    fn finish_validation(&self, netid: u32, identity: ServerIdentity, ok: bool) {
        let mut inner = self.inner.lock();

        let (still_wanted, present) = match inner.get(&netid) {
            Some(state) => (
                state.mode != PrivateDnsMode::Off && state.configured.contains(&identity),
                true,
            ),
            None => (false, false),
        };

        // A server that is no longer part of the configuration reports
        // fail regardless of what the probe saw; the result would be
        // unusable anyway.
        let result = if still_wanted && ok {
            ValidationState::Success
        } else {
            ValidationState::Fail
        };
        debug!(netid, server = %identity, ?result, "validation finished");
        self.notify(identity.addr, result, netid);

        if present {
            if let Some(state) = inner.get_mut(&netid) {
                if still_wanted {
                    state.states.insert(identity, result);
                } else {
                    state.states.remove(&identity);
                }
                if state.mode == PrivateDnsMode::Off && state.states.is_empty() {
                    inner.remove(&netid);
                }
            }
        }
    }

    fn notify(&self, server: IpAddr, state: ValidationState, netid: u32) {
        if let Some(observer) = self.observer.lock().clone() {
            observer.on_validation_state_update(server, state, netid);
        }
    }
}

/// Parses address literals for the configuration surface; one bad
/// literal rejects the whole call.
pub fn parse_server_literals(literals: &[String], port: u16) -> Result<Vec<SocketAddr>> {
    literals
        .iter()
        .map(|literal| {
            IpAddr::from_str(literal)
                .map(|ip| SocketAddr::new(ip, port))
                .map_err(|_| {
                    ResolverError::InvalidArgument(format!("bad address literal {literal:?}"))
                })
        })
        .collect()
}

/// Sends the probe query over a fresh session and judges the answer.
async fn probe(config: DotServerConfig, mark: u32, deadline: Duration) -> bool {
    let Ok(name) = Name::from_str(PROBE_HOSTNAME) else {
        return false;
    };
    let query = Message::query(rand::random(), Question::new(name, RecordType::A));

    let session = DotSession::new(config, mark);
    match timeout(deadline, session.query(query.to_wire())).await {
        Ok(QueryResult::Success(bytes)) => match Message::parse(&bytes) {
            Ok(message) => message.rcode() == ResponseCode::NoError,
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[test]
    fn literal_parsing_rejects_whole_call() {
        let good = vec!["127.0.2.2".to_string(), "::1".to_string()];
        assert_eq!(parse_server_literals(&good, 853).unwrap().len(), 2);

        let bad = vec!["127.0.2.2".to_string(), "invalid_addr".to_string()];
        assert!(matches!(
            parse_server_literals(&bad, 853),
            Err(ResolverError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn mode_derivation() {
        install_crypto_provider();
        let pdc = Arc::new(PrivateDnsConfiguration::default());
        let servers = vec!["127.0.2.2:853".parse().unwrap()];

        pdc.set(30, 30, &servers, None, None).unwrap();
        assert_eq!(pdc.status(30).mode, PrivateDnsMode::Opportunistic);

        pdc.set(30, 30, &servers, Some("dns.example.com"), None)
            .unwrap();
        assert_eq!(pdc.status(30).mode, PrivateDnsMode::Strict);

        pdc.set(30, 30, &[], None, None).unwrap();
        assert_eq!(pdc.status(30).mode, PrivateDnsMode::Off);
    }

    #[tokio::test]
    async fn empty_hostname_is_opportunistic() {
        install_crypto_provider();
        let pdc = Arc::new(PrivateDnsConfiguration::default());
        let servers = vec!["127.0.2.2:853".parse().unwrap()];
        pdc.set(30, 30, &servers, Some(""), None).unwrap();
        assert_eq!(pdc.status(30).mode, PrivateDnsMode::Opportunistic);
    }

    #[tokio::test]
    async fn unconfigured_network_reads_off() {
        let pdc = PrivateDnsConfiguration::default();
        let status = pdc.status(99);
        assert_eq!(status.mode, PrivateDnsMode::Off);
        assert!(status.servers.is_empty());
    }
}
