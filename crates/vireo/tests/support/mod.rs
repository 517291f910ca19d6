//! Test doubles for the upstream side: a scriptable DNS responder and
//! a TLS frontend that terminates DNS-over-TLS and forwards to a
//! responder.

#![allow(dead_code)]

use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use vireo_proto::{Message, Name, ResourceRecord, ResponseCode};

/// Canned answer for one (name, qtype) pair.
#[derive(Debug, Clone)]
enum Canned {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ptr(String),
}

#[derive(Default)]
struct ResponderState {
    mappings: Mutex<HashMap<(String, u16), Canned>>,
    queries: Mutex<Vec<(String, u16)>>,
    drop_all: AtomicBool,
    deferred: AtomicBool,
    release: Notify,
}

/// A fake upstream DNS server on UDP. Unmapped names get an empty
/// NOERROR answer; mapped names get their canned record. Responses
/// can be dropped wholesale or deferred until released.
pub struct DnsResponder {
    addr: SocketAddr,
    state: Arc<ResponderState>,
    task: JoinHandle<()>,
}

impl DnsResponder {
    /// Binds a responder on an ephemeral loopback port.
    pub async fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind responder");
        let addr = socket.local_addr().expect("local addr");
        let state = Arc::new(ResponderState::default());

        let run_state = state.clone();
        let task = tokio::spawn(async move {
            let socket = Arc::new(socket);
            let mut buf = vec![0u8; 4096];
            loop {
                let (len, peer) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(_) => return,
                };
                let packet = buf[..len].to_vec();
                let socket = socket.clone();
                let state = run_state.clone();
                tokio::spawn(async move {
                    if let Some(response) = answer(&state, &packet).await {
                        let _ = socket.send_to(&response, peer).await;
                    }
                });
            }
        });

        Self { addr, state, task }
    }

    /// The responder's address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address as an `ip:port` literal for configuration requests.
    pub fn literal(&self) -> String {
        self.addr.to_string()
    }

    /// Maps an A record.
    pub fn add_a(&self, name: &str, addr: Ipv4Addr) {
        self.state
            .mappings
            .lock()
            .insert((name.to_ascii_lowercase(), 1), Canned::A(addr));
    }

    /// Maps an AAAA record.
    pub fn add_aaaa(&self, name: &str, addr: Ipv6Addr) {
        self.state
            .mappings
            .lock()
            .insert((name.to_ascii_lowercase(), 28), Canned::Aaaa(addr));
    }

    /// Maps a PTR record (the name is the full reverse name).
    pub fn add_ptr(&self, reverse_name: &str, target: &str) {
        self.state
            .mappings
            .lock()
            .insert(
                (reverse_name.to_ascii_lowercase(), 12),
                Canned::Ptr(target.to_string()),
            );
    }

    /// Drops every packet (simulates a dead upstream).
    pub fn set_drop_all(&self, drop_all: bool) {
        self.state.drop_all.store(drop_all, Ordering::SeqCst);
    }

    /// Holds responses until deferral is switched off again.
    pub fn set_deferred(&self, deferred: bool) {
        self.state.deferred.store(deferred, Ordering::SeqCst);
        if !deferred {
            self.state.release.notify_waiters();
        }
    }

    /// Total queries received (including dropped ones).
    pub fn query_count(&self) -> usize {
        self.state.queries.lock().len()
    }

    /// Queries received for one name (any type).
    pub fn query_count_for(&self, name: &str) -> usize {
        let name = name.to_ascii_lowercase();
        self.state
            .queries
            .lock()
            .iter()
            .filter(|(qname, _)| *qname == name)
            .count()
    }

    /// Queries received for one (name, qtype).
    pub fn query_count_for_type(&self, name: &str, qtype: u16) -> usize {
        let name = name.to_ascii_lowercase();
        self.state
            .queries
            .lock()
            .iter()
            .filter(|(qname, qt)| *qname == name && *qt == qtype)
            .count()
    }

    /// Forgets the query log.
    pub fn clear_queries(&self) {
        self.state.queries.lock().clear();
    }
}

impl Drop for DnsResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer(state: &ResponderState, packet: &[u8]) -> Option<Vec<u8>> {
    let query = Message::parse(packet).ok()?;
    let question = query.question()?.clone();
    let name = question.qname.to_lowercase_string();

    state.queries.lock().push((name.clone(), question.qtype));

    if state.drop_all.load(Ordering::SeqCst) {
        return None;
    }

    if state.deferred.load(Ordering::SeqCst) {
        let notified = state.release.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if state.deferred.load(Ordering::SeqCst) {
            notified.await;
        }
    }

    let mut response = Message::response_from(&query);
    let canned = state.mappings.lock().get(&(name, question.qtype)).cloned();
    match canned {
        Some(Canned::A(addr)) => {
            response.add_answer(ResourceRecord::a(question.qname.clone(), 120, addr));
        }
        Some(Canned::Aaaa(addr)) => {
            response.add_answer(ResourceRecord::aaaa(question.qname.clone(), 120, addr));
        }
        Some(Canned::Ptr(target)) => {
            let target = Name::from_str(&target).ok()?;
            response.add_answer(ResourceRecord::ptr(question.qname.clone(), 120, target));
        }
        None => {
            response.set_rcode(ResponseCode::NoError);
        }
    }
    Some(response.to_wire().to_vec())
}

/// A DNS-over-TLS terminator in front of a [`DnsResponder`].
///
/// Serves a certificate for `hostname` signed by a private CA; the CA
/// bundle is exposed for strict-mode configuration. Counts accepted
/// connections and forwarded queries.
pub struct TlsFrontend {
    addr: SocketAddr,
    ca_pem: String,
    accepted: Arc<AtomicUsize>,
    forwarded: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TlsFrontend {
    /// Starts a frontend forwarding to `backend`.
    pub async fn start(backend: SocketAddr, hostname: &str) -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (server_config, ca_pem) = tls_server_config(hostname);
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind frontend");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let forwarded = Arc::new(AtomicUsize::new(0));

        let accepted_in_task = accepted.clone();
        let forwarded_in_task = forwarded.clone();
        let task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let acceptor = acceptor.clone();
                let accepted = accepted_in_task.clone();
                let forwarded = forwarded_in_task.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    loop {
                        let mut len_buf = [0u8; 2];
                        if tls.read_exact(&mut len_buf).await.is_err() {
                            return;
                        }
                        let len = usize::from(u16::from_be_bytes(len_buf));
                        let mut frame = vec![0u8; len];
                        if tls.read_exact(&mut frame).await.is_err() {
                            return;
                        }
                        forwarded.fetch_add(1, Ordering::SeqCst);

                        let Some(reply) = forward_udp(backend, &frame).await else {
                            continue;
                        };
                        let mut out = BytesMut::with_capacity(reply.len() + 2);
                        out.extend_from_slice(&(reply.len() as u16).to_be_bytes());
                        out.extend_from_slice(&reply);
                        if tls.write_all(&out).await.is_err() {
                            return;
                        }
                        let _ = tls.flush().await;
                    }
                });
            }
        });

        Self {
            addr,
            ca_pem,
            accepted,
            forwarded,
            task,
        }
    }

    /// The frontend's address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address as an `ip:port` literal.
    pub fn literal(&self) -> String {
        self.addr.to_string()
    }

    /// PEM bundle of the private CA for strict-mode trust.
    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// TLS connections accepted so far.
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Queries forwarded to the backend so far.
    pub fn forwarded_queries(&self) -> usize {
        self.forwarded.load(Ordering::SeqCst)
    }
}

impl Drop for TlsFrontend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward_udp(backend: SocketAddr, frame: &[u8]) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.ok()?;
    socket.connect(backend).await.ok()?;
    socket.send(frame).await.ok()?;

    let mut buf = vec![0u8; 4096];
    // Generous deadline: the backend may be deliberately deferred.
    let len = tokio::time::timeout(Duration::from_secs(30), socket.recv(&mut buf))
        .await
        .ok()?
        .ok()?;
    buf.truncate(len);
    Some(buf)
}

fn tls_server_config(hostname: &str) -> (rustls::ServerConfig, String) {
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    let mut ca_params = CertificateParams::new(Vec::new()).expect("ca params");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_key = KeyPair::generate().expect("ca key");
    let ca_cert = ca_params.self_signed(&ca_key).expect("ca cert");

    let ee_params = CertificateParams::new(vec![
        hostname.to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("ee params");
    let ee_key = KeyPair::generate().expect("ee key");
    let ee_cert = ee_params
        .signed_by(&ee_key, &ca_cert, &ca_key)
        .expect("ee cert");

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![ee_cert.der().clone()],
            rustls::pki_types::PrivateKeyDer::Pkcs8(ee_key.serialize_der().into()),
        )
        .expect("server config");

    (config, ca_cert.pem())
}

/// Polls `condition` every 20 ms until it holds or `deadline` passes.
pub async fn poll_for<F: Fn() -> bool>(condition: F, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
