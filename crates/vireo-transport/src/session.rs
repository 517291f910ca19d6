//! The transport multiplexer.
//!
//! One session owns at most one live socket to its server and carries
//! any number of concurrent queries over it. A driver task opens the
//! socket on first demand, feeds it frames, routes responses back
//! through the query map, and on connection loss re-opens the socket
//! and resends whatever still has retry budget.

use crate::identity::DotServerConfig;
use crate::query_map::QueryMap;
use crate::socket::{DotSocket, SocketEvent};
use crate::QueryResult;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A shared, multiplexing handle to one (mark, server) connection.
pub struct DotSession {
    map: Arc<QueryMap>,
    cmd_tx: mpsc::UnboundedSender<Bytes>,
    connect_count: Arc<AtomicU64>,
    last_used: Mutex<Instant>,
}

impl DotSession {
    /// Creates the session; no connection is opened until the first
    /// query arrives.
    pub fn new(config: DotServerConfig, mark: u32) -> Arc<Self> {
        let map = Arc::new(QueryMap::new());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let connect_count = Arc::new(AtomicU64::new(0));

        tokio::spawn(drive(
            config,
            mark,
            map.clone(),
            cmd_rx,
            connect_count.clone(),
        ));

        Arc::new(Self {
            map,
            cmd_tx,
            connect_count,
            last_used: Mutex::new(Instant::now()),
        })
    }

    /// Sends one query (bytes carry the caller's id) and resolves with
    /// the final outcome. Fails fast with `InternalError` when the id
    /// space is exhausted.
    pub async fn query(&self, query: Bytes) -> QueryResult {
        *self.last_used.lock() = Instant::now();

        let recorded = match self.map.record(&query) {
            Some(recorded) => recorded,
            None => {
                debug!("query map exhausted");
                return QueryResult::InternalError;
            }
        };

        if self.cmd_tx.send(recorded.query.clone()).is_err() {
            self.map.fail(recorded.new_id);
            return QueryResult::NetworkError;
        }

        recorded
            .completion
            .await
            .unwrap_or(QueryResult::NetworkError)
    }

    /// Number of connections opened over this session's lifetime.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Queries currently awaiting a response.
    pub fn pending_queries(&self) -> usize {
        self.map.len()
    }

    /// Instant of the most recent query submission.
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }
}

async fn drive(
    config: DotServerConfig,
    mark: u32,
    map: Arc<QueryMap>,
    mut cmd_rx: mpsc::UnboundedReceiver<Bytes>,
    connect_count: Arc<AtomicU64>,
) {
    'idle: loop {
        // No socket. Wait for demand; exit when the session is gone.
        let first = match cmd_rx.recv().await {
            Some(frame) => frame,
            None => return,
        };
        let mut resend = vec![first];

        'connection: loop {
            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            let socket = DotSocket::connect(config.clone(), mark, events_tx);
            connect_count.fetch_add(1, Ordering::Relaxed);
            trace!(server = %config.addr, "session opening socket");

            for frame in resend.drain(..) {
                socket.query(frame);
            }

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        None => return,
                        Some(frame) => {
                            socket.query(frame);
                        }
                    },
                    event = events_rx.recv() => match event {
                        Some(SocketEvent::Response(bytes)) => map.on_response(&bytes),
                        Some(SocketEvent::Closed) | None => {
                            let retries = map.take_for_retry();
                            if retries.is_empty() {
                                trace!(server = %config.addr, "socket closed, session idle");
                                continue 'idle;
                            }
                            debug!(
                                server = %config.addr,
                                queries = retries.len(),
                                "socket closed, retrying pending queries"
                            );
                            resend = retries.into_iter().map(|(_, frame)| frame).collect();
                            continue 'connection;
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    fn query_bytes(id: u16) -> Bytes {
        let mut q = vec![0u8; 12];
        q[..2].copy_from_slice(&id.to_be_bytes());
        Bytes::from(q)
    }

    #[tokio::test]
    async fn unreachable_server_fails_after_retries() {
        install_crypto_provider();
        // Bind and drop to get a port where nothing listens.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DotServerConfig::opportunistic("127.0.0.1".parse().unwrap())
            .with_port(port);
        let session = DotSession::new(config, 0);

        let result = session.query(query_bytes(0x1234)).await;
        assert_eq!(result, QueryResult::NetworkError);
        // One connect per attempt, capped by the retry budget.
        assert_eq!(session.connect_count(), u64::from(crate::MAX_TRIES));
        assert_eq!(session.pending_queries(), 0);
    }
}
