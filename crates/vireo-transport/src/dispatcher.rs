//! Process-wide session interning.
//!
//! All callers resolving through the same (network mark, server
//! identity) pair share one multiplexing session, and with it one TLS
//! connection. Sessions linger for a short grace period after their
//! last query so bursts reuse the connection, then get dropped.

use crate::identity::{DotServerConfig, ServerIdentity};
use crate::session::DotSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Default idle lifetime of an unused session.
const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(30);

/// Registry of live sessions keyed by (mark, server identity).
pub struct Dispatcher {
    sessions: Mutex<HashMap<(u32, ServerIdentity), Arc<DotSession>>>,
    idle_grace: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_GRACE)
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the given idle grace.
    pub fn new(idle_grace: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_grace,
        }
    }

    /// Returns the shared session for (mark, server), creating it on
    /// first use. Expired idle sessions are swept on the way in.
    pub fn session(&self, mark: u32, server: &DotServerConfig) -> Arc<DotSession> {
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.idle_grace);
        sessions
            .entry((mark, server.identity()))
            .or_insert_with(|| {
                trace!(mark, server = %server.identity(), "new transport session");
                DotSession::new(server.clone(), mark)
            })
            .clone()
    }

    /// Drops sessions idle past the grace period with nothing pending.
    pub fn prune(&self) {
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.idle_grace);
    }

    fn sweep(sessions: &mut HashMap<(u32, ServerIdentity), Arc<DotSession>>, grace: Duration) {
        sessions.retain(|key, session| {
            let keep =
                session.pending_queries() > 0 || session.last_used().elapsed() < grace;
            if !keep {
                trace!(mark = key.0, server = %key.1, "dropping idle session");
            }
            keep
        });
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns true if no sessions are interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(ip: &str, port: u16) -> DotServerConfig {
        DotServerConfig::opportunistic(ip.parse().unwrap()).with_port(port)
    }

    #[tokio::test]
    async fn same_pair_shares_a_session() {
        let dispatcher = Dispatcher::default();
        let a = dispatcher.session(30, &server("127.0.0.1", 853));
        // Port differences do not create a second session.
        let b = dispatcher.session(30, &server("127.0.0.1", 5353));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn mark_splits_sessions() {
        let dispatcher = Dispatcher::default();
        let a = dispatcher.session(30, &server("127.0.0.1", 853));
        let b = dispatcher.session(31, &server("127.0.0.1", 853));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(dispatcher.len(), 2);
    }

    #[tokio::test]
    async fn idle_sessions_pruned() {
        let dispatcher = Dispatcher::new(Duration::from_millis(10));
        let session = dispatcher.session(30, &server("127.0.0.1", 853));
        assert_eq!(dispatcher.len(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        dispatcher.prune();
        assert!(dispatcher.is_empty());
        // Callers holding the Arc keep their session alive regardless.
        assert_eq!(session.pending_queries(), 0);
    }
}
