//! # Vireo encrypted transport
//!
//! Client-side DNS-over-TLS plumbing for the stub resolver:
//!
//! - [`socket`]: one TLS connection with length-prefixed framing and a
//!   prompt-cancellation handshake.
//! - [`query_map`]: pairs caller message ids with freshly minted
//!   on-wire ids and hands out completion futures.
//! - [`session`]: multiplexes many in-flight queries over one socket,
//!   reconnecting and retrying on transport failure.
//! - [`dispatcher`]: interns one session per (network mark, server
//!   identity) so concurrent callers share a connection.

pub mod dispatcher;
pub mod identity;
pub mod query_map;
pub mod session;
pub mod socket;
pub mod tls;

pub use dispatcher::Dispatcher;
pub use identity::{DotServerConfig, ServerIdentity, PROTOCOL_DOT};
pub use query_map::{QueryMap, RecordedQuery, MAX_TRIES};
pub use session::DotSession;
pub use socket::{DotSocket, SocketEvent, SocketState};

use bytes::Bytes;
use thiserror::Error;

/// Transport-level failure.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TLS configuration could not be built.
    #[error("tls configuration: {0}")]
    TlsConfig(String),

    /// The TLS handshake failed or was cancelled.
    #[error("handshake with {server}: {reason}")]
    Handshake {
        /// Server address.
        server: String,
        /// Failure detail.
        reason: String,
    },

    /// Socket-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Final outcome of one multiplexed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// A response arrived; bytes carry the caller's original id.
    Success(Bytes),
    /// The transport failed and the retry budget is spent.
    NetworkError,
    /// A resource limit was hit (id space exhausted); not retried.
    InternalError,
}
