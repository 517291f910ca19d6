//! Pending-query bookkeeping.
//!
//! Callers hand in a wire-format query carrying their own message id.
//! The map mints a fresh on-wire id, rewrites the first two octets,
//! and parks a oneshot future that resolves when the matching response
//! arrives (with the caller's id restored) or the retry budget runs
//! out.

use crate::QueryResult;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::trace;

/// Attempts per query before it fails with a network error.
pub const MAX_TRIES: u8 = 3;

struct Entry {
    original_id: u16,
    query: Bytes,
    tries: u8,
    completion: oneshot::Sender<QueryResult>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u16, Entry>,
    /// Released ids, reused most-recent-first so a caller that
    /// completes each query before issuing the next sees id 0 again.
    free: Vec<u16>,
    /// Next never-used id; ids above the 16-bit range mean the fresh
    /// supply is spent and only the free list remains.
    next_fresh: u32,
}

impl Inner {
    fn allocate_id(&mut self) -> Option<u16> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.next_fresh <= u32::from(u16::MAX) {
            let id = self.next_fresh as u16;
            self.next_fresh += 1;
            Some(id)
        } else {
            None
        }
    }

    fn release_id(&mut self, id: u16) {
        self.free.push(id);
    }
}

/// A recorded query: the on-wire frame to transmit and the future to
/// await.
pub struct RecordedQuery {
    /// Freshly minted on-wire id (already written into `query`).
    pub new_id: u16,
    /// Query bytes carrying `new_id`.
    pub query: Bytes,
    /// Resolves with the final outcome.
    pub completion: oneshot::Receiver<QueryResult>,
}

/// Thread-safe id allocator and response pairing table. Allocation
/// and release are O(1): released ids go onto a free list, fresh ids
/// come off a watermark.
#[derive(Default)]
pub struct QueryMap {
    inner: Mutex<Inner>,
}

impl QueryMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a query, minting an unused on-wire id.
    ///
    /// Returns `None` when all 65,536 ids are in flight.
    pub fn record(&self, query: &[u8]) -> Option<RecordedQuery> {
        if query.len() < 2 {
            return None;
        }
        let original_id = u16::from_be_bytes([query[0], query[1]]);

        let mut inner = self.inner.lock();
        let new_id = inner.allocate_id()?;

        let mut rewritten = BytesMut::from(query);
        rewritten[..2].copy_from_slice(&new_id.to_be_bytes());
        let rewritten = rewritten.freeze();

        let (tx, rx) = oneshot::channel();
        inner.entries.insert(
            new_id,
            Entry {
                original_id,
                query: rewritten.clone(),
                tries: 1,
                completion: tx,
            },
        );
        trace!(new_id, original_id, "recorded query");

        Some(RecordedQuery {
            new_id,
            query: rewritten,
            completion: rx,
        })
    }

    /// Pairs a response frame with its pending entry and resolves the
    /// caller's future with the original id restored. Unknown ids are
    /// dropped silently (late responses after a retry).
    pub fn on_response(&self, response: &[u8]) {
        if response.len() < 2 {
            return;
        }
        let wire_id = u16::from_be_bytes([response[0], response[1]]);
        let entry = {
            let mut inner = self.inner.lock();
            match inner.entries.remove(&wire_id) {
                Some(entry) => {
                    inner.release_id(wire_id);
                    entry
                }
                None => {
                    trace!(wire_id, "response for unknown id");
                    return;
                }
            }
        };

        let mut restored = BytesMut::from(response);
        restored[..2].copy_from_slice(&entry.original_id.to_be_bytes());
        let _ = entry.completion.send(QueryResult::Success(restored.freeze()));
    }

    /// Called when the transport drops: splits the pending entries
    /// into queries worth retrying (attempt counter bumped) and
    /// entries whose budget is spent, which are resolved with
    /// `NetworkError` on the way out.
    pub fn take_for_retry(&self) -> Vec<(u16, Bytes)> {
        let mut inner = self.inner.lock();
        let mut retry = Vec::new();
        let exhausted: Vec<u16> = inner
            .entries
            .iter_mut()
            .filter_map(|(&id, entry)| {
                if entry.tries < MAX_TRIES {
                    entry.tries += 1;
                    retry.push((id, entry.query.clone()));
                    None
                } else {
                    Some(id)
                }
            })
            .collect();

        for id in exhausted {
            if let Some(entry) = inner.entries.remove(&id) {
                trace!(id, tries = entry.tries, "retry budget spent");
                inner.release_id(id);
                let _ = entry.completion.send(QueryResult::NetworkError);
            }
        }
        retry
    }

    /// Resolves one entry with `NetworkError` (transport gone before
    /// the frame could be handed off).
    pub fn fail(&self, id: u16) {
        let entry = {
            let mut inner = self.inner.lock();
            let entry = inner.entries.remove(&id);
            if entry.is_some() {
                inner.release_id(id);
            }
            entry
        };
        if let Some(entry) = entry {
            let _ = entry.completion.send(QueryResult::NetworkError);
        }
    }

    /// Number of in-flight queries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_with_id(id: u16) -> Vec<u8> {
        let mut q = vec![0u8; 12];
        q[..2].copy_from_slice(&id.to_be_bytes());
        q
    }

    #[test]
    fn sequential_queries_reuse_id_zero() {
        let map = QueryMap::new();
        for caller_id in [7u16, 1000, 0xFFFF] {
            let recorded = map.record(&query_with_id(caller_id)).unwrap();
            assert_eq!(recorded.new_id, 0);

            map.on_response(&recorded.query.to_vec());
            assert!(map.is_empty());
        }
    }

    #[test]
    fn concurrent_queries_get_distinct_ids() {
        let map = QueryMap::new();
        let a = map.record(&query_with_id(1)).unwrap();
        let b = map.record(&query_with_id(2)).unwrap();
        assert_eq!(a.new_id, 0);
        assert_eq!(b.new_id, 1);
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn response_restores_original_id() {
        let map = QueryMap::new();
        let recorded = map.record(&query_with_id(0xABCD)).unwrap();
        assert_eq!(&recorded.query[..2], &[0, 0]);

        map.on_response(&recorded.query.to_vec());
        match recorded.completion.await.unwrap() {
            QueryResult::Success(bytes) => assert_eq!(&bytes[..2], &0xABCDu16.to_be_bytes()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_cap_fails_entry() {
        let map = QueryMap::new();
        let recorded = map.record(&query_with_id(5)).unwrap();

        // First recording is attempt 1; two more retries are allowed.
        assert_eq!(map.take_for_retry().len(), 1);
        assert_eq!(map.take_for_retry().len(), 1);
        assert!(map.take_for_retry().is_empty());
        assert!(map.is_empty());

        assert_eq!(
            recorded.completion.await.unwrap(),
            QueryResult::NetworkError
        );
    }

    #[test]
    fn unknown_response_ignored() {
        let map = QueryMap::new();
        let _recorded = map.record(&query_with_id(5)).unwrap();
        map.on_response(&query_with_id(999));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn runt_query_rejected() {
        let map = QueryMap::new();
        assert!(map.record(&[0x01]).is_none());
    }
}
