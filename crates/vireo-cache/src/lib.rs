//! # Vireo answer cache
//!
//! One cache instance per network. Entries are raw answer bytes keyed
//! by the question; concurrent misses for the same key coalesce onto a
//! single upstream query (single-flight): the first caller becomes the
//! builder, later callers wait until the builder inserts or gives up.
//!
//! Size is bounded per network. Eviction removes expired entries
//! first, then the least recently used live entry.

pub mod key;

pub use key::CacheKey;

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::trace;

/// Cache tunables.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries per network.
    pub max_entries: usize,

    /// Ceiling applied to answer TTLs.
    pub max_ttl: Duration,

    /// How long a waiter blocks on a pending entry before giving up
    /// and querying upstream itself.
    pub pending_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_ttl: Duration::from_secs(600),
            pending_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct Entry {
    answer: Bytes,
    expires_at: Instant,
    last_used: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default, Debug)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    pending: HashMap<CacheKey, Arc<Notify>>,
}

/// The answer cache for one network.
#[derive(Debug)]
pub struct ResolvCache {
    config: CacheConfig,
    inner: Arc<Mutex<Inner>>,
    pending_timeouts: AtomicU32,
}

/// Outcome of a cache probe.
pub enum Lookup {
    /// A fresh answer was found.
    Hit(Bytes),
    /// The caller is now responsible for resolving this key.
    /// Dropping or completing the guard wakes any waiters.
    Build(BuildGuard),
}

impl ResolvCache {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            pending_timeouts: AtomicU32::new(0),
        }
    }

    /// Probes the cache, waiting on an in-flight builder if one
    /// exists for this key.
    pub async fn lookup(&self, key: &CacheKey) -> Lookup {
        loop {
            let notify = {
                let mut inner = self.inner.lock();
                let now = Instant::now();
                if let Some(entry) = inner.entries.get_mut(key) {
                    if entry.is_expired(now) {
                        inner.entries.remove(key);
                    } else {
                        entry.last_used = now;
                        trace!(%key, "cache hit");
                        return Lookup::Hit(entry.answer.clone());
                    }
                }
                match inner.pending.get(key) {
                    Some(notify) => notify.clone(),
                    None => {
                        inner.pending.insert(key.clone(), Arc::new(Notify::new()));
                        return Lookup::Build(BuildGuard {
                            cache: self.inner.clone(),
                            config: self.config.clone(),
                            key: key.clone(),
                            attached: true,
                        });
                    }
                }
            };

            // Register interest before re-checking, so an insert that
            // lands between the check and the await is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.fresh_entry(key).is_some() || !self.is_pending(key) {
                continue;
            }

            if tokio::time::timeout(self.config.pending_timeout, notified)
                .await
                .is_err()
            {
                // The builder is stuck. Proceed upstream without
                // registering; the original pending entry stays until
                // its builder resolves.
                self.pending_timeouts.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "gave up waiting on pending entry");
                return Lookup::Build(BuildGuard {
                    cache: self.inner.clone(),
                    config: self.config.clone(),
                    key: key.clone(),
                    attached: false,
                });
            }
        }
    }

    /// Probes without coalescing: always returns a detached builder.
    /// Used for `NO_CACHE_LOOKUP` queries.
    pub fn bypass(&self, key: &CacheKey) -> BuildGuard {
        BuildGuard {
            cache: self.inner.clone(),
            config: self.config.clone(),
            key: key.clone(),
            attached: false,
        }
    }

    fn fresh_entry(&self, key: &CacheKey) -> Option<Bytes> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            None
        } else {
            Some(entry.answer.clone())
        }
    }

    fn is_pending(&self, key: &CacheKey) -> bool {
        self.inner.lock().pending.contains_key(key)
    }

    /// Number of waiters that gave up on a pending entry.
    pub fn pending_timeout_count(&self) -> u32 {
        self.pending_timeouts.load(Ordering::Relaxed)
    }

    /// Number of live entries (expired entries may still be counted
    /// until the next insert or lookup touches them).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all entries and wakes all waiters.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        for notify in inner.pending.values() {
            notify.notify_waiters();
        }
        inner.pending.clear();
    }
}

/// Permission to resolve one cache key upstream.
///
/// Attached guards (from a miss) own the pending slot: completing or
/// dropping them wakes waiters. Detached guards (bypass or pending
/// timeout) can still store, but do not touch the pending slot.
pub struct BuildGuard {
    cache: Arc<Mutex<Inner>>,
    config: CacheConfig,
    key: CacheKey,
    attached: bool,
}

impl BuildGuard {
    /// Stores the answer with the given TTL (capped at the configured
    /// ceiling) and, for attached guards, wakes waiters.
    pub fn insert(mut self, answer: Bytes, ttl: Duration) {
        let mut inner = self.cache.lock();
        let now = Instant::now();
        let ttl = ttl.min(self.config.max_ttl);

        if !ttl.is_zero() {
            if inner.entries.len() >= self.config.max_entries
                && !inner.entries.contains_key(&self.key)
            {
                evict_one(&mut inner, now);
            }
            inner.entries.insert(
                self.key.clone(),
                Entry {
                    answer,
                    expires_at: now + ttl,
                    last_used: now,
                },
            );
        }

        if self.attached {
            self.attached = false;
            if let Some(notify) = inner.pending.remove(&self.key) {
                notify.notify_waiters();
            }
        }
    }

    /// Abandons the build without storing (used for `NO_CACHE_STORE`
    /// and failed resolutions); waiters are woken and will re-probe.
    pub fn abandon(self) {
        // Drop impl does the work.
    }
}

fn evict_one(inner: &mut Inner, now: Instant) {
    // Expired entries go first; otherwise the least recently used.
    let victim = inner
        .entries
        .iter()
        .min_by_key(|(_, e)| (!e.is_expired(now), e.last_used))
        .map(|(k, _)| k.clone());
    if let Some(key) = victim {
        trace!(key = %key, "evicting cache entry");
        inner.entries.remove(&key);
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if self.attached {
            let mut inner = self.cache.lock();
            if let Some(notify) = inner.pending.remove(&self.key) {
                notify.notify_waiters();
            }
        }
    }
}
