//! Login state store: one-time, TTL-bounded, capacity-bounded.
//!
//! The [`StateStore`] trait abstracts over storage backends. The in-process
//! implementation is [`InMemoryStateStore`]; a multi-instance deployment needs
//! a shared backend offering the same atomic consume-once semantics.
//!
//! # Design
//!
//! Entries live in a hash map keyed by the opaque `state` token, with a
//! sequence-ordered index beside it so eviction always removes the
//! oldest-*inserted* entry, independent of map iteration order. Both
//! structures sit behind one mutex: `consume` is a single remove-and-return
//! under that lock, so concurrent consumers of the same key see exactly one
//! winner. The lock is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Default lifetime of a login state (5 minutes).
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of outstanding login states.
pub const DEFAULT_STATE_CAPACITY: usize = 10_000;

/// Payload stored for one login transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Nonce the platform must echo inside the signed `id_token`.
    pub nonce: String,
    /// `login_hint` from the login initiation request.
    pub login_hint: String,
    /// When the entry was stored.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being valid.
    pub expires_at: DateTime<Utc>,
}

/// Trait abstracting the state storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request handlers.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Store a login transaction under `state`.
    ///
    /// Sweeps expired entries first, then evicts the oldest-inserted entry if
    /// the store is still full.
    async fn put(&self, state: &str, nonce: &str, login_hint: &str);

    /// Atomically remove and return the entry for `state`.
    ///
    /// Returns `None` if absent or expired; an expired entry is removed too.
    /// Never returns the same entry twice.
    async fn consume(&self, state: &str) -> Option<StateEntry>;

    /// Remove all expired entries. Called periodically by the background reaper.
    async fn reap_expired(&self) -> usize;

    /// Number of entries currently held (including not-yet-reaped expired ones).
    async fn len(&self) -> usize;
}

struct Slot {
    entry: StateEntry,
    deadline: Instant,
    seq: u64,
}

#[derive(Default)]
struct Table {
    slots: HashMap<String, Slot>,
    /// Insertion sequence -> state key.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Table {
    fn remove(&mut self, state: &str) -> Option<Slot> {
        let slot = self.slots.remove(state)?;
        self.order.remove(&slot.seq);
        Some(slot)
    }

    /// Drop expired entries from the front of the insertion order.
    ///
    /// Every entry gets the same TTL, so insertion order is expiry order and
    /// the walk stops at the first live entry.
    fn sweep(&mut self, now: Instant) -> usize {
        let mut swept = 0;
        while let Some((_, key)) = self.order.first_key_value() {
            if self.slots.get(key).is_some_and(|slot| slot.deadline > now) {
                break;
            }
            if let Some((_, key)) = self.order.pop_first()
                && self.slots.remove(&key).is_some()
            {
                swept += 1;
            }
        }
        swept
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.slots.remove(&key);
        Some(key)
    }
}

/// In-memory state store.
pub struct InMemoryStateStore {
    table: Mutex<Table>,
    ttl: Duration,
    capacity: usize,
}

impl InMemoryStateStore {
    /// Create a store with the default TTL and capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_STATE_TTL, DEFAULT_STATE_CAPACITY)
    }

    /// Create a store with an explicit TTL and capacity (minimum 1).
    #[must_use]
    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Configured entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Configured maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, state: &str, nonce: &str, login_hint: &str) {
        let now = Instant::now();
        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));

        let mut table = self.table.lock();
        table.sweep(now);

        // Re-putting a key replaces it and moves it to the back of the queue.
        table.remove(state);

        if table.slots.len() >= self.capacity {
            if let Some(evicted) = table.evict_oldest() {
                debug!(state = %evicted, "Evicted oldest login state (store full)");
            }
        }

        let seq = table.next_seq;
        table.next_seq += 1;
        table.order.insert(seq, state.to_string());
        table.slots.insert(
            state.to_string(),
            Slot {
                entry: StateEntry {
                    nonce: nonce.to_string(),
                    login_hint: login_hint.to_string(),
                    created_at,
                    expires_at,
                },
                deadline: now + self.ttl,
                seq,
            },
        );
    }

    async fn consume(&self, state: &str) -> Option<StateEntry> {
        let slot = self.table.lock().remove(state)?;

        if slot.deadline <= Instant::now() {
            debug!(state = %state, "Discarded expired login state");
            return None;
        }

        Some(slot.entry)
    }

    async fn reap_expired(&self) -> usize {
        self.table.lock().sweep(Instant::now())
    }

    async fn len(&self) -> usize {
        self.table.lock().slots.len()
    }
}

/// Spawn a background task that reaps expired states every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    store: Arc<dyn StateStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = store.reap_expired().await;
                    if reaped > 0 {
                        debug!(count = reaped, "Reaped expired login states");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("State reaper shutting down");
                    break;
                }
            }
        }
    })
}
