//! # Unconfirmed Pool
//!
//! In-memory staging area for transactions that passed verification and
//! were applied to the unconfirmed (`u_`) ledger fields, but are not yet
//! in a committed block. The pool has no persistence; a restart starts
//! empty.
//!
//! ## Design
//!
//! - `DashMap` by id serves the hot path (duplicate detection, lookups).
//! - `parking_lot::RwLock<BTreeMap>` keyed by an admission sequence number
//!   keeps insertion order for listing and for draining on reorg.
//!
//! Admission policy (apply first, then register, roll back on failure)
//! lives in the engine; this type is only the index.
//!
//! Also here: [`BalanceCache`], the pending native balance per address,
//! and [`AddressLocks`], the per-address serialization point for balance
//! merges.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use num_bigint::BigInt;
use parking_lot::{Mutex, RwLock};

use super::types::Transaction;

// ---------------------------------------------------------------------------
// UnconfirmedPool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PoolEntry {
    transaction: Transaction,
    seq: u64,
}

/// Pending transactions indexed by id, iterable in admission order.
#[derive(Default)]
pub struct UnconfirmedPool {
    entries: DashMap<String, PoolEntry>,
    order: RwLock<BTreeMap<u64, String>>,
    next_seq: AtomicU64,
}

impl fmt::Debug for UnconfirmedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnconfirmedPool")
            .field("size", &self.entries.len())
            .finish()
    }
}

impl UnconfirmedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transaction. Returns `false` (and changes nothing) if
    /// the id is already pooled.
    pub fn insert(&self, trs: Transaction) -> bool {
        let id = trs.id.clone();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        match self.entries.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(PoolEntry {
                    transaction: trs,
                    seq,
                });
                self.order.write().insert(seq, id);
                true
            }
        }
    }

    /// Remove by id. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<Transaction> {
        let (_, entry) = self.entries.remove(id)?;
        self.order.write().remove(&entry.seq);
        Some(entry.transaction)
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.entries.get(id).map(|e| e.transaction.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pooled transactions in admission order (newest first if `reverse`),
    /// truncated to `limit` when given.
    pub fn list(&self, reverse: bool, limit: Option<usize>) -> Vec<Transaction> {
        let order = self.order.read();
        let ids: Box<dyn Iterator<Item = &String>> = if reverse {
            Box::new(order.values().rev())
        } else {
            Box::new(order.values())
        };
        let cap = limit.unwrap_or(usize::MAX);
        ids.filter_map(|id| self.entries.get(id).map(|e| e.transaction.clone()))
            .take(cap)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// BalanceCache
// ---------------------------------------------------------------------------

/// Running total of pending native balance changes per address.
#[derive(Debug, Default)]
pub struct BalanceCache {
    balances: DashMap<String, BigInt>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_native_balance(&self, address: &str, delta: &BigInt) {
        *self.balances.entry(address.to_string()).or_default() += delta;
    }

    pub fn get_native_balance(&self, address: &str) -> Option<BigInt> {
        self.balances.get(address).map(|b| b.clone())
    }

    pub fn clear(&self) {
        self.balances.clear();
    }
}

// ---------------------------------------------------------------------------
// AddressLocks
// ---------------------------------------------------------------------------

/// One mutex per address. Every check-then-merge on an account's balance
/// runs under its address lock.
#[derive(Debug, Default)]
pub struct AddressLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `address`.
    pub fn with_lock<T>(&self, address: &str, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(
            self.locks
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock();
        f()
    }

    /// Drop locks nobody is holding or waiting on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn trs(id: &str) -> Transaction {
        let mut t = Transaction::new(0, "aa");
        t.id = id.to_string();
        t
    }

    #[test]
    fn insert_rejects_duplicates() {
        let pool = UnconfirmedPool::new();
        assert!(pool.insert(trs("a")));
        assert!(!pool.insert(trs("a")));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains("a"));
    }

    #[test]
    fn remove_is_idempotent() {
        let pool = UnconfirmedPool::new();
        pool.insert(trs("a"));
        assert!(pool.remove("a").is_some());
        assert!(pool.remove("a").is_none());
        assert!(pool.remove("never").is_none());
        assert!(pool.is_empty());
        assert!(pool.list(false, None).is_empty());
    }

    #[test]
    fn list_respects_order_and_limit() {
        let pool = UnconfirmedPool::new();
        for id in ["a", "b", "c", "d"] {
            pool.insert(trs(id));
        }
        pool.remove("b");
        let ids = |v: Vec<Transaction>| v.into_iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(pool.list(false, None)), vec!["a", "c", "d"]);
        assert_eq!(ids(pool.list(true, None)), vec!["d", "c", "a"]);
        assert_eq!(ids(pool.list(true, Some(2))), vec!["d", "c"]);
        assert_eq!(pool.get("c").unwrap().id, "c");
    }

    #[test]
    fn balance_cache_accumulates() {
        let cache = BalanceCache::new();
        assert!(cache.get_native_balance("M1").is_none());
        cache.add_native_balance("M1", &BigInt::from(-40));
        cache.add_native_balance("M1", &BigInt::from(15));
        assert_eq!(cache.get_native_balance("M1"), Some(BigInt::from(-25)));
        cache.clear();
        assert!(cache.get_native_balance("M1").is_none());
    }

    #[test]
    fn address_lock_serializes_read_modify_write() {
        let locks = Arc::new(AddressLocks::new());
        let counter = Arc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with_lock("M1", || {
                            let v = *counter.lock();
                            thread::yield_now();
                            *counter.lock() = v + 1;
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock(), 800);
        locks.prune();
        assert!(locks.is_empty());
    }
}
