//! The local shard: a thread-safe facade over the hash store and the
//! expiration machinery.
//!
//! One mutex (the "world" lock) guards the map, the expiry heap and
//! the timer together. Every operation takes the lock for its own
//! duration only; a multi-step request (load then store) re-enters it
//! per step and is not atomic as a whole, which is acceptable because
//! all writes for a key land on its owning node.

use crate::error::StoreError;
use crate::hash::HashStore;
use crate::record::Record;
use crate::request::Request;
use crate::ttl::{RefreshTimer, TimeHeap};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Shard construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct ShardConfig {
    /// Initial capacity of the hash store and expiry heap.
    pub capacity: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        ShardConfig { capacity: 1024 }
    }
}

struct World {
    hash: HashStore,
    expire_heap: TimeHeap,
    expire_timer: RefreshTimer,
}

/// A mutex-guarded record store with TTL expiry.
pub struct Shard {
    world: Mutex<World>,

    /// Handle back to this shard for timer callbacks; timers must not
    /// keep the shard alive on their own.
    weak: Weak<Shard>,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard").finish_non_exhaustive()
    }
}

impl Shard {
    /// Create a shard. Returned behind `Arc` because expiry timers
    /// call back into it.
    pub fn new(config: ShardConfig) -> Arc<Shard> {
        Arc::new_cyclic(|weak| Shard {
            weak: weak.clone(),
            world: Mutex::new(World {
                hash: HashStore::with_capacity(config.capacity),
                expire_heap: TimeHeap::with_capacity(config.capacity),
                expire_timer: RefreshTimer::default(),
            }),
        })
    }

    /// Process a typed request against this shard.
    pub fn serve(&self, req: &Request) -> Result<Record, StoreError> {
        req.process(self)
    }

    /// All keys stored on this shard.
    pub fn keys(&self) -> Vec<String> {
        self.world.lock().hash.keys().to_vec()
    }

    /// Load the record under `key`. A record that outlived its
    /// expiration but was not yet swept is deleted here and reported
    /// as missing.
    pub fn load(&self, key: &str) -> Option<Record> {
        let mut world = self.world.lock();
        let rec = world.hash.load(key)?;
        if rec.is_expired() {
            debug!(key, "expired on load, deleting");
            world.hash.delete(key);
            return None;
        }
        Some(rec)
    }

    /// Store a record under `key`. Non-permanent records are scheduled
    /// for expiry.
    pub fn store(&self, key: &str, rec: Record) -> Record {
        let mut world = self.world.lock();
        let stored = world.hash.store(key, rec);
        if stored.is_permanent() {
            return stored;
        }

        let cutoff = stored.expires_at();
        world.expire_heap.push(cutoff, key.to_string());

        debug!(key, cutoff, "scheduling expiry sweep");
        let weak = self.weak.clone();
        world.expire_timer.after_func(cutoff, move || {
            if let Some(shard) = weak.upgrade() {
                shard.delete_after(cutoff);
            }
        });
        stored
    }

    /// Remove `key` from the shard. Any heap entry for it goes stale
    /// and is skipped when it surfaces.
    pub fn delete(&self, key: &str) {
        self.world.lock().hash.delete(key);
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.world.lock().hash.len()
    }

    /// Whether the shard holds no records.
    pub fn is_empty(&self) -> bool {
        self.world.lock().hash.is_empty()
    }

    /// Timer callback: sweep everything due at `cutoff`, then re-arm
    /// for the next pending expiration, if any.
    fn delete_after(&self, cutoff: u64) {
        self.delete_expired_keys(cutoff);

        let mut world = self.world.lock();
        let next = match world.expire_heap.peek() {
            Some(entry) => entry.at,
            // No temporary keys left; the timer stays idle until the
            // next non-permanent store.
            None => return,
        };

        debug!(next, "re-arming expiry sweep");
        let weak = self.weak.clone();
        world.expire_timer.after_func(next, move || {
            if let Some(shard) = weak.upgrade() {
                shard.delete_after(next);
            }
        });
    }

    /// Pop heap entries due at or before `cutoff`, deleting the keys
    /// whose live record still matches the scheduled expiration.
    /// Entries for deleted or re-stored keys are discarded unmatched.
    pub fn delete_expired_keys(&self, cutoff: u64) {
        let mut world = self.world.lock();
        loop {
            match world.expire_heap.peek() {
                Some(entry) if entry.at <= cutoff => {}
                _ => break,
            }
            let Some(entry) = world.expire_heap.pop() else {
                break;
            };

            let live = world
                .hash
                .get(&entry.key)
                .is_some_and(|rec| !rec.is_permanent() && rec.expires_at() == entry.at);
            if live {
                debug!(key = %entry.key, "deleting expired key");
                world.hash.delete(&entry.key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lazy_expiry_on_load() {
        let shard = Shard::new(ShardConfig::default());

        shard.store("1", Record::with_expiry(Value::Int(1), 1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shard.load("1").is_none());

        shard.store("2", Record::with_expiry(Value::Int(2), 0));
        let rec = shard.load("2").unwrap();
        assert_eq!(rec.data, Value::Int(2));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_records() {
        let shard = Shard::new(ShardConfig::default());

        shard.store("gone", Record::with_expiry(Value::Int(1), 5));
        shard.store("kept", Record::with_expiry(Value::Int(2), 0));

        // Give the timer a chance to fire and purge.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(shard.len(), 1);
        assert!(shard.load("kept").is_some());
    }

    #[tokio::test]
    async fn test_restore_supersedes_expiry() {
        let shard = Shard::new(ShardConfig::default());

        shard.store("k", Record::with_expiry(Value::Int(1), 20));
        // Overwrite as permanent before the sweep runs; the stale heap
        // entry must not take the record with it.
        shard.store("k", Record::with_expiry(Value::Int(2), 0));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let rec = shard.load("k").unwrap();
        assert_eq!(rec.data, Value::Int(2));
        assert_eq!(rec.meta.index, 2);
    }

    #[tokio::test]
    async fn test_delete_then_sweep_is_quiet() {
        let shard = Shard::new(ShardConfig::default());

        shard.store("k", Record::with_expiry(Value::Int(1), 10));
        shard.delete("k");
        shard.store("k", Record::with_expiry(Value::Int(2), 0));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(shard.load("k").unwrap().data, Value::Int(2));
    }

    #[tokio::test]
    async fn test_delete_expired_keys_respects_cutoff() {
        let shard = Shard::new(ShardConfig::default());

        shard.store("soon", Record::with_expiry(Value::Int(1), 1));
        shard.store("later", Record::with_expiry(Value::Int(2), 60_000));
        tokio::time::sleep(Duration::from_millis(50)).await;

        shard.delete_expired_keys(crate::record::now_millis());

        let world = shard.world.lock();
        assert!(world.hash.get("soon").is_none());
        assert!(world.hash.get("later").is_some());
        assert_eq!(world.expire_heap.len(), 1);
    }

    #[tokio::test]
    async fn test_store_returns_metadata() {
        let shard = Shard::new(ShardConfig::default());

        let first = shard.store("k", Record::with_expiry(Value::Int(1), 0));
        let second = shard.store("k", Record::with_expiry(Value::Int(2), 0));

        assert_eq!(first.meta.index, 1);
        assert_eq!(second.meta.index, 2);
        assert_eq!(first.meta.created_at, second.meta.created_at);
    }
}
