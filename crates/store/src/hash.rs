//! Unsynchronized hash table of keys to records.
//!
//! Keeps a cached key sequence next to the map so enumeration does not
//! allocate on every call. The cache goes dirty on deletion and is
//! rebuilt lazily on the next enumeration. Callers synchronize; the
//! shard wraps this type behind its world mutex.

use crate::record::{now_millis, Meta, Record};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Key-to-record map with a lazily rebuilt key cache.
#[derive(Debug, Default)]
pub struct HashStore {
    records: HashMap<String, Record>,

    /// Cached key sequence, valid while `dirty` is false. Keys appear
    /// in insertion order until the first deletion forces a rebuild.
    keys: Vec<String>,

    /// Set when a key is deleted; the key cache no longer mirrors the
    /// map and must be rebuilt before the next enumeration.
    dirty: bool,
}

impl HashStore {
    /// Create a store sized for `cap` records.
    pub fn with_capacity(cap: usize) -> Self {
        HashStore {
            records: HashMap::with_capacity(cap),
            keys: Vec::with_capacity(cap),
            dirty: false,
        }
    }

    /// All keys in the store. Rebuilds the cached sequence only when a
    /// deletion invalidated it.
    pub fn keys(&mut self) -> &[String] {
        if self.dirty {
            // Keep the allocation, refill from the map.
            self.keys.clear();
            self.keys.extend(self.records.keys().cloned());
            self.dirty = false;
        }
        &self.keys
    }

    /// Load the record stored under `key`, stamping its access time.
    /// Expiry is not evaluated here; that is the shard's job.
    pub fn load(&mut self, key: &str) -> Option<Record> {
        let rec = self.records.get_mut(key)?;
        rec.meta.accessed_at = now_millis();
        Some(rec.clone())
    }

    /// Peek at a record without touching its access time.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Store `rec`'s data and expiration under `key` and return the
    /// stored record. A new key gets a fresh creation time; an update
    /// keeps it. The version counter increments either way.
    pub fn store(&mut self, key: &str, rec: Record) -> Record {
        let now = now_millis();
        let entry = match self.records.entry(key.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                if !self.dirty {
                    self.keys.push(key.to_string());
                }
                e.insert(Record {
                    meta: Meta {
                        created_at: now,
                        ..Meta::default()
                    },
                    ..Record::default()
                })
            }
        };

        entry.meta.index += 1;
        entry.meta.updated_at = now;
        entry.meta.expire_time = rec.meta.expire_time;
        entry.data = rec.data;
        entry.clone()
    }

    /// Remove `key`. Marks the key cache dirty only when the key was
    /// actually present.
    pub fn delete(&mut self, key: &str) {
        if self.records.remove(key).is_some() {
            self.dirty = true;
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
