use crate::error::StoreError;
use crate::store::{Clock, DistributedStore, EntryOptions, Expiry, SystemClock};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

struct Entry {
    value: Vec<u8>,
    expiry: Expiry,
}

/// In-process store for tests, single-node deployments and local development. Honors
/// [`EntryOptions`]; expired entries are dropped lazily when next touched.
pub struct MemoryStore {
    data: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            data: DashMap::new(),
            clock,
        }
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A platform read without side effects: does not slide the expiration window.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.data
            .get(key)
            .map(|entry| !entry.expiry.is_expired(now))
            .unwrap_or(false)
    }

    fn touch(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();

        {
            let mut entry = self.data.get_mut(key)?;
            if !entry.expiry.is_expired(now) {
                entry.expiry.touch(now);
                return Some(entry.value.clone());
            }
        }

        // The shard guard must be released before removing
        self.data.remove_if(key, |_, entry| entry.expiry.is_expired(now));
        trace!(key, "evicted expired entry");
        None
    }
}

impl DistributedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.touch(key))
    }

    fn set(&self, key: &str, value: Vec<u8>, options: &EntryOptions) -> Result<(), StoreError> {
        let expiry = Expiry::new(options, self.clock.now());
        self.data.insert(key.to_string(), Entry { value, expiry });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn refresh(&self, key: &str) -> Result<(), StoreError> {
        self.touch(key);
        Ok(())
    }
}
