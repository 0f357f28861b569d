pub mod discrete_files;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// The byte-oriented key/value service the typed accessors sit on. Implementations must be safe
/// to share between concurrently running operations; the accessors never serialize access.
///
/// The async variants default to the blocking ones, refusing with [`StoreError::Cancelled`] when
/// `cancel` already fired. Adapters doing real I/O should override them and also abandon a
/// pending call once `cancel` fires.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// `None` when the key is absent or its entry has expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &str, value: Vec<u8>, options: &EntryOptions) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Resets the sliding expiration window of `key` without reading its value out.
    fn refresh(&self, key: &str) -> Result<(), StoreError>;

    async fn get_async(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        not_cancelled(cancel)?;
        self.get(key)
    }

    async fn set_async(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        not_cancelled(cancel)?;
        self.set(key, value, options)
    }

    async fn remove_async(&self, key: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        not_cancelled(cancel)?;
        self.remove(key)
    }

    async fn refresh_async(&self, key: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        not_cancelled(cancel)?;
        self.refresh(key)
    }
}

pub(crate) fn not_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

/// Expiry policy handed to the store on every write. The accessors pass it through untouched;
/// only store adapters interpret it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Fixed point in time after which the entry is gone.
    #[serde(default)]
    pub absolute_expiration: Option<SystemTime>,
    /// Same as `absolute_expiration`, but measured from the moment of the write.
    #[serde(default)]
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Entry expires when it has not been read or refreshed for this long. Never extends past an
    /// absolute expiration.
    #[serde(default)]
    pub sliding_expiration: Option<Duration>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absolute_expiration(mut self, at: SystemTime) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_absolute_expiration_relative_to_now(mut self, ttl: Duration) -> Self {
        self.absolute_expiration_relative_to_now = Some(ttl);
        self
    }

    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    pub fn never_expires(&self) -> bool {
        self.absolute_expiration.is_none()
            && self.absolute_expiration_relative_to_now.is_none()
            && self.sliding_expiration.is_none()
    }
}

/// Per-entry expiry bookkeeping derived from [`EntryOptions`] at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    absolute: Option<SystemTime>,
    sliding: Option<Duration>,
    last_touched: SystemTime,
}

impl Expiry {
    pub fn new(options: &EntryOptions, now: SystemTime) -> Self {
        let relative = options
            .absolute_expiration_relative_to_now
            .and_then(|ttl| now.checked_add(ttl));

        // When both absolute forms are given the earlier one wins
        let absolute = match (options.absolute_expiration, relative) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            absolute,
            sliding: options.sliding_expiration,
            last_touched: now,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        if matches!(self.absolute, Some(at) if now >= at) {
            return true;
        }

        match self.sliding.and_then(|window| self.last_touched.checked_add(window)) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    pub fn touch(&mut self, now: SystemTime) {
        self.last_touched = now;
    }
}

/// Time source for expiry decisions, injectable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::Clock;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};

    pub struct ManualClock {
        now: Mutex<SystemTime>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000)),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.now.lock().unwrap()
        }
    }
}
