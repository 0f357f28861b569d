use crate::codec::{BincodeCodec, Codec, JsonCodec};
use crate::error::StoreError;
use crate::store::{not_cancelled, Clock, DistributedStore, EntryOptions, Expiry, SystemClock};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

const PARTIAL_EXTENSION: &str = "partial";

/// One file per key, named by a random UUID, with an in-memory index from key to file.
///
/// Before using the non-volatile flavor, strongly consider the volatile one. Do you really need
/// this cache to rehydrate across restarts? You are sacrificing reboot to clear corruption and
/// must consider N vs N+1 schema issues when downgrading or upgrading your application.
///
/// Every file holds the key alongside the value so the index can be rebuilt from disk. Writes go
/// to a sibling `.partial` file first and are renamed into place, so a concurrent reader sees
/// either the old or the new record, never a torn one.
///
/// Reads never write to disk. Expiry, including the sliding window moved by reads, is tracked in
/// the index and changed only under its shard guard. Files keep the expiry of their last write,
/// so after a non-volatile restart sliding windows count from that write.
pub struct DiscreteFileStore<Serde = BincodeCodec>
where
    Serde: Codec,
{
    cache_directory: PathBuf,
    index: DashMap<String, IndexEntry>,
    clock: Arc<dyn Clock>,
    phantom_serde: PhantomData<Serde>,
}

pub type DiscreteFileStoreBincode = DiscreteFileStore<BincodeCodec>;
pub type DiscreteFileStoreJson = DiscreteFileStore<JsonCodec>;

#[derive(Serialize, Deserialize)]
struct FileRecord {
    key: String,
    value: Vec<u8>,
    expiry: Expiry,
}

struct IndexEntry {
    path: PathBuf,
    expiry: Expiry,
}

enum Lookup {
    Missing,
    Live(PathBuf),
    /// Already unindexed; the file is left for the caller to delete.
    Expired(PathBuf),
}

impl<Serde: Codec> DiscreteFileStore<Serde> {
    /// Starts from an empty directory, wiping whatever a previous process left behind.
    pub fn volatile(cache_directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::volatile_with_clock(cache_directory, Arc::new(SystemClock))
    }

    pub fn volatile_with_clock(
        cache_directory: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let store = Self::empty(cache_directory.into(), clock);

        match fs::remove_dir_all(&store.cache_directory) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::create_dir_all(&store.cache_directory)?;

        Ok(store)
    }

    /// Keeps the directory contents and rebuilds the index from them. Leftover `.partial` files
    /// and records already expired are deleted; files that do not decode as records are skipped.
    /// The directory must not be shared with another live store.
    pub fn non_volatile(cache_directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::non_volatile_with_clock(cache_directory, Arc::new(SystemClock))
    }

    pub fn non_volatile_with_clock(
        cache_directory: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let store = Self::empty(cache_directory.into(), clock);
        fs::create_dir_all(&store.cache_directory)?;
        store.rehydrate_index()?;

        Ok(store)
    }

    pub fn cache_directory(&self) -> &Path {
        &self.cache_directory
    }

    fn empty(cache_directory: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_directory,
            index: DashMap::new(),
            clock,
            phantom_serde: PhantomData,
        }
    }

    fn rehydrate_index(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut swept = 0usize;

        for path in fs::read_dir(&self.cache_directory)?.flatten().map(|e| e.path()) {
            // Staging files of writes that never got renamed, e.g. a cancelled `set_async`
            if path.extension().is_some_and(|ext| ext == PARTIAL_EXTENSION) {
                remove_if_present(&path)?;
                swept += 1;
                continue;
            }

            let Ok(bytes) = fs::read(&path) else { continue };
            let Ok(record) = Serde::decode::<FileRecord>(&bytes) else { continue };

            if record.expiry.is_expired(now) {
                remove_if_present(&path)?;
                swept += 1;
            } else {
                let entry = IndexEntry {
                    path,
                    expiry: record.expiry,
                };
                self.index.insert(record.key, entry);
            }
        }

        debug!(
            directory = %self.cache_directory.display(),
            entries = self.index.len(),
            swept,
            "rehydrated file store index"
        );
        Ok(())
    }

    /// Points `key` at its file and stamps the new expiry in one step, so a concurrent read never
    /// sees the new path with the old expiry.
    fn claim(&self, key: &str, options: &EntryOptions) -> (PathBuf, Expiry) {
        let expiry = Expiry::new(options, self.clock.now());
        let mut entry = self
            .index
            .entry(key.to_string())
            .or_insert_with(|| IndexEntry {
                path: self.cache_directory.join(Uuid::new_v4().hyphenated().to_string()),
                expiry,
            });
        entry.expiry = expiry;
        (entry.path.clone(), expiry)
    }

    fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now();

        {
            let Some(mut entry) = self.index.get_mut(key) else {
                return Lookup::Missing;
            };
            if !entry.expiry.is_expired(now) {
                entry.expiry.touch(now);
                return Lookup::Live(entry.path.clone());
            }
        }

        // The shard guard must be released before removing. A `set` landing in between stamps a
        // fresh expiry, so the entry survives and the lookup is retried.
        match self.index.remove_if(key, |_, entry| entry.expiry.is_expired(now)) {
            Some((_, entry)) => Lookup::Expired(entry.path),
            None => self.lookup(key),
        }
    }

    fn encode_record(
        &self,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> Result<Vec<u8>, StoreError> {
        let record = FileRecord {
            key: key.to_string(),
            value,
            expiry,
        };
        Serde::encode(&record).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode_value(&self, key: &str, bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
        Serde::decode::<FileRecord>(bytes)
            .map(|record| record.value)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl<Serde: Codec> DistributedStore for DiscreteFileStore<Serde> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.lookup(key) {
            Lookup::Missing => Ok(None),
            Lookup::Expired(path) => {
                trace!(key, "evicting expired file entry");
                remove_if_present(&path)?;
                Ok(None)
            }
            // A claimed key whose first write has not landed yet reads as absent
            Lookup::Live(path) => match fs::read(&path) {
                Ok(bytes) => Ok(Some(self.decode_value(key, &bytes)?)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, options: &EntryOptions) -> Result<(), StoreError> {
        let (path, expiry) = self.claim(key, options);
        write_atomically(&path, &self.encode_record(key, value, expiry)?)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.index.remove(key) {
            Some((_, entry)) => remove_if_present(&entry.path),
            None => Ok(()),
        }
    }

    fn refresh(&self, key: &str) -> Result<(), StoreError> {
        match self.lookup(key) {
            Lookup::Expired(path) => remove_if_present(&path),
            Lookup::Missing | Lookup::Live(_) => Ok(()),
        }
    }

    async fn get_async(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        match self.lookup(key) {
            Lookup::Missing => Ok(None),
            Lookup::Expired(path) => {
                trace!(key, "evicting expired file entry");
                remove_if_present_async(&path, cancel).await?;
                Ok(None)
            }
            Lookup::Live(path) => match cancellable(cancel, tokio::fs::read(&path)).await {
                Ok(bytes) => Ok(Some(self.decode_value(key, &bytes)?)),
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    async fn set_async(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        not_cancelled(cancel)?;
        let (path, expiry) = self.claim(key, options);
        let bytes = self.encode_record(key, value, expiry)?;
        write_atomically_async(&path, bytes, cancel).await
    }

    async fn remove_async(&self, key: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        match self.index.remove(key) {
            Some((_, entry)) => remove_if_present_async(&entry.path, cancel).await,
            None => Ok(()),
        }
    }

    async fn refresh_async(&self, key: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        match self.lookup(key) {
            Lookup::Expired(path) => remove_if_present_async(&path, cancel).await,
            Lookup::Missing | Lookup::Live(_) => Ok(()),
        }
    }
}

/// Races a filesystem future against the token. Dropping the losing future abandons the I/O.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = operation => result.map_err(StoreError::from),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    path.with_extension(format!("{}.{}", Uuid::new_v4().simple(), PARTIAL_EXTENSION))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let staging = partial_path(path);
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        StoreError::from(e)
    })
}

async fn write_atomically_async(
    path: &Path,
    bytes: Vec<u8>,
    cancel: &CancellationToken,
) -> Result<(), StoreError> {
    let staging = partial_path(path);
    let result = cancellable(cancel, async {
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, path).await
    })
    .await;

    // A cancelled write may still create the staging file after this; rehydration sweeps it
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

async fn remove_if_present_async(path: &Path, cancel: &CancellationToken) -> Result<(), StoreError> {
    match cancellable(cancel, tokio::fs::remove_file(path)).await {
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
