use crate::codec::{is_blank, Codec, JsonCodec};
use crate::error::{CacheError, Result};
use crate::store::{DistributedStore, EntryOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Typed get/set/remove of single values over a [`DistributedStore`].
///
/// A blank key, an absent key and a blank stored value all read as `T::default()`. Malformed
/// data is never defaulted: it surfaces as [`CacheError::Decode`].
///
/// Strings written with [`set_raw`](Self::set_raw) are stored verbatim, without the codec's
/// wrapping (no JSON quotes), and read back with [`get_raw`](Self::get_raw).
pub struct ScalarCache<S = dyn DistributedStore, C = JsonCodec>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    store: Arc<S>,
    entry_options: EntryOptions,
    phantom_codec: PhantomData<C>,
}

impl<S, C> Clone for ScalarCache<S, C>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            entry_options: self.entry_options.clone(),
            phantom_codec: PhantomData,
        }
    }
}

impl<S, C> ScalarCache<S, C>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_entry_options(store, EntryOptions::default())
    }

    /// `entry_options` apply to every write that does not bring its own.
    pub fn with_entry_options(store: Arc<S>, entry_options: EntryOptions) -> Self {
        Self {
            store,
            entry_options,
            phantom_codec: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn entry_options(&self) -> &EntryOptions {
        &self.entry_options
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.fetch(key)? {
            Some(bytes) => Self::decode(key, &bytes),
            None => Ok(T::default()),
        }
    }

    pub fn set<T>(&self, key: &str, value: T) -> Result<T>
    where
        T: Serialize,
    {
        self.set_with(key, value, &self.entry_options)
    }

    pub fn set_with<T>(&self, key: &str, value: T, options: &EntryOptions) -> Result<T>
    where
        T: Serialize,
    {
        let bytes = Self::encode(key, &value)?;
        self.put(key, bytes, options)?;
        Ok(value)
    }

    pub fn get_raw(&self, key: &str) -> Result<String> {
        match self.fetch(key)? {
            Some(bytes) => String::from_utf8(bytes).map_err(|e| CacheError::decode(key, e)),
            None => Ok(String::new()),
        }
    }

    pub fn set_raw(&self, key: &str, value: String) -> Result<String> {
        self.set_raw_with(key, value, &self.entry_options)
    }

    pub fn set_raw_with(&self, key: &str, value: String, options: &EntryOptions) -> Result<String> {
        self.put(key, value.as_bytes().to_vec(), options)?;
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        trace!(key, "remove");
        Ok(self.store.remove(key)?)
    }

    pub fn refresh(&self, key: &str) -> Result<()> {
        trace!(key, "refresh");
        Ok(self.store.refresh(key)?)
    }

    pub async fn get_async<T>(&self, key: &str, cancel: &CancellationToken) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.fetch_async(key, cancel).await? {
            Some(bytes) => Self::decode(key, &bytes),
            None => Ok(T::default()),
        }
    }

    pub async fn set_async<T>(&self, key: &str, value: T, cancel: &CancellationToken) -> Result<T>
    where
        T: Serialize,
    {
        self.set_with_async(key, value, &self.entry_options, cancel).await
    }

    pub async fn set_with_async<T>(
        &self,
        key: &str,
        value: T,
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: Serialize,
    {
        let bytes = Self::encode(key, &value)?;
        self.put_async(key, bytes, options, cancel).await?;
        Ok(value)
    }

    pub async fn get_raw_async(&self, key: &str, cancel: &CancellationToken) -> Result<String> {
        match self.fetch_async(key, cancel).await? {
            Some(bytes) => String::from_utf8(bytes).map_err(|e| CacheError::decode(key, e)),
            None => Ok(String::new()),
        }
    }

    pub async fn set_raw_async(
        &self,
        key: &str,
        value: String,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.put_async(key, value.as_bytes().to_vec(), &self.entry_options, cancel)
            .await?;
        Ok(value)
    }

    pub async fn remove_async(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        ensure_live(cancel)?;
        trace!(key, "remove");
        Ok(self.store.remove_async(key, cancel).await?)
    }

    pub async fn refresh_async(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        ensure_live(cancel)?;
        trace!(key, "refresh");
        Ok(self.store.refresh_async(key, cancel).await?)
    }

    /// Raw bytes under `key`, with blank keys and blank values normalized to `None`.
    pub(crate) fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.trim().is_empty() {
            return Ok(None);
        }

        let bytes = self.store.get(key)?;
        trace!(key, found = bytes.is_some(), "get");
        Ok(bytes.filter(|bytes| !is_blank(bytes)))
    }

    pub(crate) async fn fetch_async(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        if key.trim().is_empty() {
            return Ok(None);
        }
        ensure_live(cancel)?;

        let bytes = self.store.get_async(key, cancel).await?;
        trace!(key, found = bytes.is_some(), "get");
        Ok(bytes.filter(|bytes| !is_blank(bytes)))
    }

    pub(crate) fn put(&self, key: &str, bytes: Vec<u8>, options: &EntryOptions) -> Result<()> {
        trace!(key, len = bytes.len(), "set");
        Ok(self.store.set(key, bytes, options)?)
    }

    pub(crate) async fn put_async(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_live(cancel)?;
        trace!(key, len = bytes.len(), "set");
        Ok(self.store.set_async(key, bytes, options, cancel).await?)
    }

    pub(crate) fn decode<T>(key: &str, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        C::decode(bytes).map_err(|e| CacheError::decode(key, e))
    }

    pub(crate) fn encode<T>(key: &str, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        C::encode(value).map_err(|e| CacheError::encode(key, e))
    }
}

/// A token that already fired means the store call must not be issued at all.
pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }
    Ok(())
}
