use crate::codec::{Codec, JsonCodec};
use crate::error::{CacheError, Result};
use crate::record::Record;
use crate::scalar::ScalarCache;
use crate::store::{DistributedStore, EntryOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// List-shaped view over single store keys ("array keys"). Each array key holds one encoded
/// sequence of records of one type.
///
/// Every mutation reads the whole sequence, changes it in memory and writes the whole sequence
/// back through [`replace`](Self::replace). There is no atomicity across the read and the write:
/// two concurrent mutations of the same array key race and the later write silently discards
/// the earlier one. Callers needing atomicity must serialize access per key themselves.
///
/// Records sharing an id are tolerated. Scan order is the order last written.
pub struct CollectionCache<S = dyn DistributedStore, C = JsonCodec>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    scalar: ScalarCache<S, C>,
}

impl<S, C> Clone for CollectionCache<S, C>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    fn clone(&self) -> Self {
        Self {
            scalar: self.scalar.clone(),
        }
    }
}

impl<S, C> From<ScalarCache<S, C>> for CollectionCache<S, C>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    fn from(scalar: ScalarCache<S, C>) -> Self {
        Self { scalar }
    }
}

impl<S, C> CollectionCache<S, C>
where
    S: DistributedStore + ?Sized,
    C: Codec,
{
    pub fn new(store: Arc<S>) -> Self {
        ScalarCache::new(store).into()
    }

    pub fn with_entry_options(store: Arc<S>, entry_options: EntryOptions) -> Self {
        ScalarCache::with_entry_options(store, entry_options).into()
    }

    /// The single-value accessor this collection view writes through.
    pub fn scalar(&self) -> &ScalarCache<S, C> {
        &self.scalar
    }

    pub fn list<T>(&self, array_key: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        match self.scalar.fetch(array_key)? {
            Some(bytes) => ScalarCache::<S, C>::decode(array_key, &bytes),
            None => Ok(Vec::new()),
        }
    }

    pub fn find<T>(&self, array_key: &str, id: &str) -> Result<Option<T>>
    where
        T: Record + DeserializeOwned,
    {
        Ok(first_with_id(self.list(array_key)?, id))
    }

    /// Overwrites `key` with a one-element sequence. This does NOT append; use
    /// [`add_range`](Self::add_range) to append.
    pub fn add<T>(&self, key: &str, item: T) -> Result<()>
    where
        T: Record + Serialize,
    {
        self.replace(key, &[item])
    }

    /// Appends `items` to the current sequence. An empty `items` is a no-op that touches nothing.
    pub fn add_range<T, I>(&self, array_key: &str, items: I) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(());
        }

        let mut existing = self.list(array_key)?;
        existing.extend(items);
        self.replace(array_key, &existing)
    }

    /// Replaces every record whose id matches `new_item` and writes the sequence back, even when
    /// nothing matched.
    pub fn update<T>(&self, array_key: &str, new_item: T) -> Result<T>
    where
        T: Record + Clone + Serialize + DeserializeOwned,
    {
        let mut existing = self.list(array_key)?;
        let replaced = overwrite_matching(&mut existing, &new_item);
        debug!(array_key, id = new_item.id(), replaced, "update");

        self.replace(array_key, &existing)?;
        Ok(new_item)
    }

    /// Removes the first record with `item`'s id. Identity is the id, not structural equality.
    pub fn remove_item<T>(&self, array_key: &str, item: &T) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        self.remove_by_id::<T>(array_key, item.id())
    }

    /// Removes the first record with `id`. An absent or empty collection is left alone: nothing
    /// is written and no entry is created.
    pub fn remove_by_id<T>(&self, array_key: &str, id: &str) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        let mut existing: Vec<T> = self.list(array_key)?;
        if existing.is_empty() {
            return Ok(());
        }

        let removed = take_first_with_id(&mut existing, id).is_some();
        debug!(array_key, id, removed, "remove by id");
        self.replace(array_key, &existing)
    }

    /// Removes and returns the record at `index`.
    pub fn remove_at<T>(&self, array_key: &str, index: usize) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut existing = self.list(array_key)?;
        let removed = take_at(&mut existing, index)?;
        debug!(array_key, index, "remove at");

        self.replace(array_key, &existing)?;
        Ok(removed)
    }

    /// Encodes `items` as the entire value of `array_key`. All other mutators end here.
    pub fn replace<T>(&self, array_key: &str, items: &[T]) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = ScalarCache::<S, C>::encode(array_key, items)?;
        debug!(array_key, len = items.len(), "replace");
        self.scalar.put(array_key, bytes, self.scalar.entry_options())
    }

    /// Drops the whole collection.
    pub fn remove(&self, array_key: &str) -> Result<()> {
        self.scalar.remove(array_key)
    }

    pub async fn list_async<T>(&self, array_key: &str, cancel: &CancellationToken) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        match self.scalar.fetch_async(array_key, cancel).await? {
            Some(bytes) => ScalarCache::<S, C>::decode(array_key, &bytes),
            None => Ok(Vec::new()),
        }
    }

    pub async fn find_async<T>(
        &self,
        array_key: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>>
    where
        T: Record + DeserializeOwned,
    {
        Ok(first_with_id(self.list_async(array_key, cancel).await?, id))
    }

    pub async fn add_async<T>(&self, key: &str, item: T, cancel: &CancellationToken) -> Result<()>
    where
        T: Record + Serialize,
    {
        self.replace_async(key, &[item], cancel).await
    }

    pub async fn add_range_async<T, I>(
        &self,
        array_key: &str,
        items: I,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(());
        }

        let mut existing = self.list_async(array_key, cancel).await?;
        existing.extend(items);
        self.replace_async(array_key, &existing, cancel).await
    }

    pub async fn update_async<T>(
        &self,
        array_key: &str,
        new_item: T,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: Record + Clone + Serialize + DeserializeOwned,
    {
        let mut existing = self.list_async(array_key, cancel).await?;
        let replaced = overwrite_matching(&mut existing, &new_item);
        debug!(array_key, id = new_item.id(), replaced, "update");

        self.replace_async(array_key, &existing, cancel).await?;
        Ok(new_item)
    }

    pub async fn remove_item_async<T>(
        &self,
        array_key: &str,
        item: &T,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        self.remove_by_id_async::<T>(array_key, item.id(), cancel)
            .await
    }

    pub async fn remove_by_id_async<T>(
        &self,
        array_key: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        let mut existing: Vec<T> = self.list_async(array_key, cancel).await?;
        if existing.is_empty() {
            return Ok(());
        }

        let removed = take_first_with_id(&mut existing, id).is_some();
        debug!(array_key, id, removed, "remove by id");
        self.replace_async(array_key, &existing, cancel).await
    }

    pub async fn remove_at_async<T>(
        &self,
        array_key: &str,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut existing = self.list_async(array_key, cancel).await?;
        let removed = take_at(&mut existing, index)?;
        debug!(array_key, index, "remove at");

        self.replace_async(array_key, &existing, cancel).await?;
        Ok(removed)
    }

    pub async fn replace_async<T>(
        &self,
        array_key: &str,
        items: &[T],
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = ScalarCache::<S, C>::encode(array_key, items)?;
        debug!(array_key, len = items.len(), "replace");
        self.scalar
            .put_async(array_key, bytes, self.scalar.entry_options(), cancel)
            .await
    }

    pub async fn remove_async(&self, array_key: &str, cancel: &CancellationToken) -> Result<()> {
        self.scalar.remove_async(array_key, cancel).await
    }
}

fn first_with_id<T: Record>(items: Vec<T>, id: &str) -> Option<T> {
    items.into_iter().find(|item| item.id() == id)
}

fn overwrite_matching<T: Record + Clone>(items: &mut [T], new_item: &T) -> usize {
    let mut replaced = 0;
    for item in items.iter_mut().filter(|item| item.id() == new_item.id()) {
        *item = new_item.clone();
        replaced += 1;
    }
    replaced
}

fn take_first_with_id<T: Record>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let position = items.iter().position(|item| item.id() == id)?;
    Some(items.remove(position))
}

fn take_at<T>(items: &mut Vec<T>, index: usize) -> Result<T> {
    if index >= items.len() {
        return Err(CacheError::IndexOutOfRange {
            index,
            len: items.len(),
        });
    }
    Ok(items.remove(index))
}
