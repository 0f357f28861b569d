//! Typed, collection-aware access on top of a byte-oriented distributed cache.
//!
//! The store only understands opaque blobs per key. [`ScalarCache`] stores one typed value per
//! key; [`CollectionCache`] treats one key as an ordered list of [`Record`]s and offers
//! find/add/update/remove/replace on it by reading, changing and rewriting the whole list.
//!
//! Every operation has a blocking form and an `_async` form taking a [`CancellationToken`].
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod codec;
pub mod collection;
pub mod config;
pub mod error;
pub mod record;
pub mod scalar;
pub mod store;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use collection::CollectionCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result, StoreError};
pub use record::Record;
pub use scalar::ScalarCache;
pub use store::{DistributedStore, EntryOptions};
