use crate::collection::CollectionCache;
use crate::error::{CacheError, Result};
use crate::store::discrete_files::DiscreteFileStoreBincode;
use crate::store::memory::MemoryStore;
use crate::store::{DistributedStore, EntryOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wiring for hosts that prefer declaring the cache in a TOML file over building it in code.
///
/// ```toml
/// [entry]
/// sliding_expiration_secs = 300
///
/// [store]
/// kind = "files"
/// directory = "/var/cache/app"
/// volatile = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Default expiry for writes, in whole seconds. Omitted fields mean "no such expiry".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub absolute_expiration_relative_to_now_secs: Option<u64>,
    #[serde(default)]
    pub sliding_expiration_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Files {
        directory: PathBuf,
        #[serde(default = "default_volatile")]
        volatile: bool,
    },
}

fn default_volatile() -> bool {
    true
}

impl CacheConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CacheConfig =
            toml::from_str(content).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.entry.absolute_expiration_relative_to_now_secs == Some(0) {
            return Err(CacheError::Config(
                "absolute_expiration_relative_to_now_secs must be positive".into(),
            ));
        }
        if self.entry.sliding_expiration_secs == Some(0) {
            return Err(CacheError::Config(
                "sliding_expiration_secs must be positive".into(),
            ));
        }
        if let StoreConfig::Files { directory, .. } = &self.store {
            if directory.as_os_str().is_empty() {
                return Err(CacheError::Config("files store needs a directory".into()));
            }
        }
        Ok(())
    }

    pub fn entry_options(&self) -> EntryOptions {
        EntryOptions {
            absolute_expiration: None,
            absolute_expiration_relative_to_now: self
                .entry
                .absolute_expiration_relative_to_now_secs
                .map(Duration::from_secs),
            sliding_expiration: self.entry.sliding_expiration_secs.map(Duration::from_secs),
        }
    }

    pub fn build_store(&self) -> Result<Arc<dyn DistributedStore>> {
        self.validate()?;

        let store: Arc<dyn DistributedStore> = match &self.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Files {
                directory,
                volatile: true,
            } => Arc::new(DiscreteFileStoreBincode::volatile(directory)?),
            StoreConfig::Files {
                directory,
                volatile: false,
            } => Arc::new(DiscreteFileStoreBincode::non_volatile(directory)?),
        };

        debug!(store = ?self.store, "built cache store");
        Ok(store)
    }

    /// A ready-to-use collection accessor; its [`scalar`](CollectionCache::scalar) view shares
    /// the same store and defaults.
    pub fn collection_cache(&self) -> Result<CollectionCache> {
        Ok(CollectionCache::with_entry_options(
            self.build_store()?,
            self.entry_options(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_an_unexpiring_memory_store() {
        let config = CacheConfig::from_toml("").unwrap();

        assert!(matches!(config.store, StoreConfig::Memory));
        assert!(config.entry_options().never_expires());
    }

    #[test]
    fn parses_files_store_and_expiry() {
        let config = CacheConfig::from_toml(
            r#"
            [entry]
            sliding_expiration_secs = 300

            [store]
            kind = "files"
            directory = "/tmp/distro"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.entry_options().sliding_expiration,
            Some(Duration::from_secs(300))
        );
        assert!(matches!(
            config.store,
            StoreConfig::Files { ref directory, volatile: true } if directory == Path::new("/tmp/distro")
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = CacheConfig::from_toml("[entry]\nsliding_expiration_secs = 0").unwrap_err();

        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn unknown_store_kind_is_rejected() {
        let err = CacheConfig::from_toml("[store]\nkind = \"redis\"").unwrap_err();

        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn builds_a_working_file_backed_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            entry: EntryConfig::default(),
            store: StoreConfig::Files {
                directory: dir.path().to_path_buf(),
                volatile: false,
            },
        };

        let cache = config.collection_cache().unwrap();
        cache.scalar().set("answer", 42u32).unwrap();

        assert_eq!(cache.scalar().get::<u32>("answer").unwrap(), 42);
    }
}
