#![allow(dead_code)]

use distro_cache::Record;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub id: String,
    pub temperature_c: i32,
    pub summary: String,
}

impl Record for WeatherForecast {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn forecast(id: &str, summary: &str) -> WeatherForecast {
    WeatherForecast {
        id: id.to_string(),
        temperature_c: 20,
        summary: summary.to_string(),
    }
}

pub fn forecasts(count: usize) -> Vec<WeatherForecast> {
    (1..=count)
        .map(|index| forecast(&format!("wf{index}"), &format!("weather data {index}")))
        .collect()
}

pub fn ids(items: &[WeatherForecast]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

use distro_cache::store::Clock;
use distro_cache::{DistributedStore, EntryOptions, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Wraps a store and counts the writes that reach it.
pub struct CountingStore<S> {
    pub inner: S,
    writes: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<S: DistributedStore> DistributedStore for CountingStore<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, options: &EntryOptions) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, options)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    fn refresh(&self, key: &str) -> Result<(), StoreError> {
        self.inner.refresh(key)
    }
}

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
