//! In-process partition store.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::storage::CacheStore;
use super::traits::{CacheKey, CachedResponse};
use crate::http::Response;

type Partitions = BTreeMap<String, HashMap<CacheKey, CachedResponse>>;

/// Partition store kept in memory; gone when the process exits.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<Partitions>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Partitions>> {
    self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<()> {
    self.lock()?.entry(partition.to_string()).or_default();
    Ok(())
  }

  fn put(&self, partition: &str, key: &CacheKey, response: &Response) -> Result<()> {
    self.put_all(partition, &[(key.clone(), response.clone())])
  }

  fn put_all(&self, partition: &str, entries: &[(CacheKey, Response)]) -> Result<()> {
    let cached_at = Utc::now();
    let mut partitions = self.lock()?;
    let target = partitions.entry(partition.to_string()).or_default();
    for (key, response) in entries {
      target.insert(
        key.clone(),
        CachedResponse {
          response: response.clone(),
          cached_at,
        },
      );
    }
    Ok(())
  }

  fn get(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .lock()?
        .get(partition)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool> {
    Ok(
      self
        .lock()?
        .get_mut(partition)
        .map(|entries| entries.remove(key).is_some())
        .unwrap_or(false),
    )
  }

  fn keys(&self, partition: &str) -> Result<Vec<CacheKey>> {
    let mut keys: Vec<CacheKey> = self
      .lock()?
      .get(partition)
      .map(|entries| entries.keys().cloned().collect())
      .unwrap_or_default();
    keys.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.method.cmp(&b.method)));
    Ok(keys)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    Ok(self.lock()?.remove(partition).is_some())
  }
}
