//! Cache layer that implements the freshness strategies on top of a partition store.

use color_eyre::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::storage::CacheStore;
use super::traits::{CacheKey, CachedResponse, Served};
use crate::config::AgentConfig;
use crate::diagnostics::{Diagnostic, SharedDiagnostics};
use crate::http::{Fetch, Request, Response};

/// Cache layer bound to one agent version's partitions.
///
/// Store failures never escape this layer: failed writes are dropped and
/// failed reads count as misses, both reported to diagnostics.
pub struct CacheLayer<S: CacheStore> {
  storage: Arc<S>,
  static_partition: String,
  dynamic_partition: String,
  /// Root document served when a navigation fails and nothing is cached
  fallback: CacheKey,
  diagnostics: SharedDiagnostics,
}

impl<S: CacheStore> CacheLayer<S> {
  pub fn new(storage: Arc<S>, config: &AgentConfig, diagnostics: SharedDiagnostics) -> Result<Self> {
    Ok(Self {
      storage,
      static_partition: config.static_partition(),
      dynamic_partition: config.dynamic_partition(),
      fallback: CacheKey::get(&config.resolve(&config.fallback_document)?),
      diagnostics,
    })
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn static_partition(&self) -> &str {
    &self.static_partition
  }

  pub fn dynamic_partition(&self) -> &str {
    &self.dynamic_partition
  }

  /// Find a record in this version's partitions, freshest writes first.
  pub fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
    [&self.dynamic_partition, &self.static_partition]
      .into_iter()
      .find_map(|partition| match self.storage.get(partition, key) {
        Ok(found) => found,
        Err(e) => {
          self.diagnostics.record(Diagnostic::CacheReadFailed {
            partition: partition.clone(),
            key: key.to_string(),
            error: e.to_string(),
          });
          None
        }
      })
  }

  /// Store a response, reporting instead of returning failures.
  pub fn store(&self, partition: &str, key: &CacheKey, response: &Response) {
    if let Err(e) = self.storage.put(partition, key, response) {
      self.diagnostics.record(Diagnostic::CacheWriteFailed {
        partition: partition.to_string(),
        key: key.to_string(),
        error: e.to_string(),
      });
    }
  }

  fn network_failed(&self, request: &Request, error: &color_eyre::Report) {
    self.diagnostics.record(Diagnostic::NetworkFailed {
      url: request.url.to_string(),
      error: error.to_string(),
    });
  }

  /// Network-first strategy.
  ///
  /// 1. Fetch from network; a 2xx response is copied into the dynamic partition
  /// 2. Any response that arrives is returned as-is, including error statuses
  /// 3. On transport failure, serve the cached record for the request
  /// 4. Otherwise serve the cached root document
  /// 5. Otherwise fail
  pub async fn network_first<F: Fetch>(&self, network: &F, request: &Request) -> Result<Served> {
    let key = CacheKey::for_request(request);

    match network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store(&self.dynamic_partition, &key, &response);
        }
        Ok(Served::from_network(response))
      }
      Err(e) => {
        self.network_failed(request, &e);

        if let Some(cached) = self.lookup(&key) {
          return Ok(Served::from_cache(cached));
        }

        if let Some(root) = self.lookup(&self.fallback) {
          debug!(url = %request.url, fallback = %self.fallback, "serving fallback document");
          return Ok(Served::fallback(root));
        }

        Err(e.wrap_err(format!("Offline and nothing cached for {}", request.url)))
      }
    }
  }

  /// Cache-first strategy.
  ///
  /// A cached record is returned without touching the network. On a miss
  /// the network response is returned (2xx copies go to the static
  /// partition); if the network is unreachable a 503 "Offline" is synthesized.
  pub async fn cache_first<F: Fetch>(&self, network: &F, request: &Request) -> Served {
    let key = CacheKey::for_request(request);

    if let Some(cached) = self.lookup(&key) {
      return Served::from_cache(cached);
    }

    match network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store(&self.static_partition, &key, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        self.network_failed(request, &e);
        Served::offline()
      }
    }
  }

  /// Stale-while-revalidate strategy.
  ///
  /// With a cached record, it is returned at once and the revalidating
  /// fetch runs in the returned task; the caller must keep that task alive
  /// until it finishes. Without one, the network outcome is returned
  /// directly, failures included.
  pub async fn stale_while_revalidate<F: Fetch>(
    &self,
    network: Arc<F>,
    request: &Request,
  ) -> Result<(Served, Option<JoinHandle<()>>)> {
    let key = CacheKey::for_request(request);

    if let Some(cached) = self.lookup(&key) {
      let layer = self.clone();
      let request = request.clone();
      let revalidation = tokio::spawn(async move {
        match network.fetch(&request).await {
          Ok(response) if response.ok() => {
            layer.store(&layer.dynamic_partition, &key, &response);
            debug!(url = %request.url, "revalidated");
          }
          Ok(response) => {
            debug!(url = %request.url, status = response.status, "revalidation not stored");
          }
          Err(e) => layer.network_failed(&request, &e),
        }
      });
      return Ok((Served::from_cache(cached), Some(revalidation)));
    }

    match network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store(&self.dynamic_partition, &key, &response);
        }
        Ok((Served::from_network(response), None))
      }
      Err(e) => {
        self.network_failed(request, &e);
        Err(e)
      }
    }
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      static_partition: self.static_partition.clone(),
      dynamic_partition: self.dynamic_partition.clone(),
      fallback: self.fallback.clone(),
      diagnostics: Arc::clone(&self.diagnostics),
    }
  }
}
