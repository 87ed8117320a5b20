//! The offline cache agent.
//!
//! The agent reacts to the host's lifecycle events:
//! - install: cache the manifest into this version's static partition
//! - activate: purge partitions of other versions and take control
//! - fetch: classify each request and serve it with a freshness strategy
//! - push / notification click: show and follow notifications
//! - sync: run the background sync extension point

mod classify;

pub use classify::{classify, RequestClass, Strategy};

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheLayer, CacheStore, Served};
use crate::config::{AgentConfig, Config, NotificationConfig};
use crate::diagnostics::{Diagnostic, SharedDiagnostics};
use crate::host::Host;
use crate::http::{Fetch, Request};
use crate::notification::{Notification, NotificationClick, PushEvent};

/// Outcome of intercepting a request.
#[derive(Debug)]
pub enum Interception {
  /// Not handled by the agent; the host performs the request itself.
  Passthrough(RequestClass),
  /// The agent answers the request.
  Respond {
    served: Served,
    strategy: Strategy,
    /// Background revalidation the host must keep the agent alive for
    revalidation: Option<JoinHandle<()>>,
  },
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// An open window was navigated and focused
  Focused(String),
  /// A new window was opened
  Opened,
}

/// Work run when the host fires the background sync tag.
#[async_trait]
pub trait SyncTask: Send + Sync {
  async fn run(&self) -> Result<()>;
}

/// Placeholder sync task: progress is not synchronized anywhere yet.
#[derive(Debug, Default)]
pub struct NoopSync;

#[async_trait]
impl SyncTask for NoopSync {
  async fn run(&self) -> Result<()> {
    info!("syncing progress");
    Ok(())
  }
}

/// One handler per lifecycle event the host dispatches.
#[async_trait]
pub trait Lifecycle {
  /// Cache the manifest. Fails if any asset cannot be fetched.
  async fn install(&self) -> Result<()>;

  /// Purge superseded partitions and claim clients. Returns the removed
  /// partition names. Fails without deleting anything if this version was
  /// never installed.
  async fn activate(&self) -> Result<Vec<String>>;

  async fn fetch(&self, request: Request) -> Result<Interception>;

  async fn push(&self, event: PushEvent) -> Result<Notification>;

  async fn notification_click(&self, event: NotificationClick) -> Result<ClickOutcome>;

  /// Returns whether the tag was recognized.
  async fn sync(&self, tag: &str) -> Result<bool>;
}

/// Offline cache agent for one deployed version.
pub struct OfflineAgent<S: CacheStore, F: Fetch, H: Host> {
  config: Arc<AgentConfig>,
  notification: Arc<NotificationConfig>,
  cache: CacheLayer<S>,
  network: Arc<F>,
  host: Arc<H>,
  sync_task: Arc<dyn SyncTask>,
  diagnostics: SharedDiagnostics,
}

impl<S: CacheStore, F: Fetch, H: Host> OfflineAgent<S, F, H> {
  pub fn new(
    config: &Config,
    storage: Arc<S>,
    network: Arc<F>,
    host: Arc<H>,
    diagnostics: SharedDiagnostics,
  ) -> Result<Self> {
    let cache = CacheLayer::new(storage, &config.agent, Arc::clone(&diagnostics))?;

    Ok(Self {
      config: Arc::new(config.agent.clone()),
      notification: Arc::new(config.notification.clone()),
      cache,
      network,
      host,
      sync_task: Arc::new(NoopSync),
      diagnostics,
    })
  }

  /// Replace the background sync task.
  #[allow(dead_code)]
  pub fn with_sync_task(mut self, task: Arc<dyn SyncTask>) -> Self {
    self.sync_task = task;
    self
  }

  pub fn config(&self) -> &AgentConfig {
    &self.config
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }
}

#[async_trait]
impl<S: CacheStore, F: Fetch, H: Host> Lifecycle for OfflineAgent<S, F, H> {
  async fn install(&self) -> Result<()> {
    let urls = self.config.manifest_urls()?;
    info!(version = %self.config.version, assets = urls.len(), "installing");

    let fetches = urls.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| e.wrap_err(format!("Failed to fetch manifest asset {}", url)))?;
      if !response.ok() {
        return Err(eyre!(
          "Manifest asset {} returned status {}",
          url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((CacheKey::get(url), response))
    });

    // Nothing is written unless every asset arrived
    let entries = futures::future::try_join_all(fetches).await?;

    self
      .cache
      .storage()
      .put_all(self.cache.static_partition(), &entries)
      .map_err(|e| e.wrap_err("Failed to store manifest"))?;

    info!(partition = %self.cache.static_partition(), "install complete");
    self.host.skip_waiting();
    Ok(())
  }

  async fn activate(&self) -> Result<Vec<String>> {
    info!(version = %self.config.version, "activating");
    let live = [self.cache.static_partition(), self.cache.dynamic_partition()];

    // Nothing is purged unless this version is installed
    let partitions = self.cache.storage().partitions()?;
    if !partitions
      .iter()
      .any(|p| p == self.cache.static_partition())
    {
      return Err(eyre!(
        "Cannot activate {}: partition {} is not installed",
        self.config.version,
        self.cache.static_partition()
      ));
    }

    let mut removed = Vec::new();
    for partition in partitions {
      if live.contains(&partition.as_str()) {
        continue;
      }
      self.cache.storage().delete_partition(&partition)?;
      self.diagnostics.record(Diagnostic::PartitionRemoved {
        partition: partition.clone(),
      });
      removed.push(partition);
    }

    self.host.claim_clients();
    Ok(removed)
  }

  async fn fetch(&self, request: Request) -> Result<Interception> {
    let class = classify(&self.config, &request);
    let Some(strategy) = class.strategy() else {
      debug!(url = %request.url, ?class, "passing through");
      return Ok(Interception::Passthrough(class));
    };

    debug!(url = %request.url, %strategy, "intercepting");
    let (served, revalidation) = match strategy {
      Strategy::NetworkFirst => (
        self
          .cache
          .network_first(self.network.as_ref(), &request)
          .await?,
        None,
      ),
      Strategy::CacheFirst => (
        self
          .cache
          .cache_first(self.network.as_ref(), &request)
          .await,
        None,
      ),
      Strategy::StaleWhileRevalidate => {
        self
          .cache
          .stale_while_revalidate(Arc::clone(&self.network), &request)
          .await?
      }
    };

    Ok(Interception::Respond {
      served,
      strategy,
      revalidation,
    })
  }

  async fn push(&self, event: PushEvent) -> Result<Notification> {
    info!("push received");
    let notification = Notification::from_push(
      &event,
      &self.notification,
      &self.config,
      self.diagnostics.as_ref(),
    )?;
    self.host.show_notification(&notification)?;
    Ok(notification)
  }

  async fn notification_click(&self, event: NotificationClick) -> Result<ClickOutcome> {
    let notification = event.notification;
    self.host.close_notification(&notification.tag)?;

    let origin = self.config.origin_url()?.origin();
    let existing = self
      .host
      .windows()?
      .into_iter()
      .find(|window| window.url.origin() == origin);

    match existing {
      Some(window) => {
        self.host.navigate(&window, &notification.url)?;
        self.host.focus(&window)?;
        Ok(ClickOutcome::Focused(window.id))
      }
      None => {
        self.host.open_window(&notification.url)?;
        Ok(ClickOutcome::Opened)
      }
    }
  }

  async fn sync(&self, tag: &str) -> Result<bool> {
    if tag != self.config.sync_tag {
      debug!(%tag, "ignoring unknown sync tag");
      return Ok(false);
    }

    info!(%tag, "background sync");
    self.sync_task.run().await?;
    Ok(true)
  }
}
