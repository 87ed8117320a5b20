//! Core types for the partitioned response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::http::{Method, Request, Response};

/// Normalized identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  pub method: String,
  pub url: String,
}

impl CacheKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.to_string(),
    }
  }

  pub fn for_request(request: &Request) -> Self {
    Self::new(&request.method, &request.url)
  }

  /// Key for a plain GET of `url`, used for manifest entries and fallbacks.
  pub fn get(url: &Url) -> Self {
    Self::new(&Method::Get, url)
  }

  /// SHA256 of the key, stable and fixed-length for storage.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A stored response together with its capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// A response handed back to the application, with metadata about its source.
#[derive(Debug, Clone)]
pub struct Served {
  /// The response itself
  pub response: Response,
  /// Where the response came from
  pub source: ServedFrom,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  /// A live response from the network.
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ServedFrom::Network,
      cached_at: None,
    }
  }

  /// The cached record for the request itself.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ServedFrom::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// The cached root document, served in place of a failed navigation.
  pub fn fallback(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ServedFrom::Fallback,
      cached_at: Some(cached.cached_at),
    }
  }

  /// The synthesized 503 offline response.
  pub fn offline() -> Self {
    Self {
      response: Response::offline(),
      source: ServedFrom::Offline,
      cached_at: None,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Fresh data from network
  Network,
  /// Cached record for this exact request
  Cache,
  /// Cached root document standing in for a failed page
  Fallback,
  /// Network unavailable and nothing cached
  Offline,
}

impl fmt::Display for ServedFrom {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Fallback => "fallback",
      Self::Offline => "offline",
    };
    f.write_str(s)
  }
}
