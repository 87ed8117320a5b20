//! Request and response descriptors shared by the agent, the cache and the network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Other(String),
}

impl Method {
  pub fn parse(s: &str) -> Self {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Self::Get,
      "HEAD" => Self::Head,
      "POST" => Self::Post,
      "PUT" => Self::Put,
      "PATCH" => Self::Patch,
      "DELETE" => Self::Delete,
      "OPTIONS" => Self::Options,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
      Self::Options => "OPTIONS",
      Self::Other(m) => m,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Case-insensitive header map. Names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: &str, value: impl Into<String>) {
    self.0.insert(name.to_ascii_lowercase(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
  }

  /// Add a value, joining repeated headers with ", ".
  pub fn append(&mut self, name: &str, value: &str) {
    self
      .0
      .entry(name.to_ascii_lowercase())
      .and_modify(|existing| {
        existing.push_str(", ");
        existing.push_str(value);
      })
      .or_insert_with(|| value.to_string());
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// An outgoing request issued by the hosted application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn parse_get(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL '{}': {}", url, e))?;
    Ok(Self::get(url))
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  /// Whether the request asks for an HTML document (a page navigation).
  pub fn accepts_html(&self) -> bool {
    self
      .headers
      .get("accept")
      .map(|accept| accept.to_ascii_lowercase().contains("text/html"))
      .unwrap_or(false)
  }
}

/// A captured response. Bodies are fully buffered so a response can be
/// stored and returned at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Headers::new(),
      body: body.into(),
    }
  }

  /// Synthesized response for a cache-first miss while offline.
  pub fn offline() -> Self {
    Self::new(503, b"Offline".to_vec()).with_header("content-type", "text/plain")
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  /// 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Network access used for manifest fetches, interception and revalidation.
///
/// An `Err` is a transport failure; HTTP error statuses are returned as
/// ordinary responses.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}
