//! Network access over reqwest.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use crate::http::{Fetch, Headers, Method, Request, Response};

/// Fetches requests over the real network.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offline-agent/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest_method(method: &Method) -> Result<reqwest::Method> {
  reqwest::Method::from_bytes(method.as_str().as_bytes())
    .map_err(|e| eyre!("Invalid HTTP method '{}': {}", method, e))
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(to_reqwest_method(&request.method)?, request.url.clone());
    for (name, value) in request.headers.iter() {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers.append(name.as_str(), value);
      }
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    debug!(url = %request.url, status, bytes = body.len(), "fetched");

    let mut captured = Response::new(status, body.to_vec());
    captured.headers = headers;
    Ok(captured)
  }
}
