//! Fakes for the agent's collaborators.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use url::Url;

use crate::host::{ClientWindow, Host};
use crate::http::{Fetch, Request, Response};
use crate::notification::Notification;

/// Network with canned responses per URL. Unknown URLs fail like an
/// unreachable server.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  calls: Mutex<Vec<String>>,
  gate: Option<Arc<Semaphore>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every fetch waits for a permit on `gate` before answering.
  pub fn gated(gate: Arc<Semaphore>) -> Self {
    Self {
      gate: Some(gate),
      ..Self::default()
    }
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(Url::parse(url).unwrap().to_string(), response);
  }

  pub fn fail(&self, url: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .remove(&Url::parse(url).unwrap().to_string());
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl Fetch for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.url.to_string());

    if let Some(gate) = &self.gate {
      gate.acquire().await.unwrap().forget();
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("connection refused: {}", request.url))
  }
}

/// Everything a `FakeHost` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
  SkipWaiting,
  ClaimClients,
  Navigate(String, String),
  Focus(String),
  OpenWindow(String),
  ShowNotification(String),
  CloseNotification(String),
}

#[derive(Default)]
pub struct FakeHost {
  windows: Mutex<Vec<ClientWindow>>,
  calls: Mutex<Vec<HostCall>>,
  notifications: Mutex<Vec<Notification>>,
}

impl FakeHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_window(self, id: &str, url: &str) -> Self {
    self.windows.lock().unwrap().push(ClientWindow {
      id: id.to_string(),
      url: Url::parse(url).unwrap(),
    });
    self
  }

  pub fn calls(&self) -> Vec<HostCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn notifications(&self) -> Vec<Notification> {
    self.notifications.lock().unwrap().clone()
  }

  fn record(&self, call: HostCall) {
    self.calls.lock().unwrap().push(call);
  }
}

impl Host for FakeHost {
  fn skip_waiting(&self) {
    self.record(HostCall::SkipWaiting);
  }

  fn claim_clients(&self) {
    self.record(HostCall::ClaimClients);
  }

  fn windows(&self) -> Result<Vec<ClientWindow>> {
    Ok(self.windows.lock().unwrap().clone())
  }

  fn navigate(&self, window: &ClientWindow, url: &Url) -> Result<()> {
    self.record(HostCall::Navigate(window.id.clone(), url.to_string()));
    Ok(())
  }

  fn focus(&self, window: &ClientWindow) -> Result<()> {
    self.record(HostCall::Focus(window.id.clone()));
    Ok(())
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    self.record(HostCall::OpenWindow(url.to_string()));
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.record(HostCall::ShowNotification(notification.tag.clone()));
    self
      .notifications
      .lock()
      .unwrap()
      .push(notification.clone());
    Ok(())
  }

  fn close_notification(&self, tag: &str) -> Result<()> {
    self.record(HostCall::CloseNotification(tag.to_string()));
    Ok(())
  }
}
