//! Push payload parsing and the notifications built from it.

use color_eyre::Result;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::{AgentConfig, NotificationConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};

/// A push message delivered to the agent.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
  pub data: Option<Vec<u8>>,
}

impl PushEvent {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
    Self {
      data: Some(data.into()),
    }
  }
}

/// Fields a push payload may override. Missing fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  badge: Option<String>,
  url: Option<String>,
}

/// An OS-level notification as shown by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Deduplication tag
  pub tag: String,
  /// Alert again when replacing a notification with the same tag
  pub renotify: bool,
  /// Opened when the notification is clicked
  pub url: Url,
}

/// A click on a previously shown notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
  pub notification: Notification,
}

impl Notification {
  /// Build the notification for a push event.
  ///
  /// A JSON object payload overrides the defaults field by field; any other
  /// JSON value keeps them. A payload that is not JSON becomes the body as
  /// plain text. Never fails because of the payload itself.
  pub fn from_push(
    event: &PushEvent,
    defaults: &NotificationConfig,
    agent: &AgentConfig,
    diagnostics: &dyn Diagnostics,
  ) -> Result<Self> {
    let mut payload = PushPayload::default();

    if let Some(data) = event.data.as_deref() {
      if !data.iter().all(u8::is_ascii_whitespace) {
        let parsed = serde_json::from_slice::<Value>(data).and_then(|value| match value {
          Value::Object(_) => serde_json::from_value::<PushPayload>(value),
          _ => Ok(PushPayload::default()),
        });
        match parsed {
          Ok(parsed) => payload = parsed,
          Err(e) => {
            diagnostics.record(Diagnostic::MalformedPushPayload {
              error: e.to_string(),
            });
            payload.body = Some(String::from_utf8_lossy(data).into_owned());
          }
        }
      }
    }

    let home = agent.resolve("/")?;
    let url = payload
      .url
      .as_deref()
      .and_then(|u| agent.resolve(u).ok())
      .unwrap_or(home);

    Ok(Self {
      title: payload.title.unwrap_or_else(|| defaults.title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.body.clone()),
      icon: resolve_asset(agent, payload.icon.as_deref().unwrap_or(&defaults.icon)),
      badge: resolve_asset(agent, payload.badge.as_deref().unwrap_or(&defaults.badge)),
      vibrate: defaults.vibrate.clone(),
      tag: defaults.tag.clone(),
      renotify: true,
      url,
    })
  }
}

fn resolve_asset(agent: &AgentConfig, path: &str) -> String {
  agent
    .resolve(path)
    .map(|u| u.to_string())
    .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diagnostics::RecordingDiagnostics;

  fn build(event: PushEvent) -> (Notification, Vec<Diagnostic>) {
    let diagnostics = RecordingDiagnostics::default();
    let notification = Notification::from_push(
      &event,
      &NotificationConfig::default(),
      &AgentConfig::default(),
      &diagnostics,
    )
    .unwrap();
    (notification, diagnostics.events())
  }

  #[test]
  fn test_json_payload_overrides_title_and_body() {
    let (n, diagnostics) = build(PushEvent::with_data(r#"{"title":"T","body":"B"}"#));

    assert_eq!(n.title, "T");
    assert_eq!(n.body, "B");
    assert_eq!(n.icon, "https://ostst.github.io/prompt/img/app-icon.png");
    assert_eq!(n.badge, "https://ostst.github.io/prompt/img/app-icon.png");
    assert_eq!(n.vibrate, vec![200, 100, 200]);
    assert_eq!(n.tag, "psb-notification");
    assert!(n.renotify);
    assert_eq!(n.url.as_str(), "https://ostst.github.io/prompt/");
    assert!(diagnostics.is_empty());
  }

  #[test]
  fn test_missing_payload_uses_defaults() {
    let (n, _) = build(PushEvent::empty());
    assert_eq!(n.title, "ПСБ Академия");
    assert_eq!(n.body, "Новое уведомление");

    let (n, _) = build(PushEvent::with_data("  "));
    assert_eq!(n.body, "Новое уведомление");
  }

  #[test]
  fn test_plain_text_payload_becomes_body() {
    let (n, diagnostics) = build(PushEvent::with_data("Webinar starts in 1 hour"));

    assert_eq!(n.title, "ПСБ Академия");
    assert_eq!(n.body, "Webinar starts in 1 hour");
    assert!(matches!(
      diagnostics.as_slice(),
      [Diagnostic::MalformedPushPayload { .. }]
    ));
  }

  #[test]
  fn test_non_object_json_keeps_defaults() {
    for data in ["null", "[]", "\"x\"", "42"] {
      let (n, diagnostics) = build(PushEvent::with_data(data));
      assert_eq!(n.title, "ПСБ Академия", "{}", data);
      assert_eq!(n.body, "Новое уведомление", "{}", data);
      assert!(diagnostics.is_empty(), "{}", data);
    }
  }

  #[test]
  fn test_payload_url_is_resolved() {
    let (n, _) = build(PushEvent::with_data(r#"{"url":"/materials.html"}"#));
    assert_eq!(n.url.as_str(), "https://ostst.github.io/prompt/materials.html");

    let (n, _) = build(PushEvent::with_data(r#"{"url":"https://t.me/webinar"}"#));
    assert_eq!(n.url.as_str(), "https://t.me/webinar");
  }
}
