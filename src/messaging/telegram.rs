//! Minimal Telegram Bot API client: just `sendMessage`.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A Telegram chat: numeric id or `@channel` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
  Id(i64),
  Name(String),
}

impl fmt::Display for ChatId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{}", id),
      Self::Name(name) => f.write_str(name),
    }
  }
}

impl From<&str> for ChatId {
  fn from(s: &str) -> Self {
    s.parse().map(Self::Id).unwrap_or_else(|_| Self::Name(s.to_string()))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
  pub text: String,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyMarkup {
  pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl ReplyMarkup {
  /// A keyboard with a single link button.
  pub fn link(text: &str, url: &str) -> Self {
    Self {
      inline_keyboard: vec![vec![InlineButton {
        text: text.to_string(),
        url: url.to_string(),
      }]],
    }
  }
}

/// Body of a `sendMessage` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
  pub chat_id: ChatId,
  pub text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parse_mode: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reply_markup: Option<ReplyMarkup>,
}

impl OutgoingMessage {
  pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
    Self {
      chat_id,
      text: text.into(),
      parse_mode: None,
      reply_markup: None,
    }
  }

  pub fn html(mut self) -> Self {
    self.parse_mode = Some("HTML".to_string());
    self
  }

  pub fn with_markup(mut self, markup: ReplyMarkup) -> Self {
    self.reply_markup = Some(markup);
    self
  }
}

/// Anything that can deliver a chat message.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
  async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
  ok: bool,
  description: Option<String>,
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
  http: reqwest::Client,
  send_url: String,
}

impl TelegramClient {
  pub fn new(api_base: &str, token: &str) -> Result<Self> {
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      send_url: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
    })
  }
}

#[async_trait]
impl MessageSender for TelegramClient {
  async fn send(&self, message: &OutgoingMessage) -> Result<()> {
    // The URL embeds the bot token; keep it out of error messages
    let response = self
      .http
      .post(&self.send_url)
      .json(message)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach Telegram: {}", e.without_url()))?;

    let status = response.status();
    let body: ApiResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Invalid Telegram response ({}): {}", status, e.without_url()))?;

    if !status.is_success() || !body.ok {
      return Err(eyre!(
        "Telegram rejected message to {}: {}",
        message.chat_id,
        body.description.unwrap_or_else(|| status.to_string())
      ));
    }

    debug!(chat_id = %message.chat_id, "message sent");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_chat_id_accepts_numbers_and_names() {
    let ids: Vec<ChatId> = serde_json::from_str(r#"[430657787, "@psb_academy", -100123]"#).unwrap();
    assert_eq!(
      ids,
      vec![
        ChatId::Id(430657787),
        ChatId::Name("@psb_academy".to_string()),
        ChatId::Id(-100123)
      ]
    );
    assert_eq!(ChatId::from("430657787"), ChatId::Id(430657787));
    assert_eq!(ChatId::from("@channel").to_string(), "@channel");
  }

  #[test]
  fn test_outgoing_message_omits_empty_fields() {
    let message = OutgoingMessage::text(ChatId::Id(1), "hi");
    assert_eq!(
      serde_json::to_value(&message).unwrap(),
      serde_json::json!({"chat_id": 1, "text": "hi"})
    );

    let message = OutgoingMessage::text(ChatId::Id(1), "hi")
      .html()
      .with_markup(ReplyMarkup::link("Open", "https://example.com"));
    assert_eq!(
      serde_json::to_value(&message).unwrap(),
      serde_json::json!({
        "chat_id": 1,
        "text": "hi",
        "parse_mode": "HTML",
        "reply_markup": {"inline_keyboard": [[{"text": "Open", "url": "https://example.com"}]]}
      })
    );
  }
}
