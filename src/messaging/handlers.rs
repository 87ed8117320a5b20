//! Broadcast and bot-webhook logic, independent of the HTTP layer.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::telegram::{ChatId, MessageSender, OutgoingMessage, ReplyMarkup};
use crate::config::MessagingConfig;

// ============================================================================
// Broadcast
// ============================================================================

/// Body of a broadcast request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub message: String,
  pub url: Option<String>,
  pub chat_ids: Option<Vec<ChatId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
  Sent,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
  pub chat_id: ChatId,
  pub status: DeliveryStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
  pub ok: bool,
  pub sent: usize,
  pub failed: usize,
  pub results: Vec<Delivery>,
}

/// Reasons a broadcast is rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
  #[error("Missing required fields: title, message, chatIds")]
  MissingFields,
}

/// Message text for a broadcast.
pub fn broadcast_text(title: &str, message: &str, url: Option<&str>) -> String {
  let mut text = format!("🔔 {}\n\n{}", title, message);
  if let Some(url) = url {
    text.push_str(&format!("\n\n🔗 {}", url));
  }
  text
}

/// Send one notification to every listed chat. Chats are independent: a
/// failure for one is reported in its result and does not stop the rest.
pub async fn broadcast(
  sender: &dyn MessageSender,
  config: &MessagingConfig,
  request: BroadcastRequest,
) -> Result<BroadcastReport, BroadcastError> {
  let chat_ids = match request.chat_ids {
    Some(ids) if !request.title.is_empty() && !request.message.is_empty() => ids,
    _ => return Err(BroadcastError::MissingFields),
  };

  let url = request.url.as_deref().filter(|u| !u.is_empty());
  let text = broadcast_text(&request.title, &request.message, url);
  let markup = url.map(|u| ReplyMarkup::link(&config.webinar_button, u));

  let mut results = Vec::with_capacity(chat_ids.len());
  for chat_id in chat_ids {
    let mut message = OutgoingMessage::text(chat_id.clone(), text.clone());
    if let Some(markup) = &markup {
      message = message.with_markup(markup.clone());
    }

    let delivery = match sender.send(&message).await {
      Ok(()) => Delivery {
        chat_id,
        status: DeliveryStatus::Sent,
        error: None,
      },
      Err(e) => {
        warn!(%chat_id, error = %e, "broadcast delivery failed");
        Delivery {
          chat_id,
          status: DeliveryStatus::Failed,
          error: Some(e.to_string()),
        }
      }
    };
    results.push(delivery);
  }

  let sent = results
    .iter()
    .filter(|r| r.status == DeliveryStatus::Sent)
    .count();
  info!(sent, failed = results.len() - sent, "broadcast finished");

  Ok(BroadcastReport {
    ok: true,
    sent,
    failed: results.len() - sent,
    results,
  })
}

// ============================================================================
// Bot webhook
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Update {
  pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
  pub chat: Chat,
  pub from: Option<User>,
  pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
  pub id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct User {
  #[serde(default)]
  pub first_name: String,
  pub last_name: Option<String>,
  pub username: Option<String>,
}

/// Messages the bot sends in response to an update.
pub fn webhook_replies(update: &Update, config: &MessagingConfig) -> Vec<OutgoingMessage> {
  let Some(message) = &update.message else {
    return Vec::new();
  };
  let Some(text) = message.text.as_deref() else {
    return Vec::new();
  };
  let chat = ChatId::Id(message.chat.id);

  if text.starts_with("/start") {
    let default_user = User::default();
    let user = message.from.as_ref().unwrap_or(&default_user);

    let greeting = format!(
      "👋 Привет, {}!\n\n\
       Добро пожаловать в бот ПСБ Академии!\n\n\
       🔔 Теперь вы будете получать:\n\
       • Напоминания о вебинарах за 1 час\n\
       • Уведомления о новых материалах\n\
       • Важные обновления курса\n\n\
       📱 Откройте приложение: {}",
      user.first_name, config.app_url
    );

    let username = user
      .username
      .as_ref()
      .map(|u| format!("@{}", u))
      .unwrap_or_else(|| "не указан".to_string());
    let owner_notice = format!(
      "🆕 Новый подписчик!\n\n\
       👤 {} {}\n\
       🆔 Chat ID: {}\n\
       📱 Username: {}",
      user.first_name,
      user.last_name.as_deref().unwrap_or(""),
      message.chat.id,
      username
    );

    return vec![
      OutgoingMessage::text(chat, greeting),
      OutgoingMessage::text(ChatId::from(config.owner_chat_id.as_str()), owner_notice),
    ];
  }

  match text {
    "/help" => vec![OutgoingMessage::text(
      chat,
      format!(
        "📚 Команды бота:\n\n\
         /start - Подписаться на уведомления\n\
         /schedule - Расписание вебинаров\n\
         /help - Список команд\n\n\
         🌐 Приложение: {}",
        config.app_url
      ),
    )],
    "/schedule" => vec![OutgoingMessage::text(
      chat,
      format!(
        "📅 Расписание вебинаров:\n\n{}\n\n🔗 Подробнее: {}",
        config.schedule.join("\n"),
        config.app_url
      ),
    )],
    _ => Vec::new(),
  }
}

/// Answer an update. Send failures are logged; the webhook always succeeds.
pub async fn handle_update(sender: &dyn MessageSender, config: &MessagingConfig, update: &Update) {
  for reply in webhook_replies(update, config) {
    if let Err(e) = sender.send(&reply).await {
      warn!(chat_id = %reply.chat_id, error = %e, "webhook reply failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::messaging::testing::RecordingSender;

  fn request(json: &str) -> BroadcastRequest {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_broadcast_text() {
    assert_eq!(broadcast_text("Webinar", "Starts soon", None), "🔔 Webinar\n\nStarts soon");
    assert_eq!(
      broadcast_text("Webinar", "Starts soon", Some("https://meet.example.com")),
      "🔔 Webinar\n\nStarts soon\n\n🔗 https://meet.example.com"
    );
  }

  #[tokio::test]
  async fn test_broadcast_reports_each_chat() {
    let sender = RecordingSender::failing_for(&[ChatId::Id(2)]);
    let report = broadcast(
      &sender,
      &MessagingConfig::default(),
      request(r#"{"title":"T","message":"M","url":"https://meet.example.com","chatIds":[1,2,"@c"]}"#),
    )
    .await
    .unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.results[1].status, DeliveryStatus::Failed);
    assert_eq!(report.results[1].error.as_deref(), Some("chat 2 is unreachable"));

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
      sent[0].reply_markup,
      Some(ReplyMarkup::link("📺 Перейти к вебинару", "https://meet.example.com"))
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"][0], serde_json::json!({"chatId": 1, "status": "sent"}));
  }

  #[tokio::test]
  async fn test_broadcast_without_url_has_no_keyboard() {
    let sender = RecordingSender::default();
    broadcast(
      &sender,
      &MessagingConfig::default(),
      request(r#"{"title":"T","message":"M","chatIds":[1]}"#),
    )
    .await
    .unwrap();

    assert_eq!(sender.sent()[0].reply_markup, None);
    assert_eq!(sender.sent()[0].text, "🔔 T\n\nM");
  }

  #[tokio::test]
  async fn test_broadcast_rejects_missing_fields() {
    let sender = RecordingSender::default();
    for body in [
      r#"{"message":"M","chatIds":[1]}"#,
      r#"{"title":"","message":"M","chatIds":[1]}"#,
      r#"{"title":"T","chatIds":[1]}"#,
      r#"{"title":"T","message":"M"}"#,
    ] {
      let result = broadcast(&sender, &MessagingConfig::default(), request(body)).await;
      assert_eq!(result, Err(BroadcastError::MissingFields), "{}", body);
    }
    assert!(sender.sent().is_empty());
  }

  fn update(json: &str) -> Update {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_start_greets_user_and_notifies_owner() {
    let replies = webhook_replies(
      &update(r#"{"message":{"chat":{"id":77},"from":{"first_name":"Anna","username":"anna"},"text":"/start promo"}}"#),
      &MessagingConfig::default(),
    );

    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].chat_id, ChatId::Id(77));
    assert!(replies[0].text.starts_with("👋 Привет, Anna!"));
    assert!(replies[0].text.ends_with("https://ostst.github.io/prompt/"));
    assert_eq!(replies[1].chat_id, ChatId::Id(430657787));
    assert!(replies[1].text.contains("🆔 Chat ID: 77"));
    assert!(replies[1].text.contains("📱 Username: @anna"));
  }

  #[test]
  fn test_start_without_username() {
    let replies = webhook_replies(
      &update(r#"{"message":{"chat":{"id":5},"from":{"first_name":"Ivan","last_name":"P"},"text":"/start"}}"#),
      &MessagingConfig::default(),
    );
    assert!(replies[1].text.contains("👤 Ivan P"));
    assert!(replies[1].text.contains("Username: не указан"));
  }

  #[test]
  fn test_help_and_schedule() {
    let config = MessagingConfig::default();

    let replies = webhook_replies(&update(r#"{"message":{"chat":{"id":1},"text":"/help"}}"#), &config);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("/schedule - Расписание вебинаров"));

    let replies = webhook_replies(&update(r#"{"message":{"chat":{"id":1},"text":"/schedule"}}"#), &config);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("1️⃣ 27.01 в 12:00 - Введение в ИИ"));
    assert!(replies[0].text.contains("9️⃣ 19.03 в 10:00 - Внедрение ИИ в ПСБ"));
  }

  #[test]
  fn test_other_updates_are_ignored() {
    let config = MessagingConfig::default();
    assert!(webhook_replies(&update(r#"{"message":{"chat":{"id":1},"text":"hello"}}"#), &config).is_empty());
    assert!(webhook_replies(&update(r#"{"message":{"chat":{"id":1}}}"#), &config).is_empty());
    assert!(webhook_replies(&update(r#"{"edited_message":{}}"#), &config).is_empty());
  }

  #[tokio::test]
  async fn test_handle_update_survives_send_failures() {
    let sender = RecordingSender::failing_for(&[ChatId::Id(430657787)]);
    handle_update(
      &sender,
      &MessagingConfig::default(),
      &update(r#"{"message":{"chat":{"id":9},"from":{"first_name":"A"},"text":"/start"}}"#),
    )
    .await;

    assert_eq!(sender.sent().len(), 1);
    assert_eq!(sender.sent()[0].chat_id, ChatId::Id(9));
  }
}
