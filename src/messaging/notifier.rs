use async_trait::async_trait;
use std::sync::Arc;

use super::telegram::{ChatId, MessageSender, OutgoingMessage};
use crate::diagnostics::{Diagnostic, SharedDiagnostics};

/// Fire-and-forget event sink. Callers never observe delivery failures.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, event: &str);
}

/// Forwards events to one chat as HTML messages.
pub struct ChatNotifier {
  sender: Arc<dyn MessageSender>,
  chat_id: ChatId,
  diagnostics: SharedDiagnostics,
}

impl ChatNotifier {
  pub fn new(sender: Arc<dyn MessageSender>, chat_id: ChatId, diagnostics: SharedDiagnostics) -> Self {
    Self {
      sender,
      chat_id,
      diagnostics,
    }
  }
}

#[async_trait]
impl Notifier for ChatNotifier {
  async fn notify(&self, event: &str) {
    let message = OutgoingMessage::text(self.chat_id.clone(), event).html();
    if let Err(e) = self.sender.send(&message).await {
      self.diagnostics.record(Diagnostic::NotifyFailed {
        chat_id: self.chat_id.to_string(),
        error: e.to_string(),
      });
    }
  }
}
