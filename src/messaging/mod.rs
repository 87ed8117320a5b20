//! Outbound messaging through the Telegram Bot API.
//!
//! - `Notifier`: fire-and-forget event sink used for telemetry
//! - broadcast: one notification to many chats (`/api/send-notification`)
//! - webhook: bot command replies (`/api/telegram-webhook`)

pub mod handlers;
mod notifier;
pub mod server;
mod telegram;

pub use notifier::{ChatNotifier, Notifier};
pub use telegram::{ChatId, TelegramClient};
