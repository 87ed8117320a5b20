//! The environment hosting the agent: windows, notifications and lifecycle signals.

use color_eyre::Result;
use tracing::info;
use url::Url;

use crate::notification::Notification;

/// An open application window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
  pub id: String,
  pub url: Url,
}

/// Callbacks the agent makes into its host.
pub trait Host: Send + Sync + 'static {
  /// Let a freshly installed version activate without waiting for open
  /// application instances to close.
  fn skip_waiting(&self);

  /// Take control of all open application instances.
  fn claim_clients(&self);

  /// Open application windows, controlled or not.
  fn windows(&self) -> Result<Vec<ClientWindow>>;

  fn navigate(&self, window: &ClientWindow, url: &Url) -> Result<()>;

  /// Bring a window to the foreground.
  fn focus(&self, window: &ClientWindow) -> Result<()>;

  fn open_window(&self, url: &Url) -> Result<()>;

  /// Display an OS-level notification, replacing any with the same tag.
  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self, tag: &str) -> Result<()>;
}

/// Host used by the command line: there are no windows, and every
/// request to the host is reported on stdout.
#[derive(Debug, Default)]
pub struct ConsoleHost;

impl Host for ConsoleHost {
  fn skip_waiting(&self) {
    info!("skip waiting requested");
  }

  fn claim_clients(&self) {
    info!("claiming clients");
  }

  fn windows(&self) -> Result<Vec<ClientWindow>> {
    Ok(Vec::new())
  }

  fn navigate(&self, window: &ClientWindow, url: &Url) -> Result<()> {
    println!("navigate {} -> {}", window.id, url);
    Ok(())
  }

  fn focus(&self, window: &ClientWindow) -> Result<()> {
    println!("focus {}", window.id);
    Ok(())
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    println!("open window {}", url);
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    println!("[{}] {}", notification.tag, notification.title);
    println!("{}", notification.body);
    println!("icon: {}  badge: {}", notification.icon, notification.badge);
    println!("vibrate: {:?}  renotify: {}", notification.vibrate, notification.renotify);
    println!("url: {}", notification.url);
    Ok(())
  }

  fn close_notification(&self, tag: &str) -> Result<()> {
    info!(%tag, "notification closed");
    Ok(())
  }
}
