use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub agent: AgentConfig,
  #[serde(default)]
  pub notification: NotificationConfig,
  #[serde(default)]
  pub messaging: MessagingConfig,
}

/// Everything that identifies one deployed version of the offline agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
  /// Origin the application is served from
  pub origin: String,
  /// Path prefix all application assets live under (e.g. "/prompt")
  pub base_path: String,
  /// Prefix shared by all partition names of this application
  pub cache_prefix: String,
  /// Version suffix; bumping it makes activation purge older partitions
  pub version: String,
  /// Assets that must be cached at install time
  pub manifest: Vec<String>,
  /// Hosts whose requests are never intercepted (suffix match)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub excluded_hosts: BTreeSet<String>,
  /// Path extensions served cache-first
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub static_extensions: BTreeSet<String>,
  /// Document served when a page navigation fails with nothing cached
  pub fallback_document: String,
  /// Background sync tag handled by the agent
  pub sync_tag: String,
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Default for AgentConfig {
  fn default() -> Self {
    let manifest = [
      "/",
      "/index.html",
      "/program_info.html",
      "/course_program.html",
      "/faq.html",
      "/platform_info.html",
      "/materials.html",
      "/glossary.html",
      "/stats.html",
      "/settings.html",
      "/chat.html",
      "/css/styles.css",
      "/js/app.js",
      "/manifest.json",
      "/img/app-icon.png",
      "/img/Hero.png",
      "/img/hero_lk.png",
      "/img/hero menu.png",
      "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
      "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.1/css/all.min.css",
    ];
    let static_extensions = [
      ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".woff", ".woff2",
    ];

    Self {
      origin: "https://ostst.github.io".to_string(),
      base_path: "/prompt".to_string(),
      cache_prefix: "psb".to_string(),
      version: "v3".to_string(),
      manifest: manifest.iter().map(|s| s.to_string()).collect(),
      excluded_hosts: ["telegram.org", "onesignal.com"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      static_extensions: static_extensions.iter().map(|s| s.to_string()).collect(),
      fallback_document: "/index.html".to_string(),
      sync_tag: "sync-progress".to_string(),
    }
  }
}

impl AgentConfig {
  /// Name of the static partition for this version.
  pub fn static_partition(&self) -> String {
    format!("{}-static-{}", self.cache_prefix, self.version)
  }

  /// Name of the dynamic partition for this version.
  pub fn dynamic_partition(&self) -> String {
    format!("{}-dynamic-{}", self.cache_prefix, self.version)
  }

  /// Resolve an application path or absolute URL.
  ///
  /// Absolute URLs are returned as-is; anything else is taken relative to
  /// `base_path` on `origin`.
  pub fn resolve(&self, entry: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(entry) {
      return Ok(url);
    }

    let base = self.base_path.trim_end_matches('/');
    let path = if entry.starts_with('/') {
      format!("{}{}", base, entry)
    } else {
      format!("{}/{}", base, entry)
    };

    self
      .origin_url()?
      .join(&path)
      .map_err(|e| eyre!("Invalid application path '{}': {}", entry, e))
  }

  /// The configured origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// All manifest entries as absolute URLs.
  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    self.manifest.iter().map(|m| self.resolve(m)).collect()
  }

  /// Whether requests to this host bypass the agent.
  pub fn is_excluded_host(&self, host: &str) -> bool {
    let host = host.to_lowercase();
    self
      .excluded_hosts
      .iter()
      .any(|excluded| host == *excluded || host.ends_with(&format!(".{}", excluded)))
  }
}

/// Defaults for push notifications.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub body: String,
  /// Icon path, resolved like a manifest entry
  pub icon: String,
  pub badge: String,
  /// Deduplication tag; a new notification with the same tag replaces the old one
  pub tag: String,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "ПСБ Академия".to_string(),
      body: "Новое уведомление".to_string(),
      icon: "/img/app-icon.png".to_string(),
      badge: "/img/app-icon.png".to_string(),
      tag: "psb-notification".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
  /// Base URL of the Telegram Bot API
  pub api_base: String,
  /// Chat that receives telemetry and new-subscriber notices
  pub owner_chat_id: String,
  /// Public URL of the application, linked from bot replies
  pub app_url: String,
  /// Label of the inline button attached to broadcasts with a URL
  pub webinar_button: String,
  /// Lines of the /schedule reply
  pub schedule: Vec<String>,
}

impl Default for MessagingConfig {
  fn default() -> Self {
    let schedule = [
      "1️⃣ 27.01 в 12:00 - Введение в ИИ",
      "2️⃣ 29.01 в 10:00 - Китайские ИИ-сервисы",
      "3️⃣ 05.02 в 12:00 - Чат-боты и ИИ-агенты",
      "4️⃣ 12.02 в 10:00 - Нейросети в дизайне",
      "5️⃣ 19.02 в 10:00 - Генерация изображений",
      "6️⃣ 26.02 в 10:00 - Анимация и видео",
      "7️⃣ 05.03 в 10:00 - Обработка аудио",
      "8️⃣ 12.03 в 10:00 - ИИ в банковской сфере",
      "9️⃣ 19.03 в 10:00 - Внедрение ИИ в ПСБ",
    ];

    Self {
      api_base: "https://api.telegram.org".to_string(),
      owner_chat_id: "430657787".to_string(),
      app_url: "https://ostst.github.io/prompt/".to_string(),
      webinar_button: "📺 Перейти к вебинару".to_string(),
      schedule: schedule.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-agent.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-agent/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offline-agent.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-agent").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the Telegram bot token from environment variables.
  ///
  /// Checks OFFLINE_AGENT_BOT_TOKEN first, then TELEGRAM_BOT_TOKEN as fallback.
  pub fn get_bot_token() -> Result<String> {
    std::env::var("OFFLINE_AGENT_BOT_TOKEN")
      .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
      .map_err(|_| {
        eyre!("Bot token not found. Set OFFLINE_AGENT_BOT_TOKEN or TELEGRAM_BOT_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partition_names_include_version() {
    let config = AgentConfig::default();
    assert_eq!(config.static_partition(), "psb-static-v3");
    assert_eq!(config.dynamic_partition(), "psb-dynamic-v3");
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let config = AgentConfig::default();
    assert_eq!(
      config.resolve("/index.html").unwrap().as_str(),
      "https://ostst.github.io/prompt/index.html"
    );
    assert_eq!(
      config.resolve("/").unwrap().as_str(),
      "https://ostst.github.io/prompt/"
    );
    assert_eq!(
      config.resolve("/img/hero menu.png").unwrap().as_str(),
      "https://ostst.github.io/prompt/img/hero%20menu.png"
    );
    assert_eq!(
      config
        .resolve("https://cdnjs.cloudflare.com/a.css")
        .unwrap()
        .as_str(),
      "https://cdnjs.cloudflare.com/a.css"
    );
  }

  #[test]
  fn test_excluded_host_matches_subdomains() {
    let config = AgentConfig::default();
    assert!(config.is_excluded_host("api.telegram.org"));
    assert!(config.is_excluded_host("ONESIGNAL.com"));
    assert!(!config.is_excluded_host("nottelegram.org.example.com"));
    assert!(!config.is_excluded_host("ostst.github.io"));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse(
      r#"
agent:
  version: "v4"
  static_extensions: [".CSS"]
notification:
  title: "Course"
"#,
    )
    .unwrap();

    assert_eq!(config.agent.version, "v4");
    assert_eq!(config.agent.base_path, "/prompt");
    assert!(config.agent.static_extensions.contains(".css"));
    assert_eq!(config.notification.title, "Course");
    assert_eq!(config.notification.tag, "psb-notification");
    assert_eq!(config.messaging.owner_chat_id, "430657787");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
