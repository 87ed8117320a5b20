use std::fmt;

use crate::config::AgentConfig;
use crate::http::{Method, Request};

/// How an intercepted request is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Anything but GET; never intercepted
  NonGet,
  /// Target host is excluded; never intercepted
  ExcludedOrigin,
  /// HTML page load
  Navigation,
  /// Style sheet, script, image or font
  StaticAsset,
  Other,
}

/// Freshness policy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  NetworkFirst,
  CacheFirst,
  StaleWhileRevalidate,
}

impl RequestClass {
  /// The strategy for this class, or `None` when the request passes through.
  pub fn strategy(self) -> Option<Strategy> {
    match self {
      Self::NonGet | Self::ExcludedOrigin => None,
      Self::Navigation => Some(Strategy::NetworkFirst),
      Self::StaticAsset => Some(Strategy::CacheFirst),
      Self::Other => Some(Strategy::StaleWhileRevalidate),
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::NetworkFirst => "network-first",
      Self::CacheFirst => "cache-first",
      Self::StaleWhileRevalidate => "stale-while-revalidate",
    };
    f.write_str(s)
  }
}

/// Classify a request. Rules are checked in order; the first match wins.
pub fn classify(config: &AgentConfig, request: &Request) -> RequestClass {
  if request.method != Method::Get {
    return RequestClass::NonGet;
  }

  if request
    .url
    .host_str()
    .map(|host| config.is_excluded_host(host))
    .unwrap_or(false)
  {
    return RequestClass::ExcludedOrigin;
  }

  if request.accepts_html() {
    return RequestClass::Navigation;
  }

  let path = request.url.path().to_lowercase();
  if config
    .static_extensions
    .iter()
    .any(|ext| path.ends_with(ext.as_str()))
  {
    return RequestClass::StaticAsset;
  }

  RequestClass::Other
}

#[cfg(test)]
mod tests {
  use super::*;

  fn get(url: &str) -> Request {
    Request::parse_get(url).unwrap()
  }

  #[test]
  fn test_non_get_is_not_intercepted() {
    let config = AgentConfig::default();
    let request = Request::new(Method::Post, url::Url::parse("https://ostst.github.io/prompt/").unwrap());
    assert_eq!(classify(&config, &request), RequestClass::NonGet);
    assert_eq!(RequestClass::NonGet.strategy(), None);
  }

  #[test]
  fn test_excluded_host_wins_over_html() {
    let config = AgentConfig::default();
    let request = get("https://api.telegram.org/bot/sendMessage").with_header("Accept", "text/html");
    assert_eq!(classify(&config, &request), RequestClass::ExcludedOrigin);

    let request = get("https://cdn.onesignal.com/sdks/OneSignalSDK.js");
    assert_eq!(classify(&config, &request), RequestClass::ExcludedOrigin);
  }

  #[test]
  fn test_html_accept_is_navigation_even_for_asset_paths() {
    let config = AgentConfig::default();
    let request = get("https://ostst.github.io/prompt/faq.html").with_header("Accept", "text/html");
    assert_eq!(classify(&config, &request), RequestClass::Navigation);
    assert_eq!(
      RequestClass::Navigation.strategy(),
      Some(Strategy::NetworkFirst)
    );
  }

  #[test]
  fn test_static_extensions() {
    let config = AgentConfig::default();
    for path in ["css/styles.css", "js/app.js", "img/Hero.PNG", "fonts/inter.woff2"] {
      let request = get(&format!("https://ostst.github.io/prompt/{}", path));
      assert_eq!(classify(&config, &request), RequestClass::StaticAsset, "{}", path);
    }

    // Query strings do not hide the extension
    let request = get("https://ostst.github.io/prompt/js/app.js?v=3");
    assert_eq!(classify(&config, &request), RequestClass::StaticAsset);
  }

  #[test]
  fn test_everything_else_is_stale_while_revalidate() {
    let config = AgentConfig::default();
    let request = get("https://ostst.github.io/prompt/manifest.json");
    assert_eq!(classify(&config, &request), RequestClass::Other);
    assert_eq!(
      RequestClass::Other.strategy(),
      Some(Strategy::StaleWhileRevalidate)
    );
  }
}
