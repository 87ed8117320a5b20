mod agent;
mod cache;
mod config;
mod diagnostics;
mod host;
mod http;
mod messaging;
mod network;
mod notification;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use agent::{Interception, Lifecycle, OfflineAgent};
use cache::{CacheStore, MemoryStore, SqliteStore};
use config::Config;
use diagnostics::{SharedDiagnostics, TracingDiagnostics};
use host::ConsoleHost;
use http::{Fetch, Method, Request};
use messaging::server::{self, AppState};
use messaging::{ChatId, ChatNotifier, Notifier, TelegramClient};
use network::HttpFetcher;
use notification::{Notification, NotificationClick, PushEvent};

#[derive(Parser, Debug)]
#[command(name = "offline-agent")]
#[command(about = "Offline caching agent and messaging relay for the course companion")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-agent/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep partitions in memory instead of the on-disk store
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the manifest into this version's static partition
  Install,
  /// Remove partitions of other versions
  Activate,
  /// Send a request through the agent
  Fetch {
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Accept header, e.g. "text/html" for a page navigation
    #[arg(short, long)]
    accept: Option<String>,
  },
  /// List partitions and their entries
  Partitions,
  /// Deliver a push payload (JSON or plain text)
  Push { payload: Option<String> },
  /// Simulate a click on a notification targeting URL
  Click { url: Option<String> },
  /// Fire a background sync tag
  Sync { tag: String },
  /// Send a message to the owner chat
  Notify { text: String },
  /// Run the broadcast and webhook HTTP endpoints
  Serve {
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Notify { text } => notify(&config, &text).await,
    Command::Serve { addr } => {
      let state = AppState {
        sender: Arc::new(telegram_client(&config)?),
        config: Arc::new(config.messaging.clone()),
      };
      println!("listening on http://{}", addr);
      server::serve(addr, state).await
    }
    command if args.ephemeral => run_agent(&config, Arc::new(MemoryStore::new()), command).await,
    command => run_agent(&config, Arc::new(SqliteStore::open_default()?), command).await,
  }
}

/// Log to a file under the data directory; stdout carries command output.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("offline-agent");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "offline-agent.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offline_agent=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn telegram_client(config: &Config) -> Result<TelegramClient> {
  TelegramClient::new(&config.messaging.api_base, &Config::get_bot_token()?)
}

async fn notify(config: &Config, text: &str) -> Result<()> {
  let diagnostics: SharedDiagnostics = Arc::new(TracingDiagnostics);
  let notifier = ChatNotifier::new(
    Arc::new(telegram_client(config)?),
    ChatId::from(config.messaging.owner_chat_id.as_str()),
    diagnostics,
  );
  notifier.notify(text).await;
  Ok(())
}

async fn run_agent<S: CacheStore>(config: &Config, store: Arc<S>, command: Command) -> Result<()> {
  let network = Arc::new(HttpFetcher::new()?);
  let diagnostics: SharedDiagnostics = Arc::new(TracingDiagnostics);
  let agent = OfflineAgent::new(
    config,
    Arc::clone(&store),
    Arc::clone(&network),
    Arc::new(ConsoleHost),
    Arc::clone(&diagnostics),
  )?;

  match command {
    Command::Install => {
      agent.install().await?;
      println!(
        "installed {} assets into {}",
        config.agent.manifest.len(),
        agent.cache().static_partition()
      );
    }
    Command::Activate => {
      let removed = agent.activate().await?;
      if removed.is_empty() {
        println!("no stale partitions");
      }
      for partition in removed {
        println!("removed {}", partition);
      }
    }
    Command::Fetch {
      url,
      method,
      accept,
    } => {
      let mut request = Request::parse_get(&url)?;
      request.method = Method::parse(&method);
      if let Some(accept) = accept {
        request = request.with_header("Accept", accept);
      }

      match agent.fetch(request.clone()).await? {
        Interception::Passthrough(class) => {
          let response = network.fetch(&request).await?;
          println!("HTTP {} (passthrough: {:?})", response.status, class);
          println!("{}", response.text());
        }
        Interception::Respond {
          served,
          strategy,
          revalidation,
        } => {
          println!(
            "HTTP {} ({}, {})",
            served.response.status, served.source, strategy
          );
          if let Some(cached_at) = served.cached_at {
            println!("cached at {}", cached_at.to_rfc3339());
          }
          println!("{}", served.response.text());
          if let Some(task) = revalidation {
            task
              .await
              .map_err(|e| eyre!("Revalidation task failed: {}", e))?;
          }
        }
      }
    }
    Command::Partitions => {
      let live = [
        agent.cache().static_partition(),
        agent.cache().dynamic_partition(),
      ];
      for partition in store.partitions()? {
        let marker = if live.contains(&partition.as_str()) { "*" } else { " " };
        let keys = store.keys(&partition)?;
        println!("{} {} ({} entries)", marker, partition, keys.len());
        for key in keys {
          println!("    {}", key);
        }
      }
    }
    Command::Push { payload } => {
      let event = payload
        .map(PushEvent::with_data)
        .unwrap_or_else(PushEvent::empty);
      agent.push(event).await?;
    }
    Command::Click { url } => {
      let event = match url {
        Some(url) => PushEvent::with_data(serde_json::json!({ "url": url }).to_string()),
        None => PushEvent::empty(),
      };
      let notification = Notification::from_push(
        &event,
        &config.notification,
        agent.config(),
        diagnostics.as_ref(),
      )?;
      let outcome = agent
        .notification_click(NotificationClick { notification })
        .await?;
      println!("{:?}", outcome);
    }
    Command::Sync { tag } => {
      if !agent.sync(&tag).await? {
        println!("unknown sync tag: {}", tag);
      }
    }
    Command::Notify { .. } | Command::Serve { .. } => {
      return Err(eyre!("Not an agent command"));
    }
  }

  Ok(())
}
