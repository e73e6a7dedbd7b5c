mod app;
mod config;
mod connectivity;
mod event;
mod http;
mod logging;
mod shell;
mod store;
mod sync;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::connectivity::{Connectivity, ConnectivityMonitor, HealthProbe, SignalingTransport};
use crate::event::EventHandler;
use crate::http::HttpClient;
use crate::shell::{ShellCache, ShellOutcome, ShellRequest};
use crate::store::{DurableStore, KeyValueStore, MutationMethod};
use crate::sync::{MutationRequest, StatusBroadcaster, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "ghs-sync")]
#[command(about = "Offline-first sync for the GHS inventory app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ghs-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Server base URL, overriding config and GHS_SYNC_URL
  #[arg(short = 'u', long = "url", id = "base_url", global = true)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read a URL, falling back to the cached copy when offline
  Get { url: String },
  /// Send a mutation, queueing it when the server cannot be reached
  Send {
    /// POST, PATCH or DELETE
    method: MutationMethod,
    url: String,
    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
    /// Extra header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
  },
  /// Replay queued mutations now
  Replay,
  /// Inspect or clear the mutation queue
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
  /// Manage the response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Check whether the server is reachable
  Probe,
  /// Manage the application shell cache
  Shell {
    #[command(subcommand)]
    action: ShellAction,
  },
  /// Show the connection banner and replay whenever connectivity returns
  Watch,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
  /// List queued mutations, oldest first
  List,
  /// Drop every queued mutation
  Clear,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Drop every cached response
  Clear,
}

#[derive(Subcommand, Debug)]
enum ShellAction {
  /// Precache the shell assets of the current generation
  Install,
  /// Delete shell assets of every other generation
  Activate,
  /// Resolve a request through the shell cache
  Fetch {
    url: String,
    /// Treat as a page navigation (eligible for the offline page)
    #[arg(long)]
    navigate: bool,
  },
}

fn parse_header(s: &str) -> std::result::Result<(String, String), String> {
  let (name, value) = s
    .split_once(':')
    .ok_or_else(|| format!("expected `Name: value`, got `{}`", s))?;
  let name = name.trim();
  if name.is_empty() {
    return Err(format!("empty header name in `{}`", s));
  }
  Ok((name.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(url) = args.base_url {
    config.server.base_url = url;
  }

  let _log_guard = logging::init(&config.log)?;
  tracing::debug!(base_url = %config.server.base_url, "starting");

  let kv = store::open_backend(config.store.path.as_deref(), config.store.fallback)?;
  let client = HttpClient::new(&config.server.base_url, config.server.request_timeout())?;

  let status = Arc::new(StatusBroadcaster::new());
  status.subscribe(|status, queue_length| {
    tracing::info!(%status, queue_length, "sync status");
  });

  // Ordinary traffic doubles as the passive connectivity signal
  let monitor = Arc::new(monitor(&config, client.clone()));
  let transport = SignalingTransport::new(client, monitor.clone());

  let engine = Arc::new(
    SyncEngine::new(transport.clone(), DurableStore::new(Arc::clone(&kv)), status)
      .with_max_retries(config.sync.max_retries),
  );

  match args.command {
    Command::Get { url } => match engine.cached_fetch(&url).await {
      Ok(data) => println!("{}", serde_json::to_string_pretty(&data)?),
      Err(e) if e.is_offline_no_cache() => {
        return Err(eyre!("Offline, and {} has never been fetched while online", url));
      }
      Err(e) => return Err(e.into()),
    },
    Command::Send {
      method,
      url,
      body,
      headers,
    } => {
      let mut request = MutationRequest::new(method);
      if let Some(body) = body {
        request = request.json(body);
      }
      request.headers.extend(headers);

      let res = match engine.mutation_fetch(&url, request).await {
        Ok(res) => res,
        Err(e) => match e.status() {
          Some(status) => {
            return Err(eyre!(
              "Server answered {} but the response was lost; not queued: {}",
              status,
              e
            ));
          }
          None => return Err(e.into()),
        },
      };
      if res.is_queued() {
        eprintln!("Server unreachable; queued for replay");
      }
      println!("{}", res.status);
      let text = res.text();
      if !text.is_empty() {
        println!("{}", text);
      }
    }
    Command::Replay => {
      let report = engine.replay_queue().await?;
      println!(
        "sent {}, failed {}, dropped {}, remaining {}{}",
        report.sent,
        report.failed,
        report.dropped,
        report.remaining,
        if report.aborted { " (aborted: offline)" } else { "" }
      );
    }
    Command::Queue { action } => match action {
      QueueAction::List => {
        for entry in engine.store().list_queue()? {
          println!(
            "{}  {}  {:<6} {}  retries={}",
            entry.id,
            entry.timestamp.to_rfc3339(),
            entry.method,
            entry.url,
            entry.retries
          );
        }
      }
      QueueAction::Clear => {
        let count = engine.store().queue_length()?;
        engine.store().clear_queue()?;
        tracing::warn!(count, "mutation queue cleared");
        println!("Cleared {} queued mutation(s)", count);
      }
    },
    Command::Cache { action } => match action {
      CacheAction::Clear => {
        engine.store().clear_cache()?;
        println!("Response cache cleared");
      }
    },
    Command::Probe => {
      let state = monitor.probe().await;
      println!("{}", if state.is_online() { "online" } else { "offline" });
    }
    Command::Shell { action } => run_shell(action, transport, kv, &config).await?,
    Command::Watch => {
      let events = EventHandler::new(event::POLL_RATE, config.sync.probe_interval());
      let mut app = app::App::new(engine, monitor, events.sender())?;
      app.run(events).await?;
    }
  }

  Ok(())
}

fn monitor(
  config: &config::Config,
  client: HttpClient,
) -> ConnectivityMonitor<HealthProbe<HttpClient>> {
  ConnectivityMonitor::new(
    HealthProbe::new(client, config.server.health_path.clone()),
    Connectivity::from_online(config.sync.assume_online),
    config.sync.probe_timeout(),
  )
}

async fn run_shell(
  action: ShellAction,
  transport: SignalingTransport<HttpClient>,
  kv: Arc<dyn KeyValueStore>,
  config: &config::Config,
) -> Result<()> {
  let shell = ShellCache::new(transport, kv, (&config.shell).into());

  match action {
    ShellAction::Install => {
      let count = shell.install().await?;
      println!("Cached {} shell asset(s) for {}", count, shell.generation());
    }
    ShellAction::Activate => {
      let removed = shell.activate()?;
      if removed.is_empty() {
        println!("No old generations");
      } else {
        println!("Removed {}", removed.join(", "));
      }
    }
    ShellAction::Fetch { url, navigate } => {
      let request = if navigate {
        ShellRequest::navigate(url)
      } else {
        ShellRequest::get(url)
      };
      match shell.handle(&request).await? {
        ShellOutcome::Passthrough => {
          return Err(eyre!("{} is not handled by the shell cache", request.url));
        }
        ShellOutcome::Respond(res) => {
          println!("{} ({:?})", res.status, res.origin);
          println!("{}", res.text());
        }
      }
    }
  }

  Ok(())
}
