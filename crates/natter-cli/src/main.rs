//! `natter`: terminal chat client.
//!
//! # Usage
//!
//! ```
//! natter --url http://localhost:3210 --name alice
//! natter --config ~/.config/natter/config.toml --log-file /tmp/natter.log
//! ```

mod app;
mod client;
mod ui;

use std::{
  fs::File,
  io,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use client::HttpStore;
use crossterm::{
  event::{self, Event},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use natter_core::MessageStore;
use natter_sync::{SyncConfig, SyncEngine};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "natter", about = "Terminal chat client for a natter server")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the natter server (default: http://localhost:3210).
  #[arg(long, env = "NATTER_URL")]
  url: Option<String>,

  /// Name shown as the author of your messages (default: $USER).
  #[arg(long, env = "NATTER_NAME")]
  name: Option<String>,

  /// Newly confirmed messages to observe before moving the subscription
  /// forward (default: 1).
  #[arg(long)]
  resubscribe_threshold: Option<usize>,

  /// How often the subscription re-reads the server, in milliseconds
  /// (default: 500).
  #[arg(long)]
  poll_interval_ms: Option<u64>,

  /// Write logs to this file. Nothing is logged otherwise.
  #[arg(long, value_name = "FILE")]
  log_file: Option<PathBuf>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  url:                   Option<String>,
  name:                  Option<String>,
  resubscribe_threshold: Option<usize>,
  poll_interval_ms:      Option<u64>,
  log_file:              Option<PathBuf>,
}

fn default_name() -> String {
  std::env::var("USER")
    .ok()
    .filter(|u| !u.is_empty())
    .unwrap_or_else(|| "anonymous".to_string())
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let url = args
    .url
    .or(file_cfg.url)
    .unwrap_or_else(|| "http://localhost:3210".to_string());
  let name = args.name.or(file_cfg.name).unwrap_or_else(default_name);
  let threshold = args
    .resubscribe_threshold
    .or(file_cfg.resubscribe_threshold)
    .unwrap_or(1);
  let poll_interval = args
    .poll_interval_ms
    .or(file_cfg.poll_interval_ms)
    .map_or(SyncConfig::DEFAULT_POLL_INTERVAL, Duration::from_millis);

  if let Some(path) = args.log_file.or(file_cfg.log_file) {
    init_file_logging(&path)?;
  }

  let sync_config = SyncConfig::new(threshold)
    .context("invalid --resubscribe-threshold")?
    .with_poll_interval(poll_interval);
  let store = HttpStore::new(&url).context("building HTTP client")?;
  let engine = SyncEngine::new(Arc::new(store), sync_config);
  engine.start().context("starting sync engine")?;
  tracing::info!(%url, %name, "connected");

  let mut app = App::new(engine.clone(), name);

  // Set up the terminal.
  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  let run_result = run_event_loop(&mut terminal, &mut app);

  // Restore terminal regardless of result.
  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();

  engine.shutdown();
  run_result
}

/// Send `tracing` output to `path` so it does not draw over the TUI.
fn init_file_logging(path: &Path) -> Result<()> {
  let file = File::create(path)
    .with_context(|| format!("creating log file {}", path.display()))?;
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_ansi(false)
    .with_writer(Mutex::new(file))
    .init();
  Ok(())
}

// ─── Event loop ───────────────────────────────────────────────────────────────

fn run_event_loop<S: MessageStore + 'static>(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App<S>,
) -> Result<()> {
  loop {
    app.refresh();
    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;

    // Poll for an event, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    if let Some(Event::Key(key)) = maybe_event
      && !app.handle_key(key)
    {
      break;
    }
  }

  Ok(())
}
