//! CLI binary for subwatch.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `WatchConfig`, wires the real adapters together and runs the
//! scheduler (plus the control panel, when a password is configured).

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subwatch::control::session::InMemorySessions;
use subwatch::{
    ControlConfig, ControlState, CycleOutcome, DiscordClient, HttpFetcher, Outbound,
    PdfiumRenderer, Scheduler, StateStore, WatchConfig, Watcher,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Watch the default page and post to a channel
  DISCORD_TOKEN=... subwatch --channel-id 1197586532396171334

  # Check once and exit (cron-style)
  subwatch --channel-id 1197586532396171334 --once

  # Enable the control panel on port 8000
  SUBWATCH_PANEL_PASSWORD=secret subwatch --channel-id 1197586532396171334

PDFIUM:
  The pdfium shared library is looked up at PDFIUM_LIB_PATH, then in the
  working directory, then on the system library path. Without it every
  change is announced with a summary card only.
"#;

/// Watch a page for a republished PDF and post its pages to Discord.
#[derive(Parser, Debug)]
#[command(
    name = "subwatch",
    version,
    about = "Watch a page for a republished PDF and post its pages to Discord",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Landing page that links to the document.
    #[arg(long, env = "SUBWATCH_URL", default_value = "https://kopernikus.pl/")]
    page_url: String,

    /// Visible text of the link to follow.
    #[arg(long, env = "SUBWATCH_LINK_TEXT", default_value = "Zastępstwa")]
    link_text: String,

    /// Origin used for relative links (default: derived from --page-url).
    #[arg(long, env = "SUBWATCH_ORIGIN")]
    origin: Option<String>,

    /// Discord channel that receives the pages.
    #[arg(long, env = "SUBWATCH_CHANNEL_ID")]
    channel_id: String,

    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: String,

    /// Seconds between cycles.
    #[arg(long, env = "SUBWATCH_INTERVAL", default_value_t = 300)]
    interval: u64,

    /// Per-request network timeout in seconds.
    #[arg(long, env = "SUBWATCH_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Rasterisation scale (1.0–4.0).
    #[arg(long, env = "SUBWATCH_RENDER_SCALE", default_value_t = 3.0)]
    render_scale: f32,

    /// Maximum page image width in pixels.
    #[arg(long, env = "SUBWATCH_MAX_WIDTH", default_value_t = 1920)]
    max_width: u32,

    /// Milliseconds between page messages (minimum 500).
    #[arg(long, env = "SUBWATCH_PAGE_DELAY_MS", default_value_t = 500)]
    page_delay_ms: u64,

    /// Consecutive failed cycles before a diagnostic message is posted.
    #[arg(long, env = "SUBWATCH_FAILURE_THRESHOLD", default_value_t = 5)]
    failure_threshold: u32,

    /// State file holding the last published link and fingerprint.
    #[arg(long, env = "SUBWATCH_STATE_FILE", default_value = "last_pdf.json")]
    state_file: PathBuf,

    /// Also save rendered pages under <DIR>/<date>/page_<n>.png.
    #[arg(long, env = "SUBWATCH_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Control panel password; the panel is disabled when unset.
    #[arg(long, env = "SUBWATCH_PANEL_PASSWORD", hide_env_values = true)]
    panel_password: Option<String>,

    /// Control panel listen address.
    #[arg(long, env = "SUBWATCH_LISTEN", default_value = ControlConfig::DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SUBWATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SUBWATCH_QUIET")]
    quiet: bool,
}

impl Cli {
    fn watch_config(&self) -> Result<WatchConfig> {
        let mut builder = WatchConfig::builder()
            .page_url(&self.page_url)
            .link_text(&self.link_text)
            .channel_id(&self.channel_id)
            .poll_interval(Duration::from_secs(self.interval))
            .fetch_timeout(Duration::from_secs(self.timeout))
            .render_scale(self.render_scale)
            .max_width_px(self.max_width)
            .page_delay(Duration::from_millis(self.page_delay_ms))
            .failure_threshold(self.failure_threshold)
            .state_path(&self.state_file);
        if let Some(origin) = &self.origin {
            builder = builder.site_origin(origin);
        }
        if let Some(dir) = &self.archive_dir {
            builder = builder.archive_dir(dir);
        }
        if let Some(lib) = &self.pdfium_lib {
            builder = builder.pdfium_library(lib);
        }
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Wiring ───────────────────────────────────────────────────────────
    let config = Arc::new(cli.watch_config().context("Invalid configuration")?);

    let chat = Arc::new(
        DiscordClient::new(&cli.token, config.fetch_timeout)
            .context("Failed to build Discord client")?,
    );
    let fetcher =
        Arc::new(HttpFetcher::new(config.fetch_timeout).context("Failed to build HTTP client")?);

    let renderer = PdfiumRenderer::new(&config);
    if let Err(e) = renderer.probe() {
        warn!("{}", e);
        warn!("Continuing without page images; changes will be announced with a summary only");
    }

    let store = Arc::new(StateStore::open(&config.state_path).await);
    let watcher = Arc::new(Watcher::new(
        Arc::clone(&config),
        fetcher,
        Arc::new(renderer),
        chat.clone(),
        Arc::clone(&store),
    ));
    let mut scheduler = Scheduler::new(Arc::clone(&watcher));

    // ── Single cycle ─────────────────────────────────────────────────────
    if cli.once {
        return match scheduler.tick().await {
            Ok(CycleOutcome::Skipped { reason }) => {
                anyhow::bail!("Cycle skipped: {reason:?}")
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e).context("Cycle failed"),
        };
    }

    // ── Shutdown signal ──────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; finishing the current cycle");
        }
        let _ = stop_tx.send(true);
    });
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        loop {
            let stop = *rx.borrow_and_update();
            if stop || rx.changed().await.is_err() {
                break;
            }
        }
    };

    // ── Control panel ────────────────────────────────────────────────────
    let panel = match ControlConfig::from_password(cli.panel_password.clone(), cli.listen) {
        Some(control) => {
            let state = Arc::new(
                ControlState::new(
                    control.password.clone(),
                    Arc::new(InMemorySessions::new()),
                    Outbound::new(chat, config.channel_id.clone()),
                    store,
                )
                .with_scheduler(scheduler.status()),
            );
            let shutdown = stopped(stop_rx.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = subwatch::serve(&control, state, shutdown).await {
                    error!("Control panel stopped: {}", e);
                }
            }))
        }
        None => {
            info!("No panel password set; control panel disabled");
            None
        }
    };

    scheduler.run(stopped(stop_rx)).await;

    if let Some(panel) = panel {
        let _ = panel.await;
    }
    info!("Bye");
    Ok(())
}
