//! # subwatch
//!
//! Watch a web page for a link to a regularly republished PDF, and whenever
//! the document behind that link changes, render every page to PNG and post
//! the pages to a chat channel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! landing page
//!  │
//!  ├─ 1. Link     find the anchor labelled "Zastępstwa", absolutise its href
//!  ├─ 2. Fetch    download the document (timeout-bounded)
//!  ├─ 3. Detect   SHA-256 fingerprint vs. the last published one
//!  ├─ 4. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 5. Encode   cap width, PNG-encode with maximum compression
//!  ├─ 6. Publish  summary card, then one message per page, paced
//!  └─ 7. Persist  record link + fingerprint only after delivery
//! ```
//!
//! A [`Scheduler`] repeats the cycle at a fixed interval and isolates every
//! failure at the cycle boundary. An optional password-gated panel
//! ([`control`]) lets an operator post a message or reset the state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subwatch::{DiscordClient, HttpFetcher, PdfiumRenderer, Scheduler, StateStore, WatchConfig, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(WatchConfig::builder().channel_id("1197586532396171334").build()?);
//!     let chat = Arc::new(DiscordClient::new("bot-token", config.fetch_timeout)?);
//!     let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
//!     let renderer = Arc::new(PdfiumRenderer::new(&config));
//!     let store = Arc::new(StateStore::open(&config.state_path).await);
//!
//!     let watcher = Arc::new(Watcher::new(config, fetcher, renderer, chat, store));
//!     Scheduler::new(watcher).run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `subwatch` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod watch;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::discord::DiscordClient;
pub use chat::{ChannelHandle, ChatService, Embed, Outbound, OutboundMessage};
pub use config::{ControlConfig, WatchConfig, WatchConfigBuilder};
pub use control::{router, serve, ControlState};
pub use error::{DeliveryError, WatchError};
pub use pipeline::fetch::{Fetcher, HttpFetcher};
pub use pipeline::publish::{DeliveryReport, PublicationBatch};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderedPage};
pub use scheduler::{Scheduler, SchedulerStatus};
pub use state::{StateStore, WatchState};
pub use watch::{CycleOutcome, PublicationReport, SkipReason, Watcher};
