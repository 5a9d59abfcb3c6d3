//! One watch cycle, end to end.
//!
//! ```text
//! Idle ─▶ LinkResolved ─▶ Downloaded ─▶ FingerprintChecked ─┬▶ Unchanged
//!                                                           └▶ Rendered ─▶ Published ─▶ Persisted
//! ```
//!
//! Any missing input short-circuits to a [`CycleOutcome::Skipped`] without side
//! effects. Only the publish path talks to the chat channel or writes state,
//! and the new fingerprint is recorded only after the whole batch has been
//! sent, so a crash mid-publish makes the next run retry the entire document.

use crate::chat::{ChatService, Outbound};
use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::pipeline::date::date_label_now;
use crate::pipeline::detect::{fingerprint, has_changed};
use crate::pipeline::fetch::{looks_like_pdf, Fetcher};
use crate::pipeline::link::LinkResolver;
use crate::pipeline::publish::{archive_pages, publish, DeliveryReport, PublicationBatch};
use crate::pipeline::render::{PageRenderer, RenderedPage};
use crate::state::StateStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why a cycle ended early without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The landing page could not be fetched.
    PageUnavailable,
    /// The landing page has no usable document link.
    LinkNotFound,
    /// The document could not be downloaded.
    DocumentUnavailable,
    /// The chat channel could not be resolved.
    ChannelUnavailable,
}

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Skipped { reason: SkipReason },
    Unchanged { link: String },
    Published(PublicationReport),
}

impl CycleOutcome {
    /// `Unchanged` and `Published` are healthy; skips count as failures.
    pub fn is_healthy(&self) -> bool {
        !matches!(self, CycleOutcome::Skipped { .. })
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Skipped { reason } => write!(f, "skipped ({reason:?})"),
            CycleOutcome::Unchanged { .. } => write!(f, "unchanged"),
            CycleOutcome::Published(r) => write!(
                f,
                "published {} pages ({}/{} messages delivered)",
                r.pages, r.delivery.delivered, r.delivery.attempted
            ),
        }
    }
}

/// Details of a published change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationReport {
    pub link: String,
    pub fingerprint: String,
    pub date_label: String,
    pub pages: usize,
    pub delivery: DeliveryReport,
    /// False when the state file could not be written (degraded mode).
    pub persisted: bool,
}

/// The publication pipeline.
pub struct Watcher {
    config: Arc<WatchConfig>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn PageRenderer>,
    outbound: Outbound,
    store: Arc<StateStore>,
    resolver: LinkResolver,
}

impl Watcher {
    pub fn new(
        config: Arc<WatchConfig>,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn PageRenderer>,
        chat: Arc<dyn ChatService>,
        store: Arc<StateStore>,
    ) -> Self {
        let resolver = LinkResolver::new(config.link_text.clone(), config.site_origin.clone());
        let outbound = Outbound::new(chat, config.channel_id.clone());
        Self {
            config,
            fetcher,
            renderer,
            outbound,
            store,
            resolver,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Run one cycle. Holds the state lock throughout, so a concurrent reset
    /// waits for the cycle to finish.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, WatchError> {
        let mut state = self.store.lock().await;
        let skip = |reason| Ok(CycleOutcome::Skipped { reason });

        // ── Step 1: Landing page → link ──────────────────────────────────
        let html = match self.fetcher.fetch(&self.config.page_url).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Landing page unavailable: {}", e);
                return skip(SkipReason::PageUnavailable);
            }
        };
        let Some(link) = self.resolver.resolve(&html) else {
            warn!("{}", WatchError::LinkNotFound { marker: self.config.link_text.clone() });
            return skip(SkipReason::LinkNotFound);
        };

        // ── Step 2: Download ─────────────────────────────────────────────
        let document = match self.fetcher.fetch(&link).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Document unavailable: {}", e);
                return skip(SkipReason::DocumentUnavailable);
            }
        };

        // ── Step 3: Change detection ─────────────────────────────────────
        let fp = fingerprint(&document);
        if !has_changed(&fp, state.current()) {
            info!(link = %link, "Document unchanged");
            return Ok(CycleOutcome::Unchanged { link });
        }
        info!(link = %link, fingerprint = %fp, "New document detected");
        if !looks_like_pdf(&document) {
            warn!("Downloaded file does not start with %PDF; rendering will likely fail");
        }

        // ── Step 4: Channel ──────────────────────────────────────────────
        let Some(channel) = self.outbound.resolve().await else {
            warn!("Channel {} unavailable; will retry next cycle", self.outbound.channel_id());
            return skip(SkipReason::ChannelUnavailable);
        };

        // ── Step 5: Render ───────────────────────────────────────────────
        let date_label = date_label_now(&link);
        let pages = self.render(document).await;

        let batch = PublicationBatch {
            date_label: date_label.clone(),
            source_link: link.clone(),
            pages,
        };
        let page_count = batch.pages.len();

        if let Some(dir) = &self.config.archive_dir {
            if let Err(e) = archive_pages(dir, &batch).await {
                warn!("Archiving pages to {} failed: {}", dir.display(), e);
            }
        }

        // ── Step 6: Publish ──────────────────────────────────────────────
        let delivery = publish(
            self.outbound.service(),
            &channel,
            batch,
            self.config.page_delay,
        )
        .await;
        if delivery.nothing_delivered() {
            return Err(WatchError::NothingDelivered {
                attempted: delivery.attempted,
            });
        }

        // ── Step 7: Persist ──────────────────────────────────────────────
        let persisted = match state.record(&link, &fp).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "{}; the in-memory record still prevents republishing in this process, \
                     but a restart may publish this document again",
                    e
                );
                false
            }
        };

        Ok(CycleOutcome::Published(PublicationReport {
            link,
            fingerprint: fp,
            date_label,
            pages: page_count,
            delivery,
            persisted,
        }))
    }

    /// Render off the async runtime. Failures degrade to zero pages.
    async fn render(&self, document: Vec<u8>) -> Vec<RenderedPage> {
        let renderer = Arc::clone(&self.renderer);
        let result = tokio::task::spawn_blocking(move || renderer.render(&document))
            .await
            .map_err(|e| WatchError::Internal(format!("Render task panicked: {e}")))
            .and_then(|r| r);

        match result {
            Ok(pages) => {
                info!("Rendered {} pages", pages.len());
                pages
            }
            Err(e) => {
                warn!("{}; publishing summary only", e);
                Vec::new()
            }
        }
    }
}
