//! Watch-cycle integration tests over in-memory adapters.
//!
//! Run with:
//!   cargo test --test pipeline

mod common;

use async_trait::async_trait;
use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subwatch::{CycleOutcome, Fetcher, SkipReason, StateStore, WatchError, WatchState, Watcher};
use tokio::sync::Notify;

const DOC_URL: &str = "https://example.org/pliki/zast_15-03-2024.pdf";

fn published(outcome: CycleOutcome) -> subwatch::PublicationReport {
    match outcome {
        CycleOutcome::Published(report) => report,
        other => panic!("expected a publication, got {other:?}"),
    }
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn publishes_new_document_then_ignores_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("last_pdf.json");
    let h = Harness::new(&state_path, FakeRenderer::pages(2)).await;

    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, pdf_bytes("week 11"));

    let report = published(h.watcher.run_cycle().await.unwrap());
    assert_eq!(report.link, DOC_URL);
    assert_eq!(report.date_label, "15.03.2024");
    assert_eq!(report.pages, 2);
    assert_eq!(report.delivery.attempted, 3);
    assert_eq!(report.delivery.delivered, 3);
    assert!(report.persisted);

    // Summary first, then pages in order.
    let sent = h.chat.sent();
    assert_eq!(sent.len(), 3);
    let summary = sent[0].embed.as_ref().unwrap();
    assert_eq!(summary.title.as_deref(), Some("📋 New substitutions"));
    assert!(summary.fields.iter().any(|f| f.value == "15.03.2024"));
    assert!(summary.fields.iter().any(|f| f.value.contains(DOC_URL)));
    let attachments: Vec<_> = sent[1..]
        .iter()
        .map(|m| m.attachment.as_ref().unwrap().filename.clone())
        .collect();
    assert_eq!(attachments, ["page_1.png", "page_2.png"]);

    // Durable record.
    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&state_path).unwrap()).unwrap();
    assert_eq!(raw["last"], DOC_URL);
    assert_eq!(raw["hash"], report.fingerprint.as_str());

    // Same bytes under a new name: nothing is posted.
    h.chat.clear();
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_final.pdf"));
    h.fetcher.serve("https://example.org/pliki/zast_final.pdf", pdf_bytes("week 11"));

    let outcome = h.watcher.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Unchanged {
            link: "https://example.org/pliki/zast_final.pdf".into()
        }
    );
    assert!(h.chat.sent().is_empty());
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn undated_file_name_falls_back_to_today() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(&dir.path().join("s.json"), FakeRenderer::pages(1)).await;

    h.fetcher.serve(PAGE_URL, landing_page("zastepstwa.pdf"));
    h.fetcher.serve("https://example.org/zastepstwa.pdf", pdf_bytes("x"));

    let report = published(h.watcher.run_cycle().await.unwrap());
    let today = chrono::Local::now().format("%d.%m.%Y").to_string();
    assert_eq!(report.date_label, today);
}

// ── Degraded publication ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn render_failure_still_announces_the_change() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(&dir.path().join("s.json"), FakeRenderer::failing()).await;

    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, b"<html>not a pdf</html>".to_vec());

    let report = published(h.watcher.run_cycle().await.unwrap());
    assert_eq!(report.pages, 0);
    assert_eq!(report.delivery.attempted, 1);
    assert!(report.delivery.summary_delivered);
    assert!(report.persisted);

    let sent = h.chat.sent();
    assert_eq!(sent.len(), 1);
    let summary = sent[0].embed.as_ref().unwrap();
    assert!(summary.fields.iter().any(|f| f.value == "0 pages"));
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_publishes_once_per_process() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("last_pdf.json");
    // A non-empty directory where the state file belongs makes every write fail.
    std::fs::create_dir_all(state_path.join("blocker")).unwrap();

    let h = Harness::new(&state_path, FakeRenderer::pages(1)).await;
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, pdf_bytes("a"));

    let report = published(h.watcher.run_cycle().await.unwrap());
    assert!(!report.persisted);
    assert!(matches!(
        h.watcher.run_cycle().await.unwrap(),
        CycleOutcome::Unchanged { .. }
    ));

    // After a restart nothing was recorded, so the document goes out again.
    let restarted = Harness::new(&state_path, FakeRenderer::pages(1)).await;
    restarted.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    restarted.fetcher.serve(DOC_URL, pdf_bytes("a"));
    published(restarted.watcher.run_cycle().await.unwrap());
}

// ── Early exits ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_inputs_skip_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("s.json");
    let h = Harness::new(&state_path, FakeRenderer::pages(1)).await;

    // Landing page down.
    let outcome = h.watcher.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped { reason: SkipReason::PageUnavailable });

    // No matching anchor.
    h.fetcher.serve(PAGE_URL, b"<a href=\"/x.pdf\">Plan lekcji</a>".to_vec());
    let outcome = h.watcher.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped { reason: SkipReason::LinkNotFound });

    // Link present, document 404s.
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    let outcome = h.watcher.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped { reason: SkipReason::DocumentUnavailable });

    assert!(h.chat.sent().is_empty());
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
    assert!(!state_path.exists());
}

#[tokio::test(start_paused = true)]
async fn unavailable_channel_defers_publication() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("s.json");
    let h = Harness::new(&state_path, FakeRenderer::pages(1)).await;
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, pdf_bytes("a"));
    h.chat.channel_missing.store(true, Ordering::SeqCst);

    let outcome = h.watcher.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped { reason: SkipReason::ChannelUnavailable });
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.snapshot().last_fingerprint.is_empty());
    assert!(!state_path.exists());

    h.chat.channel_missing.store(false, Ordering::SeqCst);
    published(h.watcher.run_cycle().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn total_delivery_failure_keeps_old_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(&dir.path().join("s.json"), FakeRenderer::pages(2)).await;
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, pdf_bytes("a"));
    h.chat.fail_sends.store(true, Ordering::SeqCst);

    let err = h.watcher.run_cycle().await.unwrap_err();
    assert!(matches!(err, WatchError::NothingDelivered { attempted: 3 }));
    assert!(h.store.snapshot().last_fingerprint.is_empty());

    // Next cycle retries the whole document.
    h.chat.fail_sends.store(false, Ordering::SeqCst);
    let report = published(h.watcher.run_cycle().await.unwrap());
    assert_eq!(report.delivery.delivered, 3);
}

#[tokio::test(start_paused = true)]
async fn stored_fingerprint_from_previous_run_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("s.json");
    let h = Harness::new(&state_path, FakeRenderer::pages(1)).await;
    h.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    h.fetcher.serve(DOC_URL, pdf_bytes("a"));
    let fp = published(h.watcher.run_cycle().await.unwrap()).fingerprint;

    let restarted = Harness::new(&state_path, FakeRenderer::pages(1)).await;
    assert_eq!(restarted.store.snapshot().last_fingerprint, fp);
    restarted.fetcher.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    restarted.fetcher.serve(DOC_URL, pdf_bytes("a"));
    assert!(matches!(
        restarted.watcher.run_cycle().await.unwrap(),
        CycleOutcome::Unchanged { .. }
    ));
}

// ── Reset vs. running cycle ──────────────────────────────────────────────────

/// Blocks its first fetch until released.
struct GatedFetcher {
    inner: Arc<FakeFetcher>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch(url).await
    }
}

#[tokio::test(start_paused = true)]
async fn reset_waits_for_the_running_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("s.json"));
    let chat = FakeChat::new();
    let inner = FakeFetcher::new();
    inner.serve(PAGE_URL, landing_page("/pliki/zast_15-03-2024.pdf"));
    inner.serve(DOC_URL, pdf_bytes("a"));
    let fetcher = Arc::new(GatedFetcher {
        inner,
        armed: AtomicBool::new(true),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(StateStore::with_state(
        &config.state_path,
        WatchState::published("https://example.org/old.pdf", "old"),
    ));
    let watcher = Arc::new(Watcher::new(
        config,
        fetcher.clone(),
        FakeRenderer::pages(1),
        chat.clone(),
        Arc::clone(&store),
    ));

    let cycle = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move { watcher.run_cycle().await })
    };
    fetcher.entered.notified().await;

    let reset = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.reset().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!reset.is_finished());
    assert_eq!(store.snapshot().last_fingerprint, "old");

    fetcher.release.notify_one();
    published(cycle.await.unwrap().unwrap());
    reset.await.unwrap().unwrap();

    // The reset landed after the cycle's write.
    assert!(store.snapshot().last_fingerprint.is_empty());
    assert_eq!(chat.sent().len(), 2);
}
