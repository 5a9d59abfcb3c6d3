//! In-memory adapters shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subwatch::{
    ChannelHandle, ChatService, DeliveryError, Fetcher, OutboundMessage, PageRenderer,
    RenderedPage, StateStore, WatchConfig, WatchError, Watcher,
};

pub const PAGE_URL: &str = "https://example.org/";
pub const CHANNEL: &str = "1197586532396171334";

/// Landing page with a single substitutions link.
pub fn landing_page(href: &str) -> Vec<u8> {
    format!(
        r#"<html><body><nav><a href="/plan">Plan lekcji</a> <a href="{href}">Zastępstwa</a></nav></body></html>"#
    )
    .into_bytes()
}

pub fn pdf_bytes(tag: &str) -> Vec<u8> {
    format!("%PDF-1.7\n% {tag}\n%%EOF").into_bytes()
}

// ── Fetcher ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Fail,
    Panic,
}

/// Scripted fetcher; unknown URLs fail.
#[derive(Default)]
pub struct FakeFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.set(url, Reply::Body(body));
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Panic) => panic!("scripted fetch panic for {url}"),
            Some(Reply::Fail) | None => Err(WatchError::FetchFailed {
                url: url.to_string(),
                reason: "HTTP 503 Service Unavailable".into(),
            }),
        }
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// Produces `pages` tiny pages, or fails when `pages` is `None`.
pub struct FakeRenderer {
    pages: Mutex<Option<usize>>,
    pub calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn pages(n: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(Some(n)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }
}

impl PageRenderer for FakeRenderer {
    fn render(&self, _document: &[u8]) -> Result<Vec<RenderedPage>, WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.pages.lock().unwrap() {
            Some(n) => Ok((1..=n)
                .map(|index| RenderedPage {
                    index,
                    png: vec![0x89, b'P', b'N', b'G', index as u8],
                    width: 1920,
                    height: 1484,
                })
                .collect()),
            None => Err(WatchError::RenderFailed {
                detail: "not a PDF".into(),
            }),
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

/// Records every message. The channel can be hidden and sends can be failed.
pub struct FakeChat {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub channel_missing: AtomicBool,
    pub fail_sends: AtomicBool,
    /// Sending a message with this attachment name panics.
    pub panic_on: Mutex<Option<String>>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            channel_missing: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            panic_on: Mutex::new(None),
        })
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| m.content)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn channel(&self, id: &str) -> Result<Option<ChannelHandle>, DeliveryError> {
        if self.channel_missing.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(ChannelHandle {
            id: id.to_string(),
            name: Some("zastepstwa".into()),
        }))
    }

    async fn send(&self, _channel: &ChannelHandle, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let panic_on = self.panic_on.lock().unwrap().clone();
        if let (Some(name), Some(att)) = (panic_on, &message.attachment) {
            if att.filename == name {
                panic!("scripted send panic on {name}");
            }
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api {
                status: 500,
                body: "Internal Server Error".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub fn config(state_path: &Path) -> Arc<WatchConfig> {
    Arc::new(
        WatchConfig::builder()
            .page_url(PAGE_URL)
            .channel_id(CHANNEL)
            .poll_interval(Duration::from_secs(300))
            .state_path(state_path)
            .build()
            .unwrap(),
    )
}

pub struct Harness {
    pub fetcher: Arc<FakeFetcher>,
    pub renderer: Arc<FakeRenderer>,
    pub chat: Arc<FakeChat>,
    pub store: Arc<StateStore>,
    pub watcher: Arc<Watcher>,
}

impl Harness {
    pub async fn new(state_path: &Path, renderer: Arc<FakeRenderer>) -> Self {
        Self::with_config(config(state_path), renderer).await
    }

    pub async fn with_config(config: Arc<WatchConfig>, renderer: Arc<FakeRenderer>) -> Self {
        let fetcher = FakeFetcher::new();
        let chat = FakeChat::new();
        let store = Arc::new(StateStore::open(&config.state_path).await);
        let watcher = Arc::new(Watcher::new(
            config,
            fetcher.clone(),
            renderer.clone(),
            chat.clone(),
            Arc::clone(&store),
        ));
        Self {
            fetcher,
            renderer,
            chat,
            store,
            watcher,
        }
    }
}
