//! Configuration types for the watcher.
//!
//! All pipeline behaviour is controlled through [`WatchConfig`], built via its
//! [`WatchConfigBuilder`]. The control panel has its own small
//! [`ControlConfig`]; leaving it out disables the panel without touching the
//! watch loop.

use crate::error::WatchError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum pause between consecutive page messages.
pub const MIN_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Configuration for the watch pipeline and scheduler.
///
/// # Example
/// ```rust
/// use subwatch::WatchConfig;
///
/// let config = WatchConfig::builder()
///     .page_url("https://example.org/")
///     .channel_id("1197586532396171334")
///     .render_scale(2.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.site_origin, "https://example.org");
/// ```
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Landing page that links to the current document.
    pub page_url: String,

    /// Scheme + host used to absolutise relative links, without a trailing
    /// slash. Derived from `page_url` unless set explicitly.
    pub site_origin: String,

    /// Visible text of the anchor pointing at the document. Default: `Zastępstwa`.
    pub link_text: String,

    /// Chat channel that receives the publications.
    pub channel_id: String,

    /// Time between the end of one cycle and the start of the next. Default: 300 s.
    pub poll_interval: Duration,

    /// Per-request network timeout. Default: 30 s.
    pub fetch_timeout: Duration,

    /// Rasterisation factor relative to the PDF's 72 dpi user space. Range: 1.0–4.0. Default: 3.0.
    ///
    /// Must stay fixed for a given deployment so that identical documents
    /// always produce identical images.
    pub render_scale: f32,

    /// Pages wider than this are downscaled to exactly this width. Default: 1920.
    pub max_width_px: u32,

    /// Pause between consecutive page messages. Never below [`MIN_PAGE_DELAY`].
    pub page_delay: Duration,

    /// Consecutive failed cycles before a diagnostic message is posted. Default: 5.
    pub failure_threshold: u32,

    /// Where the last published link and fingerprint are stored. Default: `last_pdf.json`.
    pub state_path: PathBuf,

    /// If set, rendered pages are also written to `<dir>/<date>/page_<n>.png`.
    pub archive_dir: Option<PathBuf>,

    /// Explicit path to the pdfium shared library. Falls back to the
    /// working directory, then the system library search path.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            page_url: "https://kopernikus.pl/".to_string(),
            site_origin: "https://kopernikus.pl".to_string(),
            link_text: "Zastępstwa".to_string(),
            channel_id: String::new(),
            poll_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
            render_scale: 3.0,
            max_width_px: 1920,
            page_delay: MIN_PAGE_DELAY,
            failure_threshold: 5,
            state_path: PathBuf::from("last_pdf.json"),
            archive_dir: None,
            pdfium_library: None,
        }
    }
}

impl WatchConfig {
    /// Create a new builder for `WatchConfig`.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder {
            config: Self::default(),
            explicit_origin: false,
        }
    }
}

/// Builder for [`WatchConfig`].
#[derive(Debug)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
    explicit_origin: bool,
}

impl WatchConfigBuilder {
    pub fn page_url(mut self, url: impl Into<String>) -> Self {
        self.config.page_url = url.into();
        self
    }

    pub fn site_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.site_origin = origin.into().trim_end_matches('/').to_string();
        self.explicit_origin = true;
        self
    }

    pub fn link_text(mut self, text: impl Into<String>) -> Self {
        self.config.link_text = text.into();
        self
    }

    pub fn channel_id(mut self, id: impl Into<String>) -> Self {
        self.config.channel_id = id.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn max_width_px(mut self, px: u32) -> Self {
        self.config.max_width_px = px.max(100);
        self
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.config.page_delay = delay.max(MIN_PAGE_DELAY);
        self
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.config.failure_threshold = n.max(1);
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.state_path = path.into();
        self
    }

    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = Some(dir.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<WatchConfig, WatchError> {
        let page = url::Url::parse(&self.config.page_url).map_err(|e| {
            WatchError::InvalidConfig(format!(
                "page URL '{}' is not valid: {}",
                self.config.page_url, e
            ))
        })?;
        if !matches!(page.scheme(), "http" | "https") {
            return Err(WatchError::InvalidConfig(format!(
                "page URL must be http or https, got '{}'",
                page.scheme()
            )));
        }
        if !self.explicit_origin {
            self.config.site_origin = page.origin().ascii_serialization();
        }

        let c = &self.config;
        if c.channel_id.trim().is_empty() {
            return Err(WatchError::InvalidConfig("channel id is required".into()));
        }
        if c.link_text.trim().is_empty() {
            return Err(WatchError::InvalidConfig("link text must not be empty".into()));
        }
        if c.poll_interval.is_zero() {
            return Err(WatchError::InvalidConfig(
                "poll interval must be greater than zero".into(),
            ));
        }
        if c.fetch_timeout.is_zero() {
            return Err(WatchError::InvalidConfig(
                "fetch timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Settings for the password-gated control panel.
#[derive(Clone)]
pub struct ControlConfig {
    /// Shared secret required to log in or reset state.
    pub password: String,
    /// Address the panel listens on. Default: `0.0.0.0:8000`.
    pub listen_addr: SocketAddr,
}

impl ControlConfig {
    pub const DEFAULT_LISTEN: &'static str = "0.0.0.0:8000";

    /// Build a panel config, or `None` when no usable password is supplied.
    pub fn from_password(password: Option<String>, listen_addr: SocketAddr) -> Option<Self> {
        password
            .filter(|p| !p.is_empty())
            .map(|password| Self {
                password,
                listen_addr,
            })
    }
}

impl std::fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConfig")
            .field("password", &"<redacted>")
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}
