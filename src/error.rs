//! Error types for the subwatch library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`WatchError`]: a cycle-level or operation-level failure. Returned as
//!   `Err(WatchError)` from a pipeline cycle, a state write or a control
//!   operation. The scheduler catches every one of them at its cycle boundary.
//!
//! * [`DeliveryError`]: a single outbound message failed. The publish step
//!   logs it and keeps going with the rest of the batch.
//!
//! Most fetch and parse problems never become errors at all: they are soft
//! outcomes ([`crate::watch::SkipReason`]) that simply end the cycle early.

use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the watch pipeline, state store and control surface.
#[derive(Debug, Error)]
pub enum WatchError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// Network error or non-2xx status while fetching a URL.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// No anchor with the configured text (or no href on it).
    #[error("No link labelled '{marker}' found on the page")]
    LinkNotFound { marker: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The downloaded document could not be decoded or has no pages.
    #[error("Rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The pdfium shared library could not be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Delivery errors ───────────────────────────────────────────────────
    /// One outbound message could not be delivered.
    #[error(transparent)]
    DeliveryFailed(#[from] DeliveryError),

    /// Every message in a batch failed; the fingerprint is left untouched.
    #[error("None of the {attempted} messages in the batch could be delivered")]
    NothingDelivered { attempted: usize },

    // ── Control errors ────────────────────────────────────────────────────
    /// Wrong or missing control-panel password.
    #[error("Authentication failed")]
    AuthFailed,

    // ── Persistence errors ────────────────────────────────────────────────
    /// The state file could not be written.
    #[error("Failed to persist watch state to '{path}': {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, serialisation bug).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single message failed to reach the chat channel.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("Chat request failed: {0}")]
    Transport(String),

    /// The chat API answered with a non-success status.
    #[error("Chat API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The chat API kept rate-limiting after the retry.
    #[error("Rate limited by chat API (retry after {retry_after_secs:.1}s)")]
    RateLimited { retry_after_secs: f64 },

    /// The configured channel does not exist or is not visible to the bot.
    #[error("Channel '{0}' is not available")]
    ChannelUnavailable(String),
}
