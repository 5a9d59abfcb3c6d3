//! Pipeline stages for one watch cycle.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped (a different chat platform, a different renderer) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ link ──▶ fetch ──▶ detect ──▶ render ──▶ encode ──▶ publish
//! (HTML)   (href)    (PDF)    (sha256)   (pdfium)   (PNG)      (chat)
//! ```
//!
//! 1. [`fetch`]   — bounded-timeout HTTP GET; errors mean "skip this cycle"
//! 2. [`link`]    — find the marker anchor and absolutise its href
//! 3. [`detect`]  — content fingerprint and comparison with the last one
//! 4. [`date`]    — date label from the document's filename
//! 5. [`render`]  — rasterise every page; runs in `spawn_blocking`
//! 6. [`encode`]  — lossless PNG for upload
//! 7. [`publish`] — summary + paced per-page messages

pub mod date;
pub mod detect;
pub mod encode;
pub mod fetch;
pub mod link;
pub mod publish;
pub mod render;
