//! PDF rasterisation: document bytes → ordered PNG pages via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-heavy and not
//! async-aware. The pipeline calls [`PageRenderer::render`] inside
//! `tokio::task::spawn_blocking` so a long render never stalls the control
//! panel's request handling.
//!
//! ## Width cap
//!
//! Pages are rendered at a fixed scale (3× by default) for legibility, then
//! anything wider than `max_width_px` is resized with Lanczos3 so the width
//! is exactly the cap and the aspect ratio is preserved.

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::pipeline::encode::encode_png;
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One rendered page, 1-based.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub index: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RenderedPage {
    /// Attachment filename used when the page is uploaded or archived.
    pub fn file_name(&self) -> String {
        format!("page_{}.png", self.index)
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("index", &self.index)
            .field("png_bytes", &self.png.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Turns document bytes into pages `1..=N` in order.
///
/// Blocking: callers on an async runtime should use `spawn_blocking`.
pub trait PageRenderer: Send + Sync {
    fn render(&self, document: &[u8]) -> Result<Vec<RenderedPage>, WatchError>;
}

/// Target size after applying the width cap.
pub fn capped_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

/// Downscale `img` to `max_width` if it is wider; otherwise return it as is.
pub fn fit_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (w, h) = capped_size(img.width(), img.height(), max_width);
    if (w, h) == (img.width(), img.height()) {
        return img;
    }
    debug!("Downscaling {}x{} → {}x{}", img.width(), img.height(), w, h);
    img.resize_exact(w, h, FilterType::Lanczos3)
}

/// Flatten to opaque RGB, cap the width and encode.
pub fn finish_page(index: usize, raw: DynamicImage, max_width: u32) -> Result<RenderedPage, WatchError> {
    let opaque = DynamicImage::ImageRgb8(raw.to_rgb8());
    let img = fit_to_width(opaque, max_width);
    let png = encode_png(&img).map_err(|e| WatchError::RenderFailed {
        detail: format!("page {index}: PNG encoding failed: {e}"),
    })?;
    Ok(RenderedPage {
        index,
        png,
        width: img.width(),
        height: img.height(),
    })
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    scale: f32,
    max_width_px: u32,
    library: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            scale: config.render_scale,
            max_width_px: config.max_width_px,
            library: config.pdfium_library.clone(),
        }
    }

    /// Bind the pdfium library: explicit path, then the working directory,
    /// then the system search path.
    pub fn bind(&self) -> Result<Pdfium, WatchError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| WatchError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// Check at startup that pdfium can be loaded; rendering would otherwise
    /// fail on every new document.
    pub fn probe(&self) -> Result<(), WatchError> {
        self.bind().map(|_| ())
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(&self, document: &[u8]) -> Result<Vec<RenderedPage>, WatchError> {
        let pdfium = self.bind()?;

        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| WatchError::RenderFailed {
                detail: format!("cannot open document: {e:?}"),
            })?;

        let pages = doc.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(WatchError::RenderFailed {
                detail: "document has no pages".into(),
            });
        }
        info!("PDF loaded: {} pages", total);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale)
            .set_clear_color(PdfColor::WHITE)
            .render_form_data(true);

        let mut results = Vec::with_capacity(total);
        for (i, page) in pages.iter().enumerate() {
            let index = i + 1;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| WatchError::RenderFailed {
                    detail: format!("page {index}: {e:?}"),
                })?;

            let page = finish_page(index, bitmap.as_image(), self.max_width_px)?;
            debug!("Rendered page {} → {}x{} px", index, page.width, page.height);
            results.push(page);
        }

        if results.len() != total {
            warn!("Rendered {} of {} pages", results.len(), total);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn narrow_pages_keep_their_size() {
        assert_eq!(capped_size(1920, 2715, 1920), (1920, 2715));
        assert_eq!(capped_size(800, 600, 1920), (800, 600));
    }

    #[test]
    fn wide_pages_are_capped_with_rounding() {
        // A4 at 3x: 1786 x 2526 fits; US Letter landscape at 3x does not.
        assert_eq!(capped_size(2376, 1836, 1920), (1920, 1484)); // 1483.6 rounds up
        assert_eq!(capped_size(3840, 1001, 1920), (1920, 501)); // 500.5 rounds away from zero
        assert_eq!(capped_size(2000, 1000, 1920), (1920, 960));
    }

    #[test]
    fn fit_to_width_resizes_exactly() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(2400, 1000));
        let out = fit_to_width(img, 1920);
        assert_eq!((out.width(), out.height()), (1920, 800));
    }

    #[test]
    fn finish_page_drops_alpha() {
        let raw = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0])));
        let page = finish_page(1, raw, 1920).unwrap();
        let decoded = image::load_from_memory(&page.png).unwrap();
        assert!(!decoded.color().has_alpha());
        assert_eq!(page.file_name(), "page_1.png");
    }

    // pdfium initialises and tears down process-global state per binding.
    static PDFIUM_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn renderer_or_skip() -> Option<PdfiumRenderer> {
        let config = WatchConfig::builder().channel_id("1").build().unwrap();
        let renderer = PdfiumRenderer::new(&config);
        match renderer.probe() {
            Ok(()) => Some(renderer),
            Err(e) => {
                println!("SKIP — pdfium unavailable: {e}");
                None
            }
        }
    }

    #[test]
    fn garbage_is_a_render_failure() {
        let _serial = PDFIUM_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let Some(renderer) = renderer_or_skip() else {
            return;
        };
        let err = renderer.render(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, WatchError::RenderFailed { .. }), "got: {err}");
    }

    #[test]
    fn blank_document_renders_in_order() {
        let _serial = PDFIUM_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let Some(renderer) = renderer_or_skip() else {
            return;
        };
        let bytes = {
            let pdfium = renderer.bind().unwrap();
            let mut doc = pdfium.create_new_pdf().unwrap();
            for _ in 0..3 {
                doc.pages_mut()
                    .create_page_at_end(PdfPagePaperSize::a4())
                    .unwrap();
            }
            let bytes = doc.save_to_bytes().unwrap();
            bytes
        };

        let pages = renderer.render(&bytes).unwrap();
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(pages.iter().all(|p| p.width <= 1920));
    }
}
