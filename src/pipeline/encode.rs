//! Image encoding: `DynamicImage` → PNG bytes ready for upload.
//!
//! PNG keeps the rendered text crisp; JPEG artefacts around small table
//! glyphs make the pages hard to read on phones. Best compression with
//! adaptive filtering keeps uploads small without losing a pixel.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use tracing::debug;

/// Encode a rendered page as an optimised, lossless PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)?;

    debug!("Encoded {}x{} page → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}
