//! Frame format conversion.

use std::io::Cursor;
use std::sync::Arc;

use flipbook_blob_store::Blob;
use flipbook_common::error::{FlipbookError, FlipbookResult};
use flipbook_project_model::Resolution;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};

/// Re-encodes stored frames into the format/size the export needs.
#[async_trait::async_trait]
pub trait FrameConverter: Send + Sync {
    /// Convert `blob` to `extension`, fitting it into `resolution` if given.
    async fn convert(
        &self,
        blob: &Blob,
        extension: &str,
        resolution: Option<Resolution>,
    ) -> FlipbookResult<Arc<Vec<u8>>>;
}

/// Extension implied by a blob's MIME type (`jpeg` maps back to `jpg`).
pub fn extension_for_blob(blob: &Blob) -> String {
    match blob.subtype() {
        "" | "jpeg" => "jpg".to_string(),
        other => other.to_string(),
    }
}

fn same_format(a: &str, b: &str) -> bool {
    let canonical = |ext: &str| match ext {
        "jpeg" => "jpg".to_string(),
        other => other.to_ascii_lowercase(),
    };
    canonical(a) == canonical(b)
}

/// Converter backed by the `image` crate.
///
/// Frames already in the target format with no resize requested pass
/// through untouched. Resized frames are letterboxed on black.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFrameConverter {
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl ImageFrameConverter {
    pub fn new() -> Self {
        Self { jpeg_quality: 92 }
    }
}

#[async_trait::async_trait]
impl FrameConverter for ImageFrameConverter {
    async fn convert(
        &self,
        blob: &Blob,
        extension: &str,
        resolution: Option<Resolution>,
    ) -> FlipbookResult<Arc<Vec<u8>>> {
        if resolution.is_none() && same_format(&extension_for_blob(blob), extension) {
            return Ok(Arc::clone(&blob.bytes));
        }

        let bytes = Arc::clone(&blob.bytes);
        let extension = extension.to_string();
        let quality = if self.jpeg_quality == 0 {
            92
        } else {
            self.jpeg_quality.min(100)
        };
        tokio::task::spawn_blocking(move || reencode(&bytes, &extension, resolution, quality))
            .await
            .map_err(|e| FlipbookError::conversion(format!("Conversion task failed: {e}")))?
            .map(Arc::new)
    }
}

fn reencode(
    bytes: &[u8],
    extension: &str,
    resolution: Option<Resolution>,
    jpeg_quality: u8,
) -> FlipbookResult<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| FlipbookError::conversion(format!("Failed to decode frame: {e}")))?;

    let image = match resolution {
        Some(target) => DynamicImage::ImageRgba8(letterbox(&decoded, target)),
        None => decoded,
    };

    let mut out = Cursor::new(Vec::new());
    match extension {
        "jpg" | "jpeg" => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality);
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| FlipbookError::conversion(format!("JPEG encode failed: {e}")))?;
        }
        "png" => image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| FlipbookError::conversion(format!("PNG encode failed: {e}")))?,
        "webp" => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut out, ImageFormat::WebP)
            .map_err(|e| FlipbookError::conversion(format!("WebP encode failed: {e}")))?,
        other => {
            return Err(FlipbookError::conversion(format!(
                "Unsupported target format: {other}"
            )))
        }
    }
    Ok(out.into_inner())
}

/// Scale to fit inside `target` keeping aspect ratio, centered on black.
fn letterbox(image: &DynamicImage, target: Resolution) -> RgbaImage {
    let (src_w, src_h) = (image.width().max(1), image.height().max(1));
    let scale = f64::min(
        f64::from(target.width) / f64::from(src_w),
        f64::from(target.height) / f64::from(src_h),
    );
    let fit_w = ((f64::from(src_w) * scale).round() as u32).clamp(1, target.width.max(1));
    let fit_h = ((f64::from(src_h) * scale).round() as u32).clamp(1, target.height.max(1));

    let resized = image.resize_exact(fit_w, fit_h, imageops::FilterType::Lanczos3);
    let mut canvas = RgbaImage::from_pixel(
        target.width.max(1),
        target.height.max(1),
        image::Rgba([0, 0, 0, 255]),
    );
    let x = i64::from((target.width - fit_w) / 2);
    let y = i64::from((target.height - fit_h) / 2);
    imageops::overlay(&mut canvas, &resized.to_rgba8(), x, y);
    canvas
}
