//! # Image Optimizer Module
//!
//! Ottimizzatore in-memory basato sul crate `image`.
//!
//! ## Formati Supportati
//!
//! | Formato | Input | Output | Strategia |
//! |---------|-------|--------|-----------|
//! | JPEG    | ✅    | ✅     | re-encode con qualità configurabile |
//! | PNG     | ✅    | ✅     | re-encode lossless |
//! | Altri   | ❌    | ❌     | skip (`unsupported-format`) |
//!
//! ## Pipeline per singolo file
//!
//! 1. **Rilevamento formato**: dall'hint (estensione), altrimenti dai magic bytes
//! 2. **Decode**: errore `Decode` se i bytes sono corrotti
//! 3. **Resize**: solo se l'immagine supera `max_width`/`max_height` (aspect ratio preservato)
//! 4. **Encode**: JPEG con `quality`, PNG lossless
//! 5. **Threshold**: se non ridimensionata e `new >= original * threshold` → skip
//!
//! Il lavoro CPU-bound gira su `spawn_blocking`, per non bloccare il runtime.

use super::{OptimizeParams, OptimizeResult, Optimized, Optimizer};
use crate::error::OptimizeError;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::time::Instant;
use tracing::debug;

/// Re-encoding optimizer for JPEG and PNG
#[derive(Debug, Clone)]
pub struct ImageOptimizer {
    /// Keep the result only if `new < original * size_threshold`
    size_threshold: f64,
}

impl Default for ImageOptimizer {
    fn default() -> Self {
        Self { size_threshold: 0.9 }
    }
}

impl ImageOptimizer {
    pub fn new(size_threshold: f64) -> Self {
        Self { size_threshold }
    }

    /// Formato di output per un hint; `None` = non supportato
    fn output_format(data: &[u8], format_hint: &str) -> Option<ImageFormat> {
        match format_hint {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "" => match image::guess_format(data).ok()? {
                ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
                ImageFormat::Png => Some(ImageFormat::Png),
                _ => None,
            },
            _ => None,
        }
    }

    fn optimize_sync(
        data: &[u8],
        format_hint: &str,
        params: OptimizeParams,
        size_threshold: f64,
    ) -> Result<Optimized, OptimizeError> {
        let start = Instant::now();
        let original_size = data.len() as u64;

        let format = match Self::output_format(data, format_hint) {
            Some(format) => format,
            None => {
                debug!("Unsupported format hint '{}', skipping", format_hint);
                return Ok(Optimized {
                    bytes: Vec::new(),
                    result: OptimizeResult::skipped(original_size, "unsupported-format", start.elapsed()),
                });
            }
        };

        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| OptimizeError::Decode(e.to_string()))?;
        let (img, resized) = Self::fit_within(img, params.max_width, params.max_height);

        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let quality = params.quality.clamp(1, 100);
                DynamicImage::ImageRgb8(img.to_rgb8())
                    .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(quality))?;
            }
            _ => {
                img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;
            }
        }

        let optimized_size = out.len() as u64;
        if !resized && (optimized_size as f64) >= (original_size as f64 * size_threshold) {
            debug!(
                "Insufficient reduction ({} -> {}, threshold {})",
                original_size, optimized_size, size_threshold
            );
            return Ok(Optimized {
                bytes: Vec::new(),
                result: OptimizeResult::skipped(original_size, "insufficient-reduction", start.elapsed()),
            });
        }

        Ok(Optimized {
            bytes: out,
            result: OptimizeResult {
                original_size,
                optimized_size,
                duration: start.elapsed(),
                skipped: false,
                reason: None,
            },
        })
    }

    /// Ridimensiona solo se l'immagine eccede i limiti (0 = illimitato)
    fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> (DynamicImage, bool) {
        let (width, height) = img.dimensions();
        let too_wide = max_width > 0 && width > max_width;
        let too_tall = max_height > 0 && height > max_height;
        if !too_wide && !too_tall {
            return (img, false);
        }

        let bound_w = if max_width > 0 { max_width.min(width) } else { width };
        let bound_h = if max_height > 0 { max_height.min(height) } else { height };
        debug!("Resizing {}x{} to fit {}x{}", width, height, bound_w, bound_h);
        (img.resize(bound_w, bound_h, FilterType::Lanczos3), true)
    }
}

#[async_trait]
impl Optimizer for ImageOptimizer {
    async fn optimize_bytes(
        &self,
        data: Vec<u8>,
        format_hint: &str,
        params: &OptimizeParams,
    ) -> Result<Optimized, OptimizeError> {
        let hint = format_hint.to_lowercase();
        let params = *params;
        let threshold = self.size_threshold;

        tokio::task::spawn_blocking(move || Self::optimize_sync(&data, &hint, params, threshold))
            .await
            .map_err(|e| OptimizeError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_jpeg_is_recompressed() {
        let original = encode(96, 96, ImageOutputFormat::Jpeg(100));
        let optimizer = ImageOptimizer::new(1.0);
        let params = OptimizeParams { quality: 30, ..Default::default() };

        let optimized = optimizer.optimize_bytes(original.clone(), "jpg", &params).await.unwrap();

        assert!(!optimized.result.skipped);
        assert_eq!(optimized.result.original_size, original.len() as u64);
        assert_eq!(optimized.result.optimized_size, optimized.bytes.len() as u64);
        assert!(optimized.bytes.len() < original.len());
    }

    #[tokio::test]
    async fn test_resize_respects_bounds() {
        let original = encode(64, 32, ImageOutputFormat::Png);
        let optimizer = ImageOptimizer::default();
        let params = OptimizeParams { max_width: 16, ..Default::default() };

        let optimized = optimizer.optimize_bytes(original, "PNG", &params).await.unwrap();

        assert!(!optimized.result.skipped);
        let decoded = image::load_from_memory(&optimized.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[tokio::test]
    async fn test_unsupported_format_is_skipped() {
        let optimizer = ImageOptimizer::default();
        let optimized = optimizer
            .optimize_bytes(b"GIF89a".to_vec(), "gif", &OptimizeParams::default())
            .await
            .unwrap();

        assert!(optimized.result.skipped);
        assert_eq!(optimized.result.reason.as_deref(), Some("unsupported-format"));
        assert!(optimized.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_bytes_are_a_decode_error() {
        let optimizer = ImageOptimizer::default();
        let result = optimizer
            .optimize_bytes(b"not a jpeg".to_vec(), "jpg", &OptimizeParams::default())
            .await;
        assert!(matches!(result, Err(OptimizeError::Decode(_))));
    }

    #[tokio::test]
    async fn test_missing_hint_sniffs_format() {
        let original = encode(8, 8, ImageOutputFormat::Png);
        let optimizer = ImageOptimizer::new(0.0);

        let optimized = optimizer
            .optimize_bytes(original, "", &OptimizeParams::default())
            .await
            .unwrap();

        // Threshold 0.0 can never be met without a resize
        assert!(optimized.result.skipped);
        assert_eq!(optimized.result.reason.as_deref(), Some("insufficient-reduction"));
    }
}
