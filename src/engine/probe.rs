// src/engine/probe.rs
//
// Quick Probe (C6): cheaply estimates whether compressing an image is even
// worth it, before paying for a full-resolution encode. Downsamples to a
// small working size, encodes at a fixed mid quality, and extrapolates the
// savings ratio back up to the original pixel count.

use crate::engine::analyzer::{self, ImageAnalysis};
use crate::engine::pipeline::fast_resize;
use crate::engine::tasks::encode_for_format;
use crate::ops::OutputFormat;
use image::{DynamicImage, GenericImageView};

/// Probe encode quality, fixed regardless of the caller's requested
/// quality — the probe only needs a representative compression ratio.
const PROBE_QUALITY: u8 = 50;

/// Probe downsample cap: never sample more than this many pixels per axis.
const PROBE_MAX_DIMENSION: u32 = 512;

/// Below this estimated-savings fraction, compressing isn't worth the cost.
const SKIP_THRESHOLD: f64 = 0.03;

#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub should_skip: bool,
    pub estimated_savings: f64,
    pub probe_time_ms: f64,
    pub analysis: Option<ImageAnalysis>,
}

/// Whether a job is even eligible for probing: same source/target format,
/// no fixed size target (the probe's estimate would be moot), and not an
/// `auto`-resolved format (nothing concrete to probe against yet).
pub fn is_probe_eligible(
    source_format_matches_target: bool,
    target_size_kb: Option<u32>,
    is_auto_format: bool,
) -> bool {
    source_format_matches_target && target_size_kb.is_none() && !is_auto_format
}

/// Run the quick probe against a decoded image for the given output format.
/// Probe failures (encode error) are treated as "don't skip" rather than
/// propagated, since the probe is purely advisory.
pub fn quick_probe(img: &DynamicImage, original_size: usize, format: &OutputFormat) -> ProbeResult {
    let started_at = std::time::Instant::now();
    let (width, height) = img.dimensions();
    let analysis = if width > 0 && height > 0 {
        Some(analyzer::analyze(img))
    } else {
        None
    };

    if width == 0 || height == 0 {
        return ProbeResult {
            should_skip: false,
            estimated_savings: 0.0,
            probe_time_ms: elapsed_ms(started_at),
            analysis,
        };
    }

    let longest_edge = width.max(height) as f64;
    let scale = (0.5f64).min(PROBE_MAX_DIMENSION as f64 / longest_edge);
    let probe_width = ((width as f64 * scale).round() as u32).max(1);
    let probe_height = ((height as f64 * scale).round() as u32).max(1);

    let downsampled = match fast_resize(img, probe_width, probe_height) {
        Ok(resized) => resized,
        Err(_) => {
            return ProbeResult {
                should_skip: false,
                estimated_savings: 0.0,
                probe_time_ms: elapsed_ms(started_at),
                analysis,
            };
        }
    };

    let probe_format = at_probe_quality(format);
    let probe_bytes = match encode_for_format(&downsampled, &probe_format, None) {
        Ok(bytes) => bytes,
        Err(_) => {
            return ProbeResult {
                should_skip: false,
                estimated_savings: 0.0,
                probe_time_ms: elapsed_ms(started_at),
                analysis,
            };
        }
    };

    let probe_pixel_count = probe_width as f64 * probe_height as f64 * 4.0;
    let ratio = probe_bytes.len() as f64 / probe_pixel_count.max(1.0);
    let original_pixel_count = width as f64 * height as f64 * 4.0;
    let estimated_size = ratio * original_pixel_count;

    let estimated_savings = if original_size > 0 {
        ((original_size as f64 - estimated_size) / original_size as f64).max(0.0)
    } else {
        0.0
    };

    ProbeResult {
        should_skip: estimated_savings < SKIP_THRESHOLD,
        estimated_savings,
        probe_time_ms: elapsed_ms(started_at),
        analysis,
    }
}

fn elapsed_ms(started_at: std::time::Instant) -> f64 {
    started_at.elapsed().as_secs_f64() * 1000.0
}

/// Rewrite an output format spec to encode at the fixed probe quality,
/// keeping every other setting (fast_mode stays whatever the caller passed,
/// since the probe should run at full speed regardless).
fn at_probe_quality(format: &OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Jpeg { .. } => OutputFormat::Jpeg {
            quality: PROBE_QUALITY,
            fast_mode: true,
            chroma_subsampling: true,
            progressive: false,
        },
        OutputFormat::Png { .. } => OutputFormat::Png { quantize: None },
        OutputFormat::WebP { .. } => OutputFormat::WebP {
            quality: PROBE_QUALITY,
            preset: crate::ops::WebpPreset::default(),
            lossless_mode: crate::ops::WebpLosslessMode::Lossy,
            near_lossless_level: 60,
        },
        OutputFormat::Avif { .. } => OutputFormat::Avif {
            quality: PROBE_QUALITY,
            speed: Some(8),
            bit_depth: crate::ops::AvifBitDepth::Eight,
        },
        OutputFormat::Jxl { .. } => OutputFormat::Jxl {
            quality: PROBE_QUALITY,
            effort: 3,
            lossless: false,
            progressive: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn flat_image_is_flagged_for_skip() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(800, 600, image::Rgba([10, 20, 30, 255])));
        let original_size = 5_000;
        let result = quick_probe(&img, original_size, &OutputFormat::WebP { quality: 80, preset: crate::ops::WebpPreset::default(), lossless_mode: crate::ops::WebpLosslessMode::Lossy, near_lossless_level: 60 });
        assert!(result.should_skip);
    }

    #[test]
    fn noisy_image_is_not_flagged_for_skip() {
        let buf = image::ImageBuffer::from_fn(800, 600, |x, y| {
            image::Rgba([((x * 53 + y * 17) % 256) as u8, (y % 256) as u8, (x % 256) as u8, 255])
        });
        let img = DynamicImage::ImageRgba8(buf);
        let original_size = 800 * 600 * 4;
        let result = quick_probe(&img, original_size, &OutputFormat::WebP { quality: 80, preset: crate::ops::WebpPreset::default(), lossless_mode: crate::ops::WebpLosslessMode::Lossy, near_lossless_level: 60 });
        assert!(!result.should_skip);
        assert!(result.estimated_savings > 0.0);
    }

    #[test]
    fn zero_dimension_image_does_not_panic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        let result = quick_probe(&img, 0, &OutputFormat::WebP { quality: 80, preset: crate::ops::WebpPreset::default(), lossless_mode: crate::ops::WebpLosslessMode::Lossy, near_lossless_level: 60 });
        assert!(!result.should_skip);
    }

    #[test]
    fn probe_eligibility_requires_matching_format_and_no_target_size() {
        assert!(is_probe_eligible(true, None, false));
        assert!(!is_probe_eligible(false, None, false));
        assert!(!is_probe_eligible(true, Some(200), false));
        assert!(!is_probe_eligible(true, None, true));
    }
}
