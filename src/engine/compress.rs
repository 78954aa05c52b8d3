// src/engine/compress.rs
//
// Job Orchestrator (C9): the single entry point that ties format detection,
// decoding, content analysis, the transform pipeline, the codec router, the
// quick probe, the size-target controller, and metadata handling together
// into one call. This is what both the NAPI binding and any pure-Rust
// caller use; `ImageEngine` (api.rs) remains available as the lower-level
// fluent builder for callers that want to compose operations by hand.

use crate::engine::analyzer::{self, ContentKind, ImageAnalysis};
use crate::engine::metadata::apply_metadata_policy;
use crate::engine::pipeline::apply_ops;
use crate::engine::pool::{JobPool, Priority};
use crate::engine::probe::{self, ProbeResult};
use crate::engine::size_target::meet_size_target;
use crate::engine::tasks::encode_for_format;
use crate::engine::{check_dimensions, MAX_PIXELS};
use crate::error::LazyImageError;
use crate::format::ImageFormat;
use crate::ops::{
    AvifBitDepth, Operation, OutputFormat, PngQuantizeOptions, ResizeFilter, ResizeFit,
    WebpLosslessMode, WebpPreset, WatermarkPosition,
};
use image::{DynamicImage, GenericImageView};
use std::borrow::Cow;

#[cfg(feature = "napi")]
type CompressResult<T> = napi::Result<T>;
#[cfg(not(feature = "napi"))]
type CompressResult<T> = std::result::Result<T, LazyImageError>;

#[cfg(feature = "napi")]
fn to_compress_error(err: LazyImageError) -> napi::Error {
    napi::Error::from(err)
}
#[cfg(not(feature = "napi"))]
fn to_compress_error(err: LazyImageError) -> LazyImageError {
    err
}

/// Every knob the job orchestrator accepts. `None` means "let the
/// orchestrator decide" for fields with an auto-resolution rule; fields
/// with no auto rule (crop, rotate, watermark, ...) are simply skipped when
/// `None`/absent.
#[derive(Clone, Debug)]
pub struct CompressionOptions {
    /// "auto", "jpeg", "png", "webp", "avif", "jxl".
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub fit_mode: ResizeFit,
    pub target_size_kb: Option<u32>,
    /// `None` triggers auto-resolution (content-kind driven); `Some` pins it.
    pub lossless: Option<bool>,
    pub dithering: f32,
    pub preserve_metadata: bool,
    pub fast_mode: bool,
    pub rotate: Option<i32>,
    pub flip_h: bool,
    pub flip_v: bool,
    pub crop: Option<(u32, u32, u32, u32)>,
    /// 0-100 intensity, mapped to the unsharp-mask sigma the pipeline
    /// actually applies (see `sharpen_intensity_to_sigma`).
    pub sharpen: Option<f32>,
    /// 0-100 intensity, mapped to a Gaussian radius of 0-50 (see
    /// `blur_intensity_to_radius`).
    pub blur: Option<f32>,
    /// 0-100 threshold, mapped to the 0-255 per-channel deviation the
    /// trim scan compares against (see `auto_trim_threshold_to_tolerance`).
    pub auto_trim: Option<u8>,
    pub watermark: Option<(String, f32, WatermarkPosition)>,
    pub watermark_font_size: Option<f32>,
    pub watermark_color: Option<(u8, u8, u8)>,
    pub resize_filter: ResizeFilter,
    /// true = 4:2:0 (smaller), false = 4:4:4 (sharper). JPEG only.
    pub chroma_subsampling: bool,
    pub progressive: bool,
    pub webp_preset: WebpPreset,
    pub webp_lossless_mode: WebpLosslessMode,
    pub near_lossless_level: u8,
    /// `None` lets the quality band pick an AVIF encode speed.
    pub avif_speed: Option<u8>,
    pub avif_bit_depth: AvifBitDepth,
    pub jxl_effort: u8,
    pub jxl_lossless: bool,
    pub jxl_progressive: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            format: None,
            quality: None,
            target_width: None,
            target_height: None,
            fit_mode: ResizeFit::default(),
            target_size_kb: None,
            lossless: None,
            dithering: 1.0,
            preserve_metadata: false,
            fast_mode: false,
            rotate: None,
            flip_h: false,
            flip_v: false,
            crop: None,
            sharpen: None,
            blur: None,
            auto_trim: None,
            watermark: None,
            watermark_font_size: None,
            watermark_color: None,
            resize_filter: ResizeFilter::default(),
            chroma_subsampling: true,
            progressive: true,
            webp_preset: WebpPreset::default(),
            webp_lossless_mode: WebpLosslessMode::default(),
            near_lossless_level: 60,
            avif_speed: None,
            avif_bit_depth: AvifBitDepth::default(),
            jxl_effort: 7,
            jxl_lossless: false,
            jxl_progressive: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompressionResult {
    pub blob: Vec<u8>,
    pub format: ImageFormat,
    pub analysis: Option<ImageAnalysis>,
    pub resize_applied: bool,
    pub target_size_met: bool,
    pub original_width: u32,
    pub original_height: u32,
    pub width: u32,
    pub height: u32,
    pub warning: Option<String>,
}

/// Run the full compression job: detect → decode → analyze → resolve
/// format/lossless/quality → probe → transform → encode → size-target →
/// safety check → metadata. `id` is an opaque caller tag used only in
/// tracing spans.
pub fn compress(
    id: &str,
    bytes: &[u8],
    declared_mime: Option<&str>,
    filename: Option<&str>,
    options: &CompressionOptions,
) -> CompressResult<CompressionResult> {
    let span = tracing::info_span!("compress", id = %id, bytes = bytes.len());
    let _enter = span.enter();

    let source_format = crate::format::detect(bytes, declared_mime, filename);
    if source_format == ImageFormat::Unknown {
        return Err(to_compress_error(LazyImageError::unsupported_format(
            "unrecognized image format",
        )));
    }

    let (decoded, _) =
        crate::engine::decoder::decode_image(bytes).map_err(to_compress_error)?;
    let (orig_w, orig_h) = decoded.dimensions();
    check_dimensions(orig_w, orig_h).map_err(to_compress_error)?;
    if (orig_w as u64) * (orig_h as u64) > MAX_PIXELS {
        return Err(to_compress_error(LazyImageError::pixel_count_exceeds_limit(
            orig_w as u64 * orig_h as u64,
            MAX_PIXELS,
        )));
    }

    let analysis = analyzer::analyze(&decoded);
    let icc_profile = crate::engine::io::extract_icc_profile(bytes);

    let requested_format = options.format.as_deref().unwrap_or("auto");
    let is_auto_format = requested_format.eq_ignore_ascii_case("auto");
    let resolved_format_name = if is_auto_format {
        resolve_auto_format(&analysis)
    } else {
        requested_format.to_string()
    };

    let mut output_format = build_output_format(&resolved_format_name, options, &analysis)
        .map_err(|e| to_compress_error(LazyImageError::unsupported_format(e)))?;

    let target_image_format = output_format_to_image_format(&output_format);

    let probe_eligible = probe::is_probe_eligible(
        source_format == target_image_format,
        options.target_size_kb,
        is_auto_format,
    );
    let probe_result: Option<ProbeResult> = if probe_eligible {
        let result = probe::quick_probe(&decoded, bytes.len(), &output_format);
        if result.should_skip {
            tracing::info!(savings = result.estimated_savings, "probe: skipping compression");
            return Ok(CompressionResult {
                blob: bytes.to_vec(),
                format: source_format,
                analysis: Some(analysis),
                resize_applied: false,
                target_size_met: true,
                original_width: orig_w,
                original_height: orig_h,
                width: orig_w,
                height: orig_h,
                warning: Some("returned original: estimated savings below threshold".to_string()),
            });
        }
        Some(result)
    } else {
        None
    };

    let ops = build_operations(options, orig_w, orig_h);
    let processed = apply_ops(Cow::Owned(decoded), &ops).map_err(to_compress_error)?;
    let (width, height) = processed.dimensions();

    let icc_ref = if options.preserve_metadata {
        icc_profile.as_deref()
    } else {
        None
    };

    let requested_quality = format_quality(&output_format).unwrap_or(80);
    let size_result = match options.target_size_kb {
        Some(target_kb) => meet_size_target(
            &processed,
            &output_format,
            requested_quality,
            target_kb,
            bytes.len(),
            icc_ref,
        )
        .map_err(to_compress_error)?,
        None => {
            let handle = JobPool::global()
                .submit(Priority::Normal, {
                    let processed_owned = processed.as_ref().clone();
                    let format = output_format.clone();
                    let icc = icc_ref.map(|c| c.to_vec());
                    move || encode_for_format(&processed_owned, &format, icc.as_deref())
                })
                .map_err(to_compress_error)?;
            let initial_bytes = handle.wait().map_err(to_compress_error)?;
            crate::engine::size_target::apply_safety_check(
                &processed,
                &output_format,
                requested_quality,
                initial_bytes,
                bytes.len(),
                icc_ref,
                width,
                height,
                false,
                true,
            )
            .map_err(to_compress_error)?
        }
    };

    let quality_used = size_result.quality_used;
    let resize_applied = size_result.resize_applied;
    let target_size_met = size_result.target_met;
    let (width, height) = (size_result.width, size_result.height);
    let mut warning = size_result.warning;
    let mut encoded = size_result.bytes;

    if quality_used > 0 {
        output_format = with_resolved_quality(&output_format, quality_used);
    }

    if encoded.is_empty() && warning.is_some() {
        encoded = bytes.to_vec();
    }
    if let Some(probe) = &probe_result {
        tracing::debug!(probe_time_ms = probe.probe_time_ms, "probe: ran before full encode");
    }

    let metadata_outcome = apply_metadata_policy(
        source_format,
        target_image_format,
        bytes,
        encoded,
        options.preserve_metadata,
        icc_ref,
    );

    Ok(CompressionResult {
        blob: metadata_outcome.bytes,
        format: target_image_format,
        analysis: Some(analysis),
        resize_applied,
        target_size_met,
        original_width: orig_w,
        original_height: orig_h,
        width,
        height,
        warning,
    })
}

/// any alpha < 255 → webp; else photo → webp; else → png.
fn resolve_auto_format(analysis: &ImageAnalysis) -> String {
    if analysis.has_transparency {
        "webp".to_string()
    } else if analysis.kind == ContentKind::Photo {
        "webp".to_string()
    } else {
        "png".to_string()
    }
}

/// JPEG quality floor applied when the analyzer calls the content a photo:
/// low quality settings introduce visible blocking on photographic gradients
/// that graphics/solid-color content doesn't show nearly as readily.
const JPEG_PHOTO_QUALITY_FLOOR: u8 = 70;

fn build_output_format(
    format_name: &str,
    options: &CompressionOptions,
    analysis: &ImageAnalysis,
) -> Result<OutputFormat, String> {
    if format_name.eq_ignore_ascii_case("png") {
        let lossless = options.lossless.unwrap_or_else(|| match analysis.kind {
            ContentKind::Photo | ContentKind::Mixed => false,
            ContentKind::Graphic => analysis.unique_colors < 256,
        });
        let quantize = if lossless {
            None
        } else {
            Some(PngQuantizeOptions {
                dithering: options.dithering,
            })
        };
        return Ok(OutputFormat::Png { quantize });
    }

    if format_name.eq_ignore_ascii_case("jpeg") || format_name.eq_ignore_ascii_case("jpg") {
        let mut quality = options.quality.unwrap_or(85);
        if analysis.kind == ContentKind::Photo {
            quality = quality.max(JPEG_PHOTO_QUALITY_FLOOR);
        }
        return Ok(OutputFormat::Jpeg {
            quality,
            fast_mode: options.fast_mode,
            chroma_subsampling: options.chroma_subsampling,
            progressive: options.progressive,
        });
    }

    if format_name.eq_ignore_ascii_case("webp") {
        let quality = options.quality.unwrap_or(80);
        let lossless_mode = if options.webp_lossless_mode != WebpLosslessMode::Lossy {
            options.webp_lossless_mode
        } else if options.lossless == Some(true) {
            WebpLosslessMode::Lossless
        } else {
            WebpLosslessMode::Lossy
        };
        return Ok(OutputFormat::WebP {
            quality,
            preset: options.webp_preset,
            lossless_mode,
            near_lossless_level: options.near_lossless_level,
        });
    }

    if format_name.eq_ignore_ascii_case("avif") {
        let quality = options.quality.unwrap_or(60);
        return Ok(OutputFormat::Avif {
            quality,
            speed: options.avif_speed,
            bit_depth: options.avif_bit_depth,
        });
    }

    if format_name.eq_ignore_ascii_case("jxl") {
        let quality = options.quality.unwrap_or(80);
        return Ok(OutputFormat::Jxl {
            quality,
            effort: options.jxl_effort,
            lossless: options.jxl_lossless || options.lossless == Some(true),
            progressive: options.jxl_progressive,
        });
    }

    Err(format!("unsupported format: {format_name}"))
}

fn output_format_to_image_format(format: &OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpeg { .. } => ImageFormat::Jpeg,
        OutputFormat::Png { .. } => ImageFormat::Png,
        OutputFormat::WebP { .. } => ImageFormat::WebP,
        OutputFormat::Avif { .. } => ImageFormat::Avif,
        OutputFormat::Jxl { .. } => ImageFormat::Jxl,
    }
}

fn format_quality(format: &OutputFormat) -> Option<u8> {
    match format {
        OutputFormat::Jpeg { quality, .. }
        | OutputFormat::WebP { quality, .. }
        | OutputFormat::Avif { quality, .. }
        | OutputFormat::Jxl { quality, .. } => Some(*quality),
        OutputFormat::Png { .. } => None,
    }
}

fn with_resolved_quality(format: &OutputFormat, quality: u8) -> OutputFormat {
    match format {
        OutputFormat::Jpeg {
            fast_mode,
            chroma_subsampling,
            progressive,
            ..
        } => OutputFormat::Jpeg {
            quality,
            fast_mode: *fast_mode,
            chroma_subsampling: *chroma_subsampling,
            progressive: *progressive,
        },
        OutputFormat::Png { quantize } => OutputFormat::Png {
            quantize: *quantize,
        },
        OutputFormat::WebP {
            preset,
            lossless_mode,
            near_lossless_level,
            ..
        } => OutputFormat::WebP {
            quality,
            preset: *preset,
            lossless_mode: *lossless_mode,
            near_lossless_level: *near_lossless_level,
        },
        OutputFormat::Avif { speed, bit_depth, .. } => OutputFormat::Avif {
            quality,
            speed: *speed,
            bit_depth: *bit_depth,
        },
        OutputFormat::Jxl {
            effort,
            lossless,
            progressive,
            ..
        } => OutputFormat::Jxl {
            quality,
            effort: *effort,
            lossless: *lossless,
            progressive: *progressive,
        },
    }
}

/// Build the fixed-order operation list: crop → rotate/flip → resize/fit →
/// sharpen → blur → auto-trim → watermark. `apply_ops` consumes operations
/// in the order given, so this order is load-bearing.
fn build_operations(options: &CompressionOptions, orig_w: u32, orig_h: u32) -> Vec<Operation> {
    let mut ops = Vec::new();

    if let Some((x, y, w, h)) = options.crop {
        ops.push(Operation::Crop { x, y, width: w, height: h });
    }

    if let Some(degrees) = options.rotate {
        ops.push(Operation::Rotate { degrees });
    }
    if options.flip_h {
        ops.push(Operation::FlipH);
    }
    if options.flip_v {
        ops.push(Operation::FlipV);
    }

    if options.target_width.is_some() || options.target_height.is_some() {
        let _ = (orig_w, orig_h);
        ops.push(Operation::Resize {
            width: options.target_width,
            height: options.target_height,
            fit: options.fit_mode,
            filter: options.resize_filter,
        });
    }

    if let Some(intensity) = options.sharpen {
        ops.push(Operation::Sharpen { sigma: sharpen_intensity_to_sigma(intensity) });
    }
    if let Some(intensity) = options.blur {
        ops.push(Operation::Blur { sigma: blur_intensity_to_radius(intensity) });
    }
    if let Some(threshold) = options.auto_trim {
        ops.push(Operation::AutoTrim { tolerance: auto_trim_threshold_to_tolerance(threshold) });
    }
    if let Some((text, opacity, position)) = options.watermark.clone() {
        ops.push(Operation::Watermark {
            text,
            opacity,
            position,
            font_size: options.watermark_font_size,
            color: options.watermark_color,
        });
    }

    ops
}

/// Sharpen 0-100 → unsharp-mask sigma 0.0-1.0 (spec §4.4).
fn sharpen_intensity_to_sigma(intensity: f32) -> f32 {
    intensity.clamp(0.0, 100.0) / 100.0
}

/// Blur 0-100 → Gaussian radius 0-50 (spec §4.4).
fn blur_intensity_to_radius(intensity: f32) -> f32 {
    intensity.clamp(0.0, 100.0) / 100.0 * 50.0
}

/// Auto-trim threshold 0-100 → per-channel deviation tolerance 0-255 (spec §4.4).
fn auto_trim_threshold_to_tolerance(threshold: u8) -> u8 {
    (threshold.min(100) as u32 * 255 / 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder::encode_png;
    use image::RgbaImage;

    fn sample_png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, image::Rgba([30, 120, 200, 255])));
        encode_png(&img, None).unwrap()
    }

    #[test]
    fn compresses_flat_png_to_smaller_auto_format() {
        let bytes = sample_png_bytes(256, 256);
        let options = CompressionOptions {
            format: Some("auto".to_string()),
            dithering: 1.0,
            preserve_metadata: false,
            ..Default::default()
        };
        let result = compress("test-1", &bytes, Some("image/png"), None, &options).unwrap();
        assert_eq!(result.original_width, 256);
        assert_eq!(result.original_height, 256);
        assert!(!result.blob.is_empty());
    }

    #[test]
    fn explicit_format_and_resize_are_honored() {
        let bytes = sample_png_bytes(400, 300);
        let options = CompressionOptions {
            format: Some("webp".to_string()),
            quality: Some(70),
            target_width: Some(200),
            fit_mode: ResizeFit::Contain,
            dithering: 1.0,
            ..Default::default()
        };
        let result = compress("test-2", &bytes, None, Some("in.png"), &options).unwrap();
        assert_eq!(result.format, ImageFormat::WebP);
        assert!(result.width <= 200);
    }

    #[test]
    fn unrecognized_bytes_return_unsupported_format_error() {
        let options = CompressionOptions::default();
        let result = compress("test-3", b"not an image", None, None, &options);
        assert!(result.is_err());
    }

    #[test]
    fn sharpen_and_blur_intensity_map_into_documented_ranges() {
        assert_eq!(sharpen_intensity_to_sigma(0.0), 0.0);
        assert_eq!(sharpen_intensity_to_sigma(100.0), 1.0);
        assert_eq!(sharpen_intensity_to_sigma(50.0), 0.5);
        assert_eq!(sharpen_intensity_to_sigma(150.0), 1.0); // clamped

        assert_eq!(blur_intensity_to_radius(0.0), 0.0);
        assert_eq!(blur_intensity_to_radius(100.0), 50.0);
        assert_eq!(blur_intensity_to_radius(40.0), 20.0);
    }

    #[test]
    fn auto_trim_threshold_maps_percent_to_byte_deviation() {
        assert_eq!(auto_trim_threshold_to_tolerance(0), 0);
        assert_eq!(auto_trim_threshold_to_tolerance(100), 255);
        assert_eq!(auto_trim_threshold_to_tolerance(50), 127);
        assert_eq!(auto_trim_threshold_to_tolerance(200), 255); // clamped to 100%
    }
}
