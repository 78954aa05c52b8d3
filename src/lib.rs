// lib.rs
//
// snapcompress: client-side, multi-codec image compression engine.
//
// Design goals:
// - Pick the smallest output that still meets a target quality or size
// - Multi-codec: JPEG, PNG, WebP, AVIF, JPEG XL behind one API
// - Non-blocking async API for Node.js via NAPI, usable as a plain Rust crate too

#[cfg(feature = "napi")]
#[macro_use]
extern crate napi_derive;

// Memory allocator optimization - jemalloc for better performance
// Expected impact: 10-15% overall performance improvement
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod engine;
pub mod error;
pub mod format;
pub mod ops;

#[cfg(any(feature = "napi", feature = "fuzzing"))]
use image::ImageReader;
#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
#[cfg(any(feature = "napi", feature = "fuzzing"))]
use std::io::{BufRead, BufReader, Cursor, Seek};

// Re-export the engine for NAPI
#[cfg(feature = "napi")]
pub use engine::ImageEngine;
#[cfg(any(feature = "napi", feature = "fuzzing"))]
use error::LazyImageError;

#[cfg(any(feature = "napi", feature = "fuzzing"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

#[cfg(any(feature = "napi", feature = "fuzzing"))]
fn read_inspect_metadata<R: BufRead + Seek>(
    reader: R,
) -> std::result::Result<InspectMetadata, LazyImageError> {
    let reader = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|e| LazyImageError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().map(|f| format!("{:?}", f).to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| LazyImageError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

#[cfg(any(feature = "napi", feature = "fuzzing"))]
pub fn inspect_header_from_bytes(
    data: &[u8],
) -> std::result::Result<InspectMetadata, LazyImageError> {
    read_inspect_metadata(Cursor::new(data))
}

#[cfg(any(feature = "napi", feature = "fuzzing"))]
pub fn inspect_header_from_path(
    path: &str,
) -> std::result::Result<InspectMetadata, LazyImageError> {
    use std::fs::File;

    let file =
        File::open(path).map_err(|e| LazyImageError::file_read_failed(path.to_string(), e))?;
    read_inspect_metadata(BufReader::new(file))
}

#[cfg(feature = "napi")]
/// Image metadata returned by inspect()
#[napi(object)]
pub struct ImageMetadata {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Detected format (jpeg, png, webp, gif, etc.)
    pub format: Option<String>,
}

#[cfg(feature = "napi")]
impl From<InspectMetadata> for ImageMetadata {
    fn from(value: InspectMetadata) -> Self {
        Self {
            width: value.width,
            height: value.height,
            format: value.format,
        }
    }
}

#[cfg(feature = "napi")]
/// Inspect image metadata WITHOUT decoding pixels.
/// This reads only the header bytes - extremely fast (<1ms).
///
/// Use this to check dimensions before processing, or to reject
/// images that are too large without wasting CPU on decoding.
#[napi]
pub fn inspect(env: Env, buffer: Buffer) -> Result<ImageMetadata> {
    let metadata = match inspect_header_from_bytes(buffer.as_ref()) {
        Ok(metadata) => metadata,
        Err(err) => {
            return Err(crate::error::napi_error_with_code(&env, err.clone())?);
        }
    };
    Ok(metadata.into())
}

#[cfg(feature = "napi")]
/// Inspect image metadata from a file path WITHOUT loading into Node.js heap.
/// **Memory-efficient**: Reads directly from filesystem, bypassing V8 entirely.
/// This is the recommended way for server-side metadata inspection.
#[napi(js_name = "inspectFile")]
pub fn inspect_file(env: Env, path: String) -> Result<ImageMetadata> {
    let metadata = match inspect_header_from_path(&path) {
        Ok(metadata) => metadata,
        Err(err) => {
            return Err(crate::error::napi_error_with_code(&env, err.clone())?);
        }
    };
    Ok(metadata.into())
}

#[cfg(feature = "napi")]
/// Get library version
#[napi]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(feature = "napi")]
/// Get supported input formats
#[napi]
pub fn supported_input_formats() -> Vec<String> {
    vec![
        "jpeg".to_string(),
        "jpg".to_string(),
        "png".to_string(),
        "webp".to_string(),
    ]
}

#[cfg(feature = "napi")]
/// Get supported output formats
#[napi]
pub fn supported_output_formats() -> Vec<String> {
    vec![
        "jpeg".to_string(),
        "jpg".to_string(),
        "png".to_string(),
        "webp".to_string(),
        "avif".to_string(),
    ]
}

/// Metrics payload version. Keep in sync with docs/metrics-schema.json
pub const PROCESSING_METRICS_VERSION: &str = "1.0.0";

/// Processing metrics for performance monitoring
#[cfg(feature = "napi")]
#[napi(object)]
pub struct ProcessingMetrics {
    /// Schema version for compatibility negotiation
    pub version: String,
    /// Decode stage duration in milliseconds
    pub decode_ms: f64,
    /// Ops (transform) stage duration in milliseconds
    pub ops_ms: f64,
    /// Encode stage duration in milliseconds
    pub encode_ms: f64,
    /// Total wall-clock duration in milliseconds
    pub total_ms: f64,
    /// Peak memory usage during processing (RSS, bytes, as u32 for NAPI compatibility)
    ///
    /// **Note**: On Linux/macOS, this uses `ru_maxrss` from `getrusage()`, which represents
    /// the cumulative maximum RSS of the entire process, not just this operation.
    /// This is a limitation of the `getrusage()` API. For accurate per-operation memory tracking,
    /// consider using process-specific memory profiling tools.
    pub peak_rss: u32,
    /// Total CPU time (user + system) in seconds
    pub cpu_time: f64,
    /// Total processing time (wall clock) in seconds (legacy seconds field)
    pub processing_time: f64,
    /// Input file size in bytes (as u32 for NAPI compatibility, max 4GB)
    pub bytes_in: u32,
    /// Output file size in bytes (as u32 for NAPI compatibility, max 4GB)
    pub bytes_out: u32,
    /// Compression ratio (bytes_out / bytes_in)
    pub compression_ratio: f64,
    /// Detected input format (lowercase: jpeg, png, webp, avif, etc.)
    pub format_in: Option<String>,
    /// Output format
    pub format_out: String,
    /// True when ICC profile was present and preserved
    pub icc_preserved: bool,
    /// True when metadata was stripped (either by default or policy)
    pub metadata_stripped: bool,
    /// Non-fatal policy rejections (e.g., strict policy forcing metadata strip)
    pub policy_violations: Vec<String>,
    // ----------------------------------------------------------------------
    // Legacy fields preserved for backward compatibility
    /// Time taken to decode the image (milliseconds) - legacy alias of decode_ms
    pub decode_time: f64,
    /// Time taken to apply all operations (milliseconds) - legacy alias of ops_ms
    pub process_time: f64,
    /// Time taken to encode the image (milliseconds) - legacy alias of encode_ms
    pub encode_time: f64,
    /// Peak memory usage during processing (RSS, bytes) - legacy alias of peak_rss
    pub memory_peak: u32,
    /// Input size legacy alias (bytes_in)
    pub input_size: u32,
    /// Output size legacy alias (bytes_out)
    pub output_size: u32,
}

#[cfg(not(feature = "napi"))]
pub struct ProcessingMetrics {
    /// Schema version for compatibility negotiation
    pub version: String,
    /// Decode stage duration in milliseconds
    pub decode_ms: f64,
    /// Ops (transform) stage duration in milliseconds
    pub ops_ms: f64,
    /// Encode stage duration in milliseconds
    pub encode_ms: f64,
    /// Total wall-clock duration in milliseconds
    pub total_ms: f64,
    /// Peak memory usage during processing (RSS, bytes, as u32 for NAPI compatibility)
    ///
    /// **Note**: On Linux/macOS, this uses `ru_maxrss` from `getrusage()`, which represents
    /// the cumulative maximum RSS of the entire process, not just this operation.
    /// This is a limitation of the `getrusage()` API. For accurate per-operation memory tracking,
    /// consider using process-specific memory profiling tools.
    pub peak_rss: u32,
    /// Total CPU time (user + system) in seconds
    pub cpu_time: f64,
    /// Total processing time (wall clock) in seconds (legacy seconds field)
    pub processing_time: f64,
    /// Input file size in bytes (as u32 for NAPI compatibility, max 4GB)
    pub bytes_in: u32,
    /// Output file size in bytes (as u32 for NAPI compatibility, max 4GB)
    pub bytes_out: u32,
    /// Compression ratio (bytes_out / bytes_in)
    pub compression_ratio: f64,
    /// Detected input format (lowercase: jpeg, png, webp, avif, etc.)
    pub format_in: Option<String>,
    /// Output format
    pub format_out: String,
    /// True when ICC profile was present and preserved
    pub icc_preserved: bool,
    /// True when metadata was stripped (either by default or policy)
    pub metadata_stripped: bool,
    /// Non-fatal policy rejections (e.g., strict policy forcing metadata strip)
    pub policy_violations: Vec<String>,
    // ----------------------------------------------------------------------
    // Legacy fields preserved for backward compatibility
    /// Time taken to decode the image (milliseconds) - legacy alias of decode_ms
    pub decode_time: f64,
    /// Time taken to apply all operations (milliseconds) - legacy alias of ops_ms
    pub process_time: f64,
    /// Time taken to encode the image (milliseconds) - legacy alias of encode_ms
    pub encode_time: f64,
    /// Peak memory usage during processing (RSS, bytes) - legacy alias of peak_rss
    pub memory_peak: u32,
    /// Input size legacy alias (bytes_in)
    pub input_size: u32,
    /// Output size legacy alias (bytes_out)
    pub output_size: u32,
}

#[cfg(feature = "napi")]
impl Default for ProcessingMetrics {
    fn default() -> Self {
        Self {
            version: PROCESSING_METRICS_VERSION.to_string(),
            decode_ms: 0.0,
            ops_ms: 0.0,
            encode_ms: 0.0,
            total_ms: 0.0,
            peak_rss: 0,
            cpu_time: 0.0,
            processing_time: 0.0,
            bytes_in: 0,
            bytes_out: 0,
            compression_ratio: 0.0,
            format_in: None,
            format_out: String::new(),
            icc_preserved: false,
            metadata_stripped: true,
            policy_violations: Vec::new(),
            decode_time: 0.0,
            process_time: 0.0,
            encode_time: 0.0,
            memory_peak: 0,
            input_size: 0,
            output_size: 0,
        }
    }
}

#[cfg(not(feature = "napi"))]
impl Default for ProcessingMetrics {
    fn default() -> Self {
        Self {
            version: PROCESSING_METRICS_VERSION.to_string(),
            decode_ms: 0.0,
            ops_ms: 0.0,
            encode_ms: 0.0,
            total_ms: 0.0,
            peak_rss: 0,
            cpu_time: 0.0,
            processing_time: 0.0,
            bytes_in: 0,
            bytes_out: 0,
            compression_ratio: 0.0,
            format_in: None,
            format_out: String::new(),
            icc_preserved: false,
            metadata_stripped: true,
            policy_violations: Vec::new(),
            decode_time: 0.0,
            process_time: 0.0,
            encode_time: 0.0,
            memory_peak: 0,
            input_size: 0,
            output_size: 0,
        }
    }
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct OutputWithMetrics {
    pub data: napi::JsBuffer,
    pub metrics: ProcessingMetrics,
}

// ---------------------------------------------------------------------------
// compress() / quickProbe() / getCapabilities() bindings
//
// These sit on top of `engine::compress`, `engine::probe`, and
// `engine::capabilities` — the job orchestrator, quick probe, and capability
// registry. The option/result DTOs below exist purely to cross the NAPI
// boundary; `engine::compress::CompressionOptions`/`CompressionResult` are
// the types actually consumed by the Rust-side logic.

#[cfg(feature = "napi")]
#[napi(object)]
#[derive(Default)]
pub struct CompressOptions {
    /// "auto" | "jpeg" | "png" | "webp" | "avif" | "jxl"
    pub format: Option<String>,
    pub quality: Option<u32>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// "contain" | "cover" | "fill" | "inside" | "outside"
    pub fit: Option<String>,
    pub target_size_kb: Option<u32>,
    pub lossless: Option<bool>,
    pub dithering: Option<f64>,
    pub preserve_metadata: Option<bool>,
    pub fast_mode: Option<bool>,
    pub rotate: Option<i32>,
    pub flip_h: Option<bool>,
    pub flip_v: Option<bool>,
    pub crop_x: Option<u32>,
    pub crop_y: Option<u32>,
    pub crop_width: Option<u32>,
    pub crop_height: Option<u32>,
    /// 0-100 sharpen intensity.
    pub sharpen: Option<f64>,
    /// 0-100 blur intensity.
    pub blur: Option<f64>,
    /// 0-100 auto-trim deviation threshold.
    pub auto_trim_tolerance: Option<u32>,
    pub watermark_text: Option<String>,
    pub watermark_opacity: Option<f64>,
    /// "topLeft" | "topRight" | "bottomLeft" | "bottomRight" | "center"
    pub watermark_position: Option<String>,
}

#[cfg(feature = "napi")]
impl CompressOptions {
    fn into_engine_options(self) -> std::result::Result<engine::compress::CompressionOptions, String> {
        use ops::{ResizeFit, WatermarkPosition};
        use std::str::FromStr;

        let fit_mode = match self.fit.as_deref() {
            None => ResizeFit::default(),
            Some("contain") => ResizeFit::Contain,
            Some("cover") => ResizeFit::Cover,
            Some("fill") => ResizeFit::Fill,
            Some("inside") => ResizeFit::Inside,
            Some("outside") => ResizeFit::Outside,
            Some(other) => return Err(format!("unsupported fit mode: {other}")),
        };

        let crop = match (self.crop_x, self.crop_y, self.crop_width, self.crop_height) {
            (Some(x), Some(y), Some(w), Some(h)) => Some((x, y, w, h)),
            (None, None, None, None) => None,
            _ => return Err("crop requires cropX, cropY, cropWidth, and cropHeight together".to_string()),
        };

        let watermark = match (self.watermark_text, self.watermark_position) {
            (Some(text), position) => {
                let position = position
                    .map(|p| WatermarkPosition::from_str(&p))
                    .transpose()?
                    .unwrap_or_default();
                Some((text, self.watermark_opacity.unwrap_or(1.0) as f32, position))
            }
            (None, _) => None,
        };

        Ok(engine::compress::CompressionOptions {
            format: self.format,
            quality: self.quality.map(|q| q.min(100) as u8),
            target_width: self.target_width,
            target_height: self.target_height,
            fit_mode,
            target_size_kb: self.target_size_kb,
            lossless: self.lossless,
            dithering: self.dithering.unwrap_or(1.0) as f32,
            preserve_metadata: self.preserve_metadata.unwrap_or(false),
            fast_mode: self.fast_mode.unwrap_or(false),
            rotate: self.rotate,
            flip_h: self.flip_h.unwrap_or(false),
            flip_v: self.flip_v.unwrap_or(false),
            crop,
            sharpen: self.sharpen.map(|v| v.clamp(0.0, 100.0) as f32),
            blur: self.blur.map(|v| v.clamp(0.0, 100.0) as f32),
            auto_trim: self.auto_trim_tolerance.map(|v| v.min(100) as u8),
            watermark,
        })
    }
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct CompressOutput {
    pub data: napi::JsBuffer,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub resize_applied: bool,
    pub target_size_met: bool,
    pub content_kind: Option<String>,
    pub unique_colors: Option<u32>,
    pub warning: Option<String>,
}

#[cfg(feature = "napi")]
impl CompressOutput {
    fn from_result(env: &Env, result: engine::compress::CompressionResult) -> Result<Self> {
        let (content_kind, unique_colors) = match result.analysis {
            Some(analysis) => {
                let kind = match analysis.kind {
                    engine::analyzer::ContentKind::Photo => "photo",
                    engine::analyzer::ContentKind::Graphic => "graphic",
                    engine::analyzer::ContentKind::Mixed => "mixed",
                };
                (Some(kind.to_string()), Some(analysis.unique_colors.min(u32::MAX as u64) as u32))
            }
            None => (None, None),
        };

        Ok(Self {
            data: env.create_buffer_with_data(result.blob)?.into_raw(),
            format: result.format.as_str().to_string(),
            width: result.width,
            height: result.height,
            original_width: result.original_width,
            original_height: result.original_height,
            resize_applied: result.resize_applied,
            target_size_met: result.target_size_met,
            content_kind,
            unique_colors,
            warning: result.warning,
        })
    }
}

/// Compress an image per the options, running the full detect → decode →
/// analyze → transform → encode → size-target pipeline.
#[cfg(feature = "napi")]
#[napi]
pub fn compress(env: Env, buffer: Buffer, options: Option<CompressOptions>) -> Result<CompressOutput> {
    let options = options
        .unwrap_or_default()
        .into_engine_options()
        .map_err(napi::Error::from_reason)?;

    let result = engine::compress::compress("napi-compress", buffer.as_ref(), None, None, &options)?;
    CompressOutput::from_result(&env, result)
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct QuickProbeOutput {
    pub should_skip: bool,
    pub estimated_savings: f64,
    pub probe_time_ms: f64,
}

/// Cheaply estimate whether compressing `buffer` to `format` is worth it,
/// without running the full pipeline.
#[cfg(feature = "napi")]
#[napi(js_name = "quickProbe")]
pub fn quick_probe(buffer: Buffer, format: String, quality: Option<u32>) -> Result<QuickProbeOutput> {
    let (decoded, _) = engine::decoder::decode_image(buffer.as_ref())?;
    let output_format = ops::OutputFormat::from_str(&format, quality.map(|q| q.min(100) as u8))
        .map_err(napi::Error::from_reason)?;
    let result = engine::probe::quick_probe(&decoded, buffer.len(), &output_format);
    Ok(QuickProbeOutput {
        should_skip: result.should_skip,
        estimated_savings: result.estimated_savings,
        probe_time_ms: result.probe_time_ms,
    })
}

#[cfg(feature = "napi")]
#[napi(object)]
pub struct CapabilitiesOutput {
    pub avif_encode: bool,
    pub avif_decode: bool,
    pub jxl_encode: bool,
    pub jxl_decode: bool,
    pub heic_decode: bool,
    pub simd: bool,
}

/// Process-wide codec/CPU capability snapshot (memoized after first call).
#[cfg(feature = "napi")]
#[napi(js_name = "getCapabilities")]
pub fn get_capabilities() -> CapabilitiesOutput {
    let caps = engine::capabilities::capabilities();
    CapabilitiesOutput {
        avif_encode: caps.avif_encode,
        avif_decode: caps.avif_decode,
        jxl_encode: caps.jxl_encode,
        jxl_decode: caps.jxl_decode,
        heic_decode: caps.heic_decode,
        simd: caps.simd,
    }
}
