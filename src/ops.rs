// src/ops.rs
//
// Lazy pipeline operations.
// These are cheap to create and store - the expensive work happens in compute().

use std::str::FromStr;

/// How a source image is mapped into a target bounding box.
///
/// `Contain` and `Inside` are aliases of the same scale-down-only fit; `Cover`
/// and `Outside` are aliases of the same scale-then-center-crop fit. Both
/// pairs exist because callers arrive using either naming convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResizeFit {
    /// Scale to fit within the box, preserving aspect ratio, never upscaling.
    #[default]
    Contain,
    /// Scale to fill the box, preserving aspect ratio, then center-crop.
    Cover,
    /// Force exact target dimensions, ignoring aspect ratio.
    Fill,
    /// Alias of `Contain`.
    Inside,
    /// Alias of `Cover`.
    Outside,
}

impl ResizeFit {
    /// True for the `Contain`/`Inside` family (scale-down-only, no crop).
    pub fn is_contain_like(&self) -> bool {
        matches!(self, Self::Contain | Self::Inside)
    }

    /// True for the `Cover`/`Outside` family (scale-to-fill then center-crop).
    pub fn is_cover_like(&self) -> bool {
        matches!(self, Self::Cover | Self::Outside)
    }
}

impl FromStr for ResizeFit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "contain" => Ok(Self::Contain),
            "cover" => Ok(Self::Cover),
            "fill" => Ok(Self::Fill),
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            other => Err(format!("unsupported fit mode: {other}")),
        }
    }
}

/// Resampling kernel used by the resize stage. `Lanczos3` is the default —
/// sharpest results, at the most compute; `Nearest` trades quality for
/// speed (used internally by the quick probe's downsample).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    #[default]
    Lanczos3,
    Mitchell,
    Bilinear,
    Nearest,
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            "mitchell" => Ok(Self::Mitchell),
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            other => Err(format!("unsupported resize filter: {other}")),
        }
    }
}

/// WebP's `image_hint`, steering the encoder's internal heuristics toward
/// the kind of content being compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WebpPreset {
    #[default]
    Photo,
    Picture,
    Graph,
}

impl FromStr for WebpPreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "photo" => Ok(Self::Photo),
            "picture" => Ok(Self::Picture),
            "graph" => Ok(Self::Graph),
            other => Err(format!("unsupported webp preset: {other}")),
        }
    }
}

/// Governs WebP's lossy/near-lossless/lossless tradeoff. Authoritative over
/// the generic `lossless` flag for WebP outputs (the generic flag still
/// selects lossless PNG and JXL).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WebpLosslessMode {
    #[default]
    Lossy,
    NearLossless,
    Lossless,
}

impl FromStr for WebpLosslessMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().replace(['_', '-'], "").as_str() {
            "lossy" => Ok(Self::Lossy),
            "nearlossless" => Ok(Self::NearLossless),
            "lossless" => Ok(Self::Lossless),
            other => Err(format!("unsupported webp lossless mode: {other}")),
        }
    }
}

/// AVIF output bit depth. 10-bit reduces banding on gradients at a small
/// size cost; the encoder still accepts 8-bit RGBA input either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AvifBitDepth {
    #[default]
    Eight,
    Ten,
}

impl AvifBitDepth {
    pub fn bits(&self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Ten => 10,
        }
    }
}

impl FromStr for AvifBitDepth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "8" => Ok(Self::Eight),
            "10" => Ok(Self::Ten),
            other => Err(format!("unsupported AVIF bit depth: {other}")),
        }
    }
}

/// Where a text watermark is anchored within the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    Center,
}

impl FromStr for WatermarkPosition {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().replace(['_', '-'], "").as_str() {
            "topleft" => Ok(Self::TopLeft),
            "topright" => Ok(Self::TopRight),
            "bottomleft" => Ok(Self::BottomLeft),
            "bottomright" => Ok(Self::BottomRight),
            "center" | "middle" => Ok(Self::Center),
            other => Err(format!("unsupported watermark position: {other}")),
        }
    }
}

/// Image operations that can be queued for lazy execution.
///
/// Design principle: each operation is self-contained and stateless.
/// No references, no lifetimes, no bullshit.
///
/// Operations that make up a single pipeline run execute in a fixed
/// order regardless of the order they were pushed in: crop, then
/// rotate/flip, then resize/fit, then sharpen, then blur, then
/// auto-trim, then watermark. `optimize_ops` in `engine::pipeline`
/// enforces this ordering.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Resize with optional width/height (maintains aspect ratio if one is None)
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        fit: ResizeFit,
        filter: ResizeFilter,
    },

    /// Resize to fit a box and crop the result - the atomic form of a
    /// `Cover`/`Outside` fit, kept distinct from `Resize` so memory
    /// projection can model the intermediate buffer precisely.
    Extract {
        width: Option<u32>,
        height: Option<u32>,
        fit: ResizeFit,
        crop_x: u32,
        crop_y: u32,
        crop_width: u32,
        crop_height: u32,
    },

    /// Crop a region from the image
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Rotate by 90, 180, or 270 degrees
    Rotate { degrees: i32 },

    /// Flip horizontally
    FlipH,

    /// Flip vertically
    FlipV,

    /// Apply an EXIF orientation tag's implied rotation/flip (1-8)
    AutoOrient { orientation: i32 },

    /// Adjust brightness (-100 to 100)
    Brightness { value: i32 },

    /// Adjust contrast (-100 to 100)
    Contrast { value: i32 },

    /// Grayscale conversion
    Grayscale,

    /// Color space conversion (currently supports basic RGB/RGBA assurance)
    ColorSpace { target: ColorSpace },

    /// Unsharp-mask style sharpen, sigma controls kernel radius
    Sharpen { sigma: f32 },

    /// Gaussian blur, sigma controls kernel radius
    Blur { sigma: f32 },

    /// Scan inward from each edge and crop away uniform-color borders
    /// within `tolerance` (0-255 per-channel deviation).
    AutoTrim { tolerance: u8 },

    /// Rasterize a text watermark onto the image. `font_size` in pixels and
    /// `color` as RGB default to a size derived from image height and white
    /// when absent.
    Watermark {
        text: String,
        opacity: f32,
        position: WatermarkPosition,
        font_size: Option<f32>,
        color: Option<(u8, u8, u8)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColorSpace {
    Srgb,
    DisplayP3, // Placeholder
    AdobeRgb,  // Placeholder
}

/// Palette quantization settings for lossy PNG. `dithering` is the
/// error-diffusion strength applied during palette remap, 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PngQuantizeOptions {
    pub dithering: f32,
}

/// Output format for encoding
#[derive(Clone, Debug)]
pub enum OutputFormat {
    Jpeg {
        quality: u8,
        fast_mode: bool,
        /// true = 4:2:0 (smaller), false = 4:4:4 (sharper).
        chroma_subsampling: bool,
        progressive: bool,
    },
    /// `quantize: None` encodes lossless (deflate only); `Some(_)` quantizes
    /// to a palette first, per the codec router's lossy PNG mode.
    Png {
        quantize: Option<PngQuantizeOptions>,
    },
    WebP {
        quality: u8,
        preset: WebpPreset,
        lossless_mode: WebpLosslessMode,
        near_lossless_level: u8,
    },
    Avif {
        quality: u8,
        /// `None` lets the quality band pick a speed; `Some` pins it (0-10).
        speed: Option<u8>,
        bit_depth: AvifBitDepth,
    },
    Jxl {
        quality: u8,
        effort: u8,
        lossless: bool,
        progressive: bool,
    },
}

impl OutputFormat {
    /// Create OutputFormat from string with format-specific default quality.
    ///
    /// Default quality by format (when quality is None):
    /// - JPEG: 85 (high quality, balanced file size)
    /// - WebP: 80 (optimal for WebP's compression characteristics)
    /// - AVIF: 60 (AVIF's high compression efficiency means lower quality still looks great)
    /// - JXL: 80
    ///
    /// These defaults are chosen based on each format's characteristics and real-world usage.
    pub fn from_str(format: &str, quality: Option<u8>) -> Result<Self, String> {
        Self::from_str_with_options(format, quality, false)
    }

    /// Same as `from_str`, with explicit control over JPEG's fast-encode mode.
    /// Per-codec knobs beyond quality/fast_mode take their documented
    /// defaults; use the struct literal directly when a caller needs to
    /// override them (chroma subsampling, webp preset, avif speed, ...).
    pub fn from_str_with_options(
        format: &str,
        quality: Option<u8>,
        fast_mode: bool,
    ) -> Result<Self, String> {
        match format.to_lowercase().as_str() {
            "jpeg" | "jpg" => {
                let q = quality.unwrap_or(85); // JPEG default: 85
                Ok(Self::Jpeg {
                    quality: q,
                    fast_mode,
                    chroma_subsampling: true,
                    progressive: true,
                })
            }
            "png" => Ok(Self::Png { quantize: None }),
            "webp" => {
                let q = quality.unwrap_or(80); // WebP default: 80
                Ok(Self::WebP {
                    quality: q,
                    preset: WebpPreset::default(),
                    lossless_mode: WebpLosslessMode::default(),
                    near_lossless_level: 60,
                })
            }
            "avif" => {
                let q = quality.unwrap_or(60); // AVIF default: 60 (high compression efficiency)
                Ok(Self::Avif {
                    quality: q,
                    speed: None,
                    bit_depth: AvifBitDepth::default(),
                })
            }
            "jxl" => {
                let q = quality.unwrap_or(80);
                Ok(Self::Jxl {
                    quality: q,
                    effort: 7,
                    lossless: false,
                    progressive: false,
                })
            }
            other => Err(format!("unsupported format: {other}")),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png { .. } => "png",
            Self::WebP { .. } => "webp",
            Self::Avif { .. } => "avif",
            Self::Jxl { .. } => "jxl",
        }
    }
}

// =============================================================================
// PRESETS - Common configurations for web image optimization
// =============================================================================

/// Preset configuration for common use cases.
/// Each preset defines optimal settings for a specific purpose.
#[derive(Clone, Debug)]
pub struct PresetConfig {
    /// Target width (None = maintain aspect ratio)
    pub width: Option<u32>,
    /// Target height (None = maintain aspect ratio)
    pub height: Option<u32>,
    /// Output format
    pub format: OutputFormat,
}

impl PresetConfig {
    /// Create a new preset configuration
    pub fn new(width: Option<u32>, height: Option<u32>, format: OutputFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Get the built-in preset by name
    pub fn get(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "thumbnail" => Some(Self::thumbnail()),
            "avatar" => Some(Self::avatar()),
            "hero" => Some(Self::hero()),
            "social" => Some(Self::social()),
            _ => None,
        }
    }

    /// Thumbnail preset: 150x150, WebP quality 75
    /// Use case: Gallery thumbnails, preview images
    pub fn thumbnail() -> Self {
        Self::new(
            Some(150),
            Some(150),
            OutputFormat::WebP {
                quality: 75,
                preset: WebpPreset::default(),
                lossless_mode: WebpLosslessMode::default(),
                near_lossless_level: 60,
            },
        )
    }

    /// Avatar preset: 200x200, WebP quality 80
    /// Use case: User profile pictures
    pub fn avatar() -> Self {
        Self::new(
            Some(200),
            Some(200),
            OutputFormat::WebP {
                quality: 80,
                preset: WebpPreset::default(),
                lossless_mode: WebpLosslessMode::default(),
                near_lossless_level: 60,
            },
        )
    }

    /// Hero preset: 1920 width, JPEG quality 85
    /// Use case: Hero images, banners
    pub fn hero() -> Self {
        Self::new(
            Some(1920),
            None,
            OutputFormat::Jpeg {
                quality: 85,
                fast_mode: false,
                chroma_subsampling: true,
                progressive: true,
            },
        )
    }

    /// Social preset: 1200x630, JPEG quality 80
    /// Use case: OGP/Twitter Card images
    pub fn social() -> Self {
        Self::new(
            Some(1200),
            Some(630),
            OutputFormat::Jpeg {
                quality: 80,
                fast_mode: false,
                chroma_subsampling: true,
                progressive: true,
            },
        )
    }
}
