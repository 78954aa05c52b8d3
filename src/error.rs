// src/error.rs
//
// Structured error types for the compression engine.
// Replaces string-based Error::from_reason() with type-safe error handling.

#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;

/// Custom error type for engine operations.
///
/// Every variant carries a stable `code()` string so JS callers can branch
/// on error kind without parsing the human-readable message.
#[derive(Debug, Clone)]
pub enum LazyImageError {
    /// File read operation failed
    FileReadFailed { path: String, source: String },
    /// File write operation failed
    FileWriteFailed { path: String, source: String },
    /// Requested file does not exist
    FileNotFound { path: String },
    /// Memory-mapping a file failed
    MmapFailed { path: String, source: String },
    /// Image source already consumed (cannot decode twice)
    SourceConsumed,
    /// Internal panic occurred (e.g., a codec panicked)
    InternalPanic { message: String },
    /// Decoded pixel buffer length didn't match the declared dimensions
    CorruptedImage,
    /// Image dimension exceeds maximum allowed
    DimensionExceedsLimit { dimension: u32, max: u32 },
    /// Total pixel count exceeds maximum allowed
    PixelCountExceedsLimit { pixels: u64, max: u64 },
    /// Invalid crop bounds
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },
    /// Invalid rotation angle
    InvalidRotationAngle { degrees: i32 },
    /// Invalid resize fit mode string
    InvalidResizeFit { value: String },
    /// Invalid watermark position string
    InvalidWatermarkPosition { value: String },
    /// Resize algorithm failed (zero/invalid dimensions, resize library error)
    ResizeFailed {
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: String,
    },
    /// Unsupported color space
    UnsupportedColorSpace { color_space: String },
    /// Invalid preset name
    InvalidPreset { name: String },
    /// Invalid Image Firewall policy name
    InvalidFirewallPolicy { policy: String },
    /// Image Firewall rejected the input or the processing result
    FirewallViolation { message: String },
    /// Input or requested output format is not recognized or not enabled
    UnsupportedFormat { format: String },
    /// Encode operation failed
    EncodeFailed { format: String, reason: String },
    /// Decode operation failed
    DecodeFailed { reason: String },
    /// Size-target controller could not hit the requested byte budget
    TargetUnmet { requested_kb: u32, achieved_kb: u32 },
    /// Quick probe determined the source is already smaller than any
    /// re-encode is likely to produce; the original bytes were returned.
    AlreadyOptimized,
    /// Worker pool job queue is at capacity
    QueueFull,
    /// A worker thread panicked while processing a job
    WorkerCrashed { message: String },
    /// Requested a codec capability that isn't compiled in or detected
    CapabilityMissing { capability: String },
    /// Generic error with message
    Generic { message: String },
}

impl LazyImageError {
    pub fn file_read_failed(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source: source.to_string(),
        }
    }

    pub fn file_write_failed(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source: source.to_string(),
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn mmap_failed(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source: source.to_string(),
        }
    }

    pub fn source_consumed() -> Self {
        Self::SourceConsumed
    }

    pub fn internal_panic(message: impl Into<String>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_crop_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn invalid_rotation_angle(degrees: i32) -> Self {
        Self::InvalidRotationAngle { degrees }
    }

    pub fn invalid_resize_fit(value: impl Into<String>) -> Self {
        Self::InvalidResizeFit {
            value: value.into(),
        }
    }

    pub fn invalid_watermark_position(value: impl Into<String>) -> Self {
        Self::InvalidWatermarkPosition {
            value: value.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self::ResizeFailed {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn unsupported_color_space(color_space: impl Into<String>) -> Self {
        Self::UnsupportedColorSpace {
            color_space: color_space.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<String>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_firewall_policy(policy: impl Into<String>) -> Self {
        Self::InvalidFirewallPolicy {
            policy: policy.into(),
        }
    }

    pub fn firewall_violation(message: impl Into<String>) -> Self {
        Self::FirewallViolation {
            message: message.into(),
        }
    }

    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn encode_failed(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
        }
    }

    pub fn target_unmet(requested_kb: u32, achieved_kb: u32) -> Self {
        Self::TargetUnmet {
            requested_kb,
            achieved_kb,
        }
    }

    pub fn already_optimized() -> Self {
        Self::AlreadyOptimized
    }

    pub fn queue_full() -> Self {
        Self::QueueFull
    }

    pub fn worker_crashed(message: impl Into<String>) -> Self {
        Self::WorkerCrashed {
            message: message.into(),
        }
    }

    pub fn capability_missing(capability: impl Into<String>) -> Self {
        Self::CapabilityMissing {
            capability: capability.into(),
        }
    }

    /// Stable machine-readable error code, exposed to JS callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileReadFailed { .. } => "FILE_READ_FAILED",
            Self::FileWriteFailed { .. } => "FILE_WRITE_FAILED",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::MmapFailed { .. } => "MMAP_FAILED",
            Self::SourceConsumed => "SOURCE_CONSUMED",
            Self::InternalPanic { .. } => "INTERNAL_PANIC",
            Self::CorruptedImage => "CORRUPTED_IMAGE",
            Self::DimensionExceedsLimit { .. } => "DIMENSION_EXCEEDS_LIMIT",
            Self::PixelCountExceedsLimit { .. } => "PIXEL_COUNT_EXCEEDS_LIMIT",
            Self::InvalidCropBounds { .. } => "INVALID_CROP_BOUNDS",
            Self::InvalidRotationAngle { .. } => "INVALID_ROTATION_ANGLE",
            Self::InvalidResizeFit { .. } => "INVALID_RESIZE_FIT",
            Self::InvalidWatermarkPosition { .. } => "INVALID_WATERMARK_POSITION",
            Self::ResizeFailed { .. } => "RESIZE_FAILED",
            Self::UnsupportedColorSpace { .. } => "UNSUPPORTED_COLOR_SPACE",
            Self::InvalidPreset { .. } => "INVALID_PRESET",
            Self::InvalidFirewallPolicy { .. } => "INVALID_FIREWALL_POLICY",
            Self::FirewallViolation { .. } => "FIREWALL_VIOLATION",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::EncodeFailed { .. } => "ENCODE_FAILED",
            Self::DecodeFailed { .. } => "DECODE_FAILED",
            Self::TargetUnmet { .. } => "TARGET_UNMET",
            Self::AlreadyOptimized => "ALREADY_OPTIMIZED",
            Self::QueueFull => "QUEUE_FULL",
            Self::WorkerCrashed { .. } => "WORKER_CRASHED",
            Self::CapabilityMissing { .. } => "CAPABILITY_MISSING",
            Self::Generic { .. } => "GENERIC",
        }
    }
}

impl std::fmt::Display for LazyImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileReadFailed { path, source } => {
                write!(f, "failed to read file '{}': {}", path, source)
            }
            Self::FileWriteFailed { path, source } => {
                write!(f, "failed to write file '{}': {}", path, source)
            }
            Self::FileNotFound { path } => write!(f, "file not found: '{}'", path),
            Self::MmapFailed { path, source } => {
                write!(f, "failed to memory-map file '{}': {}", path, source)
            }
            Self::SourceConsumed => write!(f, "image source already consumed"),
            Self::InternalPanic { message } => write!(f, "{}", message),
            Self::CorruptedImage => write!(f, "decoded pixel buffer does not match declared dimensions"),
            Self::DimensionExceedsLimit { dimension, max } => {
                write!(f, "image too large: {} exceeds max dimension {}", dimension, max)
            }
            Self::PixelCountExceedsLimit { pixels, max } => {
                write!(f, "image too large: {} pixels exceeds max {}", pixels, max)
            }
            Self::InvalidCropBounds {
                x,
                y,
                width,
                height,
                img_width,
                img_height,
            } => write!(
                f,
                "crop bounds ({}+{}, {}+{}) exceed image dimensions ({}x{})",
                x, width, y, height, img_width, img_height
            ),
            Self::InvalidRotationAngle { degrees } => write!(
                f,
                "unsupported rotation angle: {}. Only 0, 90, 180, 270 (and negatives) are supported",
                degrees
            ),
            Self::InvalidResizeFit { value } => {
                write!(f, "unsupported fit mode: '{}'. Expected one of: contain, cover, fill, inside, outside", value)
            }
            Self::InvalidWatermarkPosition { value } => {
                write!(f, "unsupported watermark position: '{}'. Expected one of: topLeft, topRight, bottomLeft, bottomRight, center", value)
            }
            Self::ResizeFailed {
                source_dims,
                target_dims,
                reason,
            } => write!(
                f,
                "resize from {}x{} to {}x{} failed: {}",
                source_dims.0, source_dims.1, target_dims.0, target_dims.1, reason
            ),
            Self::UnsupportedColorSpace { color_space } => {
                write!(f, "unsupported color space: {}", color_space)
            }
            Self::InvalidPreset { name } => write!(
                f,
                "unknown preset: '{}'. Available: thumbnail, avatar, hero, social",
                name
            ),
            Self::InvalidFirewallPolicy { policy } => {
                write!(f, "unknown firewall policy: '{}'. Available: strict, lenient", policy)
            }
            Self::FirewallViolation { message } => write!(f, "{}", message),
            Self::UnsupportedFormat { format } => write!(f, "unsupported format: '{}'", format),
            Self::EncodeFailed { format, reason } => write!(f, "{} encode failed: {}", format, reason),
            Self::DecodeFailed { reason } => write!(f, "decode failed: {}", reason),
            Self::TargetUnmet {
                requested_kb,
                achieved_kb,
            } => write!(
                f,
                "could not reach target size of {}KB, best effort was {}KB",
                requested_kb, achieved_kb
            ),
            Self::AlreadyOptimized => {
                write!(f, "source is already smaller than any re-encode would produce")
            }
            Self::QueueFull => write!(f, "worker pool job queue is full"),
            Self::WorkerCrashed { message } => write!(f, "worker crashed: {}", message),
            Self::CapabilityMissing { capability } => {
                write!(f, "required capability not available: {}", capability)
            }
            Self::Generic { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for LazyImageError {}

#[cfg(feature = "napi")]
impl From<LazyImageError> for Error {
    fn from(err: LazyImageError) -> Self {
        Error::new(Status::GenericFailure, format!("[{}] {}", err.code(), err))
    }
}

/// Build a napi::Error carrying the error's stable code in the message,
/// so JS-side callers can pattern-match `err.message.startsWith('[CODE]')`
/// without us depending on napi's unstable custom-property APIs.
#[cfg(feature = "napi")]
pub fn napi_error_with_code(_env: &Env, err: LazyImageError) -> Result<Error> {
    Ok(Error::from(err))
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, LazyImageError>;
