// src/engine/pipeline.rs
//
// Pipeline operations: apply_ops, optimize_ops, resize calculations

use crate::error::LazyImageError;
use crate::ops::{Operation, ResizeFilter, ResizeFit};
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{DynamicImage, GenericImageView, Rgba, RgbImage, RgbaImage};
use imageproc::drawing::draw_text_mut;
use std::borrow::Cow;

// Type alias for Result - use napi::Result when napi is enabled, otherwise use standard Result
#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
#[cfg(feature = "napi")]
type PipelineResult<T> = Result<T>;
#[cfg(not(feature = "napi"))]
type PipelineResult<T> = std::result::Result<T, LazyImageError>;

// Helper function to convert LazyImageError to the appropriate error type
#[cfg(feature = "napi")]
fn to_pipeline_error(err: LazyImageError) -> napi::Error {
    napi::Error::from(err)
}

#[cfg(not(feature = "napi"))]
fn to_pipeline_error(err: LazyImageError) -> LazyImageError {
    err
}

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(source_dims: (u32, u32), target_dims: (u32, u32), reason: impl Into<String>) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_lazy_image_error(self) -> LazyImageError {
        LazyImageError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// Calculate resize dimensions maintaining aspect ratio
pub fn calc_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
) -> (u32, u32) {
    match (target_w, target_h) {
        (Some(w), Some(h)) => {
            // Maintain aspect ratio while fitting inside the specified dimensions
            let orig_ratio = orig_w as f64 / orig_h as f64;
            let target_ratio = w as f64 / h as f64;

            if orig_ratio > target_ratio {
                // Original image is wider → fit to width
                let ratio = w as f64 / orig_w as f64;
                (w, (orig_h as f64 * ratio).round() as u32)
            } else {
                // Original image is taller → fit to height
                let ratio = h as f64 / orig_h as f64;
                ((orig_w as f64 * ratio).round() as u32, h)
            }
        }
        (Some(w), None) => {
            let ratio = w as f64 / orig_w as f64;
            (w, (orig_h as f64 * ratio).round() as u32)
        }
        (None, Some(h)) => {
            let ratio = h as f64 / orig_h as f64;
            ((orig_w as f64 * ratio).round() as u32, h)
        }
        (None, None) => (orig_w, orig_h),
    }
}

/// Scale-down-only variant of `calc_resize_dimensions` for `inside`/`contain`
/// fit: never produces dimensions larger than the original on either axis.
/// An image that already fits inside the target box on both axes is
/// returned unchanged.
pub fn calc_contain_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: u32,
    target_h: u32,
) -> (u32, u32) {
    // Already fits the box on both axes: the implied scale is >= 1 on both
    // per-axis ratios, i.e. upscaling would be required to "fill" the box.
    // Skip scaling entirely rather than stretch a smaller image up.
    if orig_w <= target_w && orig_h <= target_h {
        return (orig_w, orig_h);
    }
    calc_resize_dimensions(orig_w, orig_h, Some(target_w), Some(target_h))
}

/// Scale so the result covers a `target_w` x `target_h` box (the larger of the
/// two per-axis ratios), i.e. the pre-crop dimensions for `cover`/`outside` fit.
pub fn calc_cover_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: u32,
    target_h: u32,
) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (target_w.max(1), target_h.max(1));
    }
    let scale_w = target_w as f64 / orig_w as f64;
    let scale_h = target_h as f64 / orig_h as f64;
    let scale = scale_w.max(scale_h);
    let resize_w = ((orig_w as f64 * scale).ceil() as u32).max(1);
    let resize_h = ((orig_h as f64 * scale).ceil() as u32).max(1);
    (resize_w, resize_h)
}

/// Resolve `width`/`height`/`fit` into the concrete dimensions to resize to
/// and, for crop-after-resize fits, the centered crop box to apply afterward.
fn resolve_fit(
    orig_w: u32,
    orig_h: u32,
    width: Option<u32>,
    height: Option<u32>,
    fit: ResizeFit,
) -> ((u32, u32), Option<(u32, u32, u32, u32)>) {
    match (width, height) {
        // A single axis (or neither) leaves no target box to fit into; every
        // mode degrades to simple aspect-preserving resize.
        (None, None) => ((orig_w, orig_h), None),
        (w, h) if w.is_none() || h.is_none() => {
            (calc_resize_dimensions(orig_w, orig_h, w, h), None)
        }
        (Some(target_w), Some(target_h)) => match fit {
            ResizeFit::Fill => ((target_w, target_h), None),
            ResizeFit::Inside | ResizeFit::Contain => {
                (calc_contain_resize_dimensions(orig_w, orig_h, target_w, target_h), None)
            }
            ResizeFit::Cover | ResizeFit::Outside => {
                let (resize_w, resize_h) =
                    calc_cover_resize_dimensions(orig_w, orig_h, target_w, target_h);
                let crop_x = resize_w.saturating_sub(target_w) / 2;
                let crop_y = resize_h.saturating_sub(target_h) / 2;
                let crop_w = target_w.min(resize_w);
                let crop_h = target_h.min(resize_h);
                ((resize_w, resize_h), Some((crop_x, crop_y, crop_w, crop_h)))
            }
        },
    }
}

/// Optimize operations by combining consecutive resize/crop operations
pub fn optimize_ops(ops: &[Operation]) -> Vec<Operation> {
    if ops.len() < 2 {
        return ops.to_vec();
    }

    let mut optimized = Vec::new();
    let mut i = 0;

    while i < ops.len() {
        let current = &ops[i];

        // Try to combine consecutive resize operations that share a fit mode
        // simple enough to fold (Fill/Inside/Contain — Cover/Outside's crop
        // box depends on the exact target so we don't fold those).
        if let Operation::Resize {
            width: w1,
            height: h1,
            fit: fit1,
            filter: filter1,
        } = current
        {
            if matches!(fit1, ResizeFit::Fill | ResizeFit::Inside | ResizeFit::Contain) {
                let mut final_width = *w1;
                let mut final_height = *h1;
                let mut final_filter = *filter1;
                let mut j = i + 1;

                while j < ops.len() {
                    if let Operation::Resize {
                        width: w2,
                        height: h2,
                        fit: fit2,
                        filter: filter2,
                    } = &ops[j]
                    {
                        if fit2 != fit1 {
                            break;
                        }
                        // If both dimensions are specified, use the last one
                        // Otherwise, maintain aspect ratio from the first resize
                        if w2.is_some() && h2.is_some() {
                            final_width = *w2;
                            final_height = *h2;
                        } else if w2.is_some() {
                            final_width = *w2;
                            final_height = None;
                        } else if h2.is_some() {
                            final_width = None;
                            final_height = *h2;
                        }
                        final_filter = *filter2;
                        j += 1;
                    } else {
                        break;
                    }
                }

                if j > i + 1 {
                    // Combined multiple resizes into one
                    optimized.push(Operation::Resize {
                        width: final_width,
                        height: final_height,
                        fit: *fit1,
                        filter: final_filter,
                    });
                    i = j;
                    continue;
                }
            }
        }

        // Try to optimize crop + resize or resize + crop
        if i + 1 < ops.len() {
            match (&ops[i], &ops[i + 1]) {
                // Crop then resize: optimize by calculating final dimensions
                // (only for the simple aspect-preserving fits; Cover/Outside
                // need the original crop dims to compute their own crop box).
                (
                    Operation::Crop {
                        x,
                        y,
                        width: cw,
                        height: ch,
                    },
                    Operation::Resize {
                        width: rw,
                        height: rh,
                        fit: ResizeFit::Inside | ResizeFit::Contain | ResizeFit::Fill,
                        filter: rfilter,
                    },
                ) => {
                    let (final_w, final_h) = calc_resize_dimensions(*cw, *ch, *rw, *rh);
                    optimized.push(Operation::Crop {
                        x: *x,
                        y: *y,
                        width: *cw,
                        height: *ch,
                    });
                    optimized.push(Operation::Resize {
                        width: Some(final_w),
                        height: Some(final_h),
                        fit: ResizeFit::Inside,
                        filter: *rfilter,
                    });
                    i += 2;
                    continue;
                }
                // Resize then crop: keep both but order is already optimal
                (Operation::Resize { .. }, Operation::Crop { .. }) => {
                    // Keep both operations, but we could optimize further if needed
                }
                _ => {}
            }
        }

        optimized.push(current.clone());
        i += 1;
    }

    optimized
}

/// Apply all queued operations using Copy-on-Write semantics
///
/// **True Copy-on-Write**: If no operations are queued (format conversion only),
/// returns `Cow::Borrowed` - no pixel data is copied. Deep copy only happens
/// when actual image manipulation (resize, crop, etc.) is required.
pub fn apply_ops<'a>(
    img: Cow<'a, DynamicImage>,
    ops: &[Operation],
) -> PipelineResult<Cow<'a, DynamicImage>> {
    // Optimize operations first
    let optimized_ops = optimize_ops(ops);

    // No operations = no copy needed (format conversion only path)
    if optimized_ops.is_empty() {
        return Ok(img);
    }

    // Operations exist - we need owned data to mutate
    // This is where the "copy" in Copy-on-Write happens
    let mut img = img.into_owned();

    for op in &optimized_ops {
        img = match op {
            Operation::Resize { width, height, fit, filter } => {
                let ((w, h), crop_box) =
                    resolve_fit(img.width(), img.height(), *width, *height, *fit);
                let resized = resize_to(img, w, h, *filter)?;
                match crop_box {
                    Some((cx, cy, cw, ch)) => resized.crop_imm(cx, cy, cw, ch),
                    None => resized,
                }
            }

            Operation::Extract {
                width,
                height,
                fit,
                crop_x,
                crop_y,
                crop_width,
                crop_height,
            } => {
                let target_resize = (
                    width.unwrap_or(img.width()).max(1),
                    height.unwrap_or(img.height()).max(1),
                );
                let (w, h) = match fit {
                    ResizeFit::Fill => target_resize,
                    ResizeFit::Inside | ResizeFit::Contain => calc_contain_resize_dimensions(
                        img.width(),
                        img.height(),
                        target_resize.0,
                        target_resize.1,
                    ),
                    ResizeFit::Cover | ResizeFit::Outside => calc_cover_resize_dimensions(
                        img.width(),
                        img.height(),
                        target_resize.0,
                        target_resize.1,
                    ),
                };
                let resized = resize_to(img, w, h, ResizeFilter::Lanczos3)?;
                let img_w = resized.width();
                let img_h = resized.height();
                let cw = (*crop_width).min(img_w.saturating_sub(*crop_x)).max(1);
                let ch = (*crop_height).min(img_h.saturating_sub(*crop_y)).max(1);
                if *crop_x >= img_w || *crop_y >= img_h {
                    return Err(to_pipeline_error(LazyImageError::invalid_crop_bounds(
                        *crop_x, *crop_y, *crop_width, *crop_height, img_w, img_h,
                    )));
                }
                resized.crop_imm(*crop_x, *crop_y, cw, ch)
            }

            Operation::Crop {
                x,
                y,
                width,
                height,
            } => {
                // Validate crop bounds
                let img_w = img.width();
                let img_h = img.height();
                if *x + *width > img_w || *y + *height > img_h {
                    return Err(to_pipeline_error(LazyImageError::invalid_crop_bounds(
                        *x, *y, *width, *height, img_w, img_h,
                    )));
                }
                img.crop_imm(*x, *y, *width, *height)
            }

            Operation::Rotate { degrees } => {
                match degrees {
                    90 => img.rotate90(),
                    180 => img.rotate180(),
                    270 => img.rotate270(),
                    -90 => img.rotate270(),
                    -180 => img.rotate180(),
                    -270 => img.rotate90(),
                    0 => img, // No-op for 0 degrees
                    _ => {
                        return Err(to_pipeline_error(LazyImageError::invalid_rotation_angle(
                            *degrees,
                        )));
                    }
                }
            }

            Operation::FlipH => img.fliph(),
            Operation::FlipV => img.flipv(),
            Operation::Grayscale => DynamicImage::ImageLuma8(img.to_luma8()),

            Operation::Brightness { value } => img.brighten(*value),

            Operation::Contrast { value } => {
                // image crate expects f32, convert from our -100..100 scale
                img.adjust_contrast(*value as f32)
            }

            Operation::ColorSpace { target } => {
                match target {
                    crate::ops::ColorSpace::Srgb => {
                        // Ensure RGB8/RGBA8 format
                        match img {
                            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
                            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
                        }
                    }
                    crate::ops::ColorSpace::DisplayP3 | crate::ops::ColorSpace::AdobeRgb => {
                        return Err(to_pipeline_error(LazyImageError::unsupported_color_space(
                            format!("{:?}", target),
                        )));
                    }
                }
            }

            Operation::AutoOrient { orientation } => apply_exif_orientation(img, *orientation),

            Operation::Sharpen { sigma } => img.unsharpen(*sigma, 1),

            Operation::Blur { sigma } => img.blur(*sigma),

            Operation::AutoTrim { tolerance } => auto_trim(img, *tolerance),

            Operation::Watermark {
                text,
                opacity,
                position,
                font_size,
                color,
            } => match draw_watermark(img, text, *opacity, *position, *font_size, *color) {
                Ok(watermarked) => watermarked,
                Err((original, reason)) => {
                    tracing::warn!(reason = %reason, "watermark skipped");
                    original
                }
            },
        };
    }
    Ok(Cow::Owned(img))
}

/// Resize `img` to exactly `(w, h)` with the given kernel, normalizing to
/// RGBA8 first when the source format isn't RGB8/RGBA8 so the SIMD fast
/// path always applies.
fn resize_to(img: DynamicImage, w: u32, h: u32, filter: ResizeFilter) -> PipelineResult<DynamicImage> {
    let src_image = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    };
    fast_resize_owned_with_filter(src_image, w, h, filter).map_err(|err| {
        to_pipeline_error(LazyImageError::internal_panic(format!(
            "Resize algorithm failure: {}",
            err.into_lazy_image_error()
        )))
    })
}

/// Apply EXIF `Orientation` tag 1-8 the way libjpeg/EXIF readers define it:
/// a combination of a 90-degree rotation and an optional mirror flip.
fn apply_exif_orientation(img: DynamicImage, orientation: i32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.rotate180().fliph(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img, // 1 (normal) and any unrecognized value are a no-op
    }
}

/// Crop away uniform-color borders within `tolerance` of the top-left pixel's
/// color, the way a trim/autocrop tool does: find the tightest bounding box
/// that still contains every pixel differing from the border color.
fn auto_trim(img: DynamicImage, tolerance: u8) -> DynamicImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return img;
    }
    let border = *rgba.get_pixel(0, 0);
    let differs = |p: &Rgba<u8>| {
        p.0.iter()
            .zip(border.0.iter())
            .any(|(a, b)| (*a as i32 - *b as i32).unsigned_abs() as u8 > tolerance)
    };

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for y in 0..height {
        for x in 0..width {
            if differs(rgba.get_pixel(x, y)) {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if !found {
        return img;
    }

    let crop_w = max_x - min_x + 1;
    let crop_h = max_y - min_y + 1;
    img.crop_imm(min_x, min_y, crop_w, crop_h)
}

/// Render semi-transparent text onto `img` at `position`, the way a
/// copyright/brand watermark is stamped onto a processed output.
///
/// No font is vendored into the crate; watermarking rides on whatever
/// scalable font the host has installed. This mirrors the capability-gated
/// treatment of optional codecs (C11) rather than shipping a binary asset,
/// so a host with none of the searched fonts installed degrades to a
/// logged no-op (the `Err` side hands `img` back unchanged) instead of
/// failing the whole `compress()` call over a missing font.
fn draw_watermark(
    mut img: DynamicImage,
    text: &str,
    opacity: f32,
    position: crate::ops::WatermarkPosition,
    font_size: Option<f32>,
    color: Option<(u8, u8, u8)>,
) -> std::result::Result<DynamicImage, (DynamicImage, String)> {
    use ab_glyph::{FontArc, PxScale};
    use crate::ops::WatermarkPosition;

    const FONT_SEARCH_PATHS: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];
    let font_bytes = match FONT_SEARCH_PATHS.iter().find_map(|path| std::fs::read(path).ok()) {
        Some(bytes) => bytes,
        None => {
            return Err((
                img,
                "no scalable font found on host (searched common DejaVu/Liberation/Arial paths)"
                    .to_string(),
            ))
        }
    };
    let font = match FontArc::try_from_vec(font_bytes) {
        Ok(font) => font,
        Err(e) => return Err((img, format!("failed to parse font: {e}"))),
    };

    let (width, height) = (img.width(), img.height());
    let scale = PxScale::from(
        font_size.unwrap_or_else(|| (height as f32 / 16.0).clamp(12.0, 72.0)),
    );
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
    let (r, g, b) = color.unwrap_or((255, 255, 255));
    let color = Rgba([r, g, b, alpha]);

    // Rough text width estimate (scale.x * 0.6 per glyph) to place the
    // anchor without needing a text-measurement pass.
    let approx_text_width = (text.chars().count() as f32 * scale.x * 0.6) as u32;
    let margin = 10i32;
    let (x, y) = match position {
        WatermarkPosition::TopLeft => (margin, margin),
        WatermarkPosition::TopRight => {
            (width as i32 - approx_text_width as i32 - margin, margin)
        }
        WatermarkPosition::BottomLeft => {
            (margin, height as i32 - scale.y as i32 - margin)
        }
        WatermarkPosition::BottomRight => (
            width as i32 - approx_text_width as i32 - margin,
            height as i32 - scale.y as i32 - margin,
        ),
        WatermarkPosition::Center => (
            (width as i32 - approx_text_width as i32) / 2,
            (height as i32 - scale.y as i32) / 2,
        ),
    };

    let mut rgba = img.to_rgba8();
    draw_text_mut(&mut rgba, color, x, y, scale, &font, text);
    img = DynamicImage::ImageRgba8(rgba);
    Ok(img)
}

/// Fast resize with owned DynamicImage (zero-copy for RGB/RGBA), always
/// using the Lanczos3 kernel. Most callers (probe, size-target resize
/// fallback) don't expose a filter choice to their caller.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    fast_resize_owned_with_filter(img, dst_width, dst_height, ResizeFilter::Lanczos3)
}

/// Fast resize with an explicit resampling kernel, per the `resizeFilter`
/// compression option.
pub fn fast_resize_owned_with_filter(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, ResizeError> {
    fast_resize_owned_impl(img, dst_width, dst_height, filter)
}

/// Fast resize with reference (for external API compatibility)
pub fn fast_resize(
    img: &DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err("invalid dimensions".to_string());
    }

    // Select pixel layout without forcing RGBA when not needed
    // Use into_raw() to avoid clone() - ownership transfer instead of copying
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => {
            // Clone is necessary when we only have a reference
            let rgb_image = rgb.clone();
            (PixelType::U8x3, rgb_image.into_raw())
        }
        DynamicImage::ImageRgba8(rgba) => {
            // Clone is necessary when we only have a reference
            let rgba_image = rgba.clone();
            (PixelType::U8x4, rgba_image.into_raw())
        }
        _ => {
            let rgba = img.to_rgba8();
            (PixelType::U8x4, rgba.into_raw())
        }
    };

    fast_resize_internal(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height,
    )
}

/// Internal resize implementation (shared by both owned and reference versions)
pub fn fast_resize_internal(
    src_width: u32,
    src_height: u32,
    src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    fast_resize_internal_impl(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height, ResizeFilter::Lanczos3,
    )
}

fn fast_resize_owned_impl(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Select pixel layout without forcing RGBA when not needed
    // Use into_raw() to avoid clone() - ownership transfer instead of copying
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => {
            // Zero-copy: directly take ownership of the pixel buffer
            (PixelType::U8x3, rgb.into_raw())
        }
        DynamicImage::ImageRgba8(rgba) => {
            // Zero-copy: directly take ownership of the pixel buffer
            (PixelType::U8x4, rgba.into_raw())
        }
        other => {
            // For other formats, convert to RGBA (necessary conversion)
            let rgba = other.to_rgba8();
            (PixelType::U8x4, rgba.into_raw())
        }
    };

    fast_resize_internal_impl(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height, filter,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

/// Map the public resize-filter choice to `fast_image_resize`'s algorithm.
/// `Nearest` selects the non-convolution fast path; everything else is a
/// convolution kernel.
fn resize_alg_for(filter: ResizeFilter) -> fir::ResizeAlg {
    match filter {
        ResizeFilter::Nearest => fir::ResizeAlg::Nearest,
        ResizeFilter::Lanczos3 => fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3),
        ResizeFilter::Mitchell => fir::ResizeAlg::Convolution(fir::FilterType::Mitchell),
        ResizeFilter::Bilinear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
    }
}

fn fast_resize_internal_impl(
    src_width: u32,
    src_height: u32,
    src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, String> {
    // from_vec_u8 validates buffer size/alignment before taking ownership;
    // Vec<u8> from the image crate always satisfies it in practice.
    let mut src_image = fir::images::Image::from_vec_u8(src_width, src_height, src_pixels, pixel_type)
        .map_err(|e| format!("fir source image error: {e:?}"))?;

    // Create destination image
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Premultiplied Alpha conversion for RGBA images to prevent black fringing
    let mul_div = MulDiv::default();
    if pixel_type == PixelType::U8x4 {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    let options = ResizeOptions::new().resize_alg(resize_alg_for(filter));
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    // Unpremultiplied Alpha conversion for RGBA images
    if pixel_type == PixelType::U8x4 {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    // Convert back to DynamicImage
    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn contain_fit_skips_scaling_when_already_inside_box() {
        assert_eq!(calc_contain_resize_dimensions(100, 100, 500, 500), (100, 100));
        assert_eq!(calc_contain_resize_dimensions(50, 200, 300, 300), (50, 200));
    }

    #[test]
    fn contain_fit_downscales_when_larger_than_box() {
        assert_eq!(calc_contain_resize_dimensions(800, 600, 200, 200), (200, 150));
        assert_eq!(calc_contain_resize_dimensions(300, 50, 100, 200), (100, 17));
    }

    #[test]
    fn resize_op_inside_never_upscales() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, image::Rgba([1, 2, 3, 255])));
        let ops = vec![Operation::Resize {
            width: Some(400),
            height: Some(400),
            fit: ResizeFit::Inside,
            filter: ResizeFilter::default(),
        }];
        let out = apply_ops(Cow::Owned(img), &ops).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn watermark_missing_font_degrades_to_no_op() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, image::Rgba([0, 0, 0, 255])));
        let result = draw_watermark(
            img.clone(),
            "hi",
            1.0,
            crate::ops::WatermarkPosition::Center,
            None,
            None,
        );
        // Either a real font was found on this host (watermark applied) or
        // none was (the original pixels come back unchanged) - both are
        // acceptable outcomes; what must never happen is an error that
        // fails the whole pipeline.
        match result {
            Ok(_) => {}
            Err((returned, _reason)) => assert_eq!(returned.dimensions(), img.dimensions()),
        }
    }
}
