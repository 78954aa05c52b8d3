// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG, WebP, etc.

use crate::engine::common::run_with_panic_policy;
use crate::error::LazyImageError;
#[cfg(test)]
use image::GenericImageView;
use image::{DynamicImage, ImageReader, RgbImage};
use mozjpeg::Decompress;
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

// Type alias for Result - always use LazyImageError to preserve error taxonomy
// This ensures that decode errors are properly classified (CodecError, ResourceLimit, etc.)
// rather than being converted to generic InternalBug errors.
type DecoderResult<T> = std::result::Result<T, LazyImageError>;

// decode() function removed - it was unused.
// tasks.rs::EncodeTask::decode() and stress.rs::run_stress_iteration() have their own implementations.

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
/// This is SIGNIFICANTLY faster than image crate's pure Rust decoder
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(LazyImageError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            LazyImageError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        // Get image info
        let mut decompress = decompress.rgb().map_err(|e| {
            LazyImageError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();

        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(LazyImageError::decode_failed(format!(
                "image dimensions {}x{} exceed max {}",
                width, height, MAX_DIMENSION
            )));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        // Read all scanlines
        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            LazyImageError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        // Safe conversion from Vec<[u8; 3]> to Vec<u8>
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        // Create DynamicImage from raw RGB data
        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                LazyImageError::decode_failed("mozjpeg: failed to create image from raw data")
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode non-JPEG formats using the image crate under the global panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| LazyImageError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    use super::MAX_PIXELS;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(LazyImageError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(LazyImageError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Detect the source format and decode to a `DynamicImage`, routing each
/// format to the codec best suited for it: mozjpeg for JPEG, the `image`
/// crate for the formats it handles natively (PNG/GIF/BMP/TIFF/WebP), and
/// dedicated FFI wrappers for the optional codecs. Returns the detected
/// format alongside the decoded image since callers (the size-target
/// controller, metadata splicing) need to know what was actually decoded
/// rather than what was requested.
pub fn decode_image(
    data: &[u8],
) -> DecoderResult<(DynamicImage, crate::format::ImageFormat)> {
    use crate::format::ImageFormat as SourceFormat;

    let format = crate::format::detect(data, None, None);
    let image = match format {
        SourceFormat::Jpeg => decode_jpeg_mozjpeg(data)?,
        SourceFormat::Png | SourceFormat::Gif | SourceFormat::Bmp | SourceFormat::Tiff => {
            decode_with_image_crate(data)?
        }
        SourceFormat::WebP => decode_with_image_crate(data)?,
        SourceFormat::Avif => {
            #[cfg(feature = "avif")]
            {
                decode_avif(data)?
            }
            #[cfg(not(feature = "avif"))]
            {
                return Err(LazyImageError::capability_missing("avifDecode"));
            }
        }
        SourceFormat::Heic => {
            #[cfg(feature = "heic")]
            {
                decode_heic(data)?
            }
            #[cfg(not(feature = "heic"))]
            {
                return Err(LazyImageError::capability_missing("heicDecode"));
            }
        }
        SourceFormat::Jxl => {
            #[cfg(feature = "jxl")]
            {
                decode_jxl(data)?
            }
            #[cfg(not(feature = "jxl"))]
            {
                return Err(LazyImageError::capability_missing("jxlDecode"));
            }
        }
        SourceFormat::Unknown => {
            return Err(LazyImageError::unsupported_format("unknown"));
        }
    };

    let (width, height) = {
        use image::GenericImageView;
        image.dimensions()
    };
    check_dimensions(width, height)?;

    Ok((image, format))
}

#[cfg(feature = "avif")]
fn decode_avif(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:avif", || {
        let (width, height, rgba) = crate::codecs::avif_safe::SafeAvifDecoder::decode_to_rgba8(data)?;
        let buffer = image::RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| LazyImageError::decode_failed("avif: failed to build RGBA buffer"))?;
        Ok(DynamicImage::ImageRgba8(buffer))
    })
}

#[cfg(feature = "heic")]
fn decode_heic(data: &[u8]) -> DecoderResult<DynamicImage> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    run_with_panic_policy("decode:heic", || {
        let lib_heif = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(data)
            .map_err(|e| LazyImageError::decode_failed(format!("heic: {e}")))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| LazyImageError::decode_failed(format!("heic: {e}")))?;
        let heif_image = lib_heif
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
            .map_err(|e| LazyImageError::decode_failed(format!("heic: {e}")))?;
        let plane = heif_image
            .planes()
            .interleaved
            .ok_or_else(|| LazyImageError::decode_failed("heic: missing interleaved plane"))?;
        let width = plane.width;
        let height = plane.height;
        let stride = plane.stride;
        let data = plane.data;
        let mut tight = Vec::with_capacity(width as usize * height as usize * 4);
        for row in 0..height as usize {
            let start = row * stride;
            tight.extend_from_slice(&data[start..start + width as usize * 4]);
        }
        let buffer = image::RgbaImage::from_raw(width, height, tight)
            .ok_or_else(|| LazyImageError::decode_failed("heic: failed to build RGBA buffer"))?;
        Ok(DynamicImage::ImageRgba8(buffer))
    })
}

#[cfg(feature = "jxl")]
fn decode_jxl(data: &[u8]) -> DecoderResult<DynamicImage> {
    use jpegxl_rs::decoder_builder;

    run_with_panic_policy("decode:jxl", || {
        let decoder = decoder_builder()
            .build()
            .map_err(|e| LazyImageError::decode_failed(format!("jxl: {e}")))?;
        let (metadata, pixels) = decoder
            .decode_with::<u8>(data)
            .map_err(|e| LazyImageError::decode_failed(format!("jxl: {e}")))?;
        let width = metadata.width;
        let height = metadata.height;
        let buffer = image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| LazyImageError::decode_failed("jxl: failed to build RGBA buffer"))?;
        Ok(DynamicImage::ImageRgba8(buffer))
    })
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_png(64, 64);
        assert!(ensure_dimensions_safe(&data).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let width = crate::engine::MAX_DIMENSION + 1;
        let data = encode_png(width, 1);
        let err = ensure_dimensions_safe(&data).unwrap_err();
        assert!(matches!(err, LazyImageError::DimensionExceedsLimit { .. }));
    }
}
