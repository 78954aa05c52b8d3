// src/engine/analyzer.rs
//
// Content Analyzer (C3): classifies a decoded image as photo/graphic/mixed
// and measures unique-color count, gradient prevalence, solid-region
// fraction, and transparency. Drives auto-format/auto-lossless resolution
// and the quick probe. Sampling is deterministic stratified-by-stride so
// repeated runs on the same input never disagree.

use image::{DynamicImage, GenericImageView};
use std::collections::HashSet;

/// Coarse content classification used to steer format and lossless choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Photo,
    Graphic,
    Mixed,
}

/// Immutable result of analyzing a decoded image. Cheap enough to run on
/// every job, not gated behind any option.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageAnalysis {
    pub kind: ContentKind,
    pub unique_colors: u64,
    pub has_gradients: bool,
    pub has_solid_regions: bool,
    pub has_transparency: bool,
}

/// Per-channel absolute difference threshold below which two sampled pixels
/// count as a "solid" transition (==0) or a "gradient" transition (0, 30).
const GRADIENT_UPPER_BOUND: u32 = 30;

/// Stratified-sample the image and classify it. `step` is derived from
/// total pixel count so larger images don't pay for an exhaustive scan.
pub fn analyze(img: &DynamicImage) -> ImageAnalysis {
    let (width, height) = img.dimensions();
    let total_pixels = width as u64 * height as u64;
    if total_pixels == 0 {
        return ImageAnalysis {
            kind: ContentKind::Graphic,
            unique_colors: 0,
            has_gradients: false,
            has_solid_regions: false,
            has_transparency: false,
        };
    }

    let step = (total_pixels / 10_000).max(1);
    let rgba = img.to_rgba8();
    let raw = rgba.as_raw();
    let stride = width as u64 * 4;

    let mut hashes: HashSet<u32> = HashSet::new();
    let mut has_transparency = false;
    let mut gradient_samples = 0u64;
    let mut solid_samples = 0u64;
    let mut total_samples = 0u64;

    // Walk sampled pixel indices in row-major order; compare each sample to
    // the *next* sampled pixel in the same walk (not its spatial neighbor).
    let mut samples: Vec<[u8; 4]> = Vec::new();
    let mut idx = 0u64;
    while idx < total_pixels {
        let y = idx / width as u64;
        let x = idx % width as u64;
        let offset = (y * stride + x * 4) as usize;
        if offset + 4 > raw.len() {
            break;
        }
        let pixel = [raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]];
        samples.push(pixel);
        idx += step;
    }

    for pixel in &samples {
        let [r, g, b, a] = *pixel;
        hashes.insert(((r as u32) << 16) | ((g as u32) << 8) | b as u32);
        if a < 255 {
            has_transparency = true;
        }
    }

    for pair in samples.windows(2) {
        let [r1, g1, b1, _] = pair[0];
        let [r2, g2, b2, _] = pair[1];
        let diff = (r1 as i32 - r2 as i32).unsigned_abs()
            + (g1 as i32 - g2 as i32).unsigned_abs()
            + (b1 as i32 - b2 as i32).unsigned_abs();
        total_samples += 1;
        if diff == 0 {
            solid_samples += 1;
        } else if diff < GRADIENT_UPPER_BOUND {
            gradient_samples += 1;
        }
    }

    let sample_ratio = samples.len() as f64 / total_pixels as f64;
    let unique_colors = ((hashes.len() as f64 / sample_ratio.max(f64::EPSILON)).round() as u64)
        .min(total_pixels);

    let gradient_fraction = if total_samples > 0 {
        gradient_samples as f64 / total_samples as f64
    } else {
        0.0
    };
    let solid_fraction = if total_samples > 0 {
        solid_samples as f64 / total_samples as f64
    } else {
        0.0
    };

    let kind = if unique_colors < 5_000 || solid_fraction > 0.3 {
        ContentKind::Graphic
    } else if unique_colors > 50_000 && gradient_fraction > 0.3 {
        ContentKind::Photo
    } else {
        ContentKind::Mixed
    };

    ImageAnalysis {
        kind,
        unique_colors,
        has_gradients: gradient_fraction > 0.0,
        has_solid_regions: solid_fraction > 0.0,
        has_transparency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, RgbaImage};

    #[test]
    fn flat_color_image_is_graphic_with_solid_regions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(256, 256, Rgba([200, 50, 50, 255])));
        let analysis = analyze(&img);
        assert_eq!(analysis.kind, ContentKind::Graphic);
        assert!(analysis.has_solid_regions);
        assert!(!analysis.has_transparency);
    }

    #[test]
    fn alpha_below_255_is_detected_as_transparency() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([10, 10, 10, 128])));
        assert!(analyze(&img).has_transparency);
    }

    #[test]
    fn smooth_gradient_with_many_colors_is_photo() {
        let buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(512, 512, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        let analysis = analyze(&DynamicImage::ImageRgba8(buf));
        assert_eq!(analysis.kind, ContentKind::Photo);
        assert!(analysis.has_gradients);
    }

    #[test]
    fn empty_image_does_not_panic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        let analysis = analyze(&img);
        assert_eq!(analysis.unique_colors, 0);
    }

    #[test]
    fn analysis_is_deterministic_across_runs() {
        let buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(300, 200, |x, y| {
            Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x ^ y) % 256) as u8, 255])
        });
        let img = DynamicImage::ImageRgba8(buf);
        let first = analyze(&img);
        let second = analyze(&img);
        assert_eq!(first, second);
    }
}
