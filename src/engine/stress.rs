// src/engine/stress.rs
//
// Stress test utilities for fuzzing and performance testing.
// This module is independent of NAPI and can be used with --no-default-features --features stress.

#[cfg(feature = "stress")]
use crate::convert_result;
#[cfg(feature = "stress")]
use crate::engine::common::EngineResult;
#[cfg(feature = "stress")]
use crate::engine::decoder::{decode_image, ensure_dimensions_safe};
#[cfg(feature = "stress")]
use crate::engine::encoder::{encode_avif_full, encode_jpeg_full, encode_jxl_full, encode_png, encode_webp_full};
#[cfg(feature = "stress")]
use crate::engine::pipeline::apply_ops;
#[cfg(feature = "stress")]
use crate::ops::{AvifBitDepth, Operation, OutputFormat, ResizeFilter, ResizeFit, WebpLosslessMode, WebpPreset};
#[cfg(feature = "stress")]
use std::borrow::Cow;

/// Run a single stress test iteration.
///
/// This function processes an image through multiple operations and formats
/// to test the pipeline for memory leaks and correctness.
///
/// # Arguments
/// * `data` - Raw image bytes (JPEG, PNG, WebP, etc.)
///
/// # Returns
/// * `Ok(())` if processing succeeds
/// * `Err(LazyImageError)` if any step fails
#[cfg(feature = "stress")]
pub fn run_stress_iteration(data: &[u8]) -> EngineResult<()> {
    let operations: Vec<Operation> = vec![
        Operation::Resize {
            width: Some(1200),
            height: Some(800),
            fit: ResizeFit::Inside,
            filter: ResizeFilter::default(),
        },
        Operation::Rotate { degrees: 90 },
        Operation::Brightness { value: 12 },
        Operation::Contrast { value: -6 },
        Operation::Grayscale,
    ];

    let formats = [
        OutputFormat::Jpeg {
            quality: 82,
            fast_mode: false,
            chroma_subsampling: true,
            progressive: true,
        },
        OutputFormat::Png { quantize: None },
        OutputFormat::WebP {
            quality: 74,
            preset: WebpPreset::default(),
            lossless_mode: WebpLosslessMode::default(),
            near_lossless_level: 60,
        },
        OutputFormat::Avif {
            quality: 60,
            speed: None,
            bit_depth: AvifBitDepth::default(),
        },
        OutputFormat::Jxl {
            quality: 75,
            effort: 7,
            lossless: false,
            progressive: false,
        },
    ];

    // Decode the image once
    ensure_dimensions_safe(data)?;
    let (img, _detected_format) = convert_result!(decode_image(data));

    // Apply operations and encode in each format
    for format in formats.into_iter() {
        let processed = convert_result!(apply_ops(Cow::Borrowed(&img), &operations));

        // Encode to the target format
        let _encoded = match format {
            OutputFormat::Jpeg {
                quality,
                fast_mode,
                chroma_subsampling,
                progressive,
            } => {
                convert_result!(encode_jpeg_full(
                    &processed, quality, None, fast_mode, chroma_subsampling, progressive
                ))
            }
            OutputFormat::Png { .. } => {
                convert_result!(encode_png(&processed, None))
            }
            OutputFormat::WebP {
                quality,
                preset,
                lossless_mode,
                near_lossless_level,
            } => {
                convert_result!(encode_webp_full(
                    &processed, quality, None, preset, lossless_mode, near_lossless_level
                ))
            }
            OutputFormat::Avif {
                quality,
                speed,
                bit_depth,
            } => {
                convert_result!(encode_avif_full(&processed, quality, None, speed, bit_depth))
            }
            OutputFormat::Jxl {
                quality,
                effort,
                lossless,
                progressive,
            } => {
                convert_result!(encode_jxl_full(
                    &processed, quality, None, effort, lossless, progressive
                ))
            }
        };

        // stress harness only needs to ensure the pipeline runs without leaking; drop the result
    }

    Ok(())
}
