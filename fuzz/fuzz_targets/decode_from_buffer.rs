#![no_main]

//! Fuzz target for image decoding paths.
//! Tests the mozjpeg decoder and the image crate wrapper decoder.

use snapcompress::engine::{decode_jpeg_mozjpeg, decode_with_image_crate};
use snapcompress::format::{detect, ImageFormat};
use snapcompress::inspect_header_from_bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Header inspection (fast path, no full decode)
    let _ = inspect_header_from_bytes(data);

    // mozjpeg decoder (JPEG-specific path)
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        let _ = decode_jpeg_mozjpeg(data);
    }

    // image crate wrapper (PNG/WebP/other natively-decodable formats). Skip
    // unknown formats to avoid unnecessary OOM risk from random bytes.
    if detect(data, None, None) != ImageFormat::Unknown {
        let _ = decode_with_image_crate(data);
    }
});
