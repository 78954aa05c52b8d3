// src/engine/capabilities.rs
//
// Process-wide capability registry (C11). The source platform probes
// browser features for AVIF/JXL at runtime; here that becomes a fixed
// compile-time feature-flag set plus a one-time runtime verification that
// the compiled-in codec actually round-trips on this machine. Each probe
// runs once per process and the result is memoized in a `OnceLock`.

use std::sync::OnceLock;

/// Snapshot of which optional codecs and CPU features are usable in this
/// process. Immutable once built; callers degrade gracefully when a flag
/// is false (e.g. refuse `format: jxl`, fall back to webp in `auto`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub avif_encode: bool,
    pub avif_decode: bool,
    pub jxl_encode: bool,
    pub jxl_decode: bool,
    pub heic_decode: bool,
    pub simd: bool,
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Return the memoized capability snapshot, probing on first call.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(probe_all)
}

fn probe_all() -> Capabilities {
    Capabilities {
        avif_encode: probe_avif_encode(),
        avif_decode: probe_avif_decode(),
        jxl_encode: probe_jxl_encode(),
        jxl_decode: probe_jxl_decode(),
        heic_decode: probe_heic_decode(),
        simd: probe_simd(),
    }
}

/// Round-trip a 2x2 image through the AVIF encoder to confirm the codec
/// actually works here, not just that it was compiled in (libavif can be
/// linked but miss a runtime codec backend in some container images).
#[cfg(feature = "avif")]
fn probe_avif_encode() -> bool {
    use image::{DynamicImage, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255])));
    crate::engine::encoder::encode_avif(&img, 60, None).is_ok()
}

#[cfg(not(feature = "avif"))]
fn probe_avif_encode() -> bool {
    false
}

#[cfg(feature = "avif")]
fn probe_avif_decode() -> bool {
    use image::{DynamicImage, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255])));
    match crate::engine::encoder::encode_avif(&img, 60, None) {
        Ok(bytes) => crate::engine::decoder::decode_image(&bytes).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(feature = "avif"))]
fn probe_avif_decode() -> bool {
    false
}

#[cfg(feature = "jxl")]
fn probe_jxl_encode() -> bool {
    use image::{DynamicImage, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255])));
    crate::engine::encoder::encode_jxl(&img, 80, None).is_ok()
}

#[cfg(not(feature = "jxl"))]
fn probe_jxl_encode() -> bool {
    false
}

#[cfg(feature = "jxl")]
fn probe_jxl_decode() -> bool {
    use image::{DynamicImage, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255])));
    match crate::engine::encoder::encode_jxl(&img, 80, None) {
        Ok(bytes) => crate::engine::decoder::decode_image(&bytes).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(feature = "jxl"))]
fn probe_jxl_decode() -> bool {
    false
}

#[cfg(feature = "heic")]
fn probe_heic_decode() -> bool {
    // No tiny HEIC fixture to round-trip against (unlike AVIF/JXL, libheif
    // has no encode path here to produce one); compiled-in is our signal.
    true
}

#[cfg(not(feature = "heic"))]
fn probe_heic_decode() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
fn probe_simd() -> bool {
    std::is_x86_feature_detected!("avx2") || std::is_x86_feature_detected!("sse4.1")
}

#[cfg(target_arch = "aarch64")]
fn probe_simd() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn probe_simd() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_are_memoized_across_calls() {
        let first = capabilities();
        let second = capabilities();
        assert_eq!(first, second);
    }

    #[test]
    fn capabilities_respect_compiled_features() {
        let caps = capabilities();
        assert_eq!(caps.avif_encode, cfg!(feature = "avif") && caps.avif_encode);
        assert_eq!(caps.jxl_encode, cfg!(feature = "jxl") && caps.jxl_encode);
        if !cfg!(feature = "heic") {
            assert!(!caps.heic_decode);
        }
    }
}
