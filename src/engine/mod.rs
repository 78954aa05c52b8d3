// src/engine/mod.rs
//
// Wires together the engine submodules. Decode/encode/transform logic lives
// in the individual files; this module just declares the tree and holds the
// crate-wide safety limits every decoder checks against.

pub mod analyzer;
pub mod api;
pub mod capabilities;
pub mod common;
pub mod compress;
pub mod decoder;
pub mod encoder;
pub mod firewall;
pub mod io;
pub mod memory;
pub mod metadata;
pub mod pipeline;
pub mod pool;
pub mod probe;
pub mod size_target;
pub mod tasks;

#[cfg(feature = "stress")]
pub mod stress;

/// Hard ceiling on either image dimension. Inputs beyond this are rejected
/// before decode rather than left to the underlying codec to reject (or not).
pub const MAX_DIMENSION: u32 = 32_768;

/// Hard ceiling on total pixel count, independent of the two-dimensional
/// check above (a very wide, very short image can pass `MAX_DIMENSION` on
/// both axes and still decode to an enormous buffer).
pub const MAX_PIXELS: u64 = 100_000_000;

pub use api::ImageEngine;
pub use decoder::{
    check_dimensions, decode_image, decode_jpeg_mozjpeg, decode_with_image_crate,
    ensure_dimensions_safe,
};
pub use encoder::{embed_exif_jpeg, encode_avif, encode_jpeg, encode_png, encode_webp};
pub use firewall::FirewallConfig;
pub use io::{extract_icc_profile, Source};
pub use pipeline::{
    apply_ops, calc_contain_resize_dimensions, calc_resize_dimensions, fast_resize,
    fast_resize_owned,
};
