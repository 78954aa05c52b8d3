#![no_main]

//! Exercises the raw-TIFF EXIF sanitizer (orientation reset, GPS stripping)
//! reached through the JPEG EXIF embedding path.

use arbitrary::Arbitrary;
use snapcompress::engine::embed_exif_jpeg;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    jpeg: Vec<u8>,
    exif: Vec<u8>,
    reset_orientation: bool,
    strip_gps: bool,
}

fuzz_target!(|input: Input| {
    let _ = embed_exif_jpeg(input.jpeg, &input.exif, input.reset_orientation, input.strip_gps);
});
