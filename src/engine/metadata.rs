// src/engine/metadata.rs
//
// Metadata Handler (C10): splices EXIF/ICC from the source container into
// the encoded output when the caller asked to preserve metadata and the
// source/target containers are compatible. Metadata copy failures are
// non-fatal — the encoded image is returned unchanged and the failure is
// logged, never surfaced as an error to the caller (spec §4.10, §7).

use crate::engine::encoder::{embed_exif_jpeg, embed_icc_png};
use crate::format::ImageFormat;
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};

/// Outcome of applying the metadata policy to an already-encoded output.
pub struct MetadataOutcome {
    pub bytes: Vec<u8>,
    pub icc_preserved: bool,
    pub metadata_stripped: bool,
}

/// Apply the `preserveMetadata` policy. When `preserve` is false, or the
/// source/target containers don't share a metadata format, the output is
/// returned untouched (encoders never embed metadata unless explicitly
/// asked to, so "untouched" already means "stripped").
pub fn apply_metadata_policy(
    source_format: ImageFormat,
    target_format: ImageFormat,
    source_bytes: &[u8],
    encoded_bytes: Vec<u8>,
    preserve: bool,
    icc_profile: Option<&[u8]>,
) -> MetadataOutcome {
    if !preserve {
        return MetadataOutcome {
            bytes: encoded_bytes,
            icc_preserved: false,
            metadata_stripped: true,
        };
    }

    match (source_format, target_format) {
        (ImageFormat::Jpeg, ImageFormat::Jpeg) => {
            copy_jpeg_metadata(source_bytes, encoded_bytes, icc_profile)
        }
        (ImageFormat::Png, ImageFormat::Png) => match icc_profile {
            Some(icc) => match embed_icc_png(encoded_bytes.clone(), icc) {
                Ok(bytes) => MetadataOutcome {
                    bytes,
                    icc_preserved: true,
                    metadata_stripped: false,
                },
                Err(err) => {
                    tracing::warn!(error = %err, "metadata: failed to embed PNG ICC profile");
                    MetadataOutcome {
                        bytes: encoded_bytes,
                        icc_preserved: false,
                        metadata_stripped: true,
                    }
                }
            },
            None => MetadataOutcome {
                bytes: encoded_bytes,
                icc_preserved: false,
                metadata_stripped: true,
            },
        },
        // Metadata preservation across format changes is deliberately
        // dropped: target containers are usually incompatible and
        // best-effort translation isn't attempted.
        _ => MetadataOutcome {
            bytes: encoded_bytes,
            icc_preserved: false,
            metadata_stripped: true,
        },
    }
}

fn copy_jpeg_metadata(
    source_bytes: &[u8],
    encoded_bytes: Vec<u8>,
    icc_profile: Option<&[u8]>,
) -> MetadataOutcome {
    let exif = Jpeg::from_bytes(Bytes::copy_from_slice(source_bytes))
        .ok()
        .and_then(|jpeg| jpeg.exif());

    let mut bytes = encoded_bytes;
    let mut icc_preserved = false;

    if let Some(icc) = icc_profile {
        match crate::engine::encoder::embed_icc_jpeg(bytes.clone(), icc) {
            Ok(with_icc) => {
                bytes = with_icc;
                icc_preserved = true;
            }
            Err(err) => {
                tracing::warn!(error = %err, "metadata: failed to embed JPEG ICC profile");
            }
        }
    }

    let mut exif_preserved = false;
    if let Some(exif_bytes) = exif {
        match embed_exif_jpeg(bytes.clone(), &exif_bytes, false, false) {
            Ok(with_exif) => {
                bytes = with_exif;
                exif_preserved = true;
            }
            Err(err) => {
                tracing::warn!(error = %err, "metadata: failed to embed JPEG EXIF segment");
            }
        }
    }

    MetadataOutcome {
        bytes,
        icc_preserved,
        metadata_stripped: !(icc_preserved || exif_preserved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder::encode_jpeg;
    use image::{DynamicImage, RgbImage};

    fn sample_jpeg() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([10, 20, 30])));
        encode_jpeg(&img, 80, None).unwrap()
    }

    #[test]
    fn strips_metadata_when_not_requested() {
        let source = sample_jpeg();
        let encoded = sample_jpeg();
        let outcome = apply_metadata_policy(
            ImageFormat::Jpeg,
            ImageFormat::Jpeg,
            &source,
            encoded.clone(),
            false,
            None,
        );
        assert!(outcome.metadata_stripped);
        assert_eq!(outcome.bytes, encoded);
    }

    #[test]
    fn drops_metadata_across_format_change() {
        let source = sample_jpeg();
        let encoded = vec![0x89, b'P', b'N', b'G'];
        let outcome = apply_metadata_policy(
            ImageFormat::Jpeg,
            ImageFormat::Png,
            &source,
            encoded.clone(),
            true,
            None,
        );
        assert!(outcome.metadata_stripped);
        assert_eq!(outcome.bytes, encoded);
    }

    #[test]
    fn preserves_icc_for_same_format_png_round_trip() {
        let icc = vec![0u8; 64];
        let encoded = {
            use image::{DynamicImage, RgbImage};
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3])));
            crate::engine::encoder::encode_png(&img, None).unwrap()
        };
        let outcome = apply_metadata_policy(
            ImageFormat::Png,
            ImageFormat::Png,
            &[],
            encoded,
            true,
            Some(&icc),
        );
        assert!(outcome.icc_preserved);
        assert!(!outcome.metadata_stripped);
    }
}
