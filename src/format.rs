// src/format.rs
//
// Source-format detection. Magic bytes are authoritative; declared MIME
// type and filename extension are only consulted when the byte prefix is
// ambiguous or too short to sniff. Never fabricates a format: an
// indeterminate input comes back as `Unknown`, which callers turn into
// `LazyImageError::unsupported_format`.

/// Canonical source/target image container recognized by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Avif,
    Heic,
    Gif,
    Tiff,
    Bmp,
    Jxl,
    Unknown,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Heic => "heic",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Jxl => "jxl",
            Self::Unknown => "unknown",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            other => other.as_str(),
        }
    }

    /// Whether this crate can decode the format natively to RGBA8 without an
    /// optional codec feature (see `crate::engine::capabilities`).
    pub fn always_decodable(&self) -> bool {
        matches!(
            self,
            Self::Png | Self::Jpeg | Self::WebP | Self::Gif | Self::Tiff | Self::Bmp
        )
    }
}

/// Detect the source format of `bytes`. `declared_mime` and `filename` are
/// tie-breakers only, consulted in that order after the magic-byte sniff
/// comes back `Unknown`.
pub fn detect(bytes: &[u8], declared_mime: Option<&str>, filename: Option<&str>) -> ImageFormat {
    let sniffed = detect_from_magic_bytes(bytes);
    if sniffed != ImageFormat::Unknown {
        return sniffed;
    }

    if let Some(mime) = declared_mime {
        let from_mime = detect_from_mime(mime);
        if from_mime != ImageFormat::Unknown {
            return from_mime;
        }
    }

    if let Some(name) = filename {
        let from_ext = detect_from_extension(name);
        if from_ext != ImageFormat::Unknown {
            return from_ext;
        }
    }

    ImageFormat::Unknown
}

fn detect_from_magic_bytes(bytes: &[u8]) -> ImageFormat {
    if bytes.len() >= 8 && bytes[0..8] == *b"\x89PNG\r\n\x1a\n" {
        return ImageFormat::Png;
    }
    if bytes.len() >= 3 && bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
        return ImageFormat::Jpeg;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return ImageFormat::WebP;
    }
    if bytes.len() >= 6 && &bytes[0..3] == b"GIF" && (&bytes[3..6] == b"87a" || &bytes[3..6] == b"89a") {
        return ImageFormat::Gif;
    }
    if bytes.len() >= 4
        && (bytes[0..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[0..4] == [0x4D, 0x4D, 0x00, 0x2A])
    {
        return ImageFormat::Tiff;
    }
    if bytes.len() >= 2 && &bytes[0..2] == b"BM" {
        return ImageFormat::Bmp;
    }
    // Bare JPEG-XL codestream (no ISOBMFF container)
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0x0A {
        return ImageFormat::Jxl;
    }
    // ISOBMFF family: AVIF, HEIC/HEIF, and boxed JXL all share a `ftyp` box
    // at offset 4; the brand at offset 8 disambiguates them.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        match &bytes[8..12] {
            b"avif" | b"avis" => return ImageFormat::Avif,
            b"heic" | b"heix" | b"mif1" | b"msf1" => return ImageFormat::Heic,
            b"jxl " => return ImageFormat::Jxl,
            _ => {}
        }
    }
    ImageFormat::Unknown
}

fn detect_from_mime(mime: &str) -> ImageFormat {
    match mime.to_lowercase().as_str() {
        "image/png" => ImageFormat::Png,
        "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
        "image/webp" => ImageFormat::WebP,
        "image/avif" => ImageFormat::Avif,
        "image/heic" | "image/heif" => ImageFormat::Heic,
        "image/gif" => ImageFormat::Gif,
        "image/tiff" => ImageFormat::Tiff,
        "image/bmp" | "image/x-ms-bmp" => ImageFormat::Bmp,
        "image/jxl" => ImageFormat::Jxl,
        _ => ImageFormat::Unknown,
    }
}

fn detect_from_extension(filename: &str) -> ImageFormat {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "png" => ImageFormat::Png,
        "jpg" | "jpeg" | "jpe" => ImageFormat::Jpeg,
        "webp" => ImageFormat::WebP,
        "avif" => ImageFormat::Avif,
        "heic" | "heif" => ImageFormat::Heic,
        "gif" => ImageFormat::Gif,
        "tif" | "tiff" => ImageFormat::Tiff,
        "bmp" => ImageFormat::Bmp,
        "jxl" => ImageFormat::Jxl,
        _ => ImageFormat::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_by_magic_bytes() {
        let data = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0];
        assert_eq!(detect(&data, None, None), ImageFormat::Png);
    }

    #[test]
    fn detects_jpeg_by_magic_bytes() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(detect(&data, None, None), ImageFormat::Jpeg);
    }

    #[test]
    fn detects_webp_riff_container() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"WEBP");
        assert_eq!(detect(&data, None, None), ImageFormat::WebP);
    }

    #[test]
    fn detects_heic_ftyp_brand() {
        let mut data = vec![0, 0, 0, 24];
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"heic");
        assert_eq!(detect(&data, None, None), ImageFormat::Heic);
    }

    #[test]
    fn detects_avif_ftyp_brand() {
        let mut data = vec![0, 0, 0, 24];
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"avif");
        assert_eq!(detect(&data, None, None), ImageFormat::Avif);
    }

    #[test]
    fn falls_back_to_mime_when_bytes_are_ambiguous() {
        let data = [0u8; 4];
        assert_eq!(
            detect(&data, Some("image/png"), None),
            ImageFormat::Png
        );
    }

    #[test]
    fn falls_back_to_extension_as_last_resort() {
        let data = [0u8; 4];
        assert_eq!(detect(&data, None, Some("photo.webp")), ImageFormat::WebP);
    }

    #[test]
    fn never_fabricates_a_format() {
        let data = [0u8; 4];
        assert_eq!(detect(&data, None, None), ImageFormat::Unknown);
    }
}
