/// Bytes of the body prefix the sniffer needs before it will classify.
///
/// Shorter prefixes are never classified, even when the magic bytes would
/// already be unambiguous.
pub const SNIFF_PREFIX_LEN: usize = 16;

/// Image formats the filter recognizes on input and can emit on output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// JFIF/JPEG (`ff d8`).
    Jpeg,
    /// GIF87a or GIF89a.
    Gif,
    /// PNG (8-byte signature).
    Png,
    /// WebP (`RIFF` container with `W` at offset 8).
    Webp,
}

impl ImageKind {
    /// Classify a body prefix by magic bytes.
    ///
    /// Pure and total: anything shorter than [`SNIFF_PREFIX_LEN`] or without
    /// a known signature is `None`. Callers decide whether that is fatal.
    pub fn sniff(prefix: &[u8]) -> Option<Self> {
        if prefix.len() < SNIFF_PREFIX_LEN {
            return None;
        }
        match prefix {
            [0xff, 0xd8, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, ..] => Some(Self::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    /// Parse a directive or CLI format name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Content-Type emitted alongside a body of this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(sig: &[u8]) -> Vec<u8> {
        let mut buf = sig.to_vec();
        buf.resize(SNIFF_PREFIX_LEN, 0);
        buf
    }

    #[test]
    fn recognizes_the_four_signatures() {
        assert_eq!(ImageKind::sniff(&padded(&[0xff, 0xd8, 0xff, 0xe0])), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(&padded(b"GIF87a")), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(&padded(b"GIF89a")), Some(ImageKind::Gif));
        assert_eq!(
            ImageKind::sniff(&padded(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])),
            Some(ImageKind::Png)
        );
        assert_eq!(
            ImageKind::sniff(&padded(b"RIFF\x10\x00\x00\x00WEBPVP8 ")),
            Some(ImageKind::Webp)
        );
    }

    #[test]
    fn rejects_near_misses() {
        assert_eq!(ImageKind::sniff(&padded(b"GIF88a")), None);
        assert_eq!(ImageKind::sniff(&padded(b"GIF89b")), None);
        assert_eq!(ImageKind::sniff(&padded(b"RIFF\x10\x00\x00\x00AVI ")), None);
        assert_eq!(ImageKind::sniff(&padded(b"<html><body>hi</b")), None);
        assert_eq!(ImageKind::sniff(&[0u8; SNIFF_PREFIX_LEN]), None);
    }

    #[test]
    fn short_prefixes_are_never_classified() {
        // A full PNG signature, one byte short of the sniff window.
        let mut buf = padded(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        buf.truncate(SNIFF_PREFIX_LEN - 1);
        assert_eq!(ImageKind::sniff(&buf), None);
        assert_eq!(ImageKind::sniff(b""), None);
        assert_eq!(ImageKind::sniff(&[0xff, 0xd8]), None);
    }

    #[test]
    fn format_names_parse_with_aliases() {
        assert_eq!(ImageKind::from_name("jpeg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_name("JPG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_name(" webp "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::from_name("tiff"), None);
    }

    #[test]
    fn content_types_match_formats() {
        assert_eq!(ImageKind::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ImageKind::Gif.content_type(), "image/gif");
        assert_eq!(ImageKind::Png.content_type(), "image/png");
        assert_eq!(ImageKind::Webp.content_type(), "image/webp");
    }
}
