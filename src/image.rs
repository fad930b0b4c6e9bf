use crate::error::GatewayError;

/// Upload ceiling, checked before any format sniffing.
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// A validated upload: raw bytes plus the MIME type sniffed from them.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Classify an image purely by its magic bytes. Client-declared content
/// types are spoofable and never consulted.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

/// Size check first, then signature sniffing. The first failing image
/// aborts a multi-image request, so callers validate one at a time.
pub fn validate(bytes: Vec<u8>) -> Result<UploadedImage, GatewayError> {
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(GatewayError::ImageTooLarge {
            size: bytes.len(),
            limit: MAX_IMAGE_SIZE,
        });
    }
    match sniff_mime(&bytes) {
        Some(mime) => Ok(UploadedImage { bytes, mime }),
        None => Err(GatewayError::UnsupportedImageFormat),
    }
}
