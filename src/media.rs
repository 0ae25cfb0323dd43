use base64::Engine;
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("not a base64 data URI")]
    NotDataUri,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image transcode failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub fn decode_data_uri(uri: &str) -> Result<DataUri, MediaError> {
    let rest = uri.strip_prefix("data:").ok_or(MediaError::NotDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(MediaError::NotDataUri)?;
    let mime_type = header.strip_suffix(";base64").ok_or(MediaError::NotDataUri)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok(DataUri { mime_type: mime_type.to_string(), bytes })
}

/// MIME type from the image's magic bytes, falling back to what the uploader declared.
pub fn sniff_mime(bytes: &[u8], declared: Option<&str>) -> String {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => declared
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

/// Returns PNG bytes, transcoding when the payload is in another format.
pub fn ensure_png(bytes: Vec<u8>, mime_type: &str) -> Result<Vec<u8>, MediaError> {
    if mime_type.eq_ignore_ascii_case(PNG_MIME) {
        return Ok(bytes);
    }
    let decoded = image::load_from_memory(&bytes)?;
    let mut out = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    pub(crate) fn tiny_image(format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 40, 40]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn data_uri_round_trips_header_and_bytes() {
        let uri = encode_data_uri("image/jpeg", b"abc");
        assert_eq!(uri, "data:image/jpeg;base64,YWJj");
        let parsed = decode_data_uri(&uri).unwrap();
        assert_eq!(parsed.mime_type, "image/jpeg");
        assert_eq!(parsed.bytes, b"abc".to_vec());
    }

    #[test]
    fn rejects_non_data_uri() {
        assert!(matches!(decode_data_uri("https://example.com/a.png"), Err(MediaError::NotDataUri)));
        assert!(matches!(decode_data_uri("data:image/png,raw"), Err(MediaError::NotDataUri)));
    }

    #[test]
    fn sniffs_from_magic_bytes_first() {
        let jpeg = tiny_image(ImageFormat::Jpeg);
        assert_eq!(sniff_mime(&jpeg, Some("image/png")), "image/jpeg");
        assert_eq!(sniff_mime(b"not an image", Some("image/heic")), "image/heic");
        assert_eq!(sniff_mime(b"not an image", None), "application/octet-stream");
    }

    #[test]
    fn jpeg_is_transcoded_to_png() {
        let jpeg = tiny_image(ImageFormat::Jpeg);
        let png = ensure_png(jpeg, "image/jpeg").unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn png_passes_through_untouched() {
        let png = tiny_image(ImageFormat::Png);
        assert_eq!(ensure_png(png.clone(), "image/png").unwrap(), png);
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        assert!(matches!(ensure_png(b"garbage".to_vec(), "image/webp"), Err(MediaError::Image(_))));
    }
}
