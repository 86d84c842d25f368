//! Figure decoding: base64 payloads (plain or `data:` URIs) to raster images.

use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn mime(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

/// A decoded figure. The encoded bytes are kept for backends that embed the
/// original file (JPEG passthrough, DOCX media parts).
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: RasterFormat,
    pub encoded: Arc<Vec<u8>>,
    pub pixels: Arc<DynamicImage>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("encoded_len", &self.encoded.len())
            .finish()
    }
}

impl DecodedImage {
    /// Height over width; zero-width images report zero.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 {
            0.0
        } else {
            self.height as f32 / self.width as f32
        }
    }
}

pub trait ImageDecoder: Send + Sync {
    fn decode(&self, data: &str) -> Result<DecodedImage, String>;
}

/// PNG and JPEG through the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterImageDecoder;

impl ImageDecoder for RasterImageDecoder {
    fn decode(&self, data: &str) -> Result<DecodedImage, String> {
        let (mime, bytes) = match parse_data_uri(data) {
            Some(parsed) => parsed,
            None => (None, decode_base64(data)?),
        };
        let format = match mime.as_deref() {
            Some(m) if m.contains("png") => ImageFormat::Png,
            Some(m) if m.contains("jpeg") || m.contains("jpg") => ImageFormat::Jpeg,
            _ => image::guess_format(&bytes).map_err(|err| err.to_string())?,
        };
        let raster_format = match format {
            ImageFormat::Png => RasterFormat::Png,
            ImageFormat::Jpeg => RasterFormat::Jpeg,
            other => return Err(format!("unsupported image format {other:?}")),
        };
        let pixels =
            image::load_from_memory_with_format(&bytes, format).map_err(|err| err.to_string())?;
        let (width, height) = pixels.dimensions();
        Ok(DecodedImage {
            width,
            height,
            format: raster_format,
            encoded: Arc::new(bytes),
            pixels: Arc::new(pixels),
        })
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>, String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| format!("invalid base64: {err}"))
}

/// `(mime, bytes)` for `data:` URIs; `None` when `uri` is not one.
fn parse_data_uri(uri: &str) -> Option<(Option<String>, Vec<u8>)> {
    let rest = uri.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .map(str::to_ascii_lowercase);
    let bytes = if header.contains("base64") {
        decode_base64(payload).ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 30, 30, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn jpeg_base64(width: u32, height: u32) -> String {
        let img = ImageBuffer::from_pixel(width, height, Rgb([10u8, 120, 200]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .expect("encode jpeg");
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_plain_base64_png() {
        let decoded = RasterImageDecoder.decode(&png_base64(40, 20)).unwrap();
        assert_eq!((decoded.width, decoded.height), (40, 20));
        assert_eq!(decoded.format, RasterFormat::Png);
        assert_eq!(decoded.aspect(), 0.5);
    }

    #[test]
    fn decodes_data_uri_jpeg() {
        let uri = format!("data:image/jpeg;base64,{}", jpeg_base64(16, 32));
        let decoded = RasterImageDecoder.decode(&uri).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 32));
        assert_eq!(decoded.format, RasterFormat::Jpeg);
        assert_eq!(decoded.format.mime(), "image/jpeg");
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = png_base64(4, 4);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(16)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(RasterImageDecoder.decode(&wrapped).is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RasterImageDecoder.decode("not base64 at all!").is_err());
        assert!(RasterImageDecoder.decode("AAAA").is_err());
        assert!(RasterImageDecoder.decode("data:image/png;base64,AAAA").is_err());
    }
}
