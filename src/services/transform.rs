//! Variant transforms applied to an origin blob.

use image::{GenericImageView, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid crop box: {0}")]
    InvalidCropBox(String),
    #[error("could not decode source: {0}")]
    Decode(String),
    #[error("could not encode result: {0}")]
    Encode(String),
}

/// A derivation from origin bytes to variant bytes.
///
/// The implementor also names where the result is stored: the variant kind
/// is the first key segment under the upload, `segments` follow it, and
/// `variant_key` is the entry name in the metadata document.
pub trait Transform: Send + Sync + 'static {
    fn variant_kind(&self) -> &'static str;

    fn segments(&self) -> Vec<String>;

    fn variant_key(&self) -> String;

    /// Produce the variant. Must keep the source encoding format.
    fn apply(&self, body: &[u8], content_type: &str) -> Result<Vec<u8>, TransformError>;
}

/// Rectangle to cut out of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropBox {
    pub const VARIANT_KIND: &'static str = "crop";

    /// Parse `dimensions=WxH` and an optional `offset=X,Y` (defaults to `0,0`).
    pub fn parse(dimensions: &str, offset: Option<&str>) -> Result<Self, TransformError> {
        let (width, height) = parse_pair(dimensions, 'x')
            .ok_or_else(|| TransformError::InvalidCropBox(format!("bad dimensions `{}`", dimensions)))?;
        let (x, y) = match offset {
            Some(raw) => parse_pair(raw, ',')
                .ok_or_else(|| TransformError::InvalidCropBox(format!("bad offset `{}`", raw)))?,
            None => (0, 0),
        };
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidCropBox(
                "width and height must be positive".into(),
            ));
        }
        Ok(Self { width, height, x, y })
    }
}

fn parse_pair(raw: &str, separator: char) -> Option<(u32, u32)> {
    let (a, b) = raw.trim().split_once(separator)?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

impl Transform for CropBox {
    fn variant_kind(&self) -> &'static str {
        Self::VARIANT_KIND
    }

    fn segments(&self) -> Vec<String> {
        vec![
            format!("{}x{}", self.width, self.height),
            format!("offset{}x{}", self.x, self.y),
        ]
    }

    fn variant_key(&self) -> String {
        format!("{}x{}_offset{}x{}", self.width, self.height, self.x, self.y)
    }

    fn apply(&self, body: &[u8], content_type: &str) -> Result<Vec<u8>, TransformError> {
        let format = ImageFormat::from_mime_type(content_type)
            .or_else(|| image::guess_format(body).ok())
            .ok_or_else(|| TransformError::Decode(format!("unsupported image type {}", content_type)))?;
        let img = image::load_from_memory_with_format(body, format)
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let (img_width, img_height) = img.dimensions();
        let fits = self.x.checked_add(self.width).is_some_and(|right| right <= img_width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= img_height);
        if !fits {
            return Err(TransformError::InvalidCropBox(format!(
                "{}x{} at {},{} exceeds image bounds {}x{}",
                self.width, self.height, self.x, self.y, img_width, img_height
            )));
        }

        let cropped = img.crop_imm(self.x, self.y, self.width, self.height);
        let mut out = Vec::new();
        cropped
            .write_to(&mut Cursor::new(&mut out), format)
            .map_err(|e| TransformError::Encode(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb};

    /// Encode a `width`x`height` RGB image with a horizontal gradient.
    pub(crate) fn test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let buffer = ImageBuffer::from_fn(width, height, |x, _| Rgb([(x * 10 % 256) as u8, 64, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .expect("failed to encode test image");
        bytes
    }

    #[test]
    fn parses_dimensions_and_offset() {
        assert_eq!(
            CropBox::parse("100x50", Some("3,4")).unwrap(),
            CropBox { width: 100, height: 50, x: 3, y: 4 }
        );
        assert_eq!(CropBox::parse("8x8", None).unwrap().x, 0);
        assert!(matches!(CropBox::parse("0x5", None), Err(TransformError::InvalidCropBox(_))));
        assert!(CropBox::parse("100", None).is_err());
        assert!(CropBox::parse("10x10", Some("1x1")).is_err());
        assert!(CropBox::parse("-1x10", None).is_err());
    }

    #[test]
    fn names_its_variant_location() {
        let crop = CropBox { width: 100, height: 100, x: 0, y: 0 };
        assert_eq!(crop.variant_kind(), "crop");
        assert_eq!(crop.segments(), vec!["100x100", "offset0x0"]);
        assert_eq!(crop.variant_key(), "100x100_offset0x0");
    }

    #[test]
    fn crops_png_and_keeps_format() {
        let source = test_image(20, 10, ImageFormat::Png);
        let crop = CropBox { width: 5, height: 4, x: 2, y: 3 };

        let out = crop.apply(&source, "image/png").unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (5, 4));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0)[0], 20);
    }

    #[test]
    fn crops_jpeg_and_keeps_format() {
        let source = test_image(16, 16, ImageFormat::Jpeg);
        let out = CropBox { width: 8, height: 8, x: 8, y: 8 }
            .apply(&source, "image/jpeg")
            .unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn out_of_range_box_is_rejected() {
        let source = test_image(10, 10, ImageFormat::Png);
        let err = CropBox { width: 5, height: 5, x: 6, y: 0 }
            .apply(&source, "image/png")
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidCropBox(_)));

        let err = CropBox { width: u32::MAX, height: 1, x: 1, y: 0 }
            .apply(&source, "image/png")
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidCropBox(_)));
    }

    #[test]
    fn garbage_input_fails_to_decode() {
        let err = CropBox { width: 1, height: 1, x: 0, y: 0 }
            .apply(b"definitely not an image", "image/png")
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
