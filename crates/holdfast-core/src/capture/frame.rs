//! Still-frame encoding.
//!
//! The preview is shown mirrored, so the stored photo is flipped
//! horizontally to match what the user saw.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageEncoder, RgbaImage};

use crate::error::CaptureError;

/// Raw RGBA video frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// A horizontal red-to-blue gradient, handy for synthetic cameras.
    pub fn gradient(width: u32, height: u32) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _y in 0..height {
            for x in 0..width {
                let t = if width > 1 { x * 255 / (width - 1) } else { 0 };
                rgba.extend_from_slice(&[(255 - t) as u8, 64, t as u8, 255]);
            }
        }
        Self { width, height, rgba }
    }

    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Mirror `frame` horizontally and encode it as JPEG at `quality` (1..=100).
pub fn encode_mirrored_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    if !frame.has_dimensions() {
        return Err(CaptureError::Encode("frame has zero dimensions".into()));
    }
    let img = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| CaptureError::Encode("pixel buffer shorter than dimensions".into()))?;

    let mirrored = imageops::flip_horizontal(&img);
    let rgb = DynamicImage::ImageRgba8(mirrored).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// `data:image/jpeg;base64,...` for preview and the local cache slot.
pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_jpeg_with_soi_marker() {
        let jpeg = encode_mirrored_jpeg(&Frame::gradient(32, 24), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn output_is_mirrored() {
        let frame = Frame::gradient(64, 8);
        let jpeg = encode_mirrored_jpeg(&frame, 95).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        // The source is red on the left and blue on the right.
        let left = decoded.get_pixel(1, 4);
        let right = decoded.get_pixel(62, 4);
        assert!(left[2] > left[0], "left edge should be blue after mirroring");
        assert!(right[0] > right[2], "right edge should be red after mirroring");
    }

    #[test]
    fn gradient_covers_every_pixel() {
        let frame = Frame::gradient(3, 2);
        assert_eq!(frame.rgba.len(), 3 * 2 * 4);
        assert_eq!(&frame.rgba[..4], &[255, 64, 0, 255]);
        assert_eq!(&frame.rgba[8..12], &[0, 64, 255, 255]);
    }

    #[test]
    fn zero_dimensions_rejected() {
        let err = encode_mirrored_jpeg(&Frame::new(0, 0, Vec::new()), 80).unwrap_err();
        assert!(matches!(err, CaptureError::Encode(_)));
    }

    #[test]
    fn short_buffer_rejected() {
        let err = encode_mirrored_jpeg(&Frame::new(4, 4, vec![0; 10]), 80).unwrap_err();
        assert!(matches!(err, CaptureError::Encode(_)));
    }

    #[test]
    fn data_url_prefix() {
        assert!(to_data_url(&[1, 2, 3]).starts_with("data:image/jpeg;base64,AQID"));
    }
}
