use base64::{engine::general_purpose, Engine as _};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, RgbaImage};

use super::CaptureError;

/// JPEG-encodes a frame and returns the bare base64 payload.
pub fn encode_jpeg_base64(frame: RgbaImage, quality: u8) -> Result<String, CaptureError> {
    let rgb = DynamicImage::ImageRgba8(frame).into_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(general_purpose::STANDARD.encode(&jpeg))
}
