//! Uploaded avatar inspection.

use image::io::Reader as ImageReader;
use image::ImageFormat;
use std::io::Cursor;

use crate::error::{Result, ServiceError};

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;
pub const MAX_AVATAR_SIDE: u32 = 4096;

/// Checks that `data` is a PNG, JPEG, GIF or WebP image of sane size and
/// returns the MIME type detected from its content.
pub fn inspect(data: &[u8]) -> Result<&'static str> {
    if data.is_empty() {
        return Err(ServiceError::validation("Avatar is empty"));
    }
    if data.len() > MAX_AVATAR_BYTES {
        return Err(ServiceError::validation("Avatar must be at most 2 MB"));
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ServiceError::validation(format!("Unreadable image: {}", e)))?;

    let content_type = match reader.format() {
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::WebP) => "image/webp",
        _ => return Err(ServiceError::validation("Avatar must be PNG, JPEG, GIF or WebP")),
    };

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ServiceError::validation(format!("Invalid image: {}", e)))?;
    if width > MAX_AVATAR_SIDE || height > MAX_AVATAR_SIDE {
        return Err(ServiceError::validation("Avatar dimensions are too large"));
    }

    Ok(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png_bytes(side: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(side, side, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_is_accepted() {
        assert_eq!(inspect(&png_bytes(8)).unwrap(), "image/png");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(inspect(&[1, 2, 3, 4, 5]), Err(ServiceError::Validation(_))));
        assert!(matches!(inspect(&[]), Err(ServiceError::Validation(_))));
    }
}
