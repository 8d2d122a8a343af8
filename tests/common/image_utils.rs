//! Image inspection utilities for testing.

use image::{DynamicImage, GenericImageView, ImageError, ImageFormat};

/// Load an image from a byte array
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(bytes)
}

/// Detect image format from bytes
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check format, size and channel count of encoded image bytes
pub fn assert_image(
    bytes: &[u8],
    expected_format: ImageFormat,
    expected_size: u32,
    expected_channels: u8,
) -> Result<DynamicImage, String> {
    let actual_format =
        detect_image_format(bytes).ok_or_else(|| "Could not detect image format".to_string())?;
    if actual_format != expected_format {
        return Err(format!(
            "Image format differs: actual = {:?}, expected = {:?}",
            actual_format, expected_format
        ));
    }

    let image = load_image_from_bytes(bytes).map_err(|e| e.to_string())?;
    let (width, height) = image.dimensions();
    if width != expected_size || height != expected_size {
        return Err(format!(
            "Image dimensions differ: actual = {}x{}, expected = {}x{}",
            width, height, expected_size, expected_size
        ));
    }

    let channels = image.color().channel_count();
    if channels != expected_channels {
        return Err(format!(
            "Channel count differs: actual = {}, expected = {}",
            channels, expected_channels
        ));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_assert_image() {
        let img = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(4, 4);
        let mut png_bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
            .unwrap();

        assert!(assert_image(&png_bytes, ImageFormat::Png, 4, 4).is_ok());
        assert!(assert_image(&png_bytes, ImageFormat::Jpeg, 4, 4).is_err());
        assert!(assert_image(&png_bytes, ImageFormat::Png, 8, 4).is_err());
        assert!(assert_image(&png_bytes, ImageFormat::Png, 4, 3).is_err());
    }
}
