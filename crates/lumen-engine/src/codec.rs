use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::{Result, StudioError};

/// Decodes any supported container into an 8-bit RGB buffer. Alpha is dropped.
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    let image =
        image::load_from_memory(bytes).map_err(|err| StudioError::ImageDecode(err.to_string()))?;
    Ok(image.to_rgb8())
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut out, format)
        .map_err(|err| StudioError::ImageEncode(err.to_string()))?;
    Ok(out.into_inner())
}

/// Lossless encoding used for cached renders and model attachments.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    encode(image, ImageFormat::Png)
}

/// Output format from a file extension, PNG when unknown.
pub fn format_for_path(path: &Path) -> ImageFormat {
    ImageFormat::from_path(path).unwrap_or(ImageFormat::Png)
}

pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "image/png",
    }
}

/// Encodes by extension and writes, creating parent directories.
pub fn write_image(image: &RgbImage, path: &Path) -> Result<()> {
    let bytes = encode(image, format_for_path(path))?;
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::{decode, encode_png, format_for_path, mime_for_bytes, write_image};
    use crate::error::StudioError;

    #[test]
    fn png_round_trip_keeps_pixels() -> anyhow::Result<()> {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(1, 1, Rgb([10, 200, 30]));
        let bytes = encode_png(&image)?;
        assert_eq!(mime_for_bytes(&bytes), "image/png");
        assert_eq!(decode(&bytes)?, image);
        Ok(())
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = decode(b"definitely not an image").err();
        assert!(matches!(err, Some(StudioError::ImageDecode(_))));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(format_for_path(Path::new("out.jpg")), ImageFormat::Jpeg);
        assert_eq!(format_for_path(Path::new("out")), ImageFormat::Png);
    }

    #[test]
    fn write_image_creates_parents() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("exports").join("out.jpg");
        write_image(&RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])), &path)?;
        let bytes = std::fs::read(&path)?;
        assert_eq!(mime_for_bytes(&bytes), "image/jpeg");
        Ok(())
    }
}
