//! Readback encoding: textures to images, PNG files, and base64 data
//! URLs.
//!
//! The readback itself always yields four components per pixel (a
//! limitation of the underlying readback path); float and half-float
//! textures are tone-clamped to 8-bit before encoding.

use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use glowtex_core::{ComponentType, CubeFace, GpuContext, Texture};

use crate::error::IoError;
use crate::pixel::rgba_f32_to_rgba8;

/// Reads a texture (or one cube face) back into an RGBA image.
///
/// `face` must be `None` for 2D textures and name a face for cube maps,
/// matching the readback contract.
pub fn texture_to_image(
    ctx: &GpuContext,
    texture: &Texture,
    face: Option<CubeFace>,
) -> Result<image::RgbaImage, IoError> {
    let pixels = match texture.component() {
        ComponentType::UnsignedByte => texture.read_pixels(ctx, face)?,
        ComponentType::HalfFloat | ComponentType::Float => {
            rgba_f32_to_rgba8(&texture.read_pixels_f32(ctx, face)?)
        }
    };
    image::RgbaImage::from_raw(texture.width(), texture.height(), pixels)
        .ok_or_else(|| IoError::Encode("pixel buffer does not match image dimensions".into()))
}

/// Writes an RGBA image as a PNG file.
pub fn save_png(image: &image::RgbaImage, path: impl AsRef<Path>) -> Result<(), IoError> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| IoError::Encode(e.to_string()))
}

/// Reads a texture back and writes it as a PNG file.
pub fn texture_to_png(
    ctx: &GpuContext,
    texture: &Texture,
    path: impl AsRef<Path>,
    face: Option<CubeFace>,
) -> Result<(), IoError> {
    save_png(&texture_to_image(ctx, texture, face)?, path)
}

/// Encodes an RGBA image as a `data:image/png;base64,...` URL.
pub fn png_data_url(image: &image::RgbaImage) -> Result<String, IoError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| IoError::Encode(e.to_string()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:image/png;base64,{encoded}"))
}

/// Reads a texture back and encodes it as a base64 PNG data URL.
pub fn texture_to_data_url(
    ctx: &GpuContext,
    texture: &Texture,
    face: Option<CubeFace>,
) -> Result<String, IoError> {
    png_data_url(&texture_to_image(ctx, texture, face)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> image::RgbaImage {
        image::RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([12, 34, 56, 255])
            }
        })
    }

    #[test]
    fn data_url_has_the_png_prefix() {
        let url = png_data_url(&checkerboard(4, 4)).unwrap();
        assert!(
            url.starts_with("data:image/png;base64,"),
            "unexpected prefix: {}",
            &url[..30.min(url.len())]
        );
    }

    #[test]
    fn data_url_round_trips_through_base64_and_png() {
        let original = checkerboard(5, 3);
        let url = png_data_url(&original).unwrap();
        let b64 = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (5, 3));
        assert_eq!(decoded, original);
    }

    #[test]
    fn save_png_round_trips_through_a_file() {
        let original = checkerboard(8, 8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.png");

        save_png(&original, &path).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded, original);
    }

    #[test]
    #[ignore = "requires GL context"]
    fn float_textures_export_tone_clamped() {
        // Would test: a float texture with components above 1.0 exports
        // as 255 in the PNG.
    }
}
