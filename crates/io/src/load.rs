//! Texture creation from decoded image sources.
//!
//! All factories re-derive the texture's dimensions from the source
//! itself and upload tightly-packed RGBA8 pixels; the caller's options
//! keep their filter/wrap/flip/premultiply settings but the format and
//! component type are pinned to what the decoder produces. Decode
//! failures surface the decoder's message verbatim as
//! [`IoError::Decode`].

use std::path::Path;

use glowtex_core::{
    ComponentType, GpuContext, PixelFormat, Texture, TextureKind, TextureOptions, UploadOptions,
};

use crate::error::IoError;

/// Pins options to the RGBA8 layout the decoder produces.
fn pin_decoded_format(options: TextureOptions, kind: TextureKind) -> TextureOptions {
    TextureOptions {
        kind,
        format: PixelFormat::Rgba,
        component: ComponentType::UnsignedByte,
        ..options
    }
}

/// Creates a 2D texture from a decoded image, sized to the image.
pub fn texture_from_image(
    ctx: &GpuContext,
    image: &image::DynamicImage,
    options: TextureOptions,
) -> Result<Texture, IoError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let options = pin_decoded_format(options, TextureKind::D2);
    let mut texture = Texture::new(ctx, width, height, options)?;
    texture.upload_data(
        ctx,
        rgba.as_raw(),
        UploadOptions::from_texture_options(&options),
    )?;
    Ok(texture)
}

/// Creates a 2D texture from encoded image bytes (format auto-detected).
pub fn texture_from_bytes(
    ctx: &GpuContext,
    bytes: &[u8],
    options: TextureOptions,
) -> Result<Texture, IoError> {
    let image = image::load_from_memory(bytes).map_err(|e| IoError::Decode(e.to_string()))?;
    texture_from_image(ctx, &image, options)
}

/// Creates a 2D texture from an image file on disk.
pub fn texture_from_file(
    ctx: &GpuContext,
    path: impl AsRef<Path>,
    options: TextureOptions,
) -> Result<Texture, IoError> {
    let image = image::open(path).map_err(|e| IoError::Decode(e.to_string()))?;
    texture_from_image(ctx, &image, options)
}

/// Validates six decoded faces: all square, all the same size. Returns
/// the shared face size.
fn check_cube_faces(faces: &[image::RgbaImage; 6]) -> Result<u32, IoError> {
    let size = faces[0].width();
    for (index, face) in faces.iter().enumerate() {
        if face.width() != face.height() {
            return Err(IoError::FaceMismatch(format!(
                "face {index} is {}x{}, expected square",
                face.width(),
                face.height()
            )));
        }
        if face.width() != size {
            return Err(IoError::FaceMismatch(format!(
                "face {index} is {}x{}, expected {size}x{size}",
                face.width(),
                face.height()
            )));
        }
    }
    Ok(size)
}

/// Creates a cube map from six decoded images, in
/// [`CubeFace::ALL`](glowtex_core::CubeFace::ALL) order.
pub fn cube_from_images(
    ctx: &GpuContext,
    images: &[image::DynamicImage; 6],
    options: TextureOptions,
) -> Result<Texture, IoError> {
    let faces: [image::RgbaImage; 6] = std::array::from_fn(|i| images[i].to_rgba8());
    let size = check_cube_faces(&faces)?;
    let options = pin_decoded_format(options, TextureKind::CubeMap);
    let slices: [&[u8]; 6] = std::array::from_fn(|i| faces[i].as_raw().as_slice());
    Ok(Texture::cube_with_faces(ctx, size, options, &slices)?)
}

/// Creates a cube map from six image files, in
/// [`CubeFace::ALL`](glowtex_core::CubeFace::ALL) order.
pub fn cube_from_files(
    ctx: &GpuContext,
    paths: &[impl AsRef<Path>; 6],
    options: TextureOptions,
) -> Result<Texture, IoError> {
    let mut decode = |i: usize| {
        image::open(paths[i].as_ref()).map_err(|e| IoError::Decode(e.to_string()))
    };
    let images = [
        decode(0)?,
        decode(1)?,
        decode(2)?,
        decode(3)?,
        decode(4)?,
        decode(5)?,
    ];
    cube_from_images(ctx, &images, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(width: u32, height: u32) -> image::RgbaImage {
        image::RgbaImage::new(width, height)
    }

    #[test]
    fn matching_square_faces_pass() {
        let faces = [
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(32, 32),
        ];
        assert_eq!(check_cube_faces(&faces).unwrap(), 32);
    }

    #[test]
    fn non_square_face_is_rejected() {
        let faces = [
            face(32, 32),
            face(32, 16),
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(32, 32),
        ];
        let err = check_cube_faces(&faces).unwrap_err();
        assert!(
            matches!(err, IoError::FaceMismatch(_)),
            "expected FaceMismatch, got {err:?}"
        );
        assert!(format!("{err}").contains("face 1"));
    }

    #[test]
    fn size_disagreement_is_rejected() {
        let faces = [
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(32, 32),
            face(64, 64),
            face(32, 32),
        ];
        let err = check_cube_faces(&faces).unwrap_err();
        assert!(matches!(err, IoError::FaceMismatch(_)));
        assert!(format!("{err}").contains("face 4"));
    }

    #[test]
    fn pinned_options_keep_caller_filters() {
        use glowtex_core::FilterMode;
        let options = TextureOptions::rgba16f().with_filter(FilterMode::Linear);
        let pinned = pin_decoded_format(options, TextureKind::D2);
        assert_eq!(pinned.format, PixelFormat::Rgba);
        assert_eq!(pinned.component, ComponentType::UnsignedByte);
        assert_eq!(pinned.mag_filter, FilterMode::Linear);
        assert_eq!(pinned.kind, TextureKind::D2);
    }

    #[test]
    fn undecodable_bytes_surface_the_decoder_error() {
        let err = image::load_from_memory(b"not an image").unwrap_err();
        // The factory wraps exactly this message; check the conversion
        // shape without needing a GL context.
        let wrapped = IoError::Decode(err.to_string());
        assert!(!format!("{wrapped}").is_empty());
    }

    #[test]
    #[ignore = "requires GL context"]
    fn texture_from_image_sizes_to_the_source() {
        // Would test: a 300x200 decoded image produces a 300x200 RGBA8
        // texture regardless of the options' requested format.
    }
}
