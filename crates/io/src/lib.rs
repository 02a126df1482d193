#![deny(unsafe_code)]
//! CPU-side pixel source and sink support for `glowtex-core`: decoding
//! image files into texture uploads and encoding readback pixels as
//! PNG files or base64 data URLs.
//!
//! The decoder-backed modules are feature-gated behind `png` (default
//! on) so GPU-only consumers can depend on this crate without pulling in
//! the `image` stack. The pure pixel conversions in [`pixel`] are always
//! available.

pub mod error;
pub mod pixel;

#[cfg(feature = "png")]
pub mod export;
#[cfg(feature = "png")]
pub mod load;

pub use error::IoError;
pub use pixel::rgba_f32_to_rgba8;

#[cfg(feature = "png")]
pub use export::{png_data_url, texture_to_data_url, texture_to_image, texture_to_png};
#[cfg(feature = "png")]
pub use load::{
    cube_from_files, cube_from_images, texture_from_bytes, texture_from_file, texture_from_image,
};
