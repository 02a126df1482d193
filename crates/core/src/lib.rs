#![deny(unsafe_code)]
//! GPU texture and render-target management over OpenGL / WebGL2 via
//! [glow](https://docs.rs/glow).
//!
//! The crate wraps a `glow::Context` in a [`GpuContext`] and builds
//! [`Texture`] resources (2D and cube map) on top of it: validated
//! construction, sampler configuration, pixel upload with explicit
//! per-call transforms, render-to-texture with pooled depth
//! renderbuffers, copy/blur passes, and pixel readback.
//!
//! Global GL state (bound framebuffer, viewport, raster toggles) is
//! treated as borrow-and-restore: every operation that changes it
//! captures the previous values in a guard and restores them on every
//! exit path, so nested render-to-texture and copy calls never corrupt
//! the caller's surrounding rendering state.
//!
//! Raw GL calls are the only `unsafe` in the crate; `unsafe_code` is
//! denied globally and re-allowed per function at the glow boundary.
//!
//! # Module overview
//!
//! - [`format`] -- pixel formats, component types, filters, wrap modes,
//!   cube faces, and the size arithmetic between them.
//! - [`options`] -- construction/upload options, validation against
//!   context capabilities, and CPU pixel transforms.
//! - [`error`] -- the [`TextureError`] taxonomy.
//! - [`context`] -- [`GpuContext`], capability detection, and shared
//!   framebuffer/program ownership.
//! - [`pool`] -- the idle-evicting depth renderbuffer pool.
//! - [`texture`] -- the [`Texture`] resource itself.
//! - [`target`] -- render-to-texture orchestration and state guards.
//! - [`shader`] -- built-in fullscreen programs and compile helpers.
//! - [`blit`] -- copy and separable blur passes.

pub mod blit;
pub mod context;
pub mod error;
pub mod format;
pub mod options;
pub mod pool;
pub mod shader;
pub mod target;
pub mod texture;

pub use context::{ContextCaps, ContextId, GpuContext};
pub use error::TextureError;
pub use format::{
    buffer_len, bytes_per_pixel, is_power_of_two, ComponentType, CubeFace, FilterMode,
    PixelFormat, TextureKind, WrapMode,
};
pub use options::{TextureOptions, UploadOptions};
pub use pool::{DepthBufferPool, DEFAULT_POOL_TTL};
pub use shader::{compile_program, compile_shader, format_shader_log, FULLSCREEN_VERT};
pub use target::DepthAttachment;
pub use texture::Texture;
