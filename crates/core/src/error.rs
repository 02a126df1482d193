//! Error types for texture and render-target operations.

use thiserror::Error;

/// Errors produced by texture construction, configuration, upload,
/// render-to-texture, and readback operations.
///
/// All variants are reported synchronously to the immediate caller.
/// Nothing is retried internally, and no partial GPU allocation survives
/// a failed construction: validation completes before the first GL
/// resource is created.
#[derive(Debug, Error)]
pub enum TextureError {
    /// The active context does not support a requested format, type, or
    /// feature (depth textures, float/half-float storage, anisotropic
    /// filtering, or more color attachments than the device allows).
    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    /// Texture dimensions are incompatible with the requested
    /// configuration, e.g. a mipmap filter or repeating wrap mode on a
    /// non-power-of-two texture without the downgrade opt-in.
    #[error("invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// Why the dimensions were rejected.
        reason: String,
    },

    /// The operation's inputs are inconsistent: depth textures in
    /// color-only paths, mismatched multi-target dimensions or component
    /// types, self-aliased cube blur, kind mismatches, buffer length
    /// mismatches, or use of a texture against a context that did not
    /// create it.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A pixel source could not be accessed or decoded. The underlying
    /// platform error is reported verbatim, never suppressed.
    #[error("source not accessible: {0}")]
    SourceAccess(String),

    /// The graphics driver failed to allocate a resource. Surfaced
    /// as-is from the underlying API and not retried.
    #[error("resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// A framebuffer failed its completeness check after attachment.
    #[error("framebuffer incomplete: status 0x{0:04X}")]
    FramebufferIncomplete(u32),

    /// A built-in or caller-supplied shader stage failed to compile.
    #[error("shader compile error ({stage}):\n{log}")]
    ShaderCompile {
        /// The stage that failed ("vertex" or "fragment").
        stage: &'static str,
        /// Driver info log, with numbered source prepended.
        log: String,
    },

    /// A shader program failed to link.
    #[error("shader link error:\n{0}")]
    ShaderLink(String),
}
