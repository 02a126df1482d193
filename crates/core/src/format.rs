//! Pixel formats, component types, filters, wrap modes, and cube faces.
//!
//! Everything in this module is pure data: enum definitions, mappings to
//! GL constants, and size arithmetic. No GPU context is required, which
//! keeps the format rules fully unit-testable.

use serde::{Deserialize, Serialize};

/// The shape of a texture: a single 2D image or a six-faced cube map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureKind {
    /// A single two-dimensional image.
    D2,
    /// Six square faces addressed by direction vector.
    CubeMap,
}

impl TextureKind {
    /// Returns the GL bind target for this kind (`TEXTURE_2D` or
    /// `TEXTURE_CUBE_MAP`).
    pub fn gl_target(self) -> u32 {
        match self {
            TextureKind::D2 => glow::TEXTURE_2D,
            TextureKind::CubeMap => glow::TEXTURE_CUBE_MAP,
        }
    }
}

/// Channel layout of a texture's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Three color channels, no alpha.
    Rgb,
    /// Four channels including alpha.
    Rgba,
    /// Single depth channel. Only usable through the depth-specific
    /// codepaths: depth textures cannot be color targets, blurred,
    /// copied with the generic shader path, or read back.
    Depth,
}

impl PixelFormat {
    /// Number of color channels for the upload/readback format.
    ///
    /// Depth counts as one channel, though depth data never travels
    /// through the generic upload or readback paths.
    pub fn channels(self) -> u32 {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
            PixelFormat::Depth => 1,
        }
    }

    /// Returns the GL pixel transfer format (`RGB`, `RGBA`,
    /// `DEPTH_COMPONENT`).
    pub fn gl_format(self) -> u32 {
        match self {
            PixelFormat::Rgb => glow::RGB,
            PixelFormat::Rgba => glow::RGBA,
            PixelFormat::Depth => glow::DEPTH_COMPONENT,
        }
    }

    /// True for [`PixelFormat::Depth`].
    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth)
    }
}

/// Per-channel storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// 8-bit unsigned normalized.
    UnsignedByte,
    /// 16-bit float. Requires the half-float capability.
    HalfFloat,
    /// 32-bit float. Requires the float capability.
    Float,
}

impl ComponentType {
    /// Byte width of a single component as stored in upload buffers.
    ///
    /// Half-float payloads are passed as raw 16-bit words, so they count
    /// as two bytes here.
    pub fn byte_width(self) -> u32 {
        match self {
            ComponentType::UnsignedByte => 1,
            ComponentType::HalfFloat => 2,
            ComponentType::Float => 4,
        }
    }

    /// Returns the GL pixel transfer type for color formats.
    pub fn gl_type(self) -> u32 {
        match self {
            ComponentType::UnsignedByte => glow::UNSIGNED_BYTE,
            ComponentType::HalfFloat => glow::HALF_FLOAT,
            ComponentType::Float => glow::FLOAT,
        }
    }

    /// True for the two floating-point component types.
    pub fn is_float(self) -> bool {
        matches!(self, ComponentType::HalfFloat | ComponentType::Float)
    }
}

/// Returns the sized GL internal format for a `(format, component)` pair.
///
/// Color formats map to the matching sized formats (`RGBA8`, `RGBA16F`,
/// `RGB32F`, ...). Depth maps to `DEPTH_COMPONENT16` for unsigned-byte
/// precision, `DEPTH_COMPONENT24` for half-float, and
/// `DEPTH_COMPONENT32F` for float.
pub fn internal_format(format: PixelFormat, component: ComponentType) -> u32 {
    match (format, component) {
        (PixelFormat::Rgb, ComponentType::UnsignedByte) => glow::RGB8,
        (PixelFormat::Rgb, ComponentType::HalfFloat) => glow::RGB16F,
        (PixelFormat::Rgb, ComponentType::Float) => glow::RGB32F,
        (PixelFormat::Rgba, ComponentType::UnsignedByte) => glow::RGBA8,
        (PixelFormat::Rgba, ComponentType::HalfFloat) => glow::RGBA16F,
        (PixelFormat::Rgba, ComponentType::Float) => glow::RGBA32F,
        (PixelFormat::Depth, ComponentType::UnsignedByte) => glow::DEPTH_COMPONENT16,
        (PixelFormat::Depth, ComponentType::HalfFloat) => glow::DEPTH_COMPONENT24,
        (PixelFormat::Depth, ComponentType::Float) => glow::DEPTH_COMPONENT32F,
    }
}

/// Returns the GL pixel transfer type for uploads of a `(format,
/// component)` pair.
///
/// Depth departs from [`ComponentType::gl_type`]: `DEPTH_COMPONENT16`
/// transfers as `UNSIGNED_SHORT` and `DEPTH_COMPONENT24` as
/// `UNSIGNED_INT`.
pub fn transfer_type(format: PixelFormat, component: ComponentType) -> u32 {
    match (format, component) {
        (PixelFormat::Depth, ComponentType::UnsignedByte) => glow::UNSIGNED_SHORT,
        (PixelFormat::Depth, ComponentType::HalfFloat) => glow::UNSIGNED_INT,
        (PixelFormat::Depth, ComponentType::Float) => glow::FLOAT,
        _ => component.gl_type(),
    }
}

/// Bytes per pixel for a tightly-packed buffer of the given format.
pub fn bytes_per_pixel(format: PixelFormat, component: ComponentType) -> u32 {
    format.channels() * component.byte_width()
}

/// Exact byte length required for a tightly-packed `width x height`
/// pixel buffer. Returns `None` on arithmetic overflow.
pub fn buffer_len(
    width: u32,
    height: u32,
    format: PixelFormat,
    component: ComponentType,
) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(bytes_per_pixel(format, component) as usize)
}

/// Texture filtering mode for magnification and minification.
///
/// The four `*Mipmap*` variants are only valid as minification filters
/// and require the texture to actually carry mipmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// Single nearest texel.
    Nearest,
    /// Bilinear interpolation.
    Linear,
    /// Nearest texel from the nearest mipmap level.
    NearestMipmapNearest,
    /// Bilinear within the nearest mipmap level.
    LinearMipmapNearest,
    /// Nearest texel, blended between two mipmap levels.
    NearestMipmapLinear,
    /// Trilinear interpolation.
    LinearMipmapLinear,
}

impl FilterMode {
    /// Returns the GL constant for this filter.
    pub fn gl_enum(self) -> u32 {
        match self {
            FilterMode::Nearest => glow::NEAREST,
            FilterMode::Linear => glow::LINEAR,
            FilterMode::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
            FilterMode::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
            FilterMode::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
            FilterMode::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
        }
    }

    /// True if this filter samples mipmap levels and therefore requires
    /// the texture to have them.
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, FilterMode::Nearest | FilterMode::Linear)
    }
}

/// Texture coordinate wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    /// Coordinates clamp to the edge texel. The only mode valid for
    /// non-power-of-two textures.
    ClampToEdge,
    /// Coordinates repeat (tile).
    Repeat,
    /// Coordinates repeat with mirroring.
    MirroredRepeat,
}

impl WrapMode {
    /// Returns the GL constant for this wrap mode.
    pub fn gl_enum(self) -> u32 {
        match self {
            WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
            WrapMode::Repeat => glow::REPEAT,
            WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
        }
    }
}

/// One face of a cube-map texture.
///
/// The declaration order here is the fixed face order used everywhere a
/// cube map is iterated: render-to-texture invokes its callback once per
/// face in exactly this order, and face-payload arrays are interpreted
/// in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeFace {
    /// +X face.
    PositiveX,
    /// -X face.
    NegativeX,
    /// +Y face.
    PositiveY,
    /// -Y face.
    NegativeY,
    /// +Z face.
    PositiveZ,
    /// -Z face.
    NegativeZ,
}

impl CubeFace {
    /// All six faces in the fixed iteration order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Index of this face in [`CubeFace::ALL`].
    pub fn index(self) -> usize {
        match self {
            CubeFace::PositiveX => 0,
            CubeFace::NegativeX => 1,
            CubeFace::PositiveY => 2,
            CubeFace::NegativeY => 3,
            CubeFace::PositiveZ => 4,
            CubeFace::NegativeZ => 5,
        }
    }

    /// Returns the GL image target for this face
    /// (`TEXTURE_CUBE_MAP_POSITIVE_X` + offset).
    pub fn gl_target(self) -> u32 {
        glow::TEXTURE_CUBE_MAP_POSITIVE_X + self.index() as u32
    }

    /// Orientation basis for sampling this face with a direction vector.
    ///
    /// `orientation() * vec3(u, v, 1)` maps face-local coordinates
    /// `(u, v)` in `[-1, 1]` to the cube direction for that texel,
    /// following the GL cube-map face layout (Y rows run top-down).
    pub fn orientation(self) -> glam::Mat3 {
        use glam::Vec3;
        let (x, y, z) = match self {
            CubeFace::PositiveX => (Vec3::NEG_Z, Vec3::NEG_Y, Vec3::X),
            CubeFace::NegativeX => (Vec3::Z, Vec3::NEG_Y, Vec3::NEG_X),
            CubeFace::PositiveY => (Vec3::X, Vec3::Z, Vec3::Y),
            CubeFace::NegativeY => (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
            CubeFace::PositiveZ => (Vec3::X, Vec3::NEG_Y, Vec3::Z),
            CubeFace::NegativeZ => (Vec3::NEG_X, Vec3::NEG_Y, Vec3::NEG_Z),
        };
        glam::Mat3::from_cols(x, y, z)
    }
}

/// True if `n` is a power of two. Zero is not a power of two.
pub fn is_power_of_two(n: u32) -> bool {
    n != 0 && n & (n - 1) == 0
}
