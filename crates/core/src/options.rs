//! Construction and upload options, plus the CPU-side pixel transforms
//! they imply.
//!
//! Upload behavior (vertical flip, alpha premultiplication) is explicit
//! per-call state: every upload receives an [`UploadOptions`] and applies
//! its transforms to the payload before it reaches the driver. Nothing is
//! left as ambient pixel-store state between calls.

use serde::{Deserialize, Serialize};

use crate::context::ContextCaps;
use crate::error::TextureError;
use crate::format::{
    is_power_of_two, ComponentType, FilterMode, PixelFormat, TextureKind, WrapMode,
};

/// Configuration for constructing a [`Texture`](crate::Texture).
///
/// The defaults match the coordinate and format conventions of common
/// image decoders: RGBA, 8-bit unsigned, nearest filtering, clamp-to-edge
/// wrap on both axes, no alpha premultiplication, vertical flip on
/// upload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureOptions {
    /// 2D or cube map.
    pub kind: TextureKind,
    /// Channel layout.
    pub format: PixelFormat,
    /// Per-channel storage type.
    pub component: ComponentType,
    /// Magnification filter. Mipmap variants are invalid here.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Wrap mode along S.
    pub wrap_s: WrapMode,
    /// Wrap mode along T.
    pub wrap_t: WrapMode,
    /// Premultiply alpha into color channels on upload.
    pub premultiply_alpha: bool,
    /// Flip rows vertically on upload.
    pub flip_vertically: bool,
    /// Maximum anisotropic samples; 1.0 disables anisotropic filtering.
    pub anisotropy: f32,
    /// Tolerate non-power-of-two dimensions by silently downgrading a
    /// mipmap minification filter or non-clamp wrap to
    /// `{Linear, ClampToEdge}` instead of failing construction.
    pub allow_npot_downgrade: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            kind: TextureKind::D2,
            format: PixelFormat::Rgba,
            component: ComponentType::UnsignedByte,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            premultiply_alpha: false,
            flip_vertically: true,
            anisotropy: 1.0,
            allow_npot_downgrade: false,
        }
    }
}

impl TextureOptions {
    /// RGBA8 with linear filtering, the common case for sampled images.
    pub fn rgba8_linear() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Self::default()
        }
    }

    /// RGBA16F with linear filtering, the common case for HDR render
    /// targets.
    pub fn rgba16f() -> Self {
        Self {
            component: ComponentType::HalfFloat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Self::default()
        }
    }

    /// A depth texture suitable for use as a depth attachment.
    pub fn depth() -> Self {
        Self {
            format: PixelFormat::Depth,
            ..Self::default()
        }
    }

    /// A cube map with the given format and linear filtering.
    pub fn cube(format: PixelFormat, component: ComponentType) -> Self {
        Self {
            kind: TextureKind::CubeMap,
            format,
            component,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Self::default()
        }
    }

    /// Sets both filters and returns the modified options.
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.mag_filter = filter;
        self.min_filter = filter;
        self
    }

    /// Sets both wrap axes and returns the modified options.
    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self
    }

    /// Validates these options against the context capabilities and the
    /// requested dimensions, returning the resolved configuration.
    ///
    /// Validation order: depth capability, float/half-float capability,
    /// anisotropy capability, magnification filter sanity, then the
    /// non-power-of-two rule. No GPU state is touched; a texture is only
    /// allocated after this returns `Ok`.
    ///
    /// With `allow_npot_downgrade` set, a mipmap minification filter or
    /// non-clamp wrap on non-power-of-two dimensions is coerced to
    /// `{Linear, ClampToEdge}` (with a warning) instead of failing.
    /// Anisotropy above the device maximum is clamped.
    pub(crate) fn resolve(
        &self,
        caps: &ContextCaps,
        width: u32,
        height: u32,
    ) -> Result<TextureOptions, TextureError> {
        if self.format.is_depth() && !caps.depth_texture {
            return Err(TextureError::CapabilityMissing(
                "depth textures are not supported by this context".into(),
            ));
        }
        match self.component {
            ComponentType::Float if !caps.float_textures => {
                return Err(TextureError::CapabilityMissing(
                    "float textures are not supported by this context".into(),
                ));
            }
            ComponentType::HalfFloat if !caps.half_float_textures => {
                return Err(TextureError::CapabilityMissing(
                    "half-float textures are not supported by this context".into(),
                ));
            }
            _ => {}
        }
        if self.anisotropy > 1.0 && !caps.anisotropy {
            return Err(TextureError::CapabilityMissing(
                "anisotropic filtering is not supported by this context".into(),
            ));
        }
        if self.mag_filter.uses_mipmaps() {
            return Err(TextureError::InvalidConfiguration(
                "magnification filter cannot sample mipmap levels".into(),
            ));
        }

        let mut resolved = *self;
        let npot = width > 0
            && height > 0
            && !(is_power_of_two(width) && is_power_of_two(height));
        if npot {
            let wants_mipmaps = resolved.min_filter.uses_mipmaps();
            let wants_wrap = resolved.wrap_s != WrapMode::ClampToEdge
                || resolved.wrap_t != WrapMode::ClampToEdge;
            if wants_mipmaps || wants_wrap {
                if resolved.allow_npot_downgrade {
                    log::warn!(
                        "non-power-of-two texture {width}x{height}: \
                         downgrading to linear filter and clamp-to-edge wrap"
                    );
                    resolved.min_filter = FilterMode::Linear;
                    resolved.wrap_s = WrapMode::ClampToEdge;
                    resolved.wrap_t = WrapMode::ClampToEdge;
                } else {
                    return Err(TextureError::InvalidDimensions {
                        width,
                        height,
                        reason: "mipmap filters and repeating wrap modes require \
                                 power-of-two dimensions"
                            .into(),
                    });
                }
            }
        }
        if resolved.anisotropy > caps.max_anisotropy {
            resolved.anisotropy = caps.max_anisotropy;
        }
        Ok(resolved)
    }
}

/// Per-upload pixel transform options.
///
/// Threaded explicitly through every upload call; the transforms run on
/// the CPU payload before it is handed to the driver, so no upload can
/// bleed configuration into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Premultiply alpha into the color channels. Only meaningful for
    /// RGBA payloads.
    pub premultiply_alpha: bool,
    /// Reverse row order so the first row of the payload lands at the
    /// top of the texture.
    pub flip_vertically: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            premultiply_alpha: false,
            flip_vertically: true,
        }
    }
}

impl UploadOptions {
    /// Upload options matching a texture's construction-time settings.
    pub fn from_texture_options(options: &TextureOptions) -> Self {
        Self {
            premultiply_alpha: options.premultiply_alpha,
            flip_vertically: options.flip_vertically,
        }
    }

    /// No flip, no premultiply: the payload is uploaded untouched.
    pub fn raw() -> Self {
        Self {
            premultiply_alpha: false,
            flip_vertically: false,
        }
    }

    /// True if uploading with these options must modify the payload.
    pub fn is_identity(&self) -> bool {
        !self.premultiply_alpha && !self.flip_vertically
    }
}

/// Reverses the row order of a tightly-packed pixel buffer in place.
///
/// `buf.len()` must be exactly `width * height * bytes_per_pixel`.
pub fn flip_rows_in_place(buf: &mut [u8], width: u32, height: u32, bytes_per_pixel: u32) {
    let row = (width as usize) * (bytes_per_pixel as usize);
    if row == 0 {
        return;
    }
    debug_assert_eq!(buf.len(), row * height as usize);
    let mut top = 0usize;
    let mut bottom = height as usize;
    while top + 1 < bottom {
        bottom -= 1;
        let (head, tail) = buf.split_at_mut(bottom * row);
        head[top * row..top * row + row].swap_with_slice(&mut tail[..row]);
        top += 1;
    }
}

/// Premultiplies alpha into the color channels of an RGBA8 buffer,
/// rounding to nearest.
pub fn premultiply_rgba8_in_place(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(4) {
        let a = px[3] as u32;
        px[0] = ((px[0] as u32 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u32 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u32 * a + 127) / 255) as u8;
    }
}

/// Premultiplies alpha into the color channels of an RGBA f32 buffer.
pub fn premultiply_rgba_f32_in_place(buf: &mut [f32]) {
    for px in buf.chunks_exact_mut(4) {
        let a = px[3];
        px[0] *= a;
        px[1] *= a;
        px[2] *= a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextCaps;

    fn caps() -> ContextCaps {
        ContextCaps::permissive()
    }

    #[test]
    fn defaults_match_decoder_conventions() {
        let opts = TextureOptions::default();
        assert_eq!(opts.kind, TextureKind::D2);
        assert_eq!(opts.format, PixelFormat::Rgba);
        assert_eq!(opts.component, ComponentType::UnsignedByte);
        assert_eq!(opts.mag_filter, FilterMode::Nearest);
        assert_eq!(opts.min_filter, FilterMode::Nearest);
        assert_eq!(opts.wrap_s, WrapMode::ClampToEdge);
        assert_eq!(opts.wrap_t, WrapMode::ClampToEdge);
        assert!(!opts.premultiply_alpha);
        assert!(opts.flip_vertically);
        assert!(!opts.allow_npot_downgrade);
    }

    #[test]
    fn depth_without_capability_fails() {
        let mut c = caps();
        c.depth_texture = false;
        let err = TextureOptions::depth().resolve(&c, 64, 64).unwrap_err();
        assert!(
            matches!(err, TextureError::CapabilityMissing(_)),
            "expected CapabilityMissing, got {err:?}"
        );
    }

    #[test]
    fn float_without_capability_fails() {
        let mut c = caps();
        c.float_textures = false;
        let opts = TextureOptions {
            component: ComponentType::Float,
            ..TextureOptions::default()
        };
        let err = opts.resolve(&c, 64, 64).unwrap_err();
        assert!(matches!(err, TextureError::CapabilityMissing(_)));
    }

    #[test]
    fn half_float_without_capability_fails() {
        let mut c = caps();
        c.half_float_textures = false;
        let err = TextureOptions::rgba16f().resolve(&c, 64, 64).unwrap_err();
        assert!(matches!(err, TextureError::CapabilityMissing(_)));
    }

    #[test]
    fn anisotropy_without_capability_fails() {
        let mut c = caps();
        c.anisotropy = false;
        let opts = TextureOptions {
            anisotropy: 4.0,
            ..TextureOptions::default()
        };
        let err = opts.resolve(&c, 64, 64).unwrap_err();
        assert!(matches!(err, TextureError::CapabilityMissing(_)));
    }

    #[test]
    fn anisotropy_clamps_to_device_maximum() {
        let mut c = caps();
        c.max_anisotropy = 8.0;
        let opts = TextureOptions {
            anisotropy: 16.0,
            ..TextureOptions::default()
        };
        let resolved = opts.resolve(&c, 64, 64).unwrap();
        assert_eq!(resolved.anisotropy, 8.0);
    }

    #[test]
    fn mipmap_mag_filter_is_rejected() {
        let opts = TextureOptions {
            mag_filter: FilterMode::LinearMipmapLinear,
            ..TextureOptions::default()
        };
        let err = opts.resolve(&caps(), 64, 64).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    fn npot_with_mipmap_filter_fails_without_opt_in() {
        let opts = TextureOptions::default().with_filter(FilterMode::Linear);
        let opts = TextureOptions {
            min_filter: FilterMode::LinearMipmapLinear,
            ..opts
        };
        let err = opts.resolve(&caps(), 300, 200).unwrap_err();
        assert!(
            matches!(err, TextureError::InvalidDimensions { .. }),
            "expected InvalidDimensions, got {err:?}"
        );
    }

    #[test]
    fn npot_with_repeat_wrap_fails_without_opt_in() {
        let opts = TextureOptions::default().with_wrap(WrapMode::Repeat);
        let err = opts.resolve(&caps(), 300, 200).unwrap_err();
        assert!(matches!(err, TextureError::InvalidDimensions { .. }));
    }

    #[test]
    fn npot_downgrade_coerces_to_linear_clamp() {
        let opts = TextureOptions {
            min_filter: FilterMode::LinearMipmapLinear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::MirroredRepeat,
            allow_npot_downgrade: true,
            ..TextureOptions::default()
        };
        let resolved = opts.resolve(&caps(), 300, 200).unwrap();
        assert_eq!(resolved.min_filter, FilterMode::Linear);
        assert_eq!(resolved.wrap_s, WrapMode::ClampToEdge);
        assert_eq!(resolved.wrap_t, WrapMode::ClampToEdge);
    }

    #[test]
    fn pot_dimensions_keep_requested_configuration() {
        let opts = TextureOptions {
            min_filter: FilterMode::LinearMipmapLinear,
            wrap_s: WrapMode::Repeat,
            ..TextureOptions::default()
        };
        let resolved = opts.resolve(&caps(), 256, 128).unwrap();
        assert_eq!(resolved.min_filter, FilterMode::LinearMipmapLinear);
        assert_eq!(resolved.wrap_s, WrapMode::Repeat);
    }

    #[test]
    fn zero_dimensions_defer_the_npot_check() {
        // Deferred storage: no dimensions yet, so nothing to validate
        // against. The check re-runs when storage is allocated.
        let opts = TextureOptions {
            min_filter: FilterMode::LinearMipmapLinear,
            ..TextureOptions::default()
        };
        assert!(opts.resolve(&caps(), 0, 0).is_ok());
    }

    #[test]
    fn flip_rows_reverses_row_order() {
        // 2x3 pixels, 1 byte per pixel
        let mut buf = vec![1, 2, 3, 4, 5, 6];
        flip_rows_in_place(&mut buf, 2, 3, 1);
        assert_eq!(buf, vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn flip_rows_on_single_row_is_identity() {
        let mut buf = vec![9, 8, 7, 6];
        flip_rows_in_place(&mut buf, 4, 1, 1);
        assert_eq!(buf, vec![9, 8, 7, 6]);
    }

    #[test]
    fn flip_rows_handles_empty_buffer() {
        let mut buf: Vec<u8> = Vec::new();
        flip_rows_in_place(&mut buf, 0, 0, 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn premultiply_scales_color_by_alpha() {
        let mut buf = vec![255, 128, 0, 128];
        premultiply_rgba8_in_place(&mut buf);
        assert_eq!(buf[0], 128, "r scaled by a=128/255");
        assert_eq!(buf[1], 64, "g scaled by a=128/255");
        assert_eq!(buf[2], 0);
        assert_eq!(buf[3], 128, "alpha itself untouched");
    }

    #[test]
    fn premultiply_opaque_is_identity() {
        let mut buf = vec![10, 20, 30, 255, 200, 100, 50, 255];
        let before = buf.clone();
        premultiply_rgba8_in_place(&mut buf);
        assert_eq!(buf, before);
    }

    #[test]
    fn premultiply_f32_scales_color_by_alpha() {
        let mut buf = vec![1.0, 0.5, 0.25, 0.5];
        premultiply_rgba_f32_in_place(&mut buf);
        assert_eq!(buf, vec![0.5, 0.25, 0.125, 0.5]);
    }

    #[test]
    fn upload_options_identity_detection() {
        assert!(UploadOptions::raw().is_identity());
        assert!(!UploadOptions::default().is_identity());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn double_flip_is_identity(
                w in 1u32..32,
                h in 1u32..32,
                bpp in prop::sample::select(vec![1u32, 3, 4]),
            ) {
                let len = (w * h * bpp) as usize;
                let original: Vec<u8> =
                    (0..len).map(|i| (i % 251) as u8).collect();
                let mut buf = original.clone();
                flip_rows_in_place(&mut buf, w, h, bpp);
                flip_rows_in_place(&mut buf, w, h, bpp);
                prop_assert_eq!(buf, original);
            }

            #[test]
            fn flip_preserves_multiset_of_rows(
                w in 1u32..16,
                h in 1u32..16,
            ) {
                let bpp = 4u32;
                let len = (w * h * bpp) as usize;
                let original: Vec<u8> =
                    (0..len).map(|i| (i % 256) as u8).collect();
                let mut buf = original.clone();
                flip_rows_in_place(&mut buf, w, h, bpp);
                let row = (w * bpp) as usize;
                let mut before: Vec<&[u8]> = original.chunks(row).collect();
                let mut after: Vec<&[u8]> = buf.chunks(row).collect();
                before.sort();
                after.sort();
                prop_assert_eq!(before, after);
            }

            #[test]
            fn premultiplied_color_never_exceeds_alpha(
                data in prop::collection::vec(0u8..=255, 4 * 16)
            ) {
                let mut buf = data;
                premultiply_rgba8_in_place(&mut buf);
                for px in buf.chunks_exact(4) {
                    // Rounded premultiplication can exceed alpha by at
                    // most the rounding step.
                    prop_assert!(px[0] as u16 <= px[3] as u16 + 1);
                    prop_assert!(px[1] as u16 <= px[3] as u16 + 1);
                    prop_assert!(px[2] as u16 <= px[3] as u16 + 1);
                }
            }
        }
    }
}
