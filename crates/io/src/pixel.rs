//! Pure pixel conversions shared by the export paths.
//!
//! Always available (no feature gate) so float-texture consumers can
//! tone-clamp readback data without the decoder stack.

/// Converts RGBA f32 components to 8-bit, clamping each component to
/// `[0, 1]` and rounding to nearest.
///
/// Float and half-float textures read back as f32; exports tone-clamp
/// them through this before PNG encoding.
pub fn rgba_f32_to_rgba8(pixels: &[f32]) -> Vec<u8> {
    pixels
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_range_maps_across_the_byte_range() {
        let out = rgba_f32_to_rgba8(&[0.0, 0.5, 1.0, 0.25]);
        assert_eq!(out, vec![0, 128, 255, 64]);
    }

    #[test]
    fn out_of_range_values_clamp() {
        let out = rgba_f32_to_rgba8(&[-1.0, 2.0, 1e9, f32::NEG_INFINITY]);
        assert_eq!(out, vec![0, 255, 255, 0]);
    }

    #[test]
    fn nan_clamps_to_zero() {
        let out = rgba_f32_to_rgba8(&[f32::NAN]);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn length_is_preserved() {
        let input = vec![0.5f32; 64 * 4];
        assert_eq!(rgba_f32_to_rgba8(&input).len(), input.len());
    }
}
