//! Texture-to-texture copy and separable blur.
//!
//! Both operations render a fullscreen triangle through the context's
//! copy framebuffer: 2D textures with a plain quad program, cube maps
//! face by face with an orientation-matrix program. The caller's bound
//! framebuffer, viewport, and raster toggles are saved and restored
//! around every pass.

use crate::context::GpuContext;
use crate::error::TextureError;
use crate::format::{CubeFace, FilterMode, TextureKind};
use crate::options::TextureOptions;
use crate::shader::{
    builtin_program, set_uniform_f32, set_uniform_i32, set_uniform_mat3, set_uniform_vec2,
    BuiltinProgram,
};
use crate::target::{check_complete, BindingGuard, DepthAttachment};
use crate::texture::Texture;

/// UV-space step per blur tap for a pixel-space offset.
///
/// A zero extent (deferred storage never reaches a pass, but the math
/// stays total) maps to a zero step.
fn tap_step(offset_px: f32, extent: u32) -> f32 {
    if extent == 0 {
        0.0
    } else {
        offset_px / extent as f32
    }
}

/// Saved raster toggles, disabled for a blit pass and restored on drop.
///
/// A copy or blur must write every fragment of the target regardless of
/// the caller's depth, blend, or cull configuration.
struct RasterStateGuard<'a> {
    gl: &'a glow::Context,
    depth_test: bool,
    blend: bool,
    cull_face: bool,
}

impl<'a> RasterStateGuard<'a> {
    #[allow(unsafe_code)]
    fn capture(gl: &'a glow::Context) -> Self {
        use glow::HasContext;

        // SAFETY: capability queries and disables on a live context.
        unsafe {
            let depth_test = gl.is_enabled(glow::DEPTH_TEST);
            let blend = gl.is_enabled(glow::BLEND);
            let cull_face = gl.is_enabled(glow::CULL_FACE);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::BLEND);
            gl.disable(glow::CULL_FACE);
            Self {
                gl,
                depth_test,
                blend,
                cull_face,
            }
        }
    }
}

impl Drop for RasterStateGuard<'_> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        use glow::HasContext;

        // SAFETY: re-enables only what was enabled at capture time.
        unsafe {
            if self.depth_test {
                self.gl.enable(glow::DEPTH_TEST);
            }
            if self.blend {
                self.gl.enable(glow::BLEND);
            }
            if self.cull_face {
                self.gl.enable(glow::CULL_FACE);
            }
        }
    }
}

/// Renders `source` through `program` into one image of a destination
/// texture via the copy framebuffer. `set_extra` runs with the program
/// bound to install pass-specific uniforms; `u_texture` is always set to
/// unit 0.
#[allow(unsafe_code)]
fn run_pass(
    ctx: &GpuContext,
    source: &Texture,
    dest_texture: glow::Texture,
    dest_image_target: u32,
    dest_width: u32,
    dest_height: u32,
    program: glow::Program,
    set_extra: impl FnOnce(&glow::Context),
) -> Result<(), TextureError> {
    use glow::HasContext;

    let gl = ctx.gl();
    let fbo = ctx.copy_framebuffer()?;
    let vao = ctx.fullscreen_vao()?;
    let _guard = BindingGuard::capture(gl);
    let _raster = RasterStateGuard::capture(gl);

    // SAFETY: the copy framebuffer, destination handle, program, and
    // VAO are all live objects of this context; the guards restore the
    // caller's framebuffer, viewport, and raster toggles on every exit
    // path.
    unsafe {
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
        gl.viewport(0, 0, dest_width as i32, dest_height as i32);
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            dest_image_target,
            Some(dest_texture),
            0,
        );
    }
    check_complete(gl)?;
    source.bind(ctx, 0)?;
    // SAFETY: program was compiled against this context.
    unsafe { gl.use_program(Some(program)) };
    set_uniform_i32(gl, program, "u_texture", 0);
    set_extra(gl);
    // SAFETY: drawing three vertices with the empty VAO; state is
    // unwound afterward.
    unsafe {
        gl.bind_vertex_array(Some(vao));
        gl.draw_arrays(glow::TRIANGLES, 0, 3);
        gl.bind_vertex_array(None);
        gl.use_program(None);
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            dest_image_target,
            None,
            0,
        );
    }
    Ok(())
}

impl Texture {
    /// Creates a texture by rendering `program` over its full extent.
    ///
    /// The program receives the fullscreen vertex stage's `v_uv`
    /// varying. Cube maps render once per face with `u_face` set to the
    /// face index; 2D textures render a single pass. Mipmaps follow the
    /// construction rules of [`Texture::new`].
    #[allow(unsafe_code)]
    pub fn from_program(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        options: TextureOptions,
        program: glow::Program,
    ) -> Result<Self, TextureError> {
        use glow::HasContext;

        let mut texture = Texture::new(ctx, width, height, options)?;
        let vao = ctx.fullscreen_vao()?;
        ctx.draw_to(&mut texture, DepthAttachment::None, |ctx, face| {
            let gl = ctx.gl();
            let _raster = RasterStateGuard::capture(gl);
            // SAFETY: the program and VAO are live objects of this
            // context; draw_to has the target framebuffer bound and the
            // raster guard restores toggles afterward.
            unsafe {
                gl.use_program(Some(program));
                if let Some(face) = face {
                    set_uniform_i32(gl, program, "u_face", face.index() as i32);
                }
                gl.bind_vertex_array(Some(vao));
                gl.draw_arrays(glow::TRIANGLES, 0, 3);
                gl.bind_vertex_array(None);
                gl.use_program(None);
            }
            Ok(())
        })?;
        Ok(texture)
    }

    /// Renders this texture into `target` with a full-target draw.
    ///
    /// Source and target must share the same kind: 2D copies run as one
    /// quad pass, cube copies as one orientation-matrix pass per face.
    /// A caller-supplied `program` replaces the built-in one; it must
    /// accept the fullscreen vertex stage and the `u_texture` uniform
    /// (plus `u_orientation` for cube sources). Target mipmaps are
    /// regenerated when its minification filter samples them.
    pub fn copy_to(
        &self,
        ctx: &GpuContext,
        target: &mut Texture,
        program: Option<glow::Program>,
    ) -> Result<(), TextureError> {
        self.check_context(ctx)?;
        target.check_context(ctx)?;
        if self.format().is_depth() || target.format().is_depth() {
            return Err(TextureError::InvalidConfiguration(
                "depth textures cannot use the shader copy path".into(),
            ));
        }
        if self.kind() != target.kind() {
            return Err(TextureError::InvalidConfiguration(
                "copy source and target must share the same texture kind".into(),
            ));
        }
        if self.storage_deferred() || target.storage_deferred() {
            return Err(TextureError::InvalidConfiguration(
                "copy requires allocated storage on both textures".into(),
            ));
        }

        match self.kind() {
            TextureKind::D2 => {
                let program = match program {
                    Some(p) => p,
                    None => builtin_program(ctx, BuiltinProgram::Blit2d)?,
                };
                run_pass(
                    ctx,
                    self,
                    target.raw(),
                    glow::TEXTURE_2D,
                    target.width(),
                    target.height(),
                    program,
                    |_| {},
                )?;
            }
            TextureKind::CubeMap => {
                let program = match program {
                    Some(p) => p,
                    None => builtin_program(ctx, BuiltinProgram::BlitCube)?,
                };
                for face in CubeFace::ALL {
                    run_pass(
                        ctx,
                        self,
                        target.raw(),
                        face.gl_target(),
                        target.width(),
                        target.height(),
                        program,
                        |gl| set_uniform_mat3(gl, program, "u_orientation", &face.orientation()),
                    )?;
                }
            }
        }
        target.regenerate_mipmaps_if_filtered(ctx);
        Ok(())
    }

    /// Applies a separable directional blur.
    ///
    /// `offset_x`/`offset_y` are pixel-space tap offsets; `intensity`
    /// scales the result. 2D textures blur in two passes (horizontal,
    /// then vertical) through an intermediate texture: `temp` if
    /// supplied and matching, otherwise an internal scratch texture
    /// created and destroyed within the call. With `output` omitted the
    /// blur lands back in `self`.
    ///
    /// Cube maps blur one directional pass per face and cannot run in
    /// place: reading and writing the same cube face within one pass is
    /// undefined, so `output` is required. Output kind or dimension
    /// mismatches fail before any GPU state changes.
    pub fn blur(
        &mut self,
        ctx: &GpuContext,
        offset_x: f32,
        offset_y: f32,
        intensity: f32,
        temp: Option<&mut Texture>,
        mut output: Option<&mut Texture>,
    ) -> Result<(), TextureError> {
        self.check_context(ctx)?;
        if self.format().is_depth() {
            return Err(TextureError::InvalidConfiguration(
                "depth textures cannot be blurred".into(),
            ));
        }
        if self.storage_deferred() {
            return Err(TextureError::InvalidConfiguration(
                "blur requires allocated storage".into(),
            ));
        }
        if let Some(out) = output.as_deref() {
            out.check_context(ctx)?;
            if out.kind() != self.kind() {
                return Err(TextureError::InvalidConfiguration(
                    "blur output must share the source's texture kind".into(),
                ));
            }
            if out.width() != self.width() || out.height() != self.height() {
                return Err(TextureError::InvalidConfiguration(
                    "blur output must share the source's dimensions".into(),
                ));
            }
            if out.format().is_depth() {
                return Err(TextureError::InvalidConfiguration(
                    "blur output cannot be a depth texture".into(),
                ));
            }
        }

        let (width, height) = (self.width(), self.height());
        match self.kind() {
            TextureKind::D2 => match temp {
                Some(t) => {
                    t.check_context(ctx)?;
                    if t.kind() != TextureKind::D2
                        || t.width() != width
                        || t.height() != height
                        || t.format().is_depth()
                    {
                        return Err(TextureError::InvalidConfiguration(
                            "blur temp must be a 2D color texture with the \
                             source's dimensions"
                                .into(),
                        ));
                    }
                    self.blur_2d_passes(ctx, t, output, offset_x, offset_y, intensity)?;
                }
                None => {
                    let options = TextureOptions {
                        format: self.format(),
                        component: self.component(),
                        mag_filter: FilterMode::Linear,
                        min_filter: FilterMode::Linear,
                        ..TextureOptions::default()
                    };
                    let scratch = Texture::new(ctx, width, height, options)?;
                    let passes =
                        self.blur_2d_passes(ctx, &scratch, output, offset_x, offset_y, intensity);
                    scratch.destroy(ctx)?;
                    passes?;
                }
            },
            TextureKind::CubeMap => {
                let Some(out) = output.as_deref_mut() else {
                    return Err(TextureError::InvalidConfiguration(
                        "cube map blur cannot run in place: reading and writing \
                         the same face in one pass is undefined"
                            .into(),
                    ));
                };
                let program = builtin_program(ctx, BuiltinProgram::BlurCube)?;
                let step = (tap_step(offset_x, width), tap_step(offset_y, height));
                for face in CubeFace::ALL {
                    run_pass(
                        ctx,
                        self,
                        out.raw(),
                        face.gl_target(),
                        width,
                        height,
                        program,
                        |gl| {
                            set_uniform_mat3(gl, program, "u_orientation", &face.orientation());
                            set_uniform_vec2(gl, program, "u_offset", step.0, step.1);
                            set_uniform_f32(gl, program, "u_intensity", intensity);
                        },
                    )?;
                }
                out.regenerate_mipmaps_if_filtered(ctx);
            }
        }
        Ok(())
    }

    /// The horizontal-then-vertical pass pair behind a 2D blur.
    fn blur_2d_passes(
        &mut self,
        ctx: &GpuContext,
        temp: &Texture,
        mut output: Option<&mut Texture>,
        offset_x: f32,
        offset_y: f32,
        intensity: f32,
    ) -> Result<(), TextureError> {
        let (width, height) = (self.width(), self.height());
        let program = builtin_program(ctx, BuiltinProgram::Blur2d)?;

        let horizontal = (tap_step(offset_x, width), 0.0);
        run_pass(
            ctx,
            self,
            temp.raw(),
            glow::TEXTURE_2D,
            width,
            height,
            program,
            |gl| {
                set_uniform_vec2(gl, program, "u_offset", horizontal.0, horizontal.1);
                set_uniform_f32(gl, program, "u_intensity", 1.0);
            },
        )?;

        let vertical = (0.0, tap_step(offset_y, height));
        let final_raw = match output.as_deref() {
            Some(out) => out.raw(),
            None => self.raw(),
        };
        run_pass(
            ctx,
            temp,
            final_raw,
            glow::TEXTURE_2D,
            width,
            height,
            program,
            |gl| {
                set_uniform_vec2(gl, program, "u_offset", vertical.0, vertical.1);
                set_uniform_f32(gl, program, "u_intensity", intensity);
            },
        )?;

        match output.as_deref_mut() {
            Some(out) => out.regenerate_mipmaps_if_filtered(ctx),
            None => self.regenerate_mipmaps_if_filtered(ctx),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_step_converts_pixels_to_uv() {
        assert_eq!(tap_step(1.0, 256), 1.0 / 256.0);
        assert_eq!(tap_step(2.0, 128), 1.0 / 64.0);
        assert_eq!(tap_step(0.0, 512), 0.0);
    }

    #[test]
    fn tap_step_is_total_for_zero_extent() {
        assert_eq!(tap_step(3.0, 0), 0.0);
    }

    #[test]
    #[ignore = "requires GL context"]
    fn copy_rejects_kind_mismatch() {
        // Would test: copying a 2D texture into a cube map (and the
        // reverse) fails with InvalidConfiguration.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn cube_blur_without_output_fails() {
        // Would test: blur on a cube map with output=None fails before
        // touching GPU state.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn blur_creates_and_destroys_scratch_when_no_temp_given() {
        // Would test: 2D blur without a temp leaves no extra live
        // texture behind.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn copy_regenerates_target_mipmaps_only_for_mipmap_filters() {
        // Would test: a LinearMipmapLinear target reports has_mipmaps()
        // after copy_to; a Linear target does not.
    }
}
