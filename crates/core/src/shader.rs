//! Built-in GLSL programs and shader compilation helpers.
//!
//! Copy, blur, fill, and export all draw a fullscreen triangle generated
//! from `gl_VertexID` with no vertex buffer. The fragment programs below
//! are compiled lazily on first use and cached on the context. Callers
//! supplying their own copy program must accept the same vertex stage
//! and the uniform contract documented per source constant.

use crate::context::GpuContext;
use crate::error::TextureError;

/// Vertex stage shared by every built-in program: a fullscreen triangle
/// from `gl_VertexID`, UVs in `v_uv`. Draw with an empty VAO bound and
/// `draw_arrays(TRIANGLES, 0, 3)`.
pub const FULLSCREEN_VERT: &str = r#"#version 300 es
out vec2 v_uv;
void main() {
    v_uv = vec2((gl_VertexID << 1) & 2, gl_VertexID & 2);
    gl_Position = vec4(v_uv * 2.0 - 1.0, 0.0, 1.0);
}
"#;

/// Plain copy of a 2D texture. Uniforms: `u_texture` (unit index).
pub const BLIT_FRAG: &str = r#"#version 300 es
precision highp float;
uniform sampler2D u_texture;
in vec2 v_uv;
out vec4 frag_color;
void main() {
    frag_color = texture(u_texture, v_uv);
}
"#;

/// One directional pass of a separable 9-tap gaussian over a 2D
/// texture. Uniforms: `u_texture`, `u_offset` (UV step per tap),
/// `u_intensity` (output multiplier).
pub const BLUR_FRAG: &str = r#"#version 300 es
precision highp float;
uniform sampler2D u_texture;
uniform vec2 u_offset;
uniform float u_intensity;
in vec2 v_uv;
out vec4 frag_color;
const float WEIGHTS[9] = float[9](
    0.05, 0.09, 0.12, 0.15, 0.18, 0.15, 0.12, 0.09, 0.05);
void main() {
    vec4 sum = vec4(0.0);
    for (int i = 0; i < 9; ++i) {
        float k = float(i - 4);
        sum += texture(u_texture, v_uv + u_offset * k) * WEIGHTS[i];
    }
    frag_color = sum * u_intensity;
}
"#;

/// Per-face copy of a cube map. Uniforms: `u_texture` (cube unit),
/// `u_orientation` (face basis; see `CubeFace::orientation`).
pub const CUBE_BLIT_FRAG: &str = r#"#version 300 es
precision highp float;
uniform samplerCube u_texture;
uniform mat3 u_orientation;
in vec2 v_uv;
out vec4 frag_color;
void main() {
    vec3 dir = u_orientation * vec3(v_uv * 2.0 - 1.0, 1.0);
    frag_color = texture(u_texture, dir);
}
"#;

/// One directional 9-tap pass over a cube face, sampling by rotated
/// direction. Uniforms: `u_texture`, `u_orientation`, `u_offset`
/// (face-local step per tap), `u_intensity`.
pub const CUBE_BLUR_FRAG: &str = r#"#version 300 es
precision highp float;
uniform samplerCube u_texture;
uniform mat3 u_orientation;
uniform vec2 u_offset;
uniform float u_intensity;
in vec2 v_uv;
out vec4 frag_color;
const float WEIGHTS[9] = float[9](
    0.05, 0.09, 0.12, 0.15, 0.18, 0.15, 0.12, 0.09, 0.05);
void main() {
    vec2 p = v_uv * 2.0 - 1.0;
    vec4 sum = vec4(0.0);
    for (int i = 0; i < 9; ++i) {
        float k = float(i - 4);
        vec3 dir = u_orientation * vec3(p + u_offset * k * 2.0, 1.0);
        sum += texture(u_texture, dir) * WEIGHTS[i];
    }
    frag_color = sum * u_intensity;
}
"#;

/// Lazily compiled built-in programs, cached per context.
#[derive(Default)]
pub(crate) struct ProgramCache {
    blit_2d: Option<glow::Program>,
    blur_2d: Option<glow::Program>,
    blit_cube: Option<glow::Program>,
    blur_cube: Option<glow::Program>,
}

impl ProgramCache {
    /// Takes every compiled program out of the cache for deletion.
    pub fn drain(&mut self) -> Vec<glow::Program> {
        [
            self.blit_2d.take(),
            self.blur_2d.take(),
            self.blit_cube.take(),
            self.blur_cube.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Selector for the built-in fragment programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinProgram {
    Blit2d,
    Blur2d,
    BlitCube,
    BlurCube,
}

/// Returns the cached program for `which`, compiling it on first use.
pub(crate) fn builtin_program(
    ctx: &GpuContext,
    which: BuiltinProgram,
) -> Result<glow::Program, TextureError> {
    let mut cache = ctx.programs.borrow_mut();
    let (slot, frag) = match which {
        BuiltinProgram::Blit2d => (&mut cache.blit_2d, BLIT_FRAG),
        BuiltinProgram::Blur2d => (&mut cache.blur_2d, BLUR_FRAG),
        BuiltinProgram::BlitCube => (&mut cache.blit_cube, CUBE_BLIT_FRAG),
        BuiltinProgram::BlurCube => (&mut cache.blur_cube, CUBE_BLUR_FRAG),
    };
    if let Some(program) = *slot {
        return Ok(program);
    }
    let program = compile_program(ctx.gl(), FULLSCREEN_VERT, frag)?;
    *slot = Some(program);
    Ok(program)
}

/// Prepends 1-based line numbers to `source` and appends the driver
/// `log`, so error messages referencing line numbers can be read against
/// the GLSL directly.
pub fn format_shader_log(source: &str, log: &str) -> String {
    let mut out = String::new();
    for (i, line) in source.lines().enumerate() {
        out.push_str(&format!("{:>4} | {line}\n", i + 1));
    }
    if !log.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(log);
    }
    out
}

/// Compiles a single shader stage.
///
/// # Errors
///
/// Returns [`TextureError::ShaderCompile`] with the numbered source and
/// driver log if compilation fails.
#[allow(unsafe_code)]
pub fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, TextureError> {
    use glow::HasContext;

    let stage = match shader_type {
        glow::VERTEX_SHADER => "vertex",
        glow::FRAGMENT_SHADER => "fragment",
        _ => "unknown",
    };

    // SAFETY: glow wraps raw GL calls as unsafe. shader_type is a valid
    // stage enum and the shader is deleted on the failure path.
    let shader = unsafe {
        gl.create_shader(shader_type)
            .map_err(TextureError::ResourceAllocation)?
    };
    unsafe {
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
    }
    if unsafe { gl.get_shader_compile_status(shader) } {
        Ok(shader)
    } else {
        let log = unsafe { gl.get_shader_info_log(shader) };
        unsafe { gl.delete_shader(shader) };
        Err(TextureError::ShaderCompile {
            stage,
            log: format_shader_log(source, &log),
        })
    }
}

/// Compiles and links a vertex/fragment pair into a program. The stage
/// shaders are deleted after linking; the program keeps its own copies.
///
/// # Errors
///
/// Returns [`TextureError::ShaderCompile`] or
/// [`TextureError::ShaderLink`] on failure.
#[allow(unsafe_code)]
pub fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, TextureError> {
    use glow::HasContext;

    let vert = compile_shader(gl, glow::VERTEX_SHADER, vertex_src)?;
    let frag = match compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src) {
        Ok(f) => f,
        Err(e) => {
            // SAFETY: vert is a valid handle from the successful compile
            // above.
            unsafe { gl.delete_shader(vert) };
            return Err(e);
        }
    };

    // SAFETY: both handles are valid compiled shaders; all paths below
    // delete them exactly once.
    let program = unsafe {
        gl.create_program()
            .map_err(TextureError::ResourceAllocation)?
    };
    let linked = unsafe {
        gl.attach_shader(program, vert);
        gl.attach_shader(program, frag);
        gl.link_program(program);
        gl.detach_shader(program, vert);
        gl.detach_shader(program, frag);
        gl.delete_shader(vert);
        gl.delete_shader(frag);
        gl.get_program_link_status(program)
    };
    if linked {
        Ok(program)
    } else {
        let log = unsafe { gl.get_program_info_log(program) };
        unsafe { gl.delete_program(program) };
        Err(TextureError::ShaderLink(log))
    }
}

/// Sets an i32 uniform on the currently bound program.
#[allow(unsafe_code)]
pub(crate) fn set_uniform_i32(gl: &glow::Context, program: glow::Program, name: &str, value: i32) {
    use glow::HasContext;
    // SAFETY: the program is valid and bound by the caller; a missing
    // uniform resolves to None, which GL treats as a no-op.
    unsafe {
        let loc = gl.get_uniform_location(program, name);
        gl.uniform_1_i32(loc.as_ref(), value);
    }
}

/// Sets an f32 uniform on the currently bound program.
#[allow(unsafe_code)]
pub(crate) fn set_uniform_f32(gl: &glow::Context, program: glow::Program, name: &str, value: f32) {
    use glow::HasContext;
    // SAFETY: as for set_uniform_i32.
    unsafe {
        let loc = gl.get_uniform_location(program, name);
        gl.uniform_1_f32(loc.as_ref(), value);
    }
}

/// Sets a vec2 uniform on the currently bound program.
#[allow(unsafe_code)]
pub(crate) fn set_uniform_vec2(
    gl: &glow::Context,
    program: glow::Program,
    name: &str,
    x: f32,
    y: f32,
) {
    use glow::HasContext;
    // SAFETY: as for set_uniform_i32.
    unsafe {
        let loc = gl.get_uniform_location(program, name);
        gl.uniform_2_f32(loc.as_ref(), x, y);
    }
}

/// Sets a mat3 uniform on the currently bound program.
#[allow(unsafe_code)]
pub(crate) fn set_uniform_mat3(
    gl: &glow::Context,
    program: glow::Program,
    name: &str,
    m: &glam::Mat3,
) {
    use glow::HasContext;
    // SAFETY: as for set_uniform_i32; glam matrices are column-major,
    // matching GL's expected layout with transpose off.
    unsafe {
        let loc = gl.get_uniform_location(program, name);
        gl.uniform_matrix_3_f32_slice(loc.as_ref(), false, &m.to_cols_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullscreen_vertex_shader_uses_vertex_id() {
        assert!(FULLSCREEN_VERT.contains("#version 300 es"));
        assert!(FULLSCREEN_VERT.contains("gl_VertexID"));
        assert!(FULLSCREEN_VERT.contains("out vec2 v_uv"));
    }

    #[test]
    fn fragment_sources_declare_their_uniform_contracts() {
        assert!(BLIT_FRAG.contains("uniform sampler2D u_texture"));
        assert!(BLUR_FRAG.contains("uniform vec2 u_offset"));
        assert!(BLUR_FRAG.contains("uniform float u_intensity"));
        assert!(CUBE_BLIT_FRAG.contains("uniform samplerCube u_texture"));
        assert!(CUBE_BLIT_FRAG.contains("uniform mat3 u_orientation"));
        assert!(CUBE_BLUR_FRAG.contains("uniform mat3 u_orientation"));
        assert!(CUBE_BLUR_FRAG.contains("uniform vec2 u_offset"));
    }

    #[test]
    fn blur_weights_are_normalized() {
        // The WEIGHTS arrays in both blur shaders must sum to 1 so an
        // intensity of 1 preserves overall brightness.
        for src in [BLUR_FRAG, CUBE_BLUR_FRAG] {
            let weights: Vec<f32> = src
                .split("float[9](")
                .nth(1)
                .and_then(|rest| rest.split(')').next())
                .expect("weights array present")
                .split(',')
                .map(|w| w.trim().parse().expect("numeric weight"))
                .collect();
            assert_eq!(weights.len(), 9);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "weights sum to {sum}");
        }
    }

    #[test]
    fn format_shader_log_numbers_every_line() {
        let formatted = format_shader_log("void main() {\n}\n", "ERROR: 0:1: oops");
        assert!(formatted.contains("1 | void main() {"), "got:\n{formatted}");
        assert!(formatted.contains("2 | }"), "got:\n{formatted}");
        assert!(formatted.contains("ERROR: 0:1: oops"), "got:\n{formatted}");
    }

    #[test]
    fn format_shader_log_with_empty_source_keeps_log() {
        assert_eq!(format_shader_log("", "link failed"), "link failed");
    }

    #[test]
    fn format_shader_log_with_empty_log_keeps_source() {
        let formatted = format_shader_log("x", "");
        assert_eq!(formatted, "   1 | x\n");
    }

    #[test]
    fn program_cache_drain_empties_every_slot() {
        let mut cache = ProgramCache::default();
        assert!(cache.drain().is_empty());
    }

    #[test]
    #[ignore = "requires GL context"]
    fn builtin_programs_compile_and_are_cached() {
        // Would test: builtin_program returns the same handle on the
        // second call for each selector.
    }
}
