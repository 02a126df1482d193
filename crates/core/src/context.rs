//! GPU context wrapper: capability detection, shared framebuffers, and
//! the depth renderbuffer pool.
//!
//! `GpuContext` wraps a `glow::Context` and owns everything that is
//! global to a rendering context rather than to a single texture: the
//! detected capability set, the framebuffer objects reused by every
//! render-to-texture and copy call, the scratch and pooled depth
//! renderbuffers, and the lazily compiled built-in programs.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::TextureError;
use crate::pool::DepthBufferPool;
use crate::shader::ProgramCache;

/// `MAX_TEXTURE_MAX_ANISOTROPY_EXT` from `EXT_texture_filter_anisotropic`.
const MAX_TEXTURE_MAX_ANISOTROPY: u32 = 0x84FF;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`GpuContext`] instance.
///
/// Every texture records the id of the context that created it, and all
/// operations verify the id before touching GPU state: a texture must
/// never be used against a different context instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Capabilities detected from the active context at construction.
///
/// Fields are public so validation logic can be exercised against
/// synthetic capability sets in tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextCaps {
    /// Depth-format textures can be created and attached.
    pub depth_texture: bool,
    /// 32-bit float color storage is renderable.
    pub float_textures: bool,
    /// 16-bit float color storage is renderable.
    pub half_float_textures: bool,
    /// Anisotropic filtering is available.
    pub anisotropy: bool,
    /// Device limit for anisotropic samples.
    pub max_anisotropy: f32,
    /// `MAX_COLOR_ATTACHMENTS`.
    pub max_color_attachments: u32,
    /// `MAX_DRAW_BUFFERS`.
    pub max_draw_buffers: u32,
    /// `MAX_COMBINED_TEXTURE_IMAGE_UNITS`.
    pub max_texture_units: u32,
    /// `MAX_TEXTURE_SIZE`.
    pub max_texture_size: u32,
}

impl ContextCaps {
    /// A capability set with everything enabled and generous limits.
    ///
    /// Used by tests that exercise validation logic without a live
    /// context.
    pub fn permissive() -> Self {
        Self {
            depth_texture: true,
            float_textures: true,
            half_float_textures: true,
            anisotropy: true,
            max_anisotropy: 16.0,
            max_color_attachments: 8,
            max_draw_buffers: 8,
            max_texture_units: 32,
            max_texture_size: 16384,
        }
    }

    /// Queries the live context for extensions and limits.
    #[allow(unsafe_code)]
    fn detect(gl: &glow::Context) -> Self {
        use glow::HasContext;

        let exts = gl.supported_extensions();
        let depth_texture = any_ext(
            exts,
            &["WEBGL_depth_texture", "OES_depth_texture", "ARB_depth_texture"],
        );
        let float_textures = any_ext(
            exts,
            &[
                "OES_texture_float",
                "ARB_texture_float",
                "EXT_color_buffer_float",
            ],
        );
        let half_float_textures = any_ext(
            exts,
            &[
                "OES_texture_half_float",
                "EXT_color_buffer_half_float",
                "EXT_color_buffer_float",
                "ARB_half_float_pixel",
            ],
        );
        let anisotropy = any_ext(
            exts,
            &[
                "EXT_texture_filter_anisotropic",
                "ARB_texture_filter_anisotropic",
            ],
        );

        // SAFETY: glow wraps raw GL calls as unsafe. These are plain
        // integer/float limit queries with valid parameter enums.
        unsafe {
            Self {
                depth_texture,
                float_textures,
                half_float_textures,
                anisotropy,
                max_anisotropy: if anisotropy {
                    gl.get_parameter_f32(MAX_TEXTURE_MAX_ANISOTROPY)
                } else {
                    1.0
                },
                max_color_attachments: gl.get_parameter_i32(glow::MAX_COLOR_ATTACHMENTS) as u32,
                max_draw_buffers: gl.get_parameter_i32(glow::MAX_DRAW_BUFFERS) as u32,
                max_texture_units: gl.get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS)
                    as u32,
                max_texture_size: gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) as u32,
            }
        }
    }
}

/// Extension lookup tolerant of the `GL_` prefix native drivers use.
fn any_ext(exts: &HashSet<String>, names: &[&str]) -> bool {
    names
        .iter()
        .any(|n| exts.contains(*n) || exts.contains(&format!("GL_{n}")))
}

/// The non-pooled scratch depth renderbuffer, recreated on size change.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScratchDepth {
    pub width: u32,
    pub height: u32,
    pub renderbuffer: glow::Renderbuffer,
}

/// Wraps a `glow::Context` together with the state shared by every
/// texture operation on it.
///
/// Single-threaded by design: the pool, program cache, and framebuffer
/// slots use interior mutability and the type is not `Sync`. All
/// operations issue GL commands synchronously on the calling thread.
pub struct GpuContext {
    gl: glow::Context,
    id: ContextId,
    caps: ContextCaps,
    pub(crate) draw_fbo: Cell<Option<glow::Framebuffer>>,
    pub(crate) copy_fbo: Cell<Option<glow::Framebuffer>>,
    pub(crate) scratch_depth: Cell<Option<ScratchDepth>>,
    pub(crate) pool: RefCell<DepthBufferPool>,
    pooling: Cell<bool>,
    pub(crate) programs: RefCell<ProgramCache>,
    pub(crate) blit_vao: Cell<Option<glow::VertexArray>>,
}

impl GpuContext {
    /// Wraps the given GL context and queries its capabilities.
    ///
    /// Renderbuffer pooling starts enabled with the default 60 second
    /// idle eviction threshold.
    pub fn new(gl: glow::Context) -> Self {
        let caps = ContextCaps::detect(&gl);
        Self {
            gl,
            id: ContextId::next(),
            caps,
            draw_fbo: Cell::new(None),
            copy_fbo: Cell::new(None),
            scratch_depth: Cell::new(None),
            pool: RefCell::new(DepthBufferPool::default()),
            pooling: Cell::new(true),
            programs: RefCell::new(ProgramCache::default()),
            blit_vao: Cell::new(None),
        }
    }

    /// The wrapped `glow::Context`.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    /// This context's identity.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Detected capabilities.
    pub fn caps(&self) -> &ContextCaps {
        &self.caps
    }

    /// Whether depth renderbuffers are pooled across render-to-texture
    /// calls. When disabled, a single scratch renderbuffer is reused and
    /// resized instead.
    pub fn pooling_enabled(&self) -> bool {
        self.pooling.get()
    }

    /// Enables or disables depth renderbuffer pooling.
    pub fn set_pooling(&self, enabled: bool) {
        self.pooling.set(enabled);
    }

    /// Number of depth renderbuffers currently pooled.
    pub fn pool_len(&self) -> usize {
        self.pool.borrow().len()
    }

    /// Current pool idle eviction threshold.
    pub fn pool_ttl(&self) -> Duration {
        self.pool.borrow().ttl()
    }

    /// Changes the pool idle eviction threshold.
    pub fn set_pool_ttl(&self, ttl: Duration) {
        self.pool.borrow_mut().set_ttl(ttl);
    }

    /// Evicts pooled depth renderbuffers that have been idle past the
    /// threshold and releases their GPU storage. Returns the number
    /// evicted.
    ///
    /// Render-to-texture also sweeps lazily on access, so calling this
    /// is optional housekeeping for applications with long idle spans.
    #[allow(unsafe_code)]
    pub fn sweep_pool(&self) -> usize {
        use glow::HasContext;

        let stale = self.pool.borrow_mut().evict_stale(Instant::now());
        let count = stale.len();
        for renderbuffer in stale {
            log::debug!("evicting idle depth renderbuffer from pool");
            // SAFETY: the handle came out of this context's pool and has
            // not been deleted elsewhere; the pool entry is already gone.
            unsafe { self.gl.delete_renderbuffer(renderbuffer) };
        }
        count
    }

    /// The shared framebuffer used for render-to-texture, created on
    /// first use.
    #[allow(unsafe_code)]
    pub(crate) fn draw_framebuffer(&self) -> Result<glow::Framebuffer, TextureError> {
        use glow::HasContext;

        if let Some(fbo) = self.draw_fbo.get() {
            return Ok(fbo);
        }
        // SAFETY: plain resource creation; the handle is cached for the
        // lifetime of the context.
        let fbo = unsafe {
            self.gl
                .create_framebuffer()
                .map_err(TextureError::ResourceAllocation)?
        };
        self.draw_fbo.set(Some(fbo));
        Ok(fbo)
    }

    /// The shared framebuffer used for copy and readback operations,
    /// created on first use. Kept separate from the draw framebuffer so
    /// a copy issued from inside a render callback does not disturb the
    /// draw attachments.
    #[allow(unsafe_code)]
    pub(crate) fn copy_framebuffer(&self) -> Result<glow::Framebuffer, TextureError> {
        use glow::HasContext;

        if let Some(fbo) = self.copy_fbo.get() {
            return Ok(fbo);
        }
        // SAFETY: plain resource creation; the handle is cached for the
        // lifetime of the context.
        let fbo = unsafe {
            self.gl
                .create_framebuffer()
                .map_err(TextureError::ResourceAllocation)?
        };
        self.copy_fbo.set(Some(fbo));
        Ok(fbo)
    }

    /// Empty vertex array for fullscreen-triangle draws, created on
    /// first use.
    #[allow(unsafe_code)]
    pub(crate) fn fullscreen_vao(&self) -> Result<glow::VertexArray, TextureError> {
        use glow::HasContext;

        if let Some(vao) = self.blit_vao.get() {
            return Ok(vao);
        }
        // SAFETY: plain resource creation; the handle is cached for the
        // lifetime of the context.
        let vao = unsafe {
            self.gl
                .create_vertex_array()
                .map_err(TextureError::ResourceAllocation)?
        };
        self.blit_vao.set(Some(vao));
        Ok(vao)
    }

    /// Releases every GL resource owned by the context wrapper: shared
    /// framebuffers, the scratch and pooled depth renderbuffers, the
    /// fullscreen vertex array, and the built-in programs.
    ///
    /// Textures are owned by their `Texture` values and must be
    /// destroyed separately.
    #[allow(unsafe_code)]
    pub fn destroy(self) {
        use glow::HasContext;

        // SAFETY: all handles below were created by this context and are
        // deleted exactly once, here.
        unsafe {
            if let Some(fbo) = self.draw_fbo.get() {
                self.gl.delete_framebuffer(fbo);
            }
            if let Some(fbo) = self.copy_fbo.get() {
                self.gl.delete_framebuffer(fbo);
            }
            if let Some(scratch) = self.scratch_depth.get() {
                self.gl.delete_renderbuffer(scratch.renderbuffer);
            }
            if let Some(vao) = self.blit_vao.get() {
                self.gl.delete_vertex_array(vao);
            }
            for renderbuffer in self.pool.borrow_mut().drain_all() {
                self.gl.delete_renderbuffer(renderbuffer);
            }
            for program in self.programs.borrow_mut().drain() {
                self.gl.delete_program(program);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        let c = ContextId::next();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn permissive_caps_enable_everything() {
        let caps = ContextCaps::permissive();
        assert!(caps.depth_texture);
        assert!(caps.float_textures);
        assert!(caps.half_float_textures);
        assert!(caps.anisotropy);
        assert!(caps.max_color_attachments >= 4);
        assert!(caps.max_draw_buffers >= 4);
    }

    #[test]
    fn any_ext_accepts_gl_prefixed_names() {
        let mut exts = HashSet::new();
        exts.insert("GL_EXT_texture_filter_anisotropic".to_string());
        assert!(any_ext(&exts, &["EXT_texture_filter_anisotropic"]));
        assert!(!any_ext(&exts, &["EXT_color_buffer_float"]));
    }

    #[test]
    fn any_ext_accepts_bare_names() {
        let mut exts = HashSet::new();
        exts.insert("EXT_color_buffer_float".to_string());
        assert!(any_ext(&exts, &["EXT_color_buffer_float"]));
    }

    #[test]
    #[ignore = "requires GL context"]
    fn new_detects_capabilities() {
        // Would test: GpuContext::new(gl) queries extensions and limits
        // and pooling starts enabled.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn sweep_pool_releases_idle_renderbuffers() {
        // Would test: after pool entries go idle past the TTL,
        // sweep_pool() deletes them and returns the evicted count.
    }
}
