//! Render-to-texture orchestration.
//!
//! `draw_to` binds a texture (or, for cube maps, each face in turn) as
//! the color attachment of the context's shared framebuffer, resolves a
//! depth attachment, invokes the caller's drawing callback, and restores
//! the previously bound framebuffer and viewport. Restoration is
//! guaranteed on every exit path, including a callback error, by a
//! scope guard captured before any state changes.
//!
//! The callback must issue drawing commands only; it must not rebind
//! the framebuffer itself.

use std::num::NonZeroU32;
use std::time::Instant;

use crate::context::{GpuContext, ScratchDepth};
use crate::error::TextureError;
use crate::format::{ComponentType, CubeFace, PixelFormat, TextureKind};
use crate::texture::Texture;

/// Saved framebuffer binding and viewport, restored on drop.
///
/// Capturing one of these before mutating the context's global binding
/// state is what lets nested render-to-texture and copy calls leave the
/// caller's surrounding rendering state untouched, even when a callback
/// fails partway through.
pub(crate) struct BindingGuard<'a> {
    gl: &'a glow::Context,
    prev_framebuffer: Option<glow::Framebuffer>,
    prev_viewport: [i32; 4],
}

impl<'a> BindingGuard<'a> {
    /// Captures the current draw framebuffer binding and viewport.
    #[allow(unsafe_code)]
    pub fn capture(gl: &'a glow::Context) -> Self {
        use glow::HasContext;

        // SAFETY: plain integer state queries.
        let (prev_framebuffer, prev_viewport) = unsafe {
            let raw = gl.get_parameter_i32(glow::DRAW_FRAMEBUFFER_BINDING);
            let fbo = NonZeroU32::new(raw as u32).map(glow::NativeFramebuffer);
            let mut viewport = [0i32; 4];
            gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport);
            (fbo, viewport)
        };
        Self {
            gl,
            prev_framebuffer,
            prev_viewport,
        }
    }
}

impl Drop for BindingGuard<'_> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        use glow::HasContext;

        // SAFETY: restores state captured from this same context; runs
        // on success, error, and unwind paths alike.
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, self.prev_framebuffer);
            self.gl.viewport(
                self.prev_viewport[0],
                self.prev_viewport[1],
                self.prev_viewport[2],
                self.prev_viewport[3],
            );
        }
    }
}

/// Depth attachment selection for a render-to-texture call.
pub enum DepthAttachment<'a> {
    /// No depth attachment.
    None,
    /// An internally managed depth renderbuffer: pooled by the target's
    /// dimensions when pooling is enabled, or the single scratch
    /// renderbuffer otherwise.
    Auto,
    /// A caller-supplied depth texture, bound instead of an internal
    /// renderbuffer. Must be a 2D depth texture matching the color
    /// target's dimensions.
    Texture(&'a Texture),
}

/// Everything the multi-target agreement check needs to know about one
/// color target. Split out from `Texture` so the validation is testable
/// without a GL context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TargetDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub component: ComponentType,
    pub kind: TextureKind,
}

impl TargetDesc {
    fn of(texture: &Texture) -> Self {
        Self {
            width: texture.width(),
            height: texture.height(),
            format: texture.format(),
            component: texture.component(),
            kind: texture.kind(),
        }
    }
}

/// Validates a multi-render-target set: all 2D, non-depth, storage
/// allocated, agreeing on width, height, and component type, and within
/// the device's simultaneous attachment limit. Returns the common
/// dimensions.
pub(crate) fn validate_multi_target(
    descs: &[TargetDesc],
    max_color_attachments: u32,
    max_draw_buffers: u32,
) -> Result<(u32, u32), TextureError> {
    let first = descs.first().ok_or_else(|| {
        TextureError::InvalidConfiguration("no color targets supplied".into())
    })?;
    let limit = max_color_attachments.min(max_draw_buffers);
    if descs.len() as u32 > limit {
        return Err(TextureError::CapabilityMissing(format!(
            "{} simultaneous color targets exceed the device limit of {limit}",
            descs.len()
        )));
    }
    for desc in descs {
        if desc.kind != TextureKind::D2 {
            return Err(TextureError::InvalidConfiguration(
                "multi-target rendering requires 2D color targets".into(),
            ));
        }
        if desc.format.is_depth() {
            return Err(TextureError::InvalidConfiguration(
                "depth textures cannot be color targets".into(),
            ));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(TextureError::InvalidConfiguration(
                "color target has no storage".into(),
            ));
        }
        if desc.width != first.width || desc.height != first.height {
            return Err(TextureError::InvalidConfiguration(format!(
                "color targets disagree on dimensions: {}x{} vs {}x{}",
                desc.width, desc.height, first.width, first.height
            )));
        }
        if desc.component != first.component {
            return Err(TextureError::InvalidConfiguration(
                "color targets disagree on component type".into(),
            ));
        }
    }
    Ok((first.width, first.height))
}

impl GpuContext {
    /// Renders into `target` through the shared framebuffer.
    ///
    /// For 2D targets the callback runs once with `None`; for cube maps
    /// it runs once per face, in [`CubeFace::ALL`] order, with
    /// `Some(face)`. The previously bound framebuffer and viewport are
    /// restored unconditionally afterward, callback failure included.
    /// The target's mipmaps are regenerated after a successful draw when
    /// its minification filter samples them.
    ///
    /// Depth-format textures are rejected as color targets before any
    /// GPU state is touched.
    #[allow(unsafe_code)]
    pub fn draw_to<F>(
        &self,
        target: &mut Texture,
        depth: DepthAttachment<'_>,
        mut draw: F,
    ) -> Result<(), TextureError>
    where
        F: FnMut(&GpuContext, Option<CubeFace>) -> Result<(), TextureError>,
    {
        use glow::HasContext;

        target.check_context(self)?;
        if target.format().is_depth() {
            return Err(TextureError::InvalidConfiguration(
                "depth textures cannot be color targets".into(),
            ));
        }
        if target.storage_deferred() {
            return Err(TextureError::InvalidConfiguration(
                "render target has no storage".into(),
            ));
        }
        let (width, height) = (target.width(), target.height());
        self.check_depth_attachment(&depth, width, height)?;

        let fbo = self.draw_framebuffer()?;
        let gl = self.gl();
        let guard = BindingGuard::capture(gl);
        // SAFETY: fbo is the context's shared framebuffer; the guard
        // restores the previous binding and viewport when dropped.
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.viewport(0, 0, width as i32, height as i32);
        }
        self.attach_depth(&depth, width, height)?;

        let result = match target.kind() {
            TextureKind::D2 => {
                attach_color(gl, glow::TEXTURE_2D, target.raw(), 0)
                    .and_then(|()| check_complete(gl))
                    .and_then(|()| draw(self, None))
            }
            TextureKind::CubeMap => {
                let mut result = Ok(());
                for face in CubeFace::ALL {
                    result = attach_color(gl, face.gl_target(), target.raw(), 0)
                        .and_then(|()| check_complete(gl))
                        .and_then(|()| draw(self, Some(face)));
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
        };

        self.detach_depth(&depth);
        drop(guard);
        result?;
        target.regenerate_mipmaps_if_filtered(self);
        Ok(())
    }

    /// Renders into several 2D color targets simultaneously.
    ///
    /// All targets must agree on width, height, and component type, and
    /// the count must be within the device's simultaneous attachment
    /// limit; everything is checked before any GPU state changes. The
    /// callback runs exactly once. Attachments beyond the first and the
    /// draw-buffer list are reset afterward so later single-target calls
    /// see no stale state, and the previous framebuffer and viewport are
    /// restored unconditionally.
    #[allow(unsafe_code)]
    pub fn draw_to_many<F>(
        &self,
        targets: &[&Texture],
        depth: DepthAttachment<'_>,
        draw: F,
    ) -> Result<(), TextureError>
    where
        F: FnOnce(&GpuContext) -> Result<(), TextureError>,
    {
        use glow::HasContext;

        for target in targets {
            target.check_context(self)?;
        }
        let descs: Vec<TargetDesc> = targets.iter().map(|t| TargetDesc::of(t)).collect();
        let (width, height) = validate_multi_target(
            &descs,
            self.caps().max_color_attachments,
            self.caps().max_draw_buffers,
        )?;
        self.check_depth_attachment(&depth, width, height)?;

        let fbo = self.draw_framebuffer()?;
        let gl = self.gl();
        let guard = BindingGuard::capture(gl);
        // SAFETY: fbo is the context's shared framebuffer; the guard
        // restores the previous binding and viewport when dropped.
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.viewport(0, 0, width as i32, height as i32);
        }
        self.attach_depth(&depth, width, height)?;

        // SAFETY: every target handle is live and 2D; indices stay
        // within the validated attachment limit.
        unsafe {
            for (index, target) in targets.iter().enumerate() {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0 + index as u32,
                    glow::TEXTURE_2D,
                    Some(target.raw()),
                    0,
                );
            }
            let buffers: Vec<u32> = (0..targets.len() as u32)
                .map(|i| glow::COLOR_ATTACHMENT0 + i)
                .collect();
            gl.draw_buffers(&buffers);
        }

        let result = check_complete(gl).and_then(|()| draw(self));

        // SAFETY: resets the shared framebuffer to single-attachment
        // shape regardless of the callback outcome.
        unsafe {
            for index in 1..targets.len() as u32 {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0 + index,
                    glow::TEXTURE_2D,
                    None,
                    0,
                );
            }
            gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);
        }
        self.detach_depth(&depth);
        drop(guard);
        result
    }

    /// Validates a depth attachment against the color target's
    /// dimensions before any GPU state changes.
    fn check_depth_attachment(
        &self,
        depth: &DepthAttachment<'_>,
        width: u32,
        height: u32,
    ) -> Result<(), TextureError> {
        let DepthAttachment::Texture(depth_texture) = depth else {
            return Ok(());
        };
        depth_texture.check_context(self)?;
        if !depth_texture.format().is_depth() {
            return Err(TextureError::InvalidConfiguration(
                "depth attachment must be a depth-format texture".into(),
            ));
        }
        if depth_texture.kind() != TextureKind::D2 {
            return Err(TextureError::InvalidConfiguration(
                "depth attachment must be a 2D texture".into(),
            ));
        }
        if depth_texture.width() != width || depth_texture.height() != height {
            return Err(TextureError::InvalidConfiguration(format!(
                "depth attachment is {}x{}, color target is {width}x{height}",
                depth_texture.width(),
                depth_texture.height()
            )));
        }
        Ok(())
    }

    /// Binds the resolved depth attachment to the currently bound
    /// framebuffer.
    #[allow(unsafe_code)]
    fn attach_depth(
        &self,
        depth: &DepthAttachment<'_>,
        width: u32,
        height: u32,
    ) -> Result<(), TextureError> {
        use glow::HasContext;

        let gl = self.gl();
        match depth {
            DepthAttachment::None => {
                // SAFETY: clearing the depth attachment point of the
                // currently bound framebuffer.
                unsafe {
                    gl.framebuffer_renderbuffer(
                        glow::FRAMEBUFFER,
                        glow::DEPTH_ATTACHMENT,
                        glow::RENDERBUFFER,
                        None,
                    );
                }
            }
            DepthAttachment::Auto => {
                let renderbuffer = self.resolve_depth_renderbuffer(width, height)?;
                // SAFETY: the renderbuffer was just resolved from this
                // context's pool or scratch slot.
                unsafe {
                    gl.framebuffer_renderbuffer(
                        glow::FRAMEBUFFER,
                        glow::DEPTH_ATTACHMENT,
                        glow::RENDERBUFFER,
                        Some(renderbuffer),
                    );
                }
            }
            DepthAttachment::Texture(depth_texture) => {
                // SAFETY: the depth texture was validated against this
                // context and the target dimensions.
                unsafe {
                    gl.framebuffer_texture_2d(
                        glow::FRAMEBUFFER,
                        glow::DEPTH_ATTACHMENT,
                        glow::TEXTURE_2D,
                        Some(depth_texture.raw()),
                        0,
                    );
                }
            }
        }
        Ok(())
    }

    /// Detaches a caller-supplied depth texture so later passes can
    /// sample it. Internal renderbuffers stay attached; the next call
    /// overwrites them.
    #[allow(unsafe_code)]
    fn detach_depth(&self, depth: &DepthAttachment<'_>) {
        use glow::HasContext;

        if let DepthAttachment::Texture(_) = depth {
            // SAFETY: clearing the depth attachment point of the
            // currently bound framebuffer.
            unsafe {
                self.gl().framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_ATTACHMENT,
                    glow::TEXTURE_2D,
                    None,
                    0,
                );
            }
        }
    }

    /// Resolves the internal depth renderbuffer for a target size.
    ///
    /// With pooling enabled: sweeps stale entries, then reuses the
    /// pooled renderbuffer for `(width, height)` or creates and pools a
    /// new one. With pooling disabled: reuses the single scratch
    /// renderbuffer, recreating it when the size changes.
    #[allow(unsafe_code)]
    fn resolve_depth_renderbuffer(
        &self,
        width: u32,
        height: u32,
    ) -> Result<glow::Renderbuffer, TextureError> {
        use glow::HasContext;

        let gl = self.gl();
        if self.pooling_enabled() {
            let now = Instant::now();
            let stale = self.pool.borrow_mut().evict_stale(now);
            for renderbuffer in stale {
                log::debug!("evicting idle depth renderbuffer from pool");
                // SAFETY: the handle was removed from the pool and is
                // deleted exactly once.
                unsafe { gl.delete_renderbuffer(renderbuffer) };
            }
            if let Some(renderbuffer) = self.pool.borrow_mut().checkout(width, height, now) {
                return Ok(renderbuffer);
            }
            let renderbuffer = create_depth_renderbuffer(gl, width, height)?;
            log::debug!("pooling new {width}x{height} depth renderbuffer");
            if let Some(displaced) = self
                .pool
                .borrow_mut()
                .insert(width, height, renderbuffer, now)
            {
                // SAFETY: the displaced handle left the pool above.
                unsafe { gl.delete_renderbuffer(displaced) };
            }
            Ok(renderbuffer)
        } else {
            if let Some(scratch) = self.scratch_depth.get() {
                if scratch.width == width && scratch.height == height {
                    return Ok(scratch.renderbuffer);
                }
                // SAFETY: the scratch slot is cleared before deletion.
                self.scratch_depth.set(None);
                unsafe { gl.delete_renderbuffer(scratch.renderbuffer) };
            }
            let renderbuffer = create_depth_renderbuffer(gl, width, height)?;
            self.scratch_depth.set(Some(ScratchDepth {
                width,
                height,
                renderbuffer,
            }));
            Ok(renderbuffer)
        }
    }
}

/// Allocates a `DEPTH_COMPONENT16` renderbuffer of the given size.
#[allow(unsafe_code)]
fn create_depth_renderbuffer(
    gl: &glow::Context,
    width: u32,
    height: u32,
) -> Result<glow::Renderbuffer, TextureError> {
    use glow::HasContext;

    // SAFETY: plain resource creation with validated dimensions; the
    // renderbuffer binding is reset before returning.
    unsafe {
        let renderbuffer = gl
            .create_renderbuffer()
            .map_err(TextureError::ResourceAllocation)?;
        gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
        gl.renderbuffer_storage(
            glow::RENDERBUFFER,
            glow::DEPTH_COMPONENT16,
            width as i32,
            height as i32,
        );
        gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        Ok(renderbuffer)
    }
}

/// Attaches a texture image to a color attachment point of the
/// currently bound framebuffer.
#[allow(unsafe_code)]
fn attach_color(
    gl: &glow::Context,
    image_target: u32,
    texture: glow::Texture,
    index: u32,
) -> Result<(), TextureError> {
    use glow::HasContext;

    // SAFETY: the texture handle is live and image_target names either
    // TEXTURE_2D or a cube face of it.
    unsafe {
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0 + index,
            image_target,
            Some(texture),
            0,
        );
    }
    Ok(())
}

/// Fails with the driver's status code if the currently bound
/// framebuffer is incomplete.
#[allow(unsafe_code)]
pub(crate) fn check_complete(gl: &glow::Context) -> Result<(), TextureError> {
    use glow::HasContext;

    // SAFETY: plain status query on the bound framebuffer.
    let status = unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) };
    if status == glow::FRAMEBUFFER_COMPLETE {
        Ok(())
    } else {
        Err(TextureError::FramebufferIncomplete(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32, component: ComponentType) -> TargetDesc {
        TargetDesc {
            width,
            height,
            format: PixelFormat::Rgba,
            component,
            kind: TextureKind::D2,
        }
    }

    #[test]
    fn multi_target_accepts_matching_targets() {
        let descs = [
            desc(256, 128, ComponentType::UnsignedByte),
            desc(256, 128, ComponentType::UnsignedByte),
            desc(256, 128, ComponentType::UnsignedByte),
        ];
        assert_eq!(validate_multi_target(&descs, 8, 8).unwrap(), (256, 128));
    }

    #[test]
    fn multi_target_rejects_empty_set() {
        let err = validate_multi_target(&[], 8, 8).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    fn multi_target_rejects_dimension_mismatch() {
        let descs = [
            desc(256, 256, ComponentType::UnsignedByte),
            desc(128, 256, ComponentType::UnsignedByte),
        ];
        let err = validate_multi_target(&descs, 8, 8).unwrap_err();
        assert!(
            matches!(err, TextureError::InvalidConfiguration(_)),
            "expected InvalidConfiguration, got {err:?}"
        );
    }

    #[test]
    fn multi_target_rejects_component_mismatch() {
        let descs = [
            desc(256, 256, ComponentType::UnsignedByte),
            desc(256, 256, ComponentType::HalfFloat),
        ];
        let err = validate_multi_target(&descs, 8, 8).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    fn multi_target_rejects_counts_beyond_device_limit() {
        let descs = [
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
        ];
        let err = validate_multi_target(&descs, 4, 8).unwrap_err();
        assert!(
            matches!(err, TextureError::CapabilityMissing(_)),
            "expected CapabilityMissing, got {err:?}"
        );
    }

    #[test]
    fn multi_target_limit_is_min_of_attachments_and_draw_buffers() {
        let descs = [
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
            desc(64, 64, ComponentType::UnsignedByte),
        ];
        assert!(validate_multi_target(&descs, 8, 2).is_err());
        assert!(validate_multi_target(&descs, 2, 8).is_err());
        assert!(validate_multi_target(&descs, 4, 4).is_ok());
    }

    #[test]
    fn multi_target_rejects_depth_targets() {
        let mut d = desc(64, 64, ComponentType::UnsignedByte);
        d.format = PixelFormat::Depth;
        let err = validate_multi_target(&[d], 8, 8).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    fn multi_target_rejects_cube_maps() {
        let mut d = desc(64, 64, ComponentType::UnsignedByte);
        d.kind = TextureKind::CubeMap;
        let err = validate_multi_target(&[d], 8, 8).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    fn multi_target_rejects_deferred_storage() {
        let descs = [desc(0, 0, ComponentType::UnsignedByte)];
        let err = validate_multi_target(&descs, 8, 8).unwrap_err();
        assert!(matches!(err, TextureError::InvalidConfiguration(_)));
    }

    #[test]
    #[ignore = "requires GL context"]
    fn draw_to_restores_framebuffer_and_viewport_on_success() {
        // Would test: after draw_to, DRAW_FRAMEBUFFER_BINDING and
        // VIEWPORT match their values from before the call.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn draw_to_restores_state_when_the_callback_fails() {
        // Would test: a callback returning Err leaves the previous
        // framebuffer and viewport bound, and the error propagates.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn cube_draw_invokes_callback_once_per_face_in_order() {
        // Would test: the callback sees PositiveX, NegativeX, PositiveY,
        // NegativeY, PositiveZ, NegativeZ, exactly six invocations.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn equal_sizes_share_one_pooled_renderbuffer() {
        // Would test: two draw_to calls with equal-sized targets leave
        // pool_len() == 1; a third with a different size grows it to 2.
    }
}
