//! Graphics device abstraction
//!
//! [`GraphicsDevice`] is the raw command surface of a backend: every call
//! reaches the driver. [`TrackedDevice`] wraps a device with a
//! [`StatesCache`] and only forwards state changes that actually change
//! something.

use glam::{Affine3A, Mat4, Vec4};

use crate::errors::Result;
use crate::renderer::pass_config::{ColorMask, Viewport};
use crate::renderer::resources::{HandleDeleter, NativeHandle, ResourceKind};
use crate::renderer::state_cache::{
    BlendFunc, BufferTarget, Capability, FramebufferBinding, StateKind, StatesCache,
};
use crate::renderer::target::PixelFormat;
use crate::scene::{CullFace, NodeKey};

/// Raw backend commands.
pub trait GraphicsDevice: Send {
    fn set_capability(&mut self, cap: Capability, enabled: bool);
    /// `None` disables the plane.
    fn set_clip_plane(&mut self, index: usize, equation: Option<Vec4>);
    fn set_vertex_array(&mut self, index: usize, enabled: bool);
    fn set_active_texture_unit(&mut self, unit: usize);
    fn bind_texture(&mut self, unit: usize, texture: NativeHandle);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle);
    fn use_program(&mut self, program: NativeHandle);
    fn set_blend_func(&mut self, func: BlendFunc);
    fn set_cull_mode(&mut self, face: CullFace);
    fn set_color_mask(&mut self, mask: ColorMask);
    fn set_depth_mask(&mut self, write: bool);
    fn set_wireframe(&mut self, wireframe: bool);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, rect: Viewport);
    fn bind_framebuffer(&mut self, target: FramebufferBinding);

    fn clear(&mut self, color: Vec4);
    fn clear_depth(&mut self);
    fn set_matrices(&mut self, model: &Affine3A, view: &Mat4, projection: &Mat4);
    fn draw(&mut self, node: NodeKey);
    fn read_pixels(&mut self, viewport: Viewport, format: PixelFormat) -> Result<Vec<u8>>;
    fn finish(&mut self) {}

    fn create_handle(&mut self, kind: ResourceKind) -> NativeHandle;
    fn delete_handle(&mut self, kind: ResourceKind, handle: NativeHandle);
}

/// A device behind a state cache.
///
/// State setters go through the cache; draws, clears, matrix uploads and
/// read-backs are always forwarded.
#[derive(Debug)]
pub struct TrackedDevice<D> {
    device: D,
    cache: StatesCache,
}

impl<D: GraphicsDevice> TrackedDevice<D> {
    #[must_use]
    pub fn new(device: D) -> Self {
        Self {
            device,
            cache: StatesCache::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn cache(&self) -> &StatesCache {
        &self.cache
    }

    pub fn begin_frame(&mut self, frame_id: u64) {
        self.cache.begin_frame(frame_id);
    }

    pub fn invalidate(&mut self, kind: StateKind) {
        self.cache.invalidate(kind);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }

    pub fn set_capability(&mut self, cap: Capability, enabled: bool) {
        if self.cache.set_capability(cap, enabled) {
            self.device.set_capability(cap, enabled);
        }
    }

    pub fn set_clip_plane(&mut self, index: usize, equation: Option<Vec4>) {
        if self.cache.set_clip_plane(index, equation) {
            self.device.set_clip_plane(index, equation);
        }
    }

    pub fn set_vertex_array(&mut self, index: usize, enabled: bool) {
        if self.cache.set_vertex_array(index, enabled) {
            self.device.set_vertex_array(index, enabled);
        }
    }

    pub fn bind_texture(&mut self, unit: usize, texture: NativeHandle) {
        if self.cache.bound_texture(unit) == Some(texture) {
            return;
        }
        if self.cache.set_active_texture_unit(unit) {
            self.device.set_active_texture_unit(unit);
        }
        if self.cache.bind_texture(unit, texture) {
            self.device.bind_texture(unit, texture);
        }
    }

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) {
        if self.cache.bind_buffer(target, buffer) {
            self.device.bind_buffer(target, buffer);
        }
    }

    pub fn use_program(&mut self, program: NativeHandle) {
        if self.cache.use_program(program) {
            self.device.use_program(program);
        }
    }

    /// Enables blending with `func`, or disables it for `None`.
    pub fn set_blend(&mut self, func: Option<BlendFunc>) {
        self.set_capability(Capability::Blend, func.is_some());
        if let Some(func) = func
            && self.cache.set_blend_func(func)
        {
            self.device.set_blend_func(func);
        }
    }

    pub fn set_cull_face(&mut self, face: CullFace) {
        self.set_capability(Capability::CullFace, face != CullFace::None);
        if face != CullFace::None && self.cache.set_cull_mode(face) {
            self.device.set_cull_mode(face);
        }
    }

    pub fn set_color_mask(&mut self, mask: ColorMask) {
        if self.cache.set_color_mask(mask) {
            self.device.set_color_mask(mask);
        }
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if self.cache.set_depth_mask(write) {
            self.device.set_depth_mask(write);
        }
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        if self.cache.set_wireframe(wireframe) {
            self.device.set_wireframe(wireframe);
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.cache.set_viewport(viewport) {
            self.device.set_viewport(viewport);
        }
    }

    /// Enables the scissor test with `rect`, or disables it for `None`.
    pub fn set_scissor(&mut self, rect: Option<Viewport>) {
        self.set_capability(Capability::ScissorTest, rect.is_some());
        if let Some(rect) = rect
            && self.cache.set_scissor(rect)
        {
            self.device.set_scissor(rect);
        }
    }

    pub fn bind_framebuffer(&mut self, target: FramebufferBinding) {
        if self.cache.bind_framebuffer(target) {
            self.device.bind_framebuffer(target);
        }
    }

    pub fn clear(&mut self, color: Vec4) {
        self.device.clear(color);
    }

    pub fn clear_depth(&mut self) {
        self.device.clear_depth();
    }

    pub fn finish(&mut self) {
        self.device.finish();
    }

    pub fn set_matrices(&mut self, model: &Affine3A, view: &Mat4, projection: &Mat4) {
        self.device.set_matrices(model, view, projection);
    }

    pub fn draw(&mut self, node: NodeKey) {
        self.device.draw(node);
    }

    pub fn read_pixels(&mut self, viewport: Viewport, format: PixelFormat) -> Result<Vec<u8>> {
        self.device.read_pixels(viewport, format)
    }

    pub fn create_handle(&mut self, kind: ResourceKind) -> NativeHandle {
        self.device.create_handle(kind)
    }
}

impl<D: GraphicsDevice> HandleDeleter for TrackedDevice<D> {
    /// Deletes on the device and drops the handle from the cache, so a
    /// recycled handle value is never mistaken for the deleted one.
    fn delete_handle(&mut self, kind: ResourceKind, handle: NativeHandle) {
        self.cache.forget_handle(handle);
        self.device.delete_handle(kind, handle);
    }
}
