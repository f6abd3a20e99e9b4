//! GPU State Cache
//!
//! A flat mirror of the device state the backend binds while drawing. Each
//! slot is `Option`al: `None` means "unknown", which forces the next request
//! for that slot through to the device. Every setter returns whether the
//! device call must actually be issued and records the new value when it
//! must.
//!
//! The cache is owned by one rendering context and only ever touched by the
//! render thread.

use glam::Vec4;

use crate::renderer::clipper::MAX_CLIP_PLANES;
use crate::renderer::pass_config::{ColorMask, Viewport};
use crate::renderer::resources::NativeHandle;
use crate::scene::{BlendMode, CullFace};

pub const MAX_TEXTURE_UNITS: usize = 8;
pub const MAX_VERTEX_ARRAYS: usize = 8;

/// Server-side enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    CullFace,
    ScissorTest,
}

impl Capability {
    pub const COUNT: usize = 5;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Blend factors derived from a material's [`BlendMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlendFunc {
    SourceAlpha,
    /// Constant alpha from the material.
    ConstantAlpha(f32),
    Additive,
}

impl BlendFunc {
    pub fn for_mode(mode: BlendMode) -> Option<BlendFunc> {
        match mode {
            BlendMode::Opaque => None,
            BlendMode::Alpha(a) if a < 1.0 => Some(BlendFunc::ConstantAlpha(a)),
            BlendMode::Alpha(_) => Some(BlendFunc::SourceAlpha),
            BlendMode::Additive => Some(BlendFunc::Additive),
        }
    }
}

/// Where draws currently land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferBinding {
    Default,
    Offscreen(NativeHandle),
}

/// Individually invalidatable state slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Capability(Capability),
    ClipPlane(usize),
    VertexArray(usize),
    Texture(usize),
    ActiveTextureUnit,
    Buffer(BufferTarget),
    Program,
    BlendFunc,
    CullMode,
    ColorMask,
    DepthMask,
    PolygonMode,
    Viewport,
    Scissor,
    Framebuffer,
}

/// Categories tracked by the last-touched frame markers.
const CATEGORY_COUNT: usize = 15;

impl StateKind {
    fn category(self) -> usize {
        match self {
            StateKind::Capability(_) => 0,
            StateKind::ClipPlane(_) => 1,
            StateKind::VertexArray(_) => 2,
            StateKind::Texture(_) => 3,
            StateKind::ActiveTextureUnit => 4,
            StateKind::Buffer(_) => 5,
            StateKind::Program => 6,
            StateKind::BlendFunc => 7,
            StateKind::CullMode => 8,
            StateKind::ColorMask => 9,
            StateKind::DepthMask => 10,
            StateKind::PolygonMode => 11,
            StateKind::Viewport => 12,
            StateKind::Scissor => 13,
            StateKind::Framebuffer => 14,
        }
    }
}

/// Writes `value` into `slot` if it differs; returns whether it did.
#[inline]
fn update<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        return false;
    }
    *slot = Some(value);
    true
}

#[derive(Debug, Clone, Default)]
pub struct StatesCache {
    capabilities: [Option<bool>; Capability::COUNT],
    clip_planes: [Option<Option<Vec4>>; MAX_CLIP_PLANES],
    vertex_arrays: [Option<bool>; MAX_VERTEX_ARRAYS],
    textures: [Option<NativeHandle>; MAX_TEXTURE_UNITS],
    active_texture_unit: Option<usize>,
    vertex_buffer: Option<NativeHandle>,
    index_buffer: Option<NativeHandle>,
    program: Option<NativeHandle>,
    blend_func: Option<BlendFunc>,
    cull_mode: Option<CullFace>,
    color_mask: Option<ColorMask>,
    depth_mask: Option<bool>,
    wireframe: Option<bool>,
    viewport: Option<Viewport>,
    scissor: Option<Viewport>,
    framebuffer: Option<FramebufferBinding>,

    frame: u64,
    last_touched: [u64; CATEGORY_COUNT],
}

impl StatesCache {
    /// A cache that knows nothing: every first request reaches the device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the frame for the last-touched markers. Forces nothing.
    pub fn begin_frame(&mut self, frame_id: u64) {
        self.frame = frame_id;
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frame in which `kind`'s category last changed device state.
    pub fn last_touched(&self, kind: StateKind) -> u64 {
        self.last_touched[kind.category()]
    }

    fn touched(&mut self, kind: StateKind, changed: bool) -> bool {
        if changed {
            self.last_touched[kind.category()] = self.frame;
        }
        changed
    }

    /// Forgets everything, e.g. after the context was recreated or the
    /// display mode changed.
    pub fn invalidate_all(&mut self) {
        let frame = self.frame;
        let last_touched = self.last_touched;
        *self = Self::default();
        self.frame = frame;
        self.last_touched = last_touched;
    }

    /// Marks one slot stale so the next request for it reaches the device.
    pub fn invalidate(&mut self, kind: StateKind) {
        match kind {
            StateKind::Capability(cap) => self.capabilities[cap.index()] = None,
            StateKind::ClipPlane(i) => {
                if let Some(slot) = self.clip_planes.get_mut(i) {
                    *slot = None;
                }
            }
            StateKind::VertexArray(i) => {
                if let Some(slot) = self.vertex_arrays.get_mut(i) {
                    *slot = None;
                }
            }
            StateKind::Texture(unit) => {
                if let Some(slot) = self.textures.get_mut(unit) {
                    *slot = None;
                }
            }
            StateKind::ActiveTextureUnit => self.active_texture_unit = None,
            StateKind::Buffer(BufferTarget::Vertex) => self.vertex_buffer = None,
            StateKind::Buffer(BufferTarget::Index) => self.index_buffer = None,
            StateKind::Program => self.program = None,
            StateKind::BlendFunc => self.blend_func = None,
            StateKind::CullMode => self.cull_mode = None,
            StateKind::ColorMask => self.color_mask = None,
            StateKind::DepthMask => self.depth_mask = None,
            StateKind::PolygonMode => self.wireframe = None,
            StateKind::Viewport => self.viewport = None,
            StateKind::Scissor => self.scissor = None,
            StateKind::Framebuffer => self.framebuffer = None,
        }
    }

    /// Invalidates every slot currently holding `handle`, after the handle
    /// was deleted or recreated.
    pub fn forget_handle(&mut self, handle: NativeHandle) {
        for slot in &mut self.textures {
            if *slot == Some(handle) {
                *slot = None;
            }
        }
        if self.vertex_buffer == Some(handle) {
            self.vertex_buffer = None;
        }
        if self.index_buffer == Some(handle) {
            self.index_buffer = None;
        }
        if self.program == Some(handle) {
            self.program = None;
        }
        if self.framebuffer == Some(FramebufferBinding::Offscreen(handle)) {
            self.framebuffer = None;
        }
    }

    // ========================================================================
    // Setters: `true` means the device call must be issued
    // ========================================================================

    pub fn set_capability(&mut self, cap: Capability, enabled: bool) -> bool {
        let changed = update(&mut self.capabilities[cap.index()], enabled);
        self.touched(StateKind::Capability(cap), changed)
    }

    pub fn set_clip_plane(&mut self, index: usize, equation: Option<Vec4>) -> bool {
        let Some(slot) = self.clip_planes.get_mut(index) else {
            return false;
        };
        let changed = update(slot, equation);
        self.touched(StateKind::ClipPlane(index), changed)
    }

    pub fn set_vertex_array(&mut self, index: usize, enabled: bool) -> bool {
        let Some(slot) = self.vertex_arrays.get_mut(index) else {
            return false;
        };
        let changed = update(slot, enabled);
        self.touched(StateKind::VertexArray(index), changed)
    }

    pub fn set_active_texture_unit(&mut self, unit: usize) -> bool {
        let changed = update(&mut self.active_texture_unit, unit);
        self.touched(StateKind::ActiveTextureUnit, changed)
    }

    pub fn bind_texture(&mut self, unit: usize, texture: NativeHandle) -> bool {
        let Some(slot) = self.textures.get_mut(unit) else {
            return false;
        };
        let changed = update(slot, texture);
        self.touched(StateKind::Texture(unit), changed)
    }

    pub fn bound_texture(&self, unit: usize) -> Option<NativeHandle> {
        self.textures.get(unit).copied().flatten()
    }

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) -> bool {
        let slot = match target {
            BufferTarget::Vertex => &mut self.vertex_buffer,
            BufferTarget::Index => &mut self.index_buffer,
        };
        let changed = update(slot, buffer);
        self.touched(StateKind::Buffer(target), changed)
    }

    pub fn use_program(&mut self, program: NativeHandle) -> bool {
        let changed = update(&mut self.program, program);
        self.touched(StateKind::Program, changed)
    }

    pub fn program(&self) -> Option<NativeHandle> {
        self.program
    }

    pub fn set_blend_func(&mut self, func: BlendFunc) -> bool {
        let changed = update(&mut self.blend_func, func);
        self.touched(StateKind::BlendFunc, changed)
    }

    pub fn set_cull_mode(&mut self, face: CullFace) -> bool {
        let changed = update(&mut self.cull_mode, face);
        self.touched(StateKind::CullMode, changed)
    }

    pub fn set_color_mask(&mut self, mask: ColorMask) -> bool {
        let changed = update(&mut self.color_mask, mask);
        self.touched(StateKind::ColorMask, changed)
    }

    pub fn set_depth_mask(&mut self, write: bool) -> bool {
        let changed = update(&mut self.depth_mask, write);
        self.touched(StateKind::DepthMask, changed)
    }

    pub fn set_wireframe(&mut self, wireframe: bool) -> bool {
        let changed = update(&mut self.wireframe, wireframe);
        self.touched(StateKind::PolygonMode, changed)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        let changed = update(&mut self.viewport, viewport);
        self.touched(StateKind::Viewport, changed)
    }

    pub fn set_scissor(&mut self, rect: Viewport) -> bool {
        let changed = update(&mut self.scissor, rect);
        self.touched(StateKind::Scissor, changed)
    }

    pub fn bind_framebuffer(&mut self, target: FramebufferBinding) -> bool {
        let changed = update(&mut self.framebuffer, target);
        self.touched(StateKind::Framebuffer, changed)
    }
}
