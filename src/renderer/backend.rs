//! Reference render peer
//!
//! [`StateCachingPeer`] draws a [`FrameSubmission`] on any
//! [`GraphicsDevice`] through a [`TrackedDevice`], so consecutive atoms that
//! share state cost no redundant device calls. Native handles for programs,
//! textures, buffers and target framebuffers are created lazily in the
//! shared [`ResourceRegistry`](crate::renderer::resources::ResourceRegistry)
//! under the submission's context id.

use std::sync::Arc;

use log::trace;

use crate::errors::Result;
use crate::renderer::bin::RenderAtom;
use crate::renderer::clipper::MAX_CLIP_PLANES;
use crate::renderer::device::{GraphicsDevice, TrackedDevice};
use crate::renderer::pass_config::{RenderOptions, Viewport};
use crate::renderer::peer::{DrawStats, FrameSubmission, PassFrame, RenderPeer};
use crate::renderer::resources::{HandleDeleter, NativeHandle, ResourceKind, ResourceOwner};
use crate::renderer::services::RenderServices;
use crate::renderer::state_cache::{BlendFunc, BufferTarget, Capability, FramebufferBinding};
use crate::renderer::surface::CanvasId;
use crate::renderer::target::{ImageBuffer, PixelFormat, RenderTargetKind};

/// Slots of a texture: the image itself and the framebuffer used when it is
/// rendered into.
const TEXTURE_LAYOUT: &[ResourceKind] = &[ResourceKind::Texture, ResourceKind::Framebuffer];
const PROGRAM_LAYOUT: &[ResourceKind] = &[ResourceKind::Program];
const BUFFER_LAYOUT: &[ResourceKind] = &[ResourceKind::Buffer];
const PASS_LAYOUT: &[ResourceKind] = &[ResourceKind::Framebuffer];

pub struct StateCachingPeer<D> {
    device: TrackedDevice<D>,
    services: Arc<RenderServices>,
}

impl<D: GraphicsDevice> StateCachingPeer<D> {
    #[must_use]
    pub fn new(device: D, services: Arc<RenderServices>) -> Self {
        Self {
            device: TrackedDevice::new(device),
            services,
        }
    }

    pub fn device(&self) -> &TrackedDevice<D> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut TrackedDevice<D> {
        &mut self.device
    }

    fn handle(
        &mut self,
        owner: ResourceOwner,
        context: CanvasId,
        layout: &[ResourceKind],
        slot: usize,
    ) -> NativeHandle {
        let device = &mut self.device;
        self.services
            .resources
            .get_or_create(owner, context, layout, slot, |kind| device.create_handle(kind))
    }

    /// Binds the pass's target and clears it when asked to.
    fn activate_target(&mut self, canvas: CanvasId, pass: &PassFrame<'_>, size: (u32, u32)) {
        let Some(target) = pass.target else {
            self.device.bind_framebuffer(FramebufferBinding::Default);
            return;
        };

        let binding = match &target.kind {
            RenderTargetKind::DefaultFramebuffer => FramebufferBinding::Default,
            RenderTargetKind::OffscreenTexture(texture) => {
                // The texture must exist before it can back a framebuffer.
                self.handle((*texture).into(), canvas, TEXTURE_LAYOUT, 0);
                FramebufferBinding::Offscreen(self.handle((*texture).into(), canvas, TEXTURE_LAYOUT, 1))
            }
            RenderTargetKind::ImageBuffer(_) => {
                FramebufferBinding::Offscreen(self.handle(pass.key.into(), canvas, PASS_LAYOUT, 0))
            }
        };
        self.device.bind_framebuffer(binding);

        if let Some(color) = target.clear_color() {
            let (width, height) = target.frame_size().unwrap_or(size);
            let full = Viewport::new(0, 0, width, height);
            self.device.set_scissor(None);
            self.device.set_viewport(full);
            self.device.clear(color);
        }
    }

    fn apply_pass_state(&mut self, pass: &PassFrame<'_>) {
        self.device.set_viewport(pass.viewport);
        self.device.set_scissor(pass.scissor);
        self.device.set_color_mask(pass.config.color_mask);
        self.device
            .set_wireframe(pass.config.options.contains(RenderOptions::WIREFRAME));

        for index in 0..MAX_CLIP_PLANES {
            let equation = pass
                .clipper
                .and_then(|c| c.planes().get(index))
                .filter(|p| p.enabled)
                .map(|p| p.equation);
            self.device.set_clip_plane(index, equation);
        }
    }

    fn draw_atom(&mut self, canvas: CanvasId, pass: &PassFrame<'_>, atom: &RenderAtom) {
        let state = &atom.state;

        if let Some(program) = state.program {
            let handle = self.handle(program.into(), canvas, PROGRAM_LAYOUT, 0);
            self.device.use_program(handle);
        }

        if pass.config.options.contains(RenderOptions::TEXTURING) {
            for (unit, texture) in state.textures.iter().enumerate() {
                let handle = self.handle((*texture).into(), canvas, TEXTURE_LAYOUT, 0);
                self.device.bind_texture(unit, handle);
            }
        }

        if let Some(buffer) = state.vertex_buffer {
            let handle = self.handle(buffer.into(), canvas, BUFFER_LAYOUT, 0);
            self.device.bind_buffer(BufferTarget::Vertex, handle);
            self.device.set_vertex_array(0, true);
        }
        if let Some(buffer) = state.index_buffer {
            let handle = self.handle(buffer.into(), canvas, BUFFER_LAYOUT, 0);
            self.device.bind_buffer(BufferTarget::Index, handle);
        }

        self.device.set_capability(Capability::DepthTest, state.depth_test);
        self.device.set_depth_mask(state.depth_write);
        self.device.set_blend(BlendFunc::for_mode(state.blend));
        self.device.set_cull_face(state.cull_face);

        self.device.set_matrices(&atom.world, &pass.view, &pass.projection);
        self.device.draw(atom.node);
    }

    fn read_back(&mut self, buffer: &ImageBuffer) -> Result<()> {
        let viewport = Viewport::new(0, 0, buffer.width(), buffer.height());
        let raw = self.device.read_pixels(viewport, buffer.format())?;
        buffer.store_readback(&raw)
    }
}

impl<D: GraphicsDevice> RenderPeer for StateCachingPeer<D> {
    fn draw(&mut self, frame: &FrameSubmission<'_>) -> Result<DrawStats> {
        self.device.begin_frame(frame.frame_id);
        let mut stats = DrawStats::default();

        if let Some(color) = frame.background {
            self.device.bind_framebuffer(FramebufferBinding::Default);
            self.device.set_scissor(None);
            self.device
                .set_viewport(Viewport::new(0, 0, frame.size.0, frame.size.1));
            self.device.clear(color);
        }

        for (index, pass) in frame.passes.iter().enumerate() {
            for callback in pass.callbacks {
                callback.before_pass(pass.name, frame.frame_id);
            }

            self.activate_target(frame.canvas, pass, frame.size);
            self.apply_pass_state(pass);
            if index > 0 && (frame.layered || pass.layered) {
                self.device.clear_depth();
            }

            let mut drawn = 0;
            for atom in pass.bins.iter() {
                self.draw_atom(frame.canvas, pass, atom);
                drawn += 1;
            }

            if let Some(target) = pass.target
                && let RenderTargetKind::ImageBuffer(buffer) = &target.kind
            {
                self.read_back(buffer)?;
            }

            for callback in pass.callbacks {
                callback.after_pass(pass.name, frame.frame_id, drawn);
            }
            trace!("Pass '{}' drew {drawn} atoms", pass.name);
            stats.passes += 1;
            stats.atoms += drawn;
        }

        self.device.finish();
        Ok(stats)
    }

    fn take_screenshot(&mut self, buffer: &ImageBuffer, with_alpha: bool) -> Result<()> {
        let format = if with_alpha {
            PixelFormat::Rgba8
        } else {
            PixelFormat::Rgb8
        };
        self.device.bind_framebuffer(FramebufferBinding::Default);
        let viewport = Viewport::new(0, 0, buffer.width(), buffer.height());
        let raw = self.device.read_pixels(viewport, format)?;
        buffer.store_readback_as(&raw, format)
    }

    fn handle_deleter(&mut self) -> &mut dyn HandleDeleter {
        &mut self.device
    }

    fn invalidate_state(&mut self) {
        self.device.invalidate_all();
    }
}
