//! Backend render peer contract
//!
//! The renderer culls and sorts; a [`RenderPeer`] turns the result into
//! device calls. Each frame it receives one [`FrameSubmission`] per canvas
//! with the passes in draw order. When the submission carries a pick query
//! the peer resolves the pick instead of drawing.

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec4};

use crate::errors::Result;
use crate::renderer::bin::RenderBins;
use crate::renderer::clipper::Clipper;
use crate::renderer::pass::{PassKey, RenderCallback};
use crate::renderer::pass_config::{RenderPassConfig, Viewport};
use crate::renderer::picking::{PickOutcome, PickQuery};
use crate::renderer::resources::HandleDeleter;
use crate::renderer::surface::CanvasId;
use crate::renderer::target::{ImageBuffer, RenderTarget};
use crate::scene::Camera;

/// One pass, ready to draw.
pub struct PassFrame<'a> {
    pub key: PassKey,
    pub name: &'a str,
    pub config: &'a RenderPassConfig,
    pub target: Option<&'a RenderTarget>,
    pub bins: &'a RenderBins,
    pub view: Mat4,
    pub projection: Mat4,
    pub viewport: Viewport,
    pub scissor: Option<Viewport>,
    pub clipper: Option<&'a Clipper>,
    /// Depth is cleared before this pass so it composites on top.
    pub layered: bool,
    pub callbacks: &'a [Arc<dyn RenderCallback>],
}

/// Everything a peer needs for one frame on one canvas.
pub struct FrameSubmission<'a> {
    pub canvas: CanvasId,
    pub size: (u32, u32),
    pub camera: &'a Camera,
    pub passes: Vec<PassFrame<'a>>,
    pub layered: bool,
    pub frame_id: u64,
    /// Time since the renderer started.
    pub timestamp: Duration,
    /// Seconds since the previous frame.
    pub time_step: f32,
    /// Clear color of the default framebuffer, if it is cleared.
    pub background: Option<Vec4>,
    pub pick: Option<&'a PickQuery>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub passes: usize,
    pub atoms: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerOutcome {
    Drawn(DrawStats),
    Picked(PickOutcome),
}

/// A backend bound to one rendering context.
pub trait RenderPeer: Send {
    /// Draws the frame, or resolves its pick query when it carries one.
    fn render(&mut self, frame: &FrameSubmission<'_>) -> Result<PeerOutcome> {
        match frame.pick {
            Some(query) => Ok(PeerOutcome::Picked(self.resolve_pick(query))),
            None => self.draw(frame).map(PeerOutcome::Drawn),
        }
    }

    fn draw(&mut self, frame: &FrameSubmission<'_>) -> Result<DrawStats>;

    /// Picks among the candidates the core found. Backends with exact
    /// geometry tests may refine the candidate distances.
    fn resolve_pick(&mut self, query: &PickQuery) -> PickOutcome {
        query.resolve_by_distance()
    }

    /// Whether a previous draw to this surface is still in flight.
    fn is_busy(&self) -> bool {
        false
    }

    fn take_screenshot(&mut self, buffer: &ImageBuffer, with_alpha: bool) -> Result<()>;

    /// Deleter for native handles of this peer's context.
    fn handle_deleter(&mut self) -> &mut dyn HandleDeleter;

    /// Forgets all cached device state (context recreated or destroyed).
    fn invalidate_state(&mut self) {}
}
