//! Shared fixtures for the integration tests: a graphics device that records
//! every call it receives, a render peer that records every submission, and
//! small scene builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Affine3A, Mat4, Vec3, Vec4};
use parking_lot::Mutex;

use strata::errors::{RenderError, Result};
use strata::math::BoundingBox;
use strata::renderer::device::GraphicsDevice;
use strata::renderer::pass_config::{ColorMask, Viewport};
use strata::renderer::peer::{DrawStats, FrameSubmission, RenderPeer};
use strata::renderer::resources::{HandleDeleter, NativeHandle, ResourceKind};
use strata::renderer::state_cache::{BlendFunc, BufferTarget, Capability, FramebufferBinding};
use strata::renderer::target::{ImageBuffer, PixelFormat};
use strata::renderer::{RenderServices, Renderer, RendererSettings};
use strata::scene::{Appearance, CullFace, NodeKey, Scene, Shape};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Recording device
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Capability(Capability, bool),
    ClipPlane(usize, Option<Vec4>),
    VertexArray(usize, bool),
    ActiveTexture(usize),
    BindTexture(usize, NativeHandle),
    BindBuffer(BufferTarget, NativeHandle),
    UseProgram(NativeHandle),
    BlendFunc(BlendFunc),
    CullMode(CullFace),
    ColorMask(ColorMask),
    DepthMask(bool),
    Wireframe(bool),
    Viewport(Viewport),
    Scissor(Viewport),
    Framebuffer(FramebufferBinding),
    Clear(Vec4),
    ClearDepth,
    Draw(NodeKey),
    ReadPixels(Viewport, PixelFormat),
    Create(ResourceKind, NativeHandle),
    Delete(ResourceKind, NativeHandle),
}

pub type CallLog = Arc<Mutex<Vec<DeviceCall>>>;

/// Device that logs calls instead of talking to a GPU. Read-backs return
/// rows filled with the row index, so flips are observable.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub log: CallLog,
    next_handle: u32,
}

impl RecordingDevice {
    pub fn new() -> (Self, CallLog) {
        let device = Self::default();
        let log = device.log.clone();
        (device, log)
    }

    fn push(&self, call: DeviceCall) {
        self.log.lock().push(call);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        self.push(DeviceCall::Capability(cap, enabled));
    }

    fn set_clip_plane(&mut self, index: usize, equation: Option<Vec4>) {
        self.push(DeviceCall::ClipPlane(index, equation));
    }

    fn set_vertex_array(&mut self, index: usize, enabled: bool) {
        self.push(DeviceCall::VertexArray(index, enabled));
    }

    fn set_active_texture_unit(&mut self, unit: usize) {
        self.push(DeviceCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, unit: usize, texture: NativeHandle) {
        self.push(DeviceCall::BindTexture(unit, texture));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) {
        self.push(DeviceCall::BindBuffer(target, buffer));
    }

    fn use_program(&mut self, program: NativeHandle) {
        self.push(DeviceCall::UseProgram(program));
    }

    fn set_blend_func(&mut self, func: BlendFunc) {
        self.push(DeviceCall::BlendFunc(func));
    }

    fn set_cull_mode(&mut self, face: CullFace) {
        self.push(DeviceCall::CullMode(face));
    }

    fn set_color_mask(&mut self, mask: ColorMask) {
        self.push(DeviceCall::ColorMask(mask));
    }

    fn set_depth_mask(&mut self, write: bool) {
        self.push(DeviceCall::DepthMask(write));
    }

    fn set_wireframe(&mut self, wireframe: bool) {
        self.push(DeviceCall::Wireframe(wireframe));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.push(DeviceCall::Viewport(viewport));
    }

    fn set_scissor(&mut self, rect: Viewport) {
        self.push(DeviceCall::Scissor(rect));
    }

    fn bind_framebuffer(&mut self, target: FramebufferBinding) {
        self.push(DeviceCall::Framebuffer(target));
    }

    fn clear(&mut self, color: Vec4) {
        self.push(DeviceCall::Clear(color));
    }

    fn clear_depth(&mut self) {
        self.push(DeviceCall::ClearDepth);
    }

    fn set_matrices(&mut self, _model: &Affine3A, _view: &Mat4, _projection: &Mat4) {}

    fn draw(&mut self, node: NodeKey) {
        self.push(DeviceCall::Draw(node));
    }

    fn read_pixels(&mut self, viewport: Viewport, format: PixelFormat) -> Result<Vec<u8>> {
        self.push(DeviceCall::ReadPixels(viewport, format));
        let row = viewport.width as usize * format.bytes_per_pixel();
        Ok((0..viewport.height)
            .flat_map(|y| std::iter::repeat_n(y as u8, row))
            .collect())
    }

    fn create_handle(&mut self, kind: ResourceKind) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.push(DeviceCall::Create(kind, handle));
        handle
    }

    fn delete_handle(&mut self, kind: ResourceKind, handle: NativeHandle) {
        self.push(DeviceCall::Delete(kind, handle));
    }
}

/// Calls matching `pred` in `log`.
pub fn count_calls(log: &CallLog, pred: impl Fn(&DeviceCall) -> bool) -> usize {
    log.lock().iter().filter(|c| pred(c)).count()
}

pub fn drawn_nodes(log: &CallLog) -> Vec<NodeKey> {
    log.lock()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::Draw(node) => Some(*node),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Recording peer
// ============================================================================

/// What a peer saw of one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub frame_id: u64,
    pub picked: bool,
    pub layered: bool,
    /// Pass names with their atoms in draw order (opaque then transparent).
    pub passes: Vec<(String, Vec<NodeKey>)>,
    /// Viewport and projection of each pass, in the same order.
    pub frames: Vec<(Viewport, Mat4)>,
}

#[derive(Debug, Default)]
pub struct RecordedDeletes(pub Arc<Mutex<Vec<(ResourceKind, NativeHandle)>>>);

impl HandleDeleter for RecordedDeletes {
    fn delete_handle(&mut self, kind: ResourceKind, handle: NativeHandle) {
        self.0.lock().push((kind, handle));
    }
}

#[derive(Clone, Default)]
pub struct PeerLog {
    pub submissions: Arc<Mutex<Vec<Submitted>>>,
    pub deletes: Arc<Mutex<Vec<(ResourceKind, NativeHandle)>>>,
    /// Number of `is_busy` polls still answered with `true`.
    pub busy_polls: Arc<AtomicUsize>,
    /// Submissions that arrived while `busy_polls` was still non-zero.
    pub overlapping: Arc<AtomicUsize>,
    pub invalidations: Arc<AtomicUsize>,
    pub fail_draws: Arc<Mutex<bool>>,
}

impl PeerLog {
    pub fn last(&self) -> Option<Submitted> {
        self.submissions.lock().last().cloned()
    }

    pub fn draws(&self) -> Vec<Submitted> {
        self.submissions
            .lock()
            .iter()
            .filter(|s| !s.picked)
            .cloned()
            .collect()
    }
}

/// Peer that records submissions and draws nothing.
pub struct RecordingPeer {
    peer_log: PeerLog,
    deleter: RecordedDeletes,
}

impl RecordingPeer {
    pub fn new() -> (Box<dyn RenderPeer>, PeerLog) {
        let peer_log = PeerLog::default();
        let peer = Self {
            deleter: RecordedDeletes(peer_log.deletes.clone()),
            peer_log: peer_log.clone(),
        };
        (Box::new(peer), peer_log)
    }
}

impl RenderPeer for RecordingPeer {
    fn render(&mut self, frame: &FrameSubmission<'_>) -> Result<strata::renderer::PeerOutcome> {
        let submitted = Submitted {
            frame_id: frame.frame_id,
            picked: frame.pick.is_some(),
            layered: frame.layered,
            passes: frame
                .passes
                .iter()
                .map(|p| (p.name.to_string(), p.bins.iter().map(|a| a.node).collect()))
                .collect(),
            frames: frame.passes.iter().map(|p| (p.viewport, p.projection)).collect(),
        };
        self.peer_log.submissions.lock().push(submitted);
        if self.peer_log.busy_polls.load(Ordering::SeqCst) > 0 {
            self.peer_log.overlapping.fetch_add(1, Ordering::SeqCst);
        }

        match frame.pick {
            Some(query) => Ok(strata::renderer::PeerOutcome::Picked(self.resolve_pick(query))),
            None => self.draw(frame).map(strata::renderer::PeerOutcome::Drawn),
        }
    }

    fn draw(&mut self, frame: &FrameSubmission<'_>) -> Result<DrawStats> {
        if *self.peer_log.fail_draws.lock() {
            return Err(RenderError::Peer("device lost".to_string()));
        }
        Ok(DrawStats {
            passes: frame.passes.len(),
            atoms: frame.passes.iter().map(|p| p.bins.len()).sum(),
        })
    }

    fn is_busy(&self) -> bool {
        self.peer_log
            .busy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_screenshot(&mut self, buffer: &ImageBuffer, _with_alpha: bool) -> Result<()> {
        let bytes = buffer.width() as usize * buffer.height() as usize * buffer.format().bytes_per_pixel();
        buffer.store_readback(&vec![0xFF; bytes])
    }

    fn handle_deleter(&mut self) -> &mut dyn HandleDeleter {
        &mut self.deleter
    }

    fn invalidate_state(&mut self) {
        self.peer_log.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Scene and renderer builders
// ============================================================================

pub fn unit_cube() -> BoundingBox {
    BoundingBox::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5))
}

/// Adds a unit cube shape under `parent`, centered at `at`.
pub fn cube(scene: &mut Scene, parent: NodeKey, at: Vec3, appearance: Appearance) -> NodeKey {
    let key = scene
        .add_shape(parent, Shape::new(unit_cube(), appearance))
        .expect("parent is a group");
    scene
        .set_transform(key, Affine3A::from_translation(at))
        .expect("node exists");
    key
}

pub fn renderer() -> (Renderer, Arc<RenderServices>) {
    renderer_with(RendererSettings::default())
}

pub fn renderer_with(settings: RendererSettings) -> (Renderer, Arc<RenderServices>) {
    init_logger();
    let services = Arc::new(RenderServices::new());
    let renderer = Renderer::new(services.clone(), settings).expect("valid settings");
    (renderer, services)
}
