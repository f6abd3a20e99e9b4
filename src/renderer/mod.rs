//! Renderer Core
//!
//! The [`Renderer`] owns render passes, views and canvases and runs the
//! per-frame pipeline for one canvas at a time:
//!
//! 1. Drain scene changes and mark the passes whose subtrees they touch
//! 2. Service queued pick requests for the canvas, in submission order
//! 3. Cull and sort every enabled pass whose bins are stale for the view
//! 4. Wait until the canvas's peer has finished its previous frame
//! 5. Hand the ordered passes to the peer
//! 6. Reset the dirty flags once the peer succeeded
//!
//! Bins are cached per (pass, view), so canvases sharing a view reuse the
//! same culled bins within a frame.
//!
//! All frame-level work is serialized by one lock; scene mutation on other
//! threads only feeds the change channel.

pub mod backend;
pub mod bin;
pub mod changes;
pub mod clipper;
pub mod culler;
pub mod device;
pub mod pass;
pub mod pass_config;
pub mod peer;
pub mod picking;
pub mod resources;
pub mod services;
pub mod settings;
pub mod sorting;
pub mod state_cache;
pub mod surface;
pub mod target;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{Mat4, Vec4};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::errors::{RenderError, Result};
use crate::math::Frustum;
use crate::scene::{Camera, NodeKind, Scene, SceneChange, SceneListener};
use crate::utils::FrameClock;

pub use self::backend::StateCachingPeer;
pub use self::bin::{RenderAtom, RenderBins, ViewInfo};
pub use self::changes::{ChangeQueue, SceneChangeTracker};
pub use self::culler::FrustumCuller;
pub use self::device::{GraphicsDevice, TrackedDevice};
pub use self::pass::{PassKey, PassState, RenderCallback, RenderPass};
pub use self::pass_config::{RenderPassConfig, Viewport};
pub use self::peer::{DrawStats, FrameSubmission, PassFrame, PeerOutcome, RenderPeer};
pub use self::picking::{PickListener, PickMode, PickOutcome, PickRegion, PickRequest};
pub use self::resources::{NativeHandle, ResourceOwner, ResourceRegistry};
pub use self::services::RenderServices;
pub use self::settings::RendererSettings;
pub use self::sorting::{RenderBinSorter, SortingPolicy};
pub use self::surface::{Canvas, CanvasId, View, ViewKey};
pub use self::target::{RenderTarget, TargetKey};

use self::pass::PassFlags;
use self::picking::{PickHit, PickShape};
use self::target::{ImageBuffer, RenderTargetKind};

// ============================================================================
// Frame state
// ============================================================================

struct PassEntry {
    pass: RenderPass,
    state: PassState,
    /// Set by scene changes and pass edits, cleared after a successful frame.
    dirty: bool,
    /// Bumped whenever the pass is marked dirty; bins culled for an older
    /// generation are stale.
    generation: u64,
}

impl PassEntry {
    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }
}

/// Bins of one pass as seen from one view.
struct BinCache {
    bins: RenderBins,
    generation: u64,
    view_revision: u64,
    view: Mat4,
    projection: Mat4,
}

struct DefaultSorters {
    opaque: Arc<dyn RenderBinSorter>,
    transparent: Arc<dyn RenderBinSorter>,
}

impl DefaultSorters {
    fn from_policies(opaque: SortingPolicy, transparent: SortingPolicy) -> Result<Self> {
        Ok(Self {
            opaque: opaque
                .canonical_sorter()
                .ok_or(RenderError::CustomPolicyWithoutSorter)?,
            transparent: transparent
                .canonical_sorter()
                .ok_or(RenderError::CustomPolicyWithoutSorter)?,
        })
    }
}

struct FrameState {
    settings: RendererSettings,
    passes: SlotMap<PassKey, PassEntry>,
    /// Attached passes in registration order.
    order: Vec<PassKey>,
    targets: FxHashMap<TargetKey, PassKey>,
    views: SlotMap<ViewKey, View>,
    canvases: FxHashMap<CanvasId, Canvas>,
    bins: FxHashMap<(PassKey, ViewKey), BinCache>,
    defaults: DefaultSorters,
    culler: FrustumCuller,
    clock: FrameClock,
    /// Some scene change arrived since the last successful frame.
    scene_changed: bool,
}

impl FrameState {
    fn entry(&self, key: PassKey) -> Result<&PassEntry> {
        self.passes.get(key).ok_or(RenderError::PassNotAttached(key))
    }

    fn entry_mut(&mut self, key: PassKey) -> Result<&mut PassEntry> {
        self.passes
            .get_mut(key)
            .ok_or(RenderError::PassNotAttached(key))
    }

    fn mark_all_dirty(&mut self) {
        for entry in self.passes.values_mut() {
            entry.mark_dirty();
        }
    }

    /// Maps scene changes to the passes that must re-cull.
    fn apply_changes(&mut self, scene: &Scene, changes: &[SceneChange]) {
        if changes.is_empty() {
            return;
        }
        self.scene_changed = true;

        for change in changes {
            let anchor = change.anchor();
            if !scene.contains(anchor) {
                // The anchor vanished with a later removal; its passes are unknown.
                self.mark_all_dirty();
                continue;
            }

            for key in &self.order {
                let Some(entry) = self.passes.get_mut(*key) else {
                    continue;
                };
                let Some(root) = entry.pass.effective_root() else {
                    continue;
                };
                // Changes below the root alter the subtree; changes above it
                // move the whole subtree or change what is reachable.
                if !scene.contains(root)
                    || scene.is_in_subtree(anchor, root)
                    || scene.is_in_subtree(root, anchor)
                {
                    if !entry.dirty {
                        trace!("{change:?} marks pass '{}' dirty", entry.pass.name());
                    }
                    entry.mark_dirty();
                }
            }
        }
    }

    /// Registers `key`'s target; fails if another pass already owns it.
    fn bind_target(&mut self, key: PassKey, target: Option<TargetKey>) -> Result<()> {
        let Some(target) = target else {
            return Ok(());
        };
        match self.targets.get(&target) {
            Some(&owner) if owner != key => Err(RenderError::TargetAlreadyBound(owner)),
            _ => {
                self.targets.insert(target, key);
                Ok(())
            }
        }
    }

    fn unbind_target(&mut self, key: PassKey, target: Option<TargetKey>) {
        if let Some(target) = target
            && self.targets.get(&target) == Some(&key)
        {
            self.targets.remove(&target);
        }
    }

    fn detach(&mut self, key: PassKey) -> Result<()> {
        let entry = self.entry(key)?;
        if !entry.state.is_attached() {
            return Err(RenderError::PassNotAttached(key));
        }
        let target = entry.pass.target().map(RenderTarget::key);
        self.unbind_target(key, target);
        self.order.retain(|k| *k != key);
        self.bins.retain(|(pass, _), _| *pass != key);

        let entry = self.entry_mut(key)?;
        entry.state = PassState::Configured;
        debug!("Detached render pass '{}'", entry.pass.name());
        Ok(())
    }

    /// Brings the bins of every enabled pass up to date for `view_key`.
    fn refresh_bins(&mut self, scene: &Scene, view_key: ViewKey, size: (u32, u32)) -> Result<()> {
        let FrameState {
            settings,
            passes,
            order,
            views,
            bins,
            defaults,
            culler,
            ..
        } = self;
        let view = views.get(view_key).ok_or(RenderError::UnknownView(view_key))?;

        for key in order.iter() {
            let Some(entry) = passes.get(*key) else {
                continue;
            };
            if entry.state != PassState::Enabled {
                continue;
            }
            let pass = &entry.pass;
            let viewport = pass_viewport(pass, size);
            let projection = pass.config.projection_matrix(viewport.aspect_ratio());
            let view_matrix = pass.config.view_matrix(view.camera());

            let cache = bins.entry((*key, view_key)).or_insert_with(|| BinCache {
                bins: RenderBins::with_capacity(
                    settings.opaque_bin_capacity,
                    settings.transparent_bin_capacity,
                ),
                generation: u64::MAX,
                view_revision: u64::MAX,
                view: Mat4::NAN,
                projection: Mat4::NAN,
            });

            if cache.generation == entry.generation
                && cache.view_revision == view.revision()
                && cache.view == view_matrix
                && cache.projection == projection
            {
                continue;
            }

            let eye = ViewInfo::from_eye(&pass.config.eye_transform(view.camera()));
            let visible = match pass.effective_root().filter(|r| scene.contains(*r)) {
                Some(root) => {
                    let frustum = pass
                        .is_frustum_culling()
                        .then(|| Frustum::from_matrix(projection * view_matrix));
                    culler.cull_into(scene, root, frustum.as_ref(), &eye, &mut cache.bins)
                }
                None => {
                    cache.bins.clear();
                    0
                }
            };

            let opaque = pass
                .config
                .opaque_sorting()
                .sorter()
                .unwrap_or(&defaults.opaque);
            let transparent = pass
                .config
                .transparent_sorting()
                .sorter()
                .unwrap_or(&defaults.transparent);
            opaque.sort(&mut cache.bins.opaque, &eye);
            transparent.sort(&mut cache.bins.transparent, &eye);

            cache.generation = entry.generation;
            cache.view_revision = view.revision();
            cache.view = view_matrix;
            cache.projection = projection;
            debug!(
                "Pass '{}' culled for {view_key:?}: {visible} visible ({} opaque, {} transparent)",
                pass.name(),
                cache.bins.opaque.len(),
                cache.bins.transparent.len()
            );
        }
        Ok(())
    }

    /// Collects pick candidates of `request` on a canvas with `camera`.
    fn pick_candidates(
        &mut self,
        scene: &Scene,
        request: &PickRequest,
        camera: &Camera,
        size: (u32, u32),
    ) -> Vec<PickHit> {
        let FrameState { passes, culler, .. } = self;
        let mut hits = Vec::new();

        for key in request.passes() {
            let Some(entry) = passes.get(*key).filter(|e| e.state.is_attached()) else {
                debug!("Pick names pass {key:?} which is not attached; skipping it");
                continue;
            };
            let pass = &entry.pass;
            let Some(root) = pass.effective_root().filter(|r| scene.contains(*r)) else {
                continue;
            };

            let viewport = pass_viewport(pass, size);
            let projection = pass.config.projection_matrix(viewport.aspect_ratio());
            let view_matrix = pass.config.view_matrix(camera);
            let eye = ViewInfo::from_eye(&pass.config.eye_transform(camera));

            let shape =
                PickShape::from_region(request.region(), viewport, &(projection * view_matrix));
            shape.collect(culler, scene, *key, root, &eye, &mut hits);
        }
        hits
    }
}

/// Viewport of `pass` on a `canvas`-sized surface. Without an override the
/// pass covers its target's frame, or the whole canvas.
fn pass_viewport(pass: &RenderPass, canvas: (u32, u32)) -> Viewport {
    pass.config.viewport.unwrap_or_else(|| {
        let (width, height) = pass
            .target()
            .and_then(RenderTarget::frame_size)
            .unwrap_or(canvas);
        Viewport::new(0, 0, width, height)
    })
}

/// Keeps at most one draw or pick in flight per surface.
fn wait_while_busy(peer: &dyn RenderPeer, poll: Duration) {
    while peer.is_busy() {
        thread::sleep(poll);
    }
}

fn deliver_miss(request: PickRequest) {
    let outcome = match request.mode() {
        PickMode::Nearest => PickOutcome::Nearest(None),
        PickMode::All => PickOutcome::All(Vec::new()),
    };
    request.deliver(outcome);
}

// ============================================================================
// Renderer
// ============================================================================

/// Scene-graph renderer driving one or more canvases.
pub struct Renderer {
    services: Arc<RenderServices>,
    /// Frame lock: every frame-level operation runs under it.
    state: Mutex<FrameState>,
    picks: Mutex<VecDeque<(CanvasId, PickRequest)>>,
    changes: ChangeQueue,
}

impl Renderer {
    pub fn new(services: Arc<RenderServices>, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        let defaults = DefaultSorters::from_policies(
            settings.default_opaque_policy,
            settings.default_transparent_policy,
        )?;

        Ok(Self {
            services,
            state: Mutex::new(FrameState {
                settings,
                passes: SlotMap::with_key(),
                order: Vec::new(),
                targets: FxHashMap::default(),
                views: SlotMap::with_key(),
                canvases: FxHashMap::default(),
                bins: FxHashMap::default(),
                defaults,
                culler: FrustumCuller::new(),
                clock: FrameClock::new(),
                scene_changed: false,
            }),
            picks: Mutex::new(VecDeque::new()),
            changes: ChangeQueue::new(),
        })
    }

    #[inline]
    pub fn services(&self) -> &Arc<RenderServices> {
        &self.services
    }

    pub fn settings(&self) -> RendererSettings {
        self.state.lock().settings.clone()
    }

    /// Listener to register on every scene this renderer draws.
    pub fn scene_listener(&self) -> Arc<dyn SceneListener> {
        self.changes.listener()
    }

    /// Whether scene changes arrived since the last successful frame.
    pub fn has_pending_changes(&self) -> bool {
        self.changes.pending() > 0 || self.state.lock().scene_changed
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    /// Registers a pass without attaching it.
    pub fn insert_pass(&self, pass: RenderPass) -> Result<PassKey> {
        if pass.root().is_none() {
            return Err(RenderError::MissingArgument("render pass root"));
        }
        let mut state = self.state.lock();
        Ok(state.passes.insert(PassEntry {
            pass,
            state: PassState::Configured,
            dirty: true,
            generation: 0,
        }))
    }

    /// Attaches a registered pass; it is drawn after every pass attached
    /// before it.
    pub fn attach_pass(&self, key: PassKey) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.entry(key)?;
        if entry.state.is_attached() {
            return Err(RenderError::PassAlreadyAttached(key));
        }
        let target = entry.pass.target().map(RenderTarget::key);
        state.bind_target(key, target)?;

        let entry = state.entry_mut(key)?;
        entry.state = PassState::Enabled;
        entry.mark_dirty();
        debug!("Attached render pass '{}'", entry.pass.name());
        state.order.push(key);
        Ok(())
    }

    /// Registers and attaches `pass` in one step.
    pub fn add_pass(&self, pass: RenderPass) -> Result<PassKey> {
        let key = self.insert_pass(pass)?;
        if let Err(e) = self.attach_pass(key) {
            self.state.lock().passes.remove(key);
            return Err(e);
        }
        Ok(key)
    }

    /// Detaches a pass and drops its target mapping and cached bins. Native
    /// resources of its subtree stay allocated until
    /// [`free_pass_resources`](Self::free_pass_resources) or context teardown.
    pub fn detach_pass(&self, key: PassKey) -> Result<()> {
        self.state.lock().detach(key)
    }

    /// Detaches (if needed) and forgets the pass, handing it back.
    pub fn remove_pass(&self, key: PassKey) -> Result<RenderPass> {
        let mut state = self.state.lock();
        if state.entry(key)?.state.is_attached() {
            state.detach(key)?;
        }
        state
            .passes
            .remove(key)
            .map(|entry| entry.pass)
            .ok_or(RenderError::PassNotAttached(key))
    }

    pub fn set_pass_enabled(&self, key: PassKey, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.entry_mut(key)?;
        if !entry.state.is_attached() {
            return Err(RenderError::PassNotAttached(key));
        }
        entry.state = if enabled {
            PassState::Enabled
        } else {
            PassState::Disabled
        };
        Ok(())
    }

    pub fn enable_pass(&self, key: PassKey) -> Result<()> {
        self.set_pass_enabled(key, true)
    }

    pub fn disable_pass(&self, key: PassKey) -> Result<()> {
        self.set_pass_enabled(key, false)
    }

    pub fn pass_state(&self, key: PassKey) -> Result<PassState> {
        Ok(self.state.lock().entry(key)?.state)
    }

    pub fn is_pass_dirty(&self, key: PassKey) -> Result<bool> {
        Ok(self.state.lock().entry(key)?.dirty)
    }

    /// Attached passes in draw order.
    pub fn passes(&self) -> Vec<PassKey> {
        self.state.lock().order.clone()
    }

    /// Reads a pass.
    pub fn with_pass<R>(&self, key: PassKey, f: impl FnOnce(&RenderPass) -> R) -> Result<R> {
        Ok(f(&self.state.lock().entry(key)?.pass))
    }

    /// Edits a pass and marks it for re-culling.
    ///
    /// A target swapped inside `f` is re-registered; if another pass already
    /// owns the new target the previous target is put back and the call
    /// fails. Other edits made by `f` are kept.
    pub fn update_pass<R>(&self, key: PassKey, f: impl FnOnce(&mut RenderPass) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let entry = state.entry_mut(key)?;
        let previous = entry.pass.target().cloned();
        let before = previous.as_ref().map(RenderTarget::key);
        let result = f(&mut entry.pass);
        entry.mark_dirty();

        let attached = entry.state.is_attached();
        let after = entry.pass.target().map(RenderTarget::key);
        if attached && before != after {
            if let Err(e) = state.bind_target(key, after) {
                state.entry_mut(key)?.pass.set_target(previous);
                return Err(e);
            }
            state.unbind_target(key, before);
        }
        Ok(result)
    }

    /// Replaces the pass's target, keeping the target-to-pass mapping
    /// one-to-one. Returns the previous target.
    pub fn set_pass_target(
        &self,
        key: PassKey,
        target: Option<RenderTarget>,
    ) -> Result<Option<RenderTarget>> {
        let mut state = self.state.lock();
        let entry = state.entry(key)?;
        let attached = entry.state.is_attached();
        let before = entry.pass.target().map(RenderTarget::key);
        let after = target.as_ref().map(RenderTarget::key);

        if attached && before != after {
            state.bind_target(key, after)?;
            state.unbind_target(key, before);
        }
        let entry = state.entry_mut(key)?;
        entry.mark_dirty();
        Ok(entry.pass.set_target(target))
    }

    /// Pass currently rendering into `target`.
    pub fn pass_for_target(&self, target: &TargetKey) -> Option<PassKey> {
        self.state.lock().targets.get(target).copied()
    }

    /// Copy of the bins `pass` last produced for `view`.
    pub fn bins(&self, pass: PassKey, view: ViewKey) -> Option<RenderBins> {
        self.state
            .lock()
            .bins
            .get(&(pass, view))
            .map(|cache| cache.bins.clone())
    }

    // ========================================================================
    // Sorting defaults
    // ========================================================================

    pub fn set_default_sorting_policies(
        &self,
        opaque: SortingPolicy,
        transparent: SortingPolicy,
    ) -> Result<()> {
        let defaults = DefaultSorters::from_policies(opaque, transparent)?;
        let mut state = self.state.lock();
        state.settings.default_opaque_policy = opaque;
        state.settings.default_transparent_policy = transparent;
        state.defaults = defaults;
        state.mark_all_dirty();
        Ok(())
    }

    /// Installs custom default sorters; `None` keeps the current one.
    pub fn set_default_sorters(
        &self,
        opaque: Option<Arc<dyn RenderBinSorter>>,
        transparent: Option<Arc<dyn RenderBinSorter>>,
    ) {
        let mut state = self.state.lock();
        if let Some(sorter) = opaque {
            state.settings.default_opaque_policy = SortingPolicy::Custom;
            state.defaults.opaque = sorter;
        }
        if let Some(sorter) = transparent {
            state.settings.default_transparent_policy = SortingPolicy::Custom;
            state.defaults.transparent = sorter;
        }
        state.mark_all_dirty();
    }

    pub fn set_layered_mode(&self, layered: bool) {
        self.state.lock().settings.layered_mode = layered;
    }

    // ========================================================================
    // Views and canvases
    // ========================================================================

    pub fn add_view(&self, camera: Camera) -> ViewKey {
        self.state.lock().views.insert(View::new(camera))
    }

    pub fn set_camera(&self, view: ViewKey, camera: Camera) -> Result<()> {
        let mut state = self.state.lock();
        let view_ref = state
            .views
            .get_mut(view)
            .ok_or(RenderError::UnknownView(view))?;
        view_ref.camera = camera;
        view_ref.revision += 1;
        Ok(())
    }

    pub fn camera(&self, view: ViewKey) -> Result<Camera> {
        self.state
            .lock()
            .views
            .get(view)
            .map(|v| v.camera)
            .ok_or(RenderError::UnknownView(view))
    }

    /// Removes a view and its cached bins. Canvases still showing it fail to
    /// render until moved to another view.
    pub fn remove_view(&self, view: ViewKey) -> Result<()> {
        let mut state = self.state.lock();
        state
            .views
            .remove(view)
            .ok_or(RenderError::UnknownView(view))?;
        state.bins.retain(|(_, v), _| *v != view);
        Ok(())
    }

    /// Registers an output surface drawn by `peer` from `view`.
    pub fn add_canvas(
        &self,
        peer: Box<dyn RenderPeer>,
        view: ViewKey,
        width: u32,
        height: u32,
    ) -> Result<CanvasId> {
        let mut state = self.state.lock();
        if !state.views.contains_key(view) {
            return Err(RenderError::UnknownView(view));
        }
        let id = CanvasId(self.services.canvas_ids.allocate());
        state.canvases.insert(
            id,
            Canvas {
                id,
                view,
                width,
                height,
                background: None,
                peer: Some(peer),
            },
        );
        info!("Canvas {id:?} attached ({width}x{height})");
        Ok(id)
    }

    fn with_canvas<R>(&self, id: CanvasId, f: impl FnOnce(&mut Canvas) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let canvas = state
            .canvases
            .get_mut(&id)
            .ok_or(RenderError::CanvasNotAttached(id))?;
        Ok(f(canvas))
    }

    pub fn resize_canvas(&self, id: CanvasId, width: u32, height: u32) -> Result<()> {
        self.with_canvas(id, |canvas| {
            canvas.width = width;
            canvas.height = height;
        })
    }

    pub fn set_canvas_view(&self, id: CanvasId, view: ViewKey) -> Result<()> {
        if !self.state.lock().views.contains_key(view) {
            return Err(RenderError::UnknownView(view));
        }
        self.with_canvas(id, |canvas| canvas.view = view)
    }

    pub fn set_canvas_background(&self, id: CanvasId, color: Option<Vec4>) -> Result<()> {
        self.with_canvas(id, |canvas| canvas.background = color)
    }

    pub fn canvas_size(&self, id: CanvasId) -> Result<(u32, u32)> {
        self.with_canvas(id, |canvas| canvas.size())
    }

    /// Context teardown: frees every native handle registered against the
    /// canvas's context, resets the peer's state cache and releases the
    /// canvas id. Pending picks for the canvas resolve as misses.
    ///
    /// Returns the number of handles freed.
    pub fn destroy_canvas(&self, id: CanvasId) -> Result<usize> {
        let mut peer = {
            let mut state = self.state.lock();
            let canvas = state
                .canvases
                .get_mut(&id)
                .ok_or(RenderError::CanvasNotAttached(id))?;
            let peer = canvas.peer.take().ok_or(RenderError::NoPeer(id))?;
            state.canvases.remove(&id);
            peer
        };

        let freed = self
            .services
            .resources
            .destroy_context(id, peer.handle_deleter());
        peer.invalidate_state();
        self.services.canvas_ids.release(id.0);

        let orphaned: Vec<_> = {
            let mut picks = self.picks.lock();
            let (orphaned, kept): (VecDeque<_>, VecDeque<_>) =
                picks.drain(..).partition(|(canvas, _)| *canvas == id);
            *picks = kept;
            orphaned.into_iter().collect()
        };
        for (_, request) in orphaned {
            deliver_miss(request);
        }

        info!("Canvas {id:?} destroyed");
        Ok(freed)
    }

    /// Frees the native handles owned by the shapes of `pass`'s subtree and
    /// by its target, in the context of `canvas`.
    pub fn free_pass_resources(&self, key: PassKey, canvas: CanvasId, scene: &Scene) -> Result<usize> {
        let mut state = self.state.lock();
        let FrameState {
            passes, canvases, ..
        } = &mut *state;
        let pass = &passes
            .get(key)
            .ok_or(RenderError::PassNotAttached(key))?
            .pass;
        let peer = canvases
            .get_mut(&canvas)
            .ok_or(RenderError::CanvasNotAttached(canvas))?
            .peer
            .as_mut()
            .ok_or(RenderError::NoPeer(canvas))?;

        let mut owners: Vec<ResourceOwner> = vec![key.into()];
        if let Some(target) = pass.target()
            && let RenderTargetKind::OffscreenTexture(texture) = &target.kind
        {
            owners.push((*texture).into());
        }
        if let Some(root) = pass.effective_root() {
            for node_key in scene.subtree(root) {
                let Some(node) = scene.get(node_key) else {
                    continue;
                };
                owners.push(node_key.into());
                if let NodeKind::Shape(shape) = node.kind() {
                    let appearance = &shape.appearance;
                    owners.extend(appearance.program.map(ResourceOwner::from));
                    owners.extend(appearance.textures.iter().map(|&t| ResourceOwner::from(t)));
                    owners.extend(appearance.vertex_buffer.map(ResourceOwner::from));
                    owners.extend(appearance.index_buffer.map(ResourceOwner::from));
                }
            }
        }

        let deleter = peer.handle_deleter();
        let mut freed = 0;
        for owner in owners {
            freed += self.services.resources.destroy_owner(owner, canvas, deleter);
        }
        debug!("Freed {freed} native handles of pass '{}'", pass.name());
        Ok(freed)
    }

    pub fn take_screenshot(
        &self,
        id: CanvasId,
        buffer: &ImageBuffer,
        with_alpha: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let canvas = state
            .canvases
            .get_mut(&id)
            .ok_or(RenderError::CanvasNotAttached(id))?;
        let peer = canvas.peer.as_mut().ok_or(RenderError::NoPeer(id))?;
        peer.take_screenshot(buffer, with_alpha)
    }

    // ========================================================================
    // Picking
    // ========================================================================

    /// Queues a pick on `canvas`; it is resolved at the start of that
    /// canvas's next frame.
    pub fn queue_pick(&self, canvas: CanvasId, request: PickRequest) {
        self.picks.lock().push_back((canvas, request));
    }

    pub fn pending_picks(&self) -> usize {
        self.picks.lock().len()
    }

    fn take_picks(&self, canvas: CanvasId) -> Vec<PickRequest> {
        let mut picks = self.picks.lock();
        let (mine, rest): (VecDeque<_>, VecDeque<_>) =
            picks.drain(..).partition(|(c, _)| *c == canvas);
        *picks = rest;
        mine.into_iter().map(|(_, request)| request).collect()
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Renders one frame of `scene` on `canvas`.
    pub fn render_once(&self, canvas: CanvasId, scene: &Scene) -> Result<DrawStats> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (view_key, size) = {
            let canvas_ref = state
                .canvases
                .get(&canvas)
                .ok_or(RenderError::CanvasNotAttached(canvas))?;
            if canvas_ref.peer.is_none() {
                return Err(RenderError::NoPeer(canvas));
            }
            (canvas_ref.view, canvas_ref.size())
        };
        let camera = *state
            .views
            .get(view_key)
            .ok_or(RenderError::UnknownView(view_key))?
            .camera();

        // 1. Scene changes -> dirty passes
        let changes = self.changes.drain();
        state.apply_changes(scene, &changes);

        let tick = state.clock.tick();
        let layered = state.settings.layered_mode;
        let poll = state.settings.busy_wait_poll();

        // 2. Picks, in submission order, each after the surface went idle
        for request in self.take_picks(canvas) {
            let candidates = state.pick_candidates(scene, &request, &camera, size);
            let query = request.query(candidates);
            let submission = FrameSubmission {
                canvas,
                size,
                camera: &camera,
                passes: Vec::new(),
                layered,
                frame_id: tick.frame_id,
                timestamp: tick.timestamp,
                time_step: tick.time_step,
                background: None,
                pick: Some(&query),
            };
            let Some(peer) = state.canvases.get_mut(&canvas).and_then(|c| c.peer.as_mut()) else {
                deliver_miss(request);
                continue;
            };
            wait_while_busy(&**peer, poll);
            match peer.render(&submission) {
                Ok(PeerOutcome::Picked(outcome)) => request.deliver(outcome),
                Ok(PeerOutcome::Drawn(_)) => {
                    warn!("Peer of {canvas:?} drew instead of picking");
                    deliver_miss(request);
                }
                Err(e) => {
                    error!("Peer of {canvas:?} failed to pick: {e}");
                    deliver_miss(request);
                }
            }
        }

        // 3. Cull and sort stale bins
        state.refresh_bins(scene, view_key, size)?;

        // 4. Wait for the previous frame on this surface
        let FrameState {
            passes,
            order,
            canvases,
            bins,
            ..
        } = &mut *state;
        let canvas_ref = canvases
            .get_mut(&canvas)
            .ok_or(RenderError::CanvasNotAttached(canvas))?;
        let background = canvas_ref.background;
        let peer = canvas_ref.peer.as_mut().ok_or(RenderError::NoPeer(canvas))?;
        wait_while_busy(&**peer, poll);

        // 5. Dispatch in registration order
        let mut frames = Vec::with_capacity(order.len());
        for key in order.iter() {
            let Some(entry) = passes.get(*key).filter(|e| e.state == PassState::Enabled) else {
                continue;
            };
            let Some(cache) = bins.get(&(*key, view_key)) else {
                continue;
            };
            let pass = &entry.pass;
            frames.push(PassFrame {
                key: *key,
                name: pass.name(),
                config: &pass.config,
                target: pass.target(),
                bins: &cache.bins,
                view: cache.view,
                projection: cache.projection,
                viewport: pass_viewport(pass, size),
                scissor: pass.scissor(),
                clipper: pass.active_clipper(),
                layered: pass.flags().contains(PassFlags::LAYERED_MODE_FORCED),
                callbacks: pass.callbacks(),
            });
        }

        let submission = FrameSubmission {
            canvas,
            size,
            camera: &camera,
            passes: frames,
            layered,
            frame_id: tick.frame_id,
            timestamp: tick.timestamp,
            time_step: tick.time_step,
            background,
            pick: None,
        };

        let stats = match peer.render(&submission) {
            Ok(PeerOutcome::Drawn(stats)) => stats,
            Ok(PeerOutcome::Picked(_)) => {
                return Err(RenderError::Peer(
                    "peer answered a draw with a pick result".to_string(),
                ));
            }
            Err(e) => {
                error!("Peer of {canvas:?} failed to draw frame {}: {e}", tick.frame_id);
                return Err(e);
            }
        };
        drop(submission);

        // 6. Reset dirty flags
        for entry in passes.values_mut() {
            entry.dirty = false;
        }
        state.scene_changed = false;

        trace!(
            "Frame {} on {canvas:?}: {} passes, {} atoms",
            tick.frame_id, stats.passes, stats.atoms
        );
        Ok(stats)
    }
}
