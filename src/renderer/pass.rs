//! Render passes
//!
//! A [`RenderPass`] draws one scene subtree with one [`RenderPassConfig`],
//! optionally into its own [`RenderTarget`]. Passes are drawn in the order
//! they were attached to the renderer.
//!
//! Passes that must always draw everything (foreground overlays, HUDs) are
//! built without the [`PassCapabilities::CULLING`] and
//! [`PassCapabilities::CLIPPING`] capabilities; the setters check the
//! capability set before mutating.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::errors::{RenderError, Result};
use crate::renderer::clipper::Clipper;
use crate::renderer::pass_config::{RenderPassConfig, Viewport};
use crate::renderer::target::RenderTarget;
use crate::scene::NodeKey;

new_key_type! {
    pub struct PassKey;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassFlags: u8 {
        const CLIPPER_ENABLED      = 1 << 0;
        const SCISSOR_ENABLED      = 1 << 1;
        const FRUSTUM_CULLING      = 1 << 2;
        /// Draw this pass layered even when the renderer is not.
        const LAYERED_MODE_FORCED  = 1 << 3;
    }
}

bitflags! {
    /// Mutations a pass accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassCapabilities: u8 {
        const CULLING  = 1 << 0;
        const CLIPPING = 1 << 1;
    }
}

/// Hooks run by the backend around a pass's draws.
pub trait RenderCallback: Send + Sync {
    fn before_pass(&self, _pass: &str, _frame_id: u64) {}
    fn after_pass(&self, _pass: &str, _frame_id: u64, _atoms_drawn: usize) {}
}

/// Lifecycle of a pass inside a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Known to the renderer but not part of the frame walk.
    Configured,
    Enabled,
    Disabled,
}

impl PassState {
    pub fn is_attached(self) -> bool {
        !matches!(self, PassState::Configured)
    }
}

#[derive(Clone)]
pub struct RenderPass {
    name: String,
    root: Option<NodeKey>,
    pub config: RenderPassConfig,
    target: Option<RenderTarget>,
    flags: PassFlags,
    capabilities: PassCapabilities,
    shadow_light: Option<NodeKey>,
    callbacks: Vec<Arc<dyn RenderCallback>>,
    clipper: Option<Clipper>,
    scissor: Option<Viewport>,
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("flags", &self.flags)
            .field("capabilities", &self.capabilities)
            .field("target", &self.target.as_ref().map(RenderTarget::key))
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl RenderPass {
    /// A pass with every capability and frustum culling on.
    #[must_use]
    pub fn new(name: impl Into<String>, root: Option<NodeKey>, config: RenderPassConfig) -> Self {
        Self {
            name: name.into(),
            root,
            config,
            target: None,
            flags: PassFlags::FRUSTUM_CULLING,
            capabilities: PassCapabilities::all(),
            shadow_light: None,
            callbacks: Vec::new(),
            clipper: None,
            scissor: None,
        }
    }

    #[must_use]
    pub fn perspective(name: impl Into<String>, root: NodeKey, fov_y: f32, near: f32, far: f32) -> Self {
        Self::new(name, Some(root), RenderPassConfig::perspective(fov_y, near, far))
    }

    #[must_use]
    pub fn parallel(name: impl Into<String>, root: NodeKey, screen_scale: f32, near: f32, far: f32) -> Self {
        Self::new(
            name,
            Some(root),
            RenderPassConfig::parallel(screen_scale, near, far),
        )
    }

    #[must_use]
    pub fn two_d(name: impl Into<String>, root: NodeKey) -> Self {
        Self::new(name, Some(root), RenderPassConfig::two_d())
    }

    /// Overlay pass drawn in full every frame: no culling, no clipping.
    #[must_use]
    pub fn foreground(name: impl Into<String>, root: NodeKey) -> Self {
        let mut pass = Self::two_d(name, root);
        pass.flags = PassFlags::empty();
        pass.capabilities = PassCapabilities::empty();
        pass
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeKey) {
        self.root = Some(root);
    }

    /// Subtree actually drawn: the target's root when it names one.
    pub fn effective_root(&self) -> Option<NodeKey> {
        self.target
            .as_ref()
            .and_then(|t| t.root)
            .or(self.root)
    }

    #[inline]
    pub fn flags(&self) -> PassFlags {
        self.flags
    }

    #[inline]
    pub fn capabilities(&self) -> PassCapabilities {
        self.capabilities
    }

    #[inline]
    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Replaces the target. Use [`Renderer::set_pass_target`] for attached
    /// passes so the target mapping stays consistent.
    ///
    /// [`Renderer::set_pass_target`]: crate::renderer::Renderer::set_pass_target
    pub fn set_target(&mut self, target: Option<RenderTarget>) -> Option<RenderTarget> {
        std::mem::replace(&mut self.target, target)
    }

    #[must_use]
    pub fn with_target(mut self, target: RenderTarget) -> Self {
        self.target = Some(target);
        self
    }

    #[inline]
    pub fn is_frustum_culling(&self) -> bool {
        self.flags.contains(PassFlags::FRUSTUM_CULLING)
    }

    fn require(&self, capability: PassCapabilities, what: &'static str) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(RenderError::CapabilityDenied {
                pass: self.name.clone(),
                what,
            })
        }
    }

    pub fn set_frustum_culling(&mut self, enabled: bool) -> Result<()> {
        self.require(PassCapabilities::CULLING, "frustum culling")?;
        self.flags.set(PassFlags::FRUSTUM_CULLING, enabled);
        Ok(())
    }

    pub fn set_layered_mode_forced(&mut self, forced: bool) {
        self.flags.set(PassFlags::LAYERED_MODE_FORCED, forced);
    }

    #[inline]
    pub fn clipper(&self) -> Option<&Clipper> {
        self.clipper.as_ref()
    }

    /// Installs a clipper and enables it.
    pub fn set_clipper(&mut self, clipper: Clipper) -> Result<()> {
        self.require(PassCapabilities::CLIPPING, "clipping")?;
        self.clipper = Some(clipper);
        self.flags.insert(PassFlags::CLIPPER_ENABLED);
        Ok(())
    }

    pub fn set_clipper_enabled(&mut self, enabled: bool) -> Result<()> {
        self.require(PassCapabilities::CLIPPING, "clipping")?;
        self.flags
            .set(PassFlags::CLIPPER_ENABLED, enabled && self.clipper.is_some());
        Ok(())
    }

    /// Clipper in effect this frame, if any.
    pub fn active_clipper(&self) -> Option<&Clipper> {
        self.clipper
            .as_ref()
            .filter(|_| self.flags.contains(PassFlags::CLIPPER_ENABLED))
    }

    #[inline]
    pub fn scissor(&self) -> Option<Viewport> {
        self.scissor
            .filter(|_| self.flags.contains(PassFlags::SCISSOR_ENABLED))
    }

    pub fn set_scissor(&mut self, scissor: Option<Viewport>) {
        self.scissor = scissor;
        self.flags.set(PassFlags::SCISSOR_ENABLED, scissor.is_some());
    }

    #[inline]
    pub fn shadow_light(&self) -> Option<NodeKey> {
        self.shadow_light
    }

    pub fn set_shadow_light(&mut self, light: Option<NodeKey>) {
        self.shadow_light = light;
    }

    pub fn add_callback(&mut self, callback: Arc<dyn RenderCallback>) {
        self.callbacks.push(callback);
    }

    pub fn callbacks(&self) -> &[Arc<dyn RenderCallback>] {
        &self.callbacks
    }
}
