//! Output surfaces (canvases) and the views that drive them.

use std::fmt;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::renderer::peer::RenderPeer;
use crate::scene::Camera;

/// Rendering-context id. Small, process-unique while live, reused after
/// the context is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanvasId(pub u32);

new_key_type! {
    pub struct ViewKey;
}

/// A camera shared by one or more canvases.
///
/// Canvases on the same view reuse one set of culled bins per frame.
#[derive(Debug, Clone)]
pub struct View {
    pub(crate) camera: Camera,
    /// Bumped on every camera change so cached bins know they are stale.
    pub(crate) revision: u64,
}

impl View {
    pub(crate) fn new(camera: Camera) -> Self {
        Self {
            camera,
            revision: 0,
        }
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// One output surface bound to a rendering context.
pub struct Canvas {
    pub(crate) id: CanvasId,
    pub(crate) view: ViewKey,
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Clear color of the default framebuffer, if it is cleared.
    pub(crate) background: Option<Vec4>,
    /// `None` once the context was destroyed.
    pub(crate) peer: Option<Box<dyn RenderPeer>>,
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("size", &(self.width, self.height))
            .field("background", &self.background)
            .field("has_peer", &self.peer.is_some())
            .finish()
    }
}

impl Canvas {
    #[inline]
    pub fn id(&self) -> CanvasId {
        self.id
    }

    #[inline]
    pub fn view(&self) -> ViewKey {
        self.view
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn background(&self) -> Option<Vec4> {
        self.background
    }

    /// Width over height; 1.0 for degenerate sizes.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}
