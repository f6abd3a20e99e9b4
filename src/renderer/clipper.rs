use glam::Vec4;

use crate::renderer::services::MonotonicIds;

/// Maximum number of user clip planes.
pub const MAX_CLIP_PLANES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    /// Plane equation `(n, d)`; points with `dot(n, p) + d >= 0` are kept.
    pub equation: Vec4,
    pub enabled: bool,
}

impl Default for ClipPlane {
    fn default() -> Self {
        Self {
            equation: Vec4::ZERO,
            enabled: false,
        }
    }
}

/// Up to six user clip planes applied while a pass is drawn.
///
/// The id is assigned from the shared [`MonotonicIds`] at construction and is
/// never reused, so backends can cache per-clipper state by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Clipper {
    id: u64,
    planes: [ClipPlane; MAX_CLIP_PLANES],
}

impl Clipper {
    #[must_use]
    pub fn new(ids: &MonotonicIds) -> Self {
        Self {
            id: ids.next_id(),
            planes: [ClipPlane::default(); MAX_CLIP_PLANES],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn planes(&self) -> &[ClipPlane; MAX_CLIP_PLANES] {
        &self.planes
    }

    /// Sets and enables plane `index`. Out-of-range indices are ignored.
    pub fn set_plane(&mut self, index: usize, equation: Vec4) {
        if let Some(plane) = self.planes.get_mut(index) {
            plane.equation = equation;
            plane.enabled = true;
        }
    }

    pub fn set_plane_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(plane) = self.planes.get_mut(index) {
            plane.enabled = enabled;
        }
    }

    pub fn enabled_planes(&self) -> impl Iterator<Item = (usize, &ClipPlane)> {
        self.planes.iter().enumerate().filter(|(_, p)| p.enabled)
    }
}
