//! Render bins
//!
//! The culler turns every visible shape into a [`RenderAtom`] and appends it
//! to the opaque or the transparent bin of its pass. Sorters reorder the bins
//! in place; backends draw them front to back in bin order.

use std::cmp::Ordering;

use glam::{Affine3A, Mat4, Vec3};
use smallvec::SmallVec;

use crate::math::BoundingSphere;
use crate::scene::{Appearance, BlendMode, BufferId, Camera, CullFace, NodeKey, ProgramId, TextureId};

/// Resolved draw state of one atom.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomState {
    pub program: Option<ProgramId>,
    pub textures: SmallVec<[TextureId; 4]>,
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: Option<BufferId>,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_face: CullFace,
    pub material_id: u32,
}

impl From<&Appearance> for AtomState {
    fn from(appearance: &Appearance) -> Self {
        Self {
            program: appearance.program,
            textures: appearance.textures.clone(),
            vertex_buffer: appearance.vertex_buffer,
            index_buffer: appearance.index_buffer,
            blend: appearance.blend,
            depth_test: appearance.depth_test,
            depth_write: appearance.depth_write,
            cull_face: appearance.cull_face,
            material_id: appearance.material_id,
        }
    }
}

impl AtomState {
    /// Total order grouping atoms by cost of switching: program first, then
    /// textures, then the remaining fixed-function state.
    pub fn cmp_state(&self, other: &AtomState) -> Ordering {
        self.program
            .cmp(&other.program)
            .then_with(|| self.textures.as_slice().cmp(other.textures.as_slice()))
            .then_with(|| self.material_id.cmp(&other.material_id))
            .then_with(|| blend_rank(self.blend).cmp(&blend_rank(other.blend)))
            .then_with(|| (self.depth_test, self.depth_write).cmp(&(other.depth_test, other.depth_write)))
            .then_with(|| cull_rank(self.cull_face).cmp(&cull_rank(other.cull_face)))
            .then_with(|| self.vertex_buffer.cmp(&other.vertex_buffer))
    }
}

fn blend_rank(blend: BlendMode) -> u8 {
    match blend {
        BlendMode::Opaque => 0,
        BlendMode::Alpha(_) => 1,
        BlendMode::Additive => 2,
    }
}

fn cull_rank(face: CullFace) -> u8 {
    match face {
        CullFace::Back => 0,
        CullFace::Front => 1,
        CullFace::None => 2,
    }
}

/// One drawable unit in a render bin.
#[derive(Debug, Clone)]
pub struct RenderAtom {
    pub node: NodeKey,
    pub world: Affine3A,
    /// World-space bounding sphere. Unbounded shapes get a zero-radius
    /// sphere at their origin and `bounded == false`.
    pub sphere: BoundingSphere,
    pub bounded: bool,
    /// View-space Z of the sphere center (negative in front of the eye).
    pub view_z: f32,
    /// Distance of the sphere center along the view direction.
    pub eye_distance: f32,
    pub state: AtomState,
    pub order_hint: Option<i32>,
    /// Position in collection order; stable sorters never need it but
    /// backends and tests use it to identify the traversal order.
    pub sequence: u32,
}

/// The eye a bin is sorted for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewInfo {
    pub position: Vec3,
    /// Unit facing direction.
    pub forward: Vec3,
    pub view: Mat4,
}

impl ViewInfo {
    #[must_use]
    pub fn new(position: Vec3, forward: Vec3, view: Mat4) -> Self {
        Self {
            position,
            forward: forward.normalize_or_zero(),
            view,
        }
    }

    #[must_use]
    pub fn from_camera(camera: &Camera) -> Self {
        Self::new(camera.position(), camera.forward(), camera.view_matrix())
    }

    /// Eye at `eye` (world transform), looking down its -Z axis.
    #[must_use]
    pub fn from_eye(eye: &Affine3A) -> Self {
        Self::new(
            eye.translation.into(),
            eye.transform_vector3(Vec3::NEG_Z),
            Mat4::from(eye.inverse()),
        )
    }

    /// Signed distance of `point` in front of the eye.
    #[inline]
    pub fn depth_of(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward)
    }
}

/// Opaque and transparent atoms of one pass for one view.
#[derive(Debug, Clone, Default)]
pub struct RenderBins {
    pub opaque: Vec<RenderAtom>,
    pub transparent: Vec<RenderAtom>,
}

impl RenderBins {
    #[must_use]
    pub fn with_capacity(opaque: usize, transparent: usize) -> Self {
        Self {
            opaque: Vec::with_capacity(opaque),
            transparent: Vec::with_capacity(transparent),
        }
    }

    /// Empties both bins, keeping their allocations.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    pub fn push(&mut self, atom: RenderAtom, transparent: bool) {
        if transparent {
            self.transparent.push(atom);
        } else {
            self.opaque.push(atom);
        }
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }

    pub fn contains(&self, node: NodeKey) -> bool {
        self.opaque.iter().chain(&self.transparent).any(|a| a.node == node)
    }

    /// Opaque atoms followed by transparent ones, the order backends draw in.
    pub fn iter(&self) -> impl Iterator<Item = &RenderAtom> {
        self.opaque.iter().chain(&self.transparent)
    }
}
