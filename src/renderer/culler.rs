//! Frustum Culler
//!
//! Depth-first walk over a pass's subtree that prunes whole subtrees whose
//! world bound lies outside the cull volume and collects the surviving
//! shapes as render atoms.
//!
//! # Plane masks
//!
//! Every stack entry carries the set of planes its ancestors have not yet
//! been proven fully inside of. A node fully inside a plane drops it from the
//! mask for its descendants; once the mask is empty the rest of the subtree is
//! accepted without any further bound tests.
//!
//! # Fail-open
//!
//! Nodes whose bound is unknown (a shape without usable geometry bounds, or
//! any ancestor of one) are never culled. Their descendants are still tested
//! individually, so only the unbounded shapes themselves are forced visible.

use log::{debug, trace};

use crate::math::{ALL_PLANES, BoundingBox, BoundingSphere, Containment, Frustum, PlaneMask, Ray};
use crate::renderer::bin::{AtomState, RenderAtom, RenderBins, ViewInfo};
use crate::scene::{Node, NodeBounds, NodeKey, Scene, Shape};

/// A volume the culler can test world bounds against.
pub trait CullVolume {
    /// Classifies `bounds` against the planes in `mask` and returns the mask
    /// for the node's descendants.
    fn classify(&self, bounds: &BoundingBox, mask: PlaneMask) -> (Containment, PlaneMask);
}

impl CullVolume for Frustum {
    fn classify(&self, bounds: &BoundingBox, mask: PlaneMask) -> (Containment, PlaneMask) {
        let sphere = bounds.bounding_sphere();
        let (containment, remaining) = self.classify_sphere(sphere.center, sphere.radius, mask);
        // Spheres overestimate boxes; refine straddling results.
        if containment == Containment::Intersecting
            && self.classify_box(bounds.min, bounds.max) == Containment::Outside
        {
            return (Containment::Outside, mask);
        }
        (containment, remaining)
    }
}

impl CullVolume for Ray {
    fn classify(&self, bounds: &BoundingBox, mask: PlaneMask) -> (Containment, PlaneMask) {
        match self.intersect_box(bounds) {
            Some(_) => (Containment::Intersecting, mask),
            None => (Containment::Outside, mask),
        }
    }
}

/// Counters of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    pub nodes_visited: usize,
    pub subtrees_culled: usize,
    pub trivially_accepted: usize,
    pub fail_open: usize,
    pub visible_shapes: usize,
}

/// Reusable culler; the traversal stack is kept between frames.
#[derive(Debug, Default)]
pub struct FrustumCuller {
    stack: Vec<(NodeKey, PlaneMask)>,
}

impl FrustumCuller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `root` and calls `visit` for every shape that survives culling
    /// against `volume`. `None` disables bound tests (the whole active
    /// subtree is visited).
    pub fn traverse<V, F>(
        &mut self,
        scene: &Scene,
        root: NodeKey,
        volume: Option<&V>,
        mut visit: F,
    ) -> CullStats
    where
        V: CullVolume + ?Sized,
        F: FnMut(NodeKey, &Node, &Shape),
    {
        let mut stats = CullStats::default();
        self.stack.clear();
        let initial = if volume.is_some() { ALL_PLANES } else { 0 };
        self.stack.push((root, initial));

        while let Some((key, mut mask)) = self.stack.pop() {
            let Some(node) = scene.get(key) else {
                continue;
            };
            stats.nodes_visited += 1;
            if !node.is_visible() {
                continue;
            }

            match node.bounds() {
                NodeBounds::Empty => continue,
                NodeBounds::Unknown => {
                    if mask != 0 && node.shape().is_some() {
                        stats.fail_open += 1;
                        debug!("Node {key:?} has no usable bound; drawing it unculled");
                    }
                }
                NodeBounds::Known(bounds) => {
                    if let Some(volume) = volume
                        && mask != 0
                    {
                        let (containment, remaining) = volume.classify(&bounds, mask);
                        match containment {
                            Containment::Outside => {
                                stats.subtrees_culled += 1;
                                continue;
                            }
                            Containment::Inside => stats.trivially_accepted += 1,
                            Containment::Intersecting => {}
                        }
                        mask = remaining;
                    }
                }
            }

            if let Some(shape) = node.shape() {
                stats.visible_shapes += 1;
                visit(key, node, shape);
            } else {
                // Reverse so children pop in declaration order.
                self.stack
                    .extend(node.active_children().iter().rev().map(|&c| (c, mask)));
            }
        }

        trace!(
            "Culled subtree {root:?}: {} visited, {} pruned, {} visible",
            stats.nodes_visited, stats.subtrees_culled, stats.visible_shapes
        );
        stats
    }

    /// Clears `bins` and refills them with the shapes of `root` visible in
    /// `frustum`. Returns the number of visible shapes.
    pub fn cull_into(
        &mut self,
        scene: &Scene,
        root: NodeKey,
        frustum: Option<&Frustum>,
        view: &ViewInfo,
        bins: &mut RenderBins,
    ) -> usize {
        bins.clear();
        let mut sequence = 0u32;
        let stats = self.traverse(scene, root, frustum, |key, node, shape| {
            let atom = make_atom(key, node, shape, view, sequence);
            sequence += 1;
            bins.push(atom, shape.appearance.is_transparent());
        });
        stats.visible_shapes
    }
}

/// Builds the atom of a visible shape as seen from `view`.
pub fn make_atom(key: NodeKey, node: &Node, shape: &Shape, view: &ViewInfo, sequence: u32) -> RenderAtom {
    let (sphere, bounded) = match node.bounds() {
        NodeBounds::Known(bounds) => (bounds.bounding_sphere(), true),
        NodeBounds::Empty | NodeBounds::Unknown => (
            BoundingSphere::new(node.world_transform().translation.into(), 0.0),
            false,
        ),
    };

    RenderAtom {
        node: key,
        world: *node.world_transform(),
        sphere,
        bounded,
        view_z: view.view.transform_point3(sphere.center).z,
        eye_distance: view.depth_of(sphere.center),
        state: AtomState::from(&shape.appearance),
        order_hint: node.order_hint(),
        sequence,
    }
}
