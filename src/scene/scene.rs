use std::sync::Arc;

use glam::Affine3A;
use slotmap::SlotMap;

use crate::errors::{RenderError, Result};
use crate::math::BoundingBox;
use crate::scene::NodeKey;
use crate::scene::material::Appearance;
use crate::scene::node::{Node, NodeBounds, NodeKind, Shape};
use crate::scene::notify::SceneListener;

/// Retained scene graph.
///
/// A single root group owns every other node. All mutations go through the
/// scene so it can keep world matrices and bounds current and report each
/// change to its listeners.
///
/// The scene is plain data: share it between a logic thread and the render
/// thread behind a lock (e.g. `Arc<parking_lot::RwLock<Scene>>`).
pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    listeners: Vec<Arc<dyn SceneListener>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root_node = Node::new(NodeKind::Group);
        root_node.name = "Root".to_string();
        let root = nodes.insert(root_node);
        Self {
            nodes,
            root,
            listeners: Vec::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SceneListener>) {
        self.listeners.push(listener);
    }

    fn emit(&self, f: impl Fn(&dyn SceneListener)) {
        for listener in &self.listeners {
            f(listener.as_ref());
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes.get(key).ok_or(RenderError::UnknownNode(key))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes.get_mut(key).ok_or(RenderError::UnknownNode(key))
    }

    /// Whether `key` is `ancestor` or lies below it.
    pub fn is_in_subtree(&self, key: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.nodes.get(k).and_then(Node::parent);
        }
        false
    }

    /// Keys of `root` and every descendant, in depth-first pre-order.
    pub fn subtree(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(k) = stack.pop() {
            let Some(node) = self.nodes.get(k) else {
                continue;
            };
            out.push(k);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    // ========================================================================
    // Structure
    // ========================================================================

    fn insert(&mut self, parent: NodeKey, kind: NodeKind) -> Result<NodeKey> {
        if matches!(self.node(parent)?.kind, NodeKind::Shape(_)) {
            return Err(RenderError::WrongNodeKind {
                node: parent,
                expected: "group",
            });
        }

        let mut node = Node::new(kind);
        node.parent = Some(parent);
        let key = self.nodes.insert(node);
        self.node_mut(parent)?.children.push(key);
        self.refresh(key);

        self.emit(|l| {
            l.child_added(parent, key);
            l.subtree_attached(parent, key);
        });
        Ok(key)
    }

    pub fn add_group(&mut self, parent: NodeKey) -> Result<NodeKey> {
        self.insert(parent, NodeKind::Group)
    }

    pub fn add_switch(&mut self, parent: NodeKey, selected: Option<usize>) -> Result<NodeKey> {
        self.insert(parent, NodeKind::Switch { selected })
    }

    pub fn add_shape(&mut self, parent: NodeKey, shape: Shape) -> Result<NodeKey> {
        self.insert(parent, NodeKind::Shape(shape))
    }

    /// Moves `key` (with its subtree) under `new_parent`.
    pub fn reparent(&mut self, key: NodeKey, new_parent: NodeKey) -> Result<()> {
        if key == self.root {
            return Err(RenderError::MissingArgument("a non-root node to reparent"));
        }
        if self.is_in_subtree(new_parent, key) {
            log::warn!("Refusing to attach {key:?} below its own descendant {new_parent:?}");
            return Err(RenderError::WrongNodeKind {
                node: new_parent,
                expected: "node outside the moved subtree",
            });
        }
        if matches!(self.node(new_parent)?.kind, NodeKind::Shape(_)) {
            return Err(RenderError::WrongNodeKind {
                node: new_parent,
                expected: "group",
            });
        }

        let old_parent = self.node(key)?.parent;
        if let Some(p) = old_parent {
            if let Some(parent) = self.nodes.get_mut(p)
                && let Some(i) = parent.children.iter().position(|&c| c == key)
            {
                parent.children.remove(i);
            }
            self.recompute_ancestor_bounds(p);
            self.emit(|l| {
                l.subtree_detached(p, key);
                l.child_removed(p, key);
            });
        }

        self.node_mut(new_parent)?.children.push(key);
        self.node_mut(key)?.parent = Some(new_parent);
        self.refresh(key);

        self.emit(|l| {
            l.child_added(new_parent, key);
            l.subtree_attached(new_parent, key);
        });
        Ok(())
    }

    /// Removes `key` and its whole subtree.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<()> {
        if key == self.root {
            return Err(RenderError::MissingArgument("a non-root node to remove"));
        }
        let parent = self.node(key)?.parent;

        for k in self.subtree(key) {
            self.nodes.remove(k);
        }

        if let Some(p) = parent {
            if let Some(parent_node) = self.nodes.get_mut(p)
                && let Some(i) = parent_node.children.iter().position(|&c| c == key)
            {
                parent_node.children.remove(i);
            }
            self.recompute_ancestor_bounds(p);
            self.emit(|l| {
                l.subtree_detached(p, key);
                l.child_removed(p, key);
            });
        }
        Ok(())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub fn set_name(&mut self, key: NodeKey, name: impl Into<String>) -> Result<()> {
        self.node_mut(key)?.name = name.into();
        self.emit(|l| l.property_changed(key));
        Ok(())
    }

    pub fn set_transform(&mut self, key: NodeKey, local: Affine3A) -> Result<()> {
        self.node_mut(key)?.local = local;
        self.refresh(key);
        self.emit(|l| l.transform_changed(key));
        Ok(())
    }

    pub fn set_visible(&mut self, key: NodeKey, visible: bool) -> Result<()> {
        self.node_mut(key)?.visible = visible;
        self.emit(|l| l.property_changed(key));
        Ok(())
    }

    /// Explicit draw-order hint, honored by `SortingPolicy::ByStatesOrdered`.
    pub fn set_order_hint(&mut self, key: NodeKey, hint: Option<i32>) -> Result<()> {
        self.node_mut(key)?.order_hint = hint;
        self.emit(|l| l.property_changed(key));
        Ok(())
    }

    fn shape_mut(&mut self, key: NodeKey) -> Result<&mut Shape> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Shape(shape) => Ok(shape),
            _ => Err(RenderError::WrongNodeKind {
                node: key,
                expected: "shape",
            }),
        }
    }

    pub fn set_appearance(&mut self, key: NodeKey, appearance: Appearance) -> Result<()> {
        self.shape_mut(key)?.appearance = appearance;
        self.emit(|l| l.component_changed(key));
        Ok(())
    }

    pub fn set_geometry_bounds(&mut self, key: NodeKey, bounds: Option<BoundingBox>) -> Result<()> {
        self.shape_mut(key)?.bounds = bounds;
        self.refresh(key);
        self.emit(|l| l.component_changed(key));
        Ok(())
    }

    pub fn select_switch(&mut self, key: NodeKey, selected: Option<usize>) -> Result<()> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Switch { selected: current } => *current = selected,
            _ => {
                return Err(RenderError::WrongNodeKind {
                    node: key,
                    expected: "switch",
                });
            }
        }
        self.emit(|l| l.switch_changed(key));
        Ok(())
    }

    // ========================================================================
    // World matrices & bounds
    // ========================================================================

    /// Recomputes world matrices below `key`, then bounds bottom-up through
    /// the subtree and its ancestors.
    fn refresh(&mut self, key: NodeKey) {
        let parent_world = self
            .nodes
            .get(key)
            .and_then(Node::parent)
            .and_then(|p| self.nodes.get(p))
            .map_or(Affine3A::IDENTITY, |p| p.world);

        let mut order = Vec::new();
        let mut stack = vec![(key, parent_world)];
        while let Some((k, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(k) else {
                continue;
            };
            node.world = parent_world * node.local;
            order.push(k);
            for &child in &node.children {
                stack.push((child, node.world));
            }
        }

        // Pre-order reversed visits children before parents.
        for &k in order.iter().rev() {
            self.recompute_bounds(k);
        }
        if let Some(parent) = self.nodes.get(key).and_then(Node::parent) {
            self.recompute_ancestor_bounds(parent);
        }
    }

    fn recompute_ancestor_bounds(&mut self, from: NodeKey) {
        let mut current = Some(from);
        while let Some(k) = current {
            self.recompute_bounds(k);
            current = self.nodes.get(k).and_then(Node::parent);
        }
    }

    fn recompute_bounds(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let mut bounds = node.own_bounds();
        for child in &node.children {
            if let Some(child) = self.nodes.get(*child) {
                bounds = bounds.union(child.bounds);
            }
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.bounds = bounds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn group_bounds_follow_children() {
        let mut scene = Scene::new();
        let group = scene.add_group(scene.root()).unwrap();
        let a = scene
            .add_shape(group, Shape::new(unit_box(), Appearance::default()))
            .unwrap();
        scene
            .set_transform(a, Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();

        let NodeBounds::Known(b) = scene.get(group).unwrap().bounds() else {
            panic!("group bound should be known");
        };
        assert_eq!(b.center(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn unbounded_shape_makes_ancestors_unknown() {
        let mut scene = Scene::new();
        let group = scene.add_group(scene.root()).unwrap();
        scene.add_shape(group, Shape::default()).unwrap();
        assert_eq!(scene.get(group).unwrap().bounds(), NodeBounds::Unknown);
        assert_eq!(scene.get(scene.root()).unwrap().bounds(), NodeBounds::Unknown);
    }

    #[test]
    fn parent_transform_moves_descendants() {
        let mut scene = Scene::new();
        let group = scene.add_group(scene.root()).unwrap();
        let shape = scene
            .add_shape(group, Shape::new(unit_box(), Appearance::default()))
            .unwrap();
        scene
            .set_transform(group, Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        let world: Vec3 = scene.get(shape).unwrap().world_transform().translation.into();
        assert_eq!(world, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn remove_node_drops_subtree() {
        let mut scene = Scene::new();
        let group = scene.add_group(scene.root()).unwrap();
        let child = scene.add_group(group).unwrap();
        scene.remove_node(group).unwrap();
        assert!(!scene.contains(group));
        assert!(!scene.contains(child));
        assert!(scene.get(scene.root()).unwrap().children().is_empty());
    }

    #[test]
    fn reparent_rejects_cycles() {
        let mut scene = Scene::new();
        let a = scene.add_group(scene.root()).unwrap();
        let b = scene.add_group(a).unwrap();
        assert!(scene.reparent(a, b).is_err());
        assert!(scene.reparent(b, scene.root()).is_ok());
        assert_eq!(scene.get(b).unwrap().parent(), Some(scene.root()));
    }
}
