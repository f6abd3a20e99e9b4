use glam::Affine3A;

use crate::math::BoundingBox;
use crate::scene::NodeKey;
use crate::scene::material::Appearance;

/// A drawable leaf: geometry bounds plus the state needed to draw it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    /// Local-space bounds of the geometry. `None` means the geometry never
    /// computed a bound; culling then treats the shape as always visible.
    pub bounds: Option<BoundingBox>,
    pub appearance: Appearance,
}

impl Shape {
    #[must_use]
    pub fn new(bounds: BoundingBox, appearance: Appearance) -> Self {
        Self {
            bounds: Some(bounds),
            appearance,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    /// Group drawing at most one child.
    Switch { selected: Option<usize> },
    Shape(Shape),
}

/// World-space bound of a node's subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeBounds {
    /// Subtree has no geometry.
    Empty,
    Known(BoundingBox),
    /// Some geometry below has no usable bound.
    Unknown,
}

impl NodeBounds {
    #[inline]
    pub fn known(self) -> Option<BoundingBox> {
        match self {
            NodeBounds::Known(b) => Some(b),
            NodeBounds::Empty | NodeBounds::Unknown => None,
        }
    }

    #[must_use]
    pub fn union(self, other: NodeBounds) -> NodeBounds {
        match (self, other) {
            (NodeBounds::Unknown, _) | (_, NodeBounds::Unknown) => NodeBounds::Unknown,
            (NodeBounds::Empty, b) | (b, NodeBounds::Empty) => b,
            (NodeBounds::Known(a), NodeBounds::Known(b)) => NodeBounds::Known(a.union(&b)),
        }
    }
}

/// A scene graph node.
///
/// Hierarchy, local transform and kind are authored; the world matrix and
/// world bounds are maintained by [`Scene`](crate::scene::Scene) on every
/// mutation so the render thread only ever reads them.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) kind: NodeKind,
    pub(crate) local: Affine3A,
    pub(crate) world: Affine3A,
    pub(crate) bounds: NodeBounds,
    pub(crate) visible: bool,
    pub(crate) order_hint: Option<i32>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            kind,
            local: Affine3A::IDENTITY,
            world: Affine3A::IDENTITY,
            bounds: NodeBounds::Empty,
            visible: true,
            order_hint: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn shape(&self) -> Option<&Shape> {
        match &self.kind {
            NodeKind::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    #[inline]
    pub fn local_transform(&self) -> &Affine3A {
        &self.local
    }

    #[inline]
    pub fn world_transform(&self) -> &Affine3A {
        &self.world
    }

    #[inline]
    pub fn bounds(&self) -> NodeBounds {
        self.bounds
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[inline]
    pub fn order_hint(&self) -> Option<i32> {
        self.order_hint
    }

    /// Children that take part in rendering: all of them for groups, the
    /// selected one for switches, none for shapes.
    pub fn active_children(&self) -> &[NodeKey] {
        match self.kind {
            NodeKind::Group => &self.children,
            NodeKind::Switch { selected: Some(i) } if i < self.children.len() => {
                &self.children[i..=i]
            }
            NodeKind::Switch { .. } | NodeKind::Shape(_) => &[],
        }
    }

    /// Bound of this node alone (shapes only), in world space.
    pub(crate) fn own_bounds(&self) -> NodeBounds {
        match &self.kind {
            NodeKind::Shape(shape) => match shape.bounds {
                Some(local) => {
                    let world = local.transform(&self.world);
                    if world.is_valid() {
                        NodeBounds::Known(world)
                    } else {
                        NodeBounds::Unknown
                    }
                }
                None => NodeBounds::Unknown,
            },
            NodeKind::Group | NodeKind::Switch { .. } => NodeBounds::Empty,
        }
    }
}
