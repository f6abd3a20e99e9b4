//! Scene modification notifications.
//!
//! The scene graph calls a [`SceneListener`] for every mutation. The renderer
//! implements the listener to learn which render passes need re-culling
//! without touching render-bin state from the mutating thread.

use crate::scene::NodeKey;

/// One recorded scene mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    SubtreeAttached { parent: NodeKey, root: NodeKey },
    SubtreeDetached { parent: NodeKey, root: NodeKey },
    PropertyChanged { node: NodeKey },
    ChildAdded { group: NodeKey, child: NodeKey },
    ChildRemoved { group: NodeKey, child: NodeKey },
    TransformChanged { node: NodeKey },
    ComponentChanged { node: NodeKey },
    SwitchChanged { node: NodeKey },
}

impl SceneChange {
    /// Structural changes alter which nodes a traversal visits.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SceneChange::SubtreeAttached { .. }
                | SceneChange::SubtreeDetached { .. }
                | SceneChange::ChildAdded { .. }
                | SceneChange::ChildRemoved { .. }
                | SceneChange::SwitchChanged { .. }
        )
    }

    /// The node whose render-pass membership decides who must re-cull.
    ///
    /// For attach/detach this is the parent, which stays in the scene even
    /// when the child subtree is gone.
    pub fn anchor(&self) -> NodeKey {
        match *self {
            SceneChange::SubtreeAttached { parent, .. }
            | SceneChange::SubtreeDetached { parent, .. } => parent,
            SceneChange::ChildAdded { group, .. } | SceneChange::ChildRemoved { group, .. } => {
                group
            }
            SceneChange::PropertyChanged { node }
            | SceneChange::TransformChanged { node }
            | SceneChange::ComponentChanged { node }
            | SceneChange::SwitchChanged { node } => node,
        }
    }
}

/// Callback interface invoked by the scene graph on every mutation.
///
/// Implementations must be cheap and thread-safe: they run on whatever
/// thread mutates the scene.
pub trait SceneListener: Send + Sync {
    fn notify(&self, change: SceneChange);

    fn subtree_attached(&self, parent: NodeKey, root: NodeKey) {
        self.notify(SceneChange::SubtreeAttached { parent, root });
    }

    fn subtree_detached(&self, parent: NodeKey, root: NodeKey) {
        self.notify(SceneChange::SubtreeDetached { parent, root });
    }

    fn property_changed(&self, node: NodeKey) {
        self.notify(SceneChange::PropertyChanged { node });
    }

    fn child_added(&self, group: NodeKey, child: NodeKey) {
        self.notify(SceneChange::ChildAdded { group, child });
    }

    fn child_removed(&self, group: NodeKey, child: NodeKey) {
        self.notify(SceneChange::ChildRemoved { group, child });
    }

    fn transform_changed(&self, node: NodeKey) {
        self.notify(SceneChange::TransformChanged { node });
    }

    fn component_changed(&self, node: NodeKey) {
        self.notify(SceneChange::ComponentChanged { node });
    }

    fn switch_changed(&self, node: NodeKey) {
        self.notify(SceneChange::SwitchChanged { node });
    }
}
