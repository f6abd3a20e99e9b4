//! Scene graph module
//!
//! The minimal retained scene the renderer culls and draws:
//! - [`Scene`]: node arena with a single root, keeps world matrices and
//!   bounds current and reports every mutation to its listeners
//! - [`Node`]: group, switch or shape
//! - [`Appearance`]: the render state of a shape
//! - [`Camera`]: viewer position and orientation
//! - [`SceneListener`]: change-notification contract

pub mod camera;
pub mod material;
pub mod node;
pub mod notify;
pub mod scene;

pub use camera::Camera;
pub use material::{Appearance, BlendMode, BufferId, CullFace, ProgramId, TextureId};
pub use node::{Node, NodeBounds, NodeKind, Shape};
pub use notify::{SceneChange, SceneListener};
pub use scene::Scene;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
}
