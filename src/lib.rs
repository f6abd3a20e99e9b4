#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Strata
//!
//! Core of a retained-mode scene-graph renderer: render passes and render
//! targets, hierarchical frustum culling, render-bin sorting, a GPU state
//! cache and a per-context native resource registry, driven per frame by the
//! [`Renderer`].
//!
//! The crate never talks to a graphics API itself. Backends implement
//! [`renderer::RenderPeer`] (or a [`renderer::GraphicsDevice`] wrapped by the
//! reference [`renderer::StateCachingPeer`]).

pub mod errors;
pub mod math;
pub mod renderer;
pub mod scene;
pub mod utils;

pub use errors::{RenderError, Result};
pub use math::{BoundingBox, Frustum, Ray};
pub use renderer::{
    CanvasId, PassKey, RenderPass, RenderPassConfig, RenderServices, RenderTarget, Renderer,
    RendererSettings, SortingPolicy, ViewKey,
};
pub use scene::{Appearance, Camera, Node, NodeKey, Scene, Shape};
