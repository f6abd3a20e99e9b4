//! Error Types
//!
//! This module defines the error types used throughout the renderer core.
//!
//! # Overview
//!
//! The main error type [`RenderError`] groups failures by how the caller is
//! expected to react:
//! - Configuration errors: a precondition of the call was violated
//! - Resource-state errors: an object was used before it was attached
//! - Peer errors: the backend render peer reported a failure
//!
//! Transient conditions (a surface still drawing the previous frame) and
//! pick misses are never reported through this type.
//!
//! # Usage
//!
//! All public fallible APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, RenderError>`.
//!
//! ```rust,ignore
//! use strata::errors::{RenderError, Result};
//!
//! fn attach(renderer: &Renderer, pass: RenderPass) -> Result<PassKey> {
//!     renderer.add_pass(pass)
//! }
//! ```

use thiserror::Error;

use crate::renderer::pass::PassKey;
use crate::renderer::surface::{CanvasId, ViewKey};
use crate::scene::NodeKey;

/// The main error type for the renderer core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A required argument was not supplied.
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    /// A projection policy was set before any camera mode was established.
    #[error("Camera mode must be set before the projection policy")]
    CameraModeNotSet,

    /// A sorting policy name could not be parsed.
    #[error("Unknown sorting policy: {0}")]
    UnknownSortPolicy(String),

    /// `SortingPolicy::Custom` was requested by name with no sorter attached.
    #[error("The CUSTOM sorting policy requires an explicit sorter")]
    CustomPolicyWithoutSorter,

    /// The pass does not allow this mutation (e.g. culling on an overlay pass).
    #[error("Render pass '{pass}' does not allow {what}")]
    CapabilityDenied {
        /// Name of the pass that rejected the mutation
        pass: String,
        /// The rejected capability
        what: &'static str,
    },

    // ========================================================================
    // Resource-State Errors
    // ========================================================================
    /// The render pass is not attached to this renderer.
    #[error("Render pass {0:?} is not attached")]
    PassNotAttached(PassKey),

    /// The render pass is already attached.
    #[error("Render pass {0:?} is already attached")]
    PassAlreadyAttached(PassKey),

    /// The render target is already mapped to another pass.
    #[error("Render target is already bound to pass {0:?}")]
    TargetAlreadyBound(PassKey),

    /// The node does not exist in the scene.
    #[error("Scene node {0:?} does not exist")]
    UnknownNode(NodeKey),

    /// The node exists but is not of the kind the operation needs.
    #[error("Scene node {node:?} is not a {expected}")]
    WrongNodeKind {
        /// The offending node
        node: NodeKey,
        /// What the operation expected
        expected: &'static str,
    },

    /// The view is not registered with this renderer.
    #[error("View {0:?} does not exist")]
    UnknownView(ViewKey),

    /// The canvas is not registered with this renderer.
    #[error("Canvas {0:?} is not attached to a renderer")]
    CanvasNotAttached(CanvasId),

    /// The canvas has no backend peer (its context was already destroyed).
    #[error("Canvas {0:?} has no render peer")]
    NoPeer(CanvasId),

    /// An image buffer's dimensions do not match the read-back data.
    #[error("Invalid image buffer: expected {expected} bytes, got {actual}")]
    InvalidImageBuffer {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    // ========================================================================
    // Peer Errors
    // ========================================================================
    /// The backend render peer failed to draw or read back.
    #[error("Render peer error: {0}")]
    Peer(String),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
