//! Geometry primitives shared by culling, sorting and picking.
//!
//! - [`BoundingBox`] / [`BoundingSphere`]: world and local bounds
//! - [`Frustum`]: plane extraction and volume classification
//! - [`Ray`]: pick rays and eye-ray intersection

pub mod bounds;
pub mod frustum;
pub mod ray;

pub use bounds::{BoundingBox, BoundingSphere};
pub use frustum::{ALL_PLANES, Containment, Frustum, PlaneMask};
pub use ray::Ray;
