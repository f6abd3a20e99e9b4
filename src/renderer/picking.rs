//! Picking
//!
//! A [`PickRequest`] asks which shapes of some render passes lie under a
//! screen point or rectangle. The renderer services queued requests at the
//! start of the next frame: it turns the region into a world-space ray (point)
//! or sub-frustum (rectangle), walks each named pass with the culler's
//! traversal, and lets the peer pick the winner among the candidates.
//!
//! Each request is consumed by [`PickRequest::deliver`], so its listener is
//! called exactly once: with the hit(s), or with a miss.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};

use crate::math::{Frustum, Ray};
use crate::renderer::bin::ViewInfo;
use crate::renderer::culler::FrustumCuller;
use crate::renderer::pass::PassKey;
use crate::renderer::pass_config::Viewport;
use crate::scene::{NodeKey, Scene};

/// Screen region in pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickRegion {
    Point { x: f32, y: f32 },
    Rect { x: f32, y: f32, width: f32, height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    Nearest,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub pass: PassKey,
    pub node: NodeKey,
    /// Ray distance for point picks, eye distance for rectangle picks.
    pub distance: f32,
}

/// Receives the outcome of a pick request.
pub trait PickListener: Send + Sync {
    fn on_object_picked(&self, _hit: PickHit, _elapsed_ms: f64) {}
    fn on_objects_picked(&self, _hits: Vec<PickHit>, _elapsed_ms: f64) {}
    fn on_picking_missed(&self, _elapsed_ms: f64) {}
}

/// What the peer decided a pick resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    Nearest(Option<PickHit>),
    All(Vec<PickHit>),
}

/// Data handed to the peer for one pick: the region, the mode and the
/// candidates the core's traversal found.
#[derive(Debug, Clone)]
pub struct PickQuery {
    pub region: PickRegion,
    pub mode: PickMode,
    pub candidates: Vec<PickHit>,
}

impl PickQuery {
    /// Orders candidates by distance; nearest keeps the first.
    pub fn resolve_by_distance(&self) -> PickOutcome {
        let mut hits = self.candidates.clone();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        match self.mode {
            PickMode::Nearest => PickOutcome::Nearest(hits.into_iter().next()),
            PickMode::All => PickOutcome::All(hits),
        }
    }
}

pub struct PickRequest {
    passes: Vec<PassKey>,
    region: PickRegion,
    mode: PickMode,
    listener: Arc<dyn PickListener>,
    submitted: Instant,
}

impl fmt::Debug for PickRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickRequest")
            .field("passes", &self.passes)
            .field("region", &self.region)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PickRequest {
    #[must_use]
    pub fn new(
        passes: Vec<PassKey>,
        region: PickRegion,
        mode: PickMode,
        listener: Arc<dyn PickListener>,
    ) -> Self {
        Self {
            passes,
            region,
            mode,
            listener,
            submitted: Instant::now(),
        }
    }

    #[must_use]
    pub fn nearest(passes: Vec<PassKey>, region: PickRegion, listener: Arc<dyn PickListener>) -> Self {
        Self::new(passes, region, PickMode::Nearest, listener)
    }

    #[must_use]
    pub fn all(passes: Vec<PassKey>, region: PickRegion, listener: Arc<dyn PickListener>) -> Self {
        Self::new(passes, region, PickMode::All, listener)
    }

    pub fn passes(&self) -> &[PassKey] {
        &self.passes
    }

    pub fn region(&self) -> PickRegion {
        self.region
    }

    pub fn mode(&self) -> PickMode {
        self.mode
    }

    pub fn query(&self, candidates: Vec<PickHit>) -> PickQuery {
        PickQuery {
            region: self.region,
            mode: self.mode,
            candidates,
        }
    }

    /// Calls the listener once and consumes the request.
    pub fn deliver(self, outcome: PickOutcome) {
        let elapsed_ms = self.submitted.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            PickOutcome::Nearest(Some(hit)) => self.listener.on_object_picked(hit, elapsed_ms),
            PickOutcome::All(hits) if !hits.is_empty() => {
                self.listener.on_objects_picked(hits, elapsed_ms);
            }
            PickOutcome::Nearest(None) | PickOutcome::All(_) => {
                self.listener.on_picking_missed(elapsed_ms);
            }
        }
    }
}

/// World-space pick shape derived from a screen region.
#[derive(Debug, Clone, Copy)]
pub enum PickShape {
    Ray(Ray),
    Volume(Frustum),
}

/// Pick matrix mapping the NDC rectangle `center +- half` onto the full
/// clip volume.
pub fn pick_matrix(center_ndc: (f32, f32), half_ndc: (f32, f32)) -> Mat4 {
    let sx = 1.0 / half_ndc.0.max(f32::EPSILON);
    let sy = 1.0 / half_ndc.1.max(f32::EPSILON);
    Mat4::from_scale(Vec3::new(sx, sy, 1.0))
        * Mat4::from_translation(Vec3::new(-center_ndc.0, -center_ndc.1, 0.0))
}

/// Maps a surface pixel into the NDC of `viewport`.
fn to_ndc(x: f32, y: f32, viewport: Viewport) -> (f32, f32) {
    let w = viewport.width.max(1) as f32;
    let h = viewport.height.max(1) as f32;
    let x = x - viewport.x as f32;
    let y = y - viewport.y as f32;
    (x / w * 2.0 - 1.0, 1.0 - y / h * 2.0)
}

impl PickShape {
    /// Builds the pick shape of `region` for a pass drawn into `viewport`.
    pub fn from_region(region: PickRegion, viewport: Viewport, view_projection: &Mat4) -> Self {
        match region {
            PickRegion::Point { x, y } => {
                let (nx, ny) = to_ndc(x, y, viewport);
                PickShape::Ray(Ray::from_ndc(nx, ny, view_projection))
            }
            PickRegion::Rect {
                x,
                y,
                width: rw,
                height: rh,
            } => {
                let (x0, y0) = to_ndc(x, y, viewport);
                let (x1, y1) = to_ndc(x + rw, y + rh, viewport);
                let center = ((x0 + x1) * 0.5, (y0 + y1) * 0.5);
                let half = ((x1 - x0).abs() * 0.5, (y1 - y0).abs() * 0.5);
                PickShape::Volume(Frustum::from_matrix(pick_matrix(center, half) * *view_projection))
            }
        }
    }

    /// Appends every shape of `root` the pick shape touches.
    pub fn collect(
        &self,
        culler: &mut FrustumCuller,
        scene: &Scene,
        pass: PassKey,
        root: NodeKey,
        view: &ViewInfo,
        out: &mut Vec<PickHit>,
    ) {
        match self {
            PickShape::Ray(ray) => {
                culler.traverse(scene, root, Some(ray), |node_key, node, _| {
                    // Shapes without a bound cannot be ray tested.
                    if let Some(bounds) = node.bounds().known()
                        && let Some(distance) = ray.intersect_box(&bounds)
                    {
                        out.push(PickHit {
                            pass,
                            node: node_key,
                            distance,
                        });
                    }
                });
            }
            PickShape::Volume(frustum) => {
                culler.traverse(scene, root, Some(frustum), |node_key, node, _| {
                    let Some(bounds) = node.bounds().known() else {
                        return;
                    };
                    out.push(PickHit {
                        pass,
                        node: node_key,
                        distance: view.depth_of(bounds.center()),
                    });
                });
            }
        }
    }
}
