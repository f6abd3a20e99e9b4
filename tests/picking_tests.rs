//! Picking Tests
//!
//! Tests for:
//! - Nearest and all-hits point picks through the renderer
//! - Rectangle picks
//! - Exactly-once listener delivery for hits, misses and teardown
//! - Picks waiting for a busy surface

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;

use common::{cube, renderer, RecordingPeer};
use strata::renderer::picking::{PickHit, PickListener, PickRegion, PickRequest};
use strata::renderer::RenderPass;
use strata::scene::{Appearance, Camera, NodeKey, Scene, Shape};

#[derive(Debug, Clone, PartialEq)]
enum Heard {
    One(NodeKey),
    Many(Vec<NodeKey>),
    Missed,
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Heard>>);

impl Recorder {
    fn heard(&self) -> Vec<Heard> {
        self.0.lock().clone()
    }
}

impl PickListener for Recorder {
    fn on_object_picked(&self, hit: PickHit, _elapsed_ms: f64) {
        self.0.lock().push(Heard::One(hit.node));
    }

    fn on_objects_picked(&self, hits: Vec<PickHit>, _elapsed_ms: f64) {
        self.0.lock().push(Heard::Many(hits.iter().map(|h| h.node).collect()));
    }

    fn on_picking_missed(&self, _elapsed_ms: f64) {
        self.0.lock().push(Heard::Missed);
    }
}

const CENTER: PickRegion = PickRegion::Point { x: 50.0, y: 50.0 };

/// Three cubes stacked along the view axis, farthest added first.
fn stacked_scene() -> (Scene, [NodeKey; 3]) {
    let mut scene = Scene::new();
    let root = scene.root();
    let far = cube(&mut scene, root, Vec3::new(0.0, 0.0, -15.0), Appearance::opaque(1));
    let mid = cube(&mut scene, root, Vec3::new(0.0, 0.0, -10.0), Appearance::opaque(1));
    let near = cube(&mut scene, root, Vec3::new(0.0, 0.0, -5.0), Appearance::opaque(1));
    (scene, [near, mid, far])
}

#[test]
fn nearest_pick_reports_only_the_closest_shape() {
    let (renderer, _) = renderer();
    let (scene, [near, _, _]) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (peer, peer_log) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();

    let hit = Arc::new(Recorder::default());
    let miss = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::nearest(vec![pass], CENTER, hit.clone()));
    renderer.queue_pick(
        canvas,
        PickRequest::nearest(vec![pass], PickRegion::Point { x: 2.0, y: 2.0 }, miss.clone()),
    );
    assert_eq!(renderer.pending_picks(), 2);

    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(renderer.pending_picks(), 0);
    assert_eq!(hit.heard(), vec![Heard::One(near)]);
    assert_eq!(miss.heard(), vec![Heard::Missed]);

    // Two pick submissions, then the frame itself.
    let submissions = peer_log.submissions.lock().clone();
    assert_eq!(submissions.len(), 3);
    assert!(submissions[0].picked && submissions[1].picked);
    assert!(!submissions[2].picked);

    // Delivered requests never fire again.
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(hit.heard().len(), 1);
    assert_eq!(miss.heard().len(), 1);
}

#[test]
fn all_pick_reports_every_shape_nearest_first() {
    let (renderer, _) = renderer();
    let (scene, [near, mid, far]) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (peer, _) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::all(vec![pass], CENTER, listener.clone()));
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(listener.heard(), vec![Heard::Many(vec![near, mid, far])]);
}

#[test]
fn rectangle_pick_collects_shapes_inside_the_region() {
    let (renderer, _) = renderer();
    let mut scene = Scene::new();
    let root = scene.root();
    let left = cube(&mut scene, root, Vec3::new(-3.0, 0.0, -10.0), Appearance::opaque(1));
    let right = cube(&mut scene, root, Vec3::new(3.0, 0.0, -10.0), Appearance::opaque(1));

    let view = renderer.add_view(Camera::default());
    let (peer, _) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", root, 1.0, 0.1, 100.0))
        .unwrap();

    // Left half of the surface.
    let region = PickRegion::Rect {
        x: 0.0,
        y: 0.0,
        width: 45.0,
        height: 100.0,
    };
    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::all(vec![pass], region, listener.clone()));
    renderer.render_once(canvas, &scene).unwrap();

    let heard = listener.heard();
    assert_eq!(heard, vec![Heard::Many(vec![left])]);
    assert!(!matches!(&heard[0], Heard::Many(nodes) if nodes.contains(&right)));
}

#[test]
fn unbounded_shapes_are_not_pickable() {
    let (renderer, _) = renderer();
    let mut scene = Scene::new();
    let root = scene.root();
    scene
        .add_shape(root, Shape {
            bounds: None,
            appearance: Appearance::opaque(1),
        })
        .unwrap();

    let view = renderer.add_view(Camera::default());
    let (peer, peer_log) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", root, 1.0, 0.1, 100.0))
        .unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::nearest(vec![pass], CENTER, listener.clone()));
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(listener.heard(), vec![Heard::Missed]);
    // Still drawn: culling fails open.
    assert_eq!(peer_log.draws()[0].passes[0].1.len(), 1);
}

#[test]
fn pick_on_a_detached_pass_misses() {
    let (renderer, _) = renderer();
    let (scene, _) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (peer, _) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();
    renderer.detach_pass(pass).unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::nearest(vec![pass], CENTER, listener.clone()));
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(listener.heard(), vec![Heard::Missed]);
}

#[test]
fn picks_wait_for_their_own_canvas() {
    let (renderer, _) = renderer();
    let (scene, [near, _, _]) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (first_peer, _) = RecordingPeer::new();
    let (second_peer, _) = RecordingPeer::new();
    let first = renderer.add_canvas(first_peer, view, 100, 100).unwrap();
    let second = renderer.add_canvas(second_peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(second, PickRequest::nearest(vec![pass], CENTER, listener.clone()));
    renderer.render_once(first, &scene).unwrap();
    assert!(listener.heard().is_empty());
    assert_eq!(renderer.pending_picks(), 1);

    renderer.render_once(second, &scene).unwrap();
    assert_eq!(listener.heard(), vec![Heard::One(near)]);
}

#[test]
fn destroying_a_canvas_resolves_its_picks_as_misses() {
    let (renderer, _) = renderer();
    let (scene, _) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (peer, _) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::all(vec![pass], CENTER, listener.clone()));
    renderer.destroy_canvas(canvas).unwrap();
    assert_eq!(listener.heard(), vec![Heard::Missed]);
    assert_eq!(renderer.pending_picks(), 0);
}

#[test]
fn picks_wait_for_the_surface_to_go_idle() {
    let (renderer, _) = renderer();
    let (scene, [near, _, _]) = stacked_scene();
    let view = renderer.add_view(Camera::default());
    let (peer, peer_log) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 100, 100).unwrap();
    let pass = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();

    let listener = Arc::new(Recorder::default());
    renderer.queue_pick(canvas, PickRequest::nearest(vec![pass], CENTER, listener.clone()));
    // The previous draw is still in flight for three polls.
    peer_log.busy_polls.store(3, Ordering::SeqCst);
    renderer.render_once(canvas, &scene).unwrap();

    assert_eq!(peer_log.overlapping.load(Ordering::SeqCst), 0);
    assert_eq!(peer_log.busy_polls.load(Ordering::SeqCst), 0);
    assert_eq!(listener.heard(), vec![Heard::One(near)]);
    assert_eq!(peer_log.submissions.lock().len(), 2);
}
