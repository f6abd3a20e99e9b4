//! Native Resource Tests
//!
//! Tests for:
//! - Lazy handle creation per (owner, context)
//! - Exactly-once destruction on context teardown
//! - Canvas teardown through the renderer
//! - Freeing the resources of one pass
//! - Screenshots

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use glam::Vec3;

use common::{count_calls, cube, renderer, DeviceCall, RecordedDeletes, RecordingDevice, RecordingPeer};
use strata::errors::RenderError;
use strata::renderer::device::TrackedDevice;
use strata::renderer::resources::{HandleDeleter, NativeHandle, ResourceKind, ResourceOwner, ResourceRegistry};
use strata::renderer::target::{ImageBuffer, PixelFormat};
use strata::renderer::{CanvasId, RenderPass, StateCachingPeer};
use strata::scene::{Appearance, Camera, ProgramId, Scene, TextureId};

const TEXTURE: &[ResourceKind] = &[ResourceKind::Texture, ResourceKind::Framebuffer];

// ============================================================================
// Registry
// ============================================================================

#[test]
fn handles_are_created_once_per_context() {
    let registry = ResourceRegistry::new();
    let owner = ResourceOwner::from(TextureId(1));
    let mut next = 10;
    let mut create = |_: ResourceKind| {
        next += 1;
        NativeHandle(next)
    };

    let a = registry.get_or_create(owner, CanvasId(0), TEXTURE, 0, &mut create);
    let again = registry.get_or_create(owner, CanvasId(0), TEXTURE, 0, &mut create);
    let other = registry.get_or_create(owner, CanvasId(1), TEXTURE, 0, &mut create);
    assert_eq!(a, again);
    assert_ne!(a, other);
    assert_eq!(registry.handle(owner, CanvasId(0), 1), NativeHandle::UNSET);
    assert_eq!(registry.live_handles(CanvasId(0)), 1);
    assert_eq!(registry.live_handles(CanvasId(1)), 1);
}

#[test]
fn context_teardown_frees_each_handle_once() {
    let registry = ResourceRegistry::new();
    let texture = ResourceOwner::from(TextureId(1));
    let program = ResourceOwner::from(ProgramId(2));
    registry.get_or_create(texture, CanvasId(0), TEXTURE, 0, |_| NativeHandle(1));
    registry.get_or_create(texture, CanvasId(0), TEXTURE, 1, |_| NativeHandle(2));
    registry.get_or_create(program, CanvasId(0), &[ResourceKind::Program], 0, |_| NativeHandle(3));
    registry.get_or_create(program, CanvasId(1), &[ResourceKind::Program], 0, |_| NativeHandle(9));

    let deletes = RecordedDeletes::default();
    let mut deleter = RecordedDeletes(deletes.0.clone());
    assert_eq!(registry.destroy_context(CanvasId(0), &mut deleter), 3);
    assert_eq!(registry.destroy_context(CanvasId(0), &mut deleter), 0);

    let mut freed = deletes.0.lock().clone();
    freed.sort_by_key(|(_, h)| h.0);
    assert_eq!(
        freed,
        vec![
            (ResourceKind::Texture, NativeHandle(1)),
            (ResourceKind::Framebuffer, NativeHandle(2)),
            (ResourceKind::Program, NativeHandle(3)),
        ]
    );
    // The other context is untouched.
    assert_eq!(registry.live_handles(CanvasId(1)), 1);
}

#[test]
fn destroying_an_unset_slot_is_a_no_op() {
    let registry = ResourceRegistry::new();
    let owner = ResourceOwner::from(TextureId(5));
    let mut deleter = RecordedDeletes::default();

    assert!(!registry.destroy_slot(owner, CanvasId(0), 0, &mut deleter));
    assert!(registry.ensure(owner, CanvasId(0), TEXTURE));
    assert!(!registry.ensure(owner, CanvasId(0), TEXTURE));
    assert!(!registry.destroy_slot(owner, CanvasId(0), 1, &mut deleter));

    assert!(registry.set_handle(owner, CanvasId(0), 1, NativeHandle(4)));
    assert!(registry.destroy_slot(owner, CanvasId(0), 1, &mut deleter));
    assert!(!registry.destroy_slot(owner, CanvasId(0), 1, &mut deleter));
    assert_eq!(*deleter.0.lock(), vec![(ResourceKind::Framebuffer, NativeHandle(4))]);
}

#[test]
fn deleted_handle_is_forgotten_by_the_state_cache() {
    let (device, log) = RecordingDevice::new();
    let mut tracked = TrackedDevice::new(device);

    tracked.use_program(NativeHandle(3));
    tracked.delete_handle(ResourceKind::Program, NativeHandle(3));
    // A recycled handle with the same value must be bound again.
    tracked.use_program(NativeHandle(3));
    assert_eq!(count_calls(&log, |c| matches!(c, DeviceCall::UseProgram(_))), 2);
}

// ============================================================================
// Through the renderer
// ============================================================================

fn textured_scene() -> Scene {
    let mut scene = Scene::new();
    let root = scene.root();
    let appearance = Appearance::opaque(1)
        .with_program(ProgramId(1))
        .with_texture(TextureId(2));
    cube(&mut scene, root, Vec3::new(0.0, 0.0, -5.0), appearance.clone());
    cube(&mut scene, root, Vec3::new(1.0, 0.0, -5.0), appearance);
    scene
}

#[test]
fn destroying_a_canvas_frees_its_context() {
    let (renderer, services) = renderer();
    let scene = textured_scene();
    let view = renderer.add_view(Camera::default());
    let (device, log) = RecordingDevice::new();
    let canvas = renderer
        .add_canvas(Box::new(StateCachingPeer::new(device, services.clone())), view, 64, 64)
        .unwrap();
    renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(services.resources.live_handles(canvas), 2);

    assert_eq!(renderer.destroy_canvas(canvas), Ok(2));
    assert_eq!(count_calls(&log, |c| matches!(c, DeviceCall::Delete(..))), 2);
    assert_eq!(services.resources.live_handles(canvas), 0);
    assert_eq!(
        renderer.destroy_canvas(canvas),
        Err(RenderError::CanvasNotAttached(canvas))
    );
    assert_eq!(count_calls(&log, |c| matches!(c, DeviceCall::Delete(..))), 2);
}

#[test]
fn canvas_teardown_resets_the_peer_and_recycles_the_id() {
    let (renderer, services) = renderer();
    let view = renderer.add_view(Camera::default());
    let (peer, peer_log) = RecordingPeer::new();
    let canvas = renderer.add_canvas(peer, view, 10, 10).unwrap();
    services
        .resources
        .get_or_create(ResourceOwner::from(TextureId(1)), canvas, TEXTURE, 0, |_| NativeHandle(7));

    assert_eq!(renderer.destroy_canvas(canvas), Ok(1));
    assert_eq!(peer_log.invalidations.load(Ordering::SeqCst), 1);
    assert_eq!(*peer_log.deletes.lock(), vec![(ResourceKind::Texture, NativeHandle(7))]);

    let (peer, _) = RecordingPeer::new();
    assert_eq!(renderer.add_canvas(peer, view, 10, 10), Ok(canvas));
    assert_eq!(services.resources.live_handles(canvas), 0);
}

#[test]
fn freeing_a_pass_releases_its_subtree_handles() {
    let (renderer, services) = renderer();
    let mut scene = textured_scene();
    let other_root = scene.add_group(scene.root()).unwrap();
    let lonely = Appearance::opaque(3).with_program(ProgramId(8));
    cube(&mut scene, other_root, Vec3::new(0.0, 1.0, -5.0), lonely);

    let view = renderer.add_view(Camera::default());
    let (device, _) = RecordingDevice::new();
    let canvas = renderer
        .add_canvas(Box::new(StateCachingPeer::new(device, Arc::clone(&services))), view, 64, 64)
        .unwrap();
    let main = renderer
        .add_pass(RenderPass::perspective("main", scene.root(), 1.0, 0.1, 100.0))
        .unwrap();
    let other = renderer
        .add_pass(RenderPass::perspective("other", other_root, 1.0, 0.1, 100.0))
        .unwrap();
    renderer.render_once(canvas, &scene).unwrap();
    assert_eq!(services.resources.live_handles(canvas), 3);

    assert_eq!(renderer.free_pass_resources(other, canvas, &scene), Ok(1));
    assert_eq!(services.resources.live_handles(canvas), 2);
    assert_eq!(renderer.free_pass_resources(main, canvas, &scene), Ok(2));
    assert_eq!(renderer.free_pass_resources(main, canvas, &scene), Ok(0));
    assert_eq!(services.resources.live_handles(canvas), 0);

    assert_eq!(
        renderer.free_pass_resources(main, CanvasId(42), &scene),
        Err(RenderError::CanvasNotAttached(CanvasId(42)))
    );
}

#[test]
fn screenshot_reads_the_default_framebuffer() {
    let (renderer, services) = renderer();
    let view = renderer.add_view(Camera::default());
    let (device, log) = RecordingDevice::new();
    let canvas = renderer
        .add_canvas(Box::new(StateCachingPeer::new(device, services)), view, 2, 2)
        .unwrap();

    let buffer = ImageBuffer::new(2, 2, PixelFormat::Rgba8);
    renderer.take_screenshot(canvas, &buffer, false).unwrap();

    assert_eq!(
        count_calls(&log, |c| matches!(c, DeviceCall::ReadPixels(_, PixelFormat::Rgb8))),
        1
    );
    // Opaque RGB rows, bottom row first.
    assert_eq!(buffer.pixels(), vec![0xFF01_0101, 0xFF01_0101, 0xFF00_0000, 0xFF00_0000]);

    assert_eq!(
        renderer.take_screenshot(CanvasId(99), &buffer, true),
        Err(RenderError::CanvasNotAttached(CanvasId(99)))
    );
}
