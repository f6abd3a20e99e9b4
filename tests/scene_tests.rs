//! Scene Integration Tests
//!
//! Tests for:
//! - Scene: add/remove nodes, reparenting, names
//! - World transforms and bounds kept current by the scene
//! - Change notifications delivered to listeners
//! - Switch nodes

mod common;

use glam::{Affine3A, Vec3};

use common::cube;
use strata::errors::RenderError;
use strata::renderer::changes::ChangeQueue;
use strata::scene::{Appearance, NodeBounds, ProgramId, Scene, SceneChange, TextureId};

// ============================================================================
// Structure
// ============================================================================

#[test]
fn scene_starts_with_a_root_group() {
    let scene = Scene::new();
    assert!(scene.is_empty());
    assert_eq!(scene.len(), 1);
    assert_eq!(scene.get(scene.root()).unwrap().name(), "Root");
    assert_eq!(scene.subtree(scene.root()), vec![scene.root()]);
}

#[test]
fn scene_subtree_is_depth_first() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add_group(root).unwrap();
    let a1 = cube(&mut scene, a, Vec3::ZERO, Appearance::opaque(1));
    let b = scene.add_group(root).unwrap();
    let a2 = cube(&mut scene, a, Vec3::ZERO, Appearance::opaque(1));

    assert_eq!(scene.subtree(root), vec![root, a, a1, a2, b]);
    assert!(scene.is_in_subtree(a2, root));
    assert!(!scene.is_in_subtree(b, a));
}

#[test]
fn shapes_cannot_have_children() {
    let mut scene = Scene::new();
    let root = scene.root();
    let shape = cube(&mut scene, root, Vec3::ZERO, Appearance::opaque(1));
    assert_eq!(
        scene.add_group(shape),
        Err(RenderError::WrongNodeKind {
            node: shape,
            expected: "group",
        })
    );
}

#[test]
fn scene_remove_node_drops_descendants() {
    let mut scene = Scene::new();
    let root = scene.root();
    let group = scene.add_group(root).unwrap();
    let child = cube(&mut scene, group, Vec3::ZERO, Appearance::opaque(1));

    scene.remove_node(group).unwrap();
    assert!(!scene.contains(group));
    assert!(!scene.contains(child));
    assert!(scene.get(root).unwrap().children().is_empty());
    assert!(scene.remove_node(root).is_err());
    assert_eq!(scene.remove_node(group), Err(RenderError::UnknownNode(group)));
}

#[test]
fn reparent_moves_world_transform_along() {
    let mut scene = Scene::new();
    let root = scene.root();
    let left = scene.add_group(root).unwrap();
    let right = scene.add_group(root).unwrap();
    scene
        .set_transform(right, Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)))
        .unwrap();
    let shape = cube(&mut scene, left, Vec3::new(1.0, 0.0, 0.0), Appearance::opaque(1));

    scene.reparent(shape, right).unwrap();
    let world = scene.get(shape).unwrap().world_transform();
    assert_eq!(Vec3::from(world.translation), Vec3::new(11.0, 0.0, 0.0));
    assert_eq!(scene.get(shape).unwrap().parent(), Some(right));
    assert!(scene.get(left).unwrap().children().is_empty());

    assert!(scene.reparent(right, shape).is_err());
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn group_bounds_track_moving_children() {
    let mut scene = Scene::new();
    let root = scene.root();
    let group = scene.add_group(root).unwrap();
    let shape = cube(&mut scene, group, Vec3::ZERO, Appearance::opaque(1));

    scene
        .set_transform(shape, Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0)))
        .unwrap();
    let NodeBounds::Known(bounds) = scene.get(group).unwrap().bounds() else {
        panic!("group with a bounded child has known bounds");
    };
    assert!((bounds.center() - Vec3::new(0.0, 5.0, 0.0)).length() < 1e-5);

    scene.remove_node(shape).unwrap();
    assert_eq!(scene.get(group).unwrap().bounds(), NodeBounds::Empty);
}

#[test]
fn clearing_geometry_bounds_makes_ancestors_unknown() {
    let mut scene = Scene::new();
    let root = scene.root();
    let shape = cube(&mut scene, root, Vec3::ZERO, Appearance::opaque(1));

    scene.set_geometry_bounds(shape, None).unwrap();
    assert_eq!(scene.get(root).unwrap().bounds(), NodeBounds::Unknown);
    assert!(scene.get(shape).unwrap().bounds().known().is_none());
}

// ============================================================================
// Notifications
// ============================================================================

#[test]
fn every_mutation_is_reported() {
    let queue = ChangeQueue::new();
    let mut scene = Scene::new();
    scene.add_listener(queue.listener());
    let root = scene.root();

    let group = scene.add_group(root).unwrap();
    scene.set_name(group, "Props").unwrap();
    scene.set_transform(group, Affine3A::IDENTITY).unwrap();
    scene.remove_node(group).unwrap();

    assert_eq!(
        queue.drain(),
        vec![
            SceneChange::ChildAdded { group: root, child: group },
            SceneChange::SubtreeAttached { parent: root, root: group },
            SceneChange::PropertyChanged { node: group },
            SceneChange::TransformChanged { node: group },
            SceneChange::SubtreeDetached { parent: root, root: group },
            SceneChange::ChildRemoved { group: root, child: group },
        ]
    );
    assert_eq!(queue.pending(), 0);
}

#[test]
fn appearance_changes_are_component_changes() {
    let queue = ChangeQueue::new();
    let mut scene = Scene::new();
    let root = scene.root();
    let shape = cube(&mut scene, root, Vec3::ZERO, Appearance::opaque(1));
    scene.add_listener(queue.listener());

    scene.set_appearance(shape, Appearance::opaque(2)).unwrap();
    let change = queue.drain()[0];
    assert_eq!(change, SceneChange::ComponentChanged { node: shape });
    assert!(!change.is_structural());
    assert_eq!(change.anchor(), shape);

    assert!(scene.set_appearance(root, Appearance::opaque(3)).is_err());
}

#[test]
fn appearance_with_texture_units_survives_serde() -> anyhow::Result<()> {
    let appearance = Appearance::opaque(4)
        .with_program(ProgramId(7))
        .with_texture(TextureId(1))
        .with_texture(TextureId(2));

    let json = serde_json::to_string(&appearance)?;
    let back: Appearance = serde_json::from_str(&json)?;
    assert_eq!(back, appearance);
    assert_eq!(back.textures.as_slice(), &[TextureId(1), TextureId(2)]);
    Ok(())
}

// ============================================================================
// Switches
// ============================================================================

#[test]
fn switch_selection_is_structural() {
    let queue = ChangeQueue::new();
    let mut scene = Scene::new();
    let root = scene.root();
    let switch = scene.add_switch(root, Some(0)).unwrap();
    let first = cube(&mut scene, switch, Vec3::ZERO, Appearance::opaque(1));
    let second = cube(&mut scene, switch, Vec3::ZERO, Appearance::opaque(2));
    assert_eq!(scene.get(switch).unwrap().active_children(), &[first]);

    scene.add_listener(queue.listener());
    scene.select_switch(switch, Some(1)).unwrap();
    assert_eq!(scene.get(switch).unwrap().active_children(), &[second]);
    scene.select_switch(switch, None).unwrap();
    assert!(scene.get(switch).unwrap().active_children().is_empty());

    let changes = queue.drain();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(SceneChange::is_structural));
    assert!(scene.select_switch(root, Some(0)).is_err());
}
