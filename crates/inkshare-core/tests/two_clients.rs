//! Two participants drawing on one shared store.

use inkshare_core::record::{ObjectId, ObjectRecord};
use inkshare_core::remote::{Entries, MemoryStore, RemoteStore};
use inkshare_core::scene::{Scene, SceneAdapter};
use inkshare_core::shapes::{Freehand, Shape};
use inkshare_core::{ToolKind, WhiteboardManager};
use kurbo::Point;

type Manager = WhiteboardManager<Scene, MemoryStore>;

fn pair() -> (Manager, Manager) {
    let store = MemoryStore::new();
    let mut alice = WhiteboardManager::new(Scene::new(), store.connect(), "room", "alice");
    let mut bob = WhiteboardManager::new(Scene::new(), store.connect(), "room", "bob");
    assert!(alice.start_sync());
    assert!(bob.start_sync());
    (alice, bob)
}

fn ids(m: &Manager) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = m.scene().tagged().into_iter().map(|(_, id)| id).collect();
    ids.sort();
    ids
}

fn remote(m: &Manager) -> Entries {
    m.store().read(m.namespace()).unwrap()
}

#[test]
fn test_shapes_propagate_both_ways() {
    let (mut alice, mut bob) = pair();

    alice.set_tool(ToolKind::Rectangle);
    let rect = alice.draw_shape(Point::new(0.0, 0.0), Point::new(30.0, 30.0)).unwrap();
    bob.poll();
    assert!(bob.scene().find(&rect).is_some());

    bob.set_tool(ToolKind::Circle);
    let circle = bob.draw_shape(Point::new(100.0, 0.0), Point::new(120.0, 0.0)).unwrap();
    alice.poll();
    bob.poll();

    assert_eq!(ids(&alice), ids(&bob));
    assert_eq!(alice.scene().len(), 2);
    assert!(alice.scene().find(&circle).is_some());
}

#[test]
fn test_own_echo_is_not_duplicated() {
    let (mut alice, _bob) = pair();
    alice.set_tool(ToolKind::Line);
    alice.draw_shape(Point::new(0.0, 0.0), Point::new(10.0, 10.0)).unwrap();
    let renders = alice.scene().render_count();

    let report = alice.poll();
    assert!(!report.changed());
    assert_eq!(alice.scene().len(), 1);
    assert_eq!(alice.scene().render_count(), renders);

    alice.poll();
    assert_eq!(alice.scene().len(), 1);
    assert_eq!(alice.bridge().loaded_ids().len(), 1);
}

#[test]
fn test_remote_erase_and_undo() {
    let (mut alice, mut bob) = pair();
    alice.set_tool(ToolKind::Line);
    let line = alice.draw_shape(Point::new(0.0, 50.0), Point::new(100.0, 50.0)).unwrap();
    bob.poll();

    let stroke = bob.scene_mut().add(
        Shape::Freehand(Freehand::from_points(vec![Point::new(50.0, 0.0), Point::new(50.0, 100.0)])),
        None,
    );
    assert!(bob.erase_objects(stroke));
    alice.poll();
    assert!(alice.scene().find(&line).is_none());

    assert!(bob.undo());
    alice.poll();
    assert!(alice.scene().find(&line).is_some());
    assert_eq!(ids(&alice), ids(&bob));
}

#[test]
fn test_remote_clear_keeps_text_under_edit() {
    let (mut alice, mut bob) = pair();
    bob.set_tool(ToolKind::Rectangle);
    bob.draw_shape(Point::new(0.0, 0.0), Point::new(20.0, 20.0)).unwrap();
    alice.poll();
    assert_eq!(alice.scene().len(), 1);

    let label = alice.add_text(Point::new(5.0, 5.0), Some("draft")).unwrap();
    assert!(bob.clear_canvas());
    alice.poll();
    assert_eq!(ids(&alice), vec![label.clone()]);

    assert!(alice.finish_text_edit());
    bob.poll();
    assert!(bob.scene().find(&label).is_some());
}

#[test]
fn test_remote_adds_wait_for_stroke_end() {
    let (mut alice, mut bob) = pair();

    alice.pointer_down(Point::new(0.0, 0.0));
    alice.pointer_move(Point::new(10.0, 10.0));

    bob.set_tool(ToolKind::Circle);
    let circle = bob.draw_shape(Point::new(200.0, 200.0), Point::new(220.0, 200.0)).unwrap();
    let report = alice.poll();
    assert!(report.deferred);
    assert!(alice.scene().find(&circle).is_none());

    alice.pointer_up(Point::new(20.0, 0.0));
    assert!(alice.scene().find(&circle).is_some());
    alice.poll();
    bob.poll();
    assert_eq!(ids(&alice), ids(&bob));
    assert_eq!(remote(&alice).len(), 2);
}

#[test]
fn test_late_joiner_loads_everything() {
    let store = MemoryStore::new();
    let mut alice = WhiteboardManager::new(Scene::new(), store.connect(), "room", "alice");
    alice.set_tool(ToolKind::Line);
    for i in 0..3 {
        let y = i as f64 * 10.0;
        alice.draw_shape(Point::new(0.0, y), Point::new(50.0, y)).unwrap();
    }
    alice.add_path(
        ObjectRecord::path(&[Point::new(0.0, 0.0), Point::new(3.0, 4.0)], None, None),
        None,
    );

    let mut carol = WhiteboardManager::new(Scene::new(), store.connect(), "room", "carol");
    assert!(carol.bridge().is_initial_load());
    assert!(carol.start_sync());
    assert!(!carol.bridge().is_initial_load());
    assert_eq!(carol.scene().len(), 4);
    assert_eq!(ids(&carol), ids(&alice));
}

#[test]
fn test_deferred_materialization_for_remote_paths() {
    let store = MemoryStore::new();
    let mut alice = WhiteboardManager::new(Scene::new(), store.connect(), "room", "alice");
    let mut scene = Scene::new();
    scene.set_deferred_paths(true);
    let mut bob = WhiteboardManager::new(scene, store.connect(), "room", "bob");
    assert!(bob.start_sync());

    let path = alice
        .add_path(
            ObjectRecord::path(&[Point::new(0.0, 0.0), Point::new(3.0, 4.0)], None, None),
            None,
        )
        .unwrap();
    // Resolved during the same poll that saw the entry
    bob.poll();
    assert!(bob.scene().find(&path).is_some());
    assert_eq!(bob.bridge().pending_count(), 0);
}

#[test]
fn test_queued_snapshots_do_not_evict_own_shape() {
    let (mut alice, mut bob) = pair();
    bob.set_tool(ToolKind::Line);
    for i in 0..3 {
        let y = f64::from(i) * 10.0;
        bob.draw_shape(Point::new(0.0, y), Point::new(50.0, y)).unwrap();
    }

    alice.set_tool(ToolKind::Rectangle);
    let rect = alice.draw_shape(Point::new(0.0, 100.0), Point::new(30.0, 130.0)).unwrap();
    let report = alice.poll();

    assert_eq!(report.removed, 0);
    assert_eq!(report.added, 3);
    assert_eq!(alice.scene().len(), 4);
    assert!(alice.scene().find(&rect).is_some());
    assert!(remote(&alice).contains_key(rect.as_str()));
}
