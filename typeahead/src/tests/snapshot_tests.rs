use super::init_tracing;
use crate::platforms::mock::{MockEngine, MockNode};
use crate::platforms::AccessibilityEngine;
use crate::snapshot::{SnapshotConfig, SnapshotTarget, Snapshotter};
use crate::{AutomationError, ElementId};
use std::collections::HashSet;
use std::sync::Arc;

fn document_window() -> MockNode {
    MockNode::new("AXWindow").title("Untitled").children([
        MockNode::new("AXToolbar").children([
            MockNode::new("AXButton").title("Bold").actions(&["AXPress"]),
            MockNode::new("AXButton").title("Italic").actions(&["AXPress"]),
        ]),
        MockNode::new("AXScrollArea").child(
            MockNode::new("AXTextArea")
                .value("Dear team")
                .actions(&["AXShowMenu"]),
        ),
    ])
}

fn app_with(pid: i32, windows: Vec<MockNode>) -> (Arc<MockEngine>, Snapshotter) {
    init_tracing();
    let engine = Arc::new(MockEngine::new(Default::default()));
    engine.set_application(pid, MockNode::new("AXApplication").title("TextEdit").children(windows));
    let snapshotter = Snapshotter::new(engine.clone(), SnapshotConfig::default());
    (engine, snapshotter)
}

fn target(pid: i32, bundle_id: &str) -> SnapshotTarget {
    SnapshotTarget {
        pid: Some(pid),
        bundle_identifier: Some(bundle_id.to_string()),
    }
}

#[test]
fn ids_are_unique_role_prefixed_and_all_mapped() {
    let (_, snapshotter) = app_with(42, vec![document_window()]);
    let (tree, map) = snapshotter.get_ui_elements(Some(&target(42, "com.apple.TextEdit")));
    let tree = tree.expect("snapshot");

    let ids: Vec<&ElementId> = tree.root.walk().map(|(_, e)| &e.id).collect();
    let unique: HashSet<&ElementId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(map.len(), ids.len());
    for (_, element) in tree.root.walk() {
        assert!(element.id.as_str().starts_with(element.role()));
        assert!(map.contains(&element.id));
    }
}

#[test]
fn narrows_to_first_window_with_children() {
    let (_, snapshotter) = app_with(
        7,
        vec![MockNode::new("AXWindow").title("Empty"), document_window()],
    );
    let (tree, _) = snapshotter.get_ui_elements(Some(&target(7, "com.apple.TextEdit")));
    let tree = tree.unwrap();
    assert_eq!(tree.root.role(), "AXWindow");
    assert_eq!(tree.root.attributes.title.as_deref(), Some("Untitled"));
}

#[test]
fn multi_window_apps_keep_the_application_root() {
    let (_, snapshotter) = app_with(7, vec![document_window(), document_window()]);
    let (tree, _) = snapshotter.get_ui_elements(Some(&target(7, "com.macpaw.CleanMyMac4")));
    let tree = tree.unwrap();
    assert_eq!(tree.root.role(), "AXApplication");
    assert_eq!(tree.root.children.len(), 2);

    let no_bundle = SnapshotTarget {
        pid: Some(7),
        bundle_identifier: None,
    };
    let (tree, _) = snapshotter.get_ui_elements(Some(&no_bundle));
    assert_eq!(tree.unwrap().root.role(), "AXApplication");
}

#[test]
fn single_child_groups_are_flattened() {
    let window = MockNode::new("AXWindow").child(
        MockNode::new("AXGroup").child(MockNode::new("AXGroup").child(
            MockNode::new("AXButton").title("OK").actions(&["AXPress"]),
        )),
    );
    let (_, snapshotter) = app_with(1, vec![window]);
    let (tree, _) = snapshotter.get_ui_elements(Some(&target(1, "com.example.app")));
    let tree = tree.unwrap();
    assert_eq!(tree.root.children.len(), 1);
    assert_eq!(tree.root.children[0].role(), "AXButton");
    assert!(tree.find_first(|e| e.role() == "AXGroup").is_none());
}

#[test]
fn role_less_containers_keep_their_children() {
    let window = MockNode::new("AXWindow").children([
        MockNode::new(""),
        MockNode::new("").children([
            MockNode::new("AXButton").title("Left").actions(&["AXPress"]),
            MockNode::new("AXButton").title("Right").actions(&["AXPress"]),
        ]),
        MockNode::new("").child(MockNode::new("AXCheckBox").title("Bold")),
    ]);
    let (_, snapshotter) = app_with(1, vec![window]);
    let (tree, map) = snapshotter.get_ui_elements(Some(&target(1, "com.example.app")));
    let tree = tree.unwrap();

    let roles: Vec<&str> = tree.root.children.iter().map(|c| c.role()).collect();
    assert_eq!(roles, vec!["AXUnknown", "AXCheckBox"]);
    assert_eq!(tree.root.children[0].children.len(), 2);
    assert_eq!(tree.element_count(), 5);
    assert_eq!(map.len(), 5);
}

#[test]
fn exclusive_roles_drop_their_siblings() {
    let window = MockNode::new("AXWindow").children([
        MockNode::new("AXButton").title("Behind"),
        MockNode::new("AXSheet").child(MockNode::new("AXButton").title("Replace")),
        MockNode::new("AXButton").title("After"),
    ]);
    let (_, snapshotter) = app_with(1, vec![window]);
    let (tree, map) = snapshotter.get_ui_elements(Some(&target(1, "com.example.app")));
    let tree = tree.unwrap();
    assert_eq!(tree.root.children.len(), 1);
    assert_eq!(tree.root.children[0].role(), "AXSheet");
    // Dropped siblings are not reachable through the map either.
    assert_eq!(map.len(), tree.element_count());
}

#[test]
fn subrole_wins_and_title_falls_back_to_title_element() {
    let window = MockNode::new("AXWindow").children([
        MockNode::new("AXButton").subrole("AXCloseButton"),
        MockNode::new("AXTextField")
            .title_element(MockNode::new("AXStaticText").value("Name")),
    ]);
    let (_, snapshotter) = app_with(1, vec![window]);
    let (tree, _) = snapshotter.get_ui_elements(Some(&target(1, "com.example.app")));
    let tree = tree.unwrap();
    assert_eq!(tree.root.children[0].role(), "AXCloseButton");
    assert_eq!(tree.root.children[1].attributes.title.as_deref(), Some("Name"));
    assert_eq!(tree.root.children[1].attributes.parent_role.as_deref(), Some("AXWindow"));
}

#[test]
fn new_snapshot_invalidates_previous_map() {
    let (_, snapshotter) = app_with(3, vec![document_window()]);
    let t = target(3, "com.apple.TextEdit");
    let (tree, old_map) = snapshotter.get_ui_elements(Some(&t));
    let button = tree
        .unwrap()
        .find_first(|e| e.attributes.title.as_deref() == Some("Bold"))
        .map(|e| e.id.clone())
        .unwrap();
    assert!(snapshotter.resolve(&old_map, &button).is_ok());

    let (_, new_map) = snapshotter.get_ui_elements(Some(&t));
    assert!(new_map.generation() > old_map.generation());
    assert!(matches!(
        snapshotter.resolve(&old_map, &button),
        Err(AutomationError::NoSuchElement(_))
    ));
    let element = snapshotter.resolve(&new_map, &button).unwrap();
    assert_eq!(element.title().as_deref(), Some("Bold"));

    assert!(matches!(
        snapshotter.resolve(&new_map, &ElementId::from("AXButton999")),
        Err(AutomationError::NoSuchElement(_))
    ));
}

#[test]
fn missing_root_yields_empty_result() {
    let (_, snapshotter) = app_with(3, vec![document_window()]);
    let (tree, map) = snapshotter.get_ui_elements(Some(&target(99, "com.example.gone")));
    assert!(tree.is_none());
    assert!(map.is_empty());

    // No pid and no system-wide element configured.
    let (tree, map) = snapshotter.get_ui_elements(None);
    assert!(tree.is_none());
    assert!(map.is_empty());
}

#[test]
fn system_wide_root_without_pid() {
    let (engine, snapshotter) = app_with(3, vec![]);
    engine.set_system_wide(MockNode::new("AXSystemWide").child(MockNode::new("AXMenuBar")));
    assert!(engine.system_wide_element().is_ok());
    let (tree, _) = snapshotter.get_ui_elements(None);
    assert_eq!(tree.unwrap().root.role(), "AXSystemWide");
}

#[test]
fn traversal_respects_limits() {
    let wide = MockNode::new("AXWindow")
        .children((0..50).map(|i| MockNode::new("AXButton").title(&format!("b{i}"))));
    init_tracing();
    let engine = Arc::new(MockEngine::new(Default::default()));
    engine.set_application(5, MockNode::new("AXApplication").child(wide));

    let narrow = Snapshotter::new(
        engine.clone(),
        SnapshotConfig {
            max_children: 10,
            ..Default::default()
        },
    );
    let (tree, _) = narrow.get_ui_elements(Some(&target(5, "com.example.app")));
    assert_eq!(tree.unwrap().root.children.len(), 10);

    let capped = Snapshotter::new(
        engine.clone(),
        SnapshotConfig {
            max_elements: 5,
            ..Default::default()
        },
    );
    let (tree, map) = capped.get_ui_elements(Some(&target(5, "com.example.app")));
    assert_eq!(tree.unwrap().element_count(), 5);
    assert_eq!(map.len(), 5);

    let mut deep = MockNode::new("AXButton");
    for _ in 0..40 {
        deep = MockNode::new("AXList").child(deep).child(MockNode::new("AXRow"));
    }
    engine.set_application(6, MockNode::new("AXApplication").child(MockNode::new("AXWindow").child(deep)));
    let shallow = Snapshotter::new(
        engine,
        SnapshotConfig {
            max_depth: 3,
            ..Default::default()
        },
    );
    let (tree, _) = shallow.get_ui_elements(Some(&target(6, "com.example.app")));
    let depth = tree.unwrap().root.walk().map(|(d, _)| d).max().unwrap();
    assert_eq!(depth, 3);
}

#[test]
fn serialized_tree_matches_model_format() {
    let (_, snapshotter) = app_with(2, vec![document_window()]);
    let (tree, _) = snapshotter.get_ui_elements(Some(&target(2, "com.apple.TextEdit")));
    let text = tree.unwrap().serialize().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("AXWindow"));
    assert!(lines[0].ends_with(": Untitled"));
    assert!(lines[2].starts_with("    AXButton"));
    assert!(lines[2].ends_with(": Bold, actionable: true"));
    assert!(lines[5].ends_with(": , value: Dear team"));
}
