//! Bounded capture of the accessibility tree into an immutable [`UIElementTree`]
//! plus a generation-stamped [`ElementMap`] of live handles.

use crate::element::{roles, AxElement, ElementId, UIElement, UIElementAttributes};
use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;
use crate::tree_formatter::{format_tree, SerializeOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Apps whose windows must be captured together instead of narrowing to the first window.
pub const MULTI_WINDOW_BUNDLE_IDS: &[&str] = &["com.macpaw.CleanMyMac4"];

/// If a child has one of these roles its siblings are dropped.
pub const EXCLUSIVE_ROLES: &[&str] = &[roles::SHEET, roles::APPLICATION_DIALOG];

/// Limits that keep a traversal of a hostile or huge tree bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub max_depth: usize,
    pub max_children: usize,
    pub max_elements: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_depth: 25,
            max_children: 200,
            max_elements: 5000,
        }
    }
}

/// Which process to capture. `None` means the system-wide element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotTarget {
    pub pid: Option<i32>,
    pub bundle_identifier: Option<String>,
}

/// Arena of live handles for one snapshot.
///
/// Every map carries the generation of the snapshot that produced it; the
/// [`Snapshotter`] refuses lookups through a map from an older generation.
#[derive(Debug, Clone, Default)]
pub struct ElementMap {
    generation: u64,
    handles: HashMap<ElementId, AxElement>,
}

impl ElementMap {
    /// The "no snapshot" map. Generation 0 is never issued by a snapshotter.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.handles.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ElementId> {
        self.handles.keys()
    }

    fn get(&self, id: &ElementId) -> Option<&AxElement> {
        self.handles.get(id)
    }
}

/// Result of one traversal.
#[derive(Debug, Clone)]
pub struct UIElementTree {
    pub root: UIElement,
    pub generation: u64,
}

impl UIElementTree {
    /// Model-facing text form: one line per element, two spaces of indent per level.
    pub fn serialize(&self) -> Option<String> {
        self.serialize_with(&SerializeOptions::default())
    }

    pub fn serialize_with(&self, options: &SerializeOptions) -> Option<String> {
        format_tree(&self.root, options)
    }

    pub fn get(&self, id: &ElementId) -> Option<&UIElement> {
        self.root.find_first(true, |e| &e.id == id)
    }

    pub fn find_first<F>(&self, condition: F) -> Option<&UIElement>
    where
        F: Fn(&UIElement) -> bool,
    {
        self.root.find_first(true, condition)
    }

    pub fn find_all<F>(&self, condition: F) -> Vec<&UIElement>
    where
        F: Fn(&UIElement) -> bool,
    {
        self.root.find_all(true, condition)
    }

    pub fn element_count(&self) -> usize {
        self.root.walk().count()
    }
}

/// Counters for one traversal.
struct SnapshotBuilder<'a> {
    config: &'a SnapshotConfig,
    next_id: usize,
    visited: usize,
    truncated: bool,
    handles: HashMap<ElementId, AxElement>,
}

impl SnapshotBuilder<'_> {
    /// Removes the handles of a subtree that was dropped from the snapshot.
    fn forget(&mut self, node: &UIElement) {
        for (_, element) in node.walk() {
            self.handles.remove(&element.id);
        }
    }

    fn visit(&mut self, element: &AxElement, depth: usize) -> Option<UIElement> {
        if self.visited >= self.config.max_elements {
            self.truncated = true;
            return None;
        }

        let mut children = element.children();
        // Role-less containers still hold reachable content.
        let role = match element.role() {
            Some(role) => role,
            None if !children.is_empty() => roles::UNKNOWN.to_string(),
            None => return None,
        };
        self.visited += 1;

        if (role == roles::GROUP || role == roles::UNKNOWN) && children.len() == 1 {
            if depth >= self.config.max_depth {
                self.truncated = true;
                return None;
            }
            let only_child = children.remove(0);
            return self.visit(&only_child, depth + 1);
        }

        self.next_id += 1;
        let id = ElementId::new(&role, self.next_id);

        let mut kept = Vec::new();
        if depth < self.config.max_depth {
            if children.len() > self.config.max_children {
                self.truncated = true;
                children.truncate(self.config.max_children);
            }
            for child in &children {
                let Some(node) = self.visit(child, depth + 1) else {
                    continue;
                };
                if EXCLUSIVE_ROLES.contains(&node.role()) {
                    for dropped in kept.drain(..) {
                        self.forget(&dropped);
                    }
                    kept.push(node);
                    break;
                }
                kept.push(node);
            }
        } else if !children.is_empty() {
            self.truncated = true;
        }

        let attributes = UIElementAttributes {
            role,
            title: element.title(),
            description: element.description(),
            label: element.label(),
            value: element.value(),
            link: element.link(),
            identifier: element.identifier(),
            dom_id: element.dom_id(),
            position: element.position(),
            size: element.size(),
            enabled: element.is_enabled(),
            actions: element.actions(),
            parent_role: element.parent().and_then(|p| p.base_role()),
        };

        self.handles.insert(id.clone(), element.clone());
        Some(UIElement {
            id,
            attributes,
            children: kept,
        })
    }
}

/// Captures snapshots and owns the generation counter that invalidates old maps.
pub struct Snapshotter {
    engine: Arc<dyn AccessibilityEngine>,
    config: SnapshotConfig,
    generation: AtomicU64,
}

impl Snapshotter {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, config: SnapshotConfig) -> Self {
        Self {
            engine,
            config,
            generation: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Generation of the most recent snapshot, 0 before the first one.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Takes a fresh snapshot. Every earlier [`ElementMap`] becomes stale.
    #[instrument(skip(self))]
    pub fn get_ui_elements(
        &self,
        target: Option<&SnapshotTarget>,
    ) -> (Option<UIElementTree>, ElementMap) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let root = match self.resolve_root(target) {
            Ok(root) => root,
            Err(e) => {
                warn!("Could not resolve accessibility root: {}", e);
                return (None, ElementMap::empty());
            }
        };

        let mut builder = SnapshotBuilder {
            config: &self.config,
            next_id: 0,
            visited: 0,
            truncated: false,
            handles: HashMap::new(),
        };

        let Some(root) = builder.visit(&root, 0) else {
            debug!("Accessibility root has no role, snapshot is empty");
            return (None, ElementMap::empty());
        };

        if builder.truncated {
            debug!(
                "Snapshot {} truncated at {} elements (limits: {:?})",
                generation, builder.visited, self.config
            );
        } else {
            debug!("Snapshot {} captured {} elements", generation, builder.visited);
        }

        let map = ElementMap {
            generation,
            handles: builder.handles,
        };
        (Some(UIElementTree { root, generation }), map)
    }

    /// Looks up a handle, failing when the id is unknown or the map is stale.
    pub fn resolve<'m>(
        &self,
        map: &'m ElementMap,
        id: &ElementId,
    ) -> Result<&'m AxElement, AutomationError> {
        let current = self.current_generation();
        if map.generation() != current {
            return Err(AutomationError::NoSuchElement(format!(
                "{id} (snapshot {} is stale, current is {current})",
                map.generation()
            )));
        }
        map.get(id)
            .ok_or_else(|| AutomationError::NoSuchElement(id.to_string()))
    }

    fn resolve_root(&self, target: Option<&SnapshotTarget>) -> Result<AxElement, AutomationError> {
        let Some(pid) = target.and_then(|t| t.pid) else {
            return self.engine.system_wide_element();
        };

        let app = self.engine.application_element(pid)?;
        let narrow = target
            .and_then(|t| t.bundle_identifier.as_deref())
            .is_some_and(|bundle_id| !MULTI_WINDOW_BUNDLE_IDS.contains(&bundle_id));
        if !narrow {
            return Ok(app);
        }

        let window = app.children().into_iter().find(|child| {
            child.base_role().as_deref() == Some(roles::WINDOW) && !child.children().is_empty()
        });
        Ok(window.unwrap_or(app))
    }
}
