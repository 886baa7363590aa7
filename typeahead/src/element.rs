use crate::errors::AutomationError;
use crate::geometry::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Accessibility attribute names read by the snapshot and the executors.
pub mod attributes {
    pub const ROLE: &str = "AXRole";
    pub const SUBROLE: &str = "AXSubrole";
    pub const TITLE: &str = "AXTitle";
    pub const TITLE_UI_ELEMENT: &str = "AXTitleUIElement";
    pub const DESCRIPTION: &str = "AXDescription";
    pub const LABEL_VALUE: &str = "AXLabelValue";
    pub const VALUE: &str = "AXValue";
    pub const URL: &str = "AXURL";
    pub const DOM_IDENTIFIER: &str = "AXDOMIdentifier";
    pub const IDENTIFIER: &str = "AXIdentifier";
    pub const POSITION: &str = "AXPosition";
    pub const SIZE: &str = "AXSize";
    pub const ENABLED: &str = "AXEnabled";
    pub const PARENT: &str = "AXParent";
    pub const CHILDREN: &str = "AXChildren";
    pub const FOCUSED_UI_ELEMENT: &str = "AXFocusedUIElement";
}

pub mod actions {
    pub const PRESS: &str = "AXPress";
    pub const SCROLL_TO_VISIBLE: &str = "AXScrollToVisible";
    pub const SHOW_MENU: &str = "AXShowMenu";
    pub const CANCEL: &str = "AXCancel";
    pub const RAISE: &str = "AXRaise";
}

pub mod roles {
    pub const WINDOW: &str = "AXWindow";
    pub const GROUP: &str = "AXGroup";
    pub const UNKNOWN: &str = "AXUnknown";
    pub const STATIC_TEXT: &str = "AXStaticText";
    pub const LINK: &str = "AXLink";
    pub const BUTTON: &str = "AXButton";
    pub const COMBO_BOX: &str = "AXComboBox";
    pub const LIST: &str = "AXList";
    pub const SHEET: &str = "AXSheet";
    pub const APPLICATION_DIALOG: &str = "AXApplicationDialog";
}

/// Per-snapshot element id, rendered as `<role><n>` (e.g. `AXButton12`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(role: &str, index: usize) -> Self {
        Self(format!("{role}{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Platform side of a live accessibility element.
///
/// Attribute readers return `None` when the attribute is missing or has an
/// unexpected type; only actions and writes report errors.
pub trait AxElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn string_attribute(&self, name: &str) -> Option<String>;
    fn bool_attribute(&self, name: &str) -> Option<bool>;
    fn point_attribute(&self, name: &str) -> Option<Point>;
    fn size_attribute(&self, name: &str) -> Option<Size>;
    fn url_attribute(&self, name: &str) -> Option<String>;
    fn element_attribute(&self, name: &str) -> Option<AxElement>;
    fn elements_attribute(&self, name: &str) -> Vec<AxElement>;
    fn action_names(&self) -> Vec<String>;
    fn perform_action(&self, action: &str) -> Result<(), AutomationError>;
    fn set_string_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn AxElementImpl>;
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handle to a live accessibility element.
#[derive(Debug)]
pub struct AxElement {
    inner: Box<dyn AxElementImpl>,
}

impl Clone for AxElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for AxElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl AxElement {
    pub fn new(inner: Box<dyn AxElementImpl>) -> Self {
        Self { inner }
    }

    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    /// Subrole when present, otherwise the role.
    pub fn role(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::SUBROLE))
            .or_else(|| non_empty(self.inner.string_attribute(attributes::ROLE)))
    }

    /// The raw `AXRole`, ignoring the subrole.
    pub fn base_role(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::ROLE))
    }

    /// `AXTitle`, falling back to the value of a static-text title element.
    pub fn title(&self) -> Option<String> {
        if let Some(title) = non_empty(self.inner.string_attribute(attributes::TITLE)) {
            return Some(title);
        }
        let title_element = self.inner.element_attribute(attributes::TITLE_UI_ELEMENT)?;
        if title_element.base_role().as_deref() != Some(roles::STATIC_TEXT) {
            return None;
        }
        title_element.value()
    }

    pub fn description(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::DESCRIPTION))
    }

    pub fn label(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::LABEL_VALUE))
    }

    pub fn value(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::VALUE))
    }

    pub fn link(&self) -> Option<String> {
        self.inner.url_attribute(attributes::URL)
    }

    pub fn dom_id(&self) -> Option<String> {
        non_empty(self.inner.string_attribute(attributes::DOM_IDENTIFIER))
    }

    pub fn identifier(&self) -> Option<String> {
        self.inner.string_attribute(attributes::IDENTIFIER)
    }

    pub fn position(&self) -> Option<Point> {
        self.inner.point_attribute(attributes::POSITION)
    }

    pub fn size(&self) -> Option<Size> {
        self.inner.size_attribute(attributes::SIZE)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.bool_attribute(attributes::ENABLED).unwrap_or(false)
    }

    pub fn parent(&self) -> Option<AxElement> {
        self.inner.element_attribute(attributes::PARENT)
    }

    pub fn children(&self) -> Vec<AxElement> {
        self.inner.elements_attribute(attributes::CHILDREN)
    }

    pub fn focused_element(&self) -> Option<AxElement> {
        self.inner.element_attribute(attributes::FOCUSED_UI_ELEMENT)
    }

    pub fn actions(&self) -> Vec<String> {
        self.inner.action_names()
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions().iter().any(|a| a == action)
    }

    pub fn perform_action(&self, action: &str) -> Result<(), AutomationError> {
        self.inner.perform_action(action)
    }

    pub fn press(&self) -> Result<(), AutomationError> {
        self.inner.perform_action(actions::PRESS)
    }

    pub fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_string_attribute(attributes::VALUE, value)
    }

    pub fn bounds(&self) -> Option<Rect> {
        let origin = self.position()?;
        let size = self.size()?;
        Some(Rect { origin, size })
    }

    /// Center of the element when it covers more than a single point.
    pub fn center(&self) -> Option<Point> {
        let bounds = self.bounds()?;
        if bounds.size.width * bounds.size.height <= 1.0 {
            return None;
        }
        Some(bounds.center())
    }

    /// Depth-first search over the live subtree. When `reflexive` is set the
    /// element itself is a candidate.
    pub fn find_first<F>(&self, reflexive: bool, max_depth: usize, condition: F) -> Option<AxElement>
    where
        F: Fn(&AxElement) -> bool,
    {
        let mut stack: Vec<(AxElement, usize)> = if reflexive {
            vec![(self.clone(), 0)]
        } else {
            self.children()
                .into_iter()
                .rev()
                .map(|child| (child, 1))
                .collect()
        };

        while let Some((element, depth)) = stack.pop() {
            if condition(&element) {
                return Some(element);
            }
            if depth >= max_depth {
                continue;
            }
            for child in element.children().into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        None
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Attributes captured for one element at snapshot time.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UIElementAttributes {
    pub role: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub dom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub parent_role: Option<String>,
}

impl Debug for UIElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElementAttributes");
        debug_struct.field("role", &self.role);

        // Only show non-empty fields
        if let Some(ref title) = self.title {
            debug_struct.field("title", title);
        }
        if let Some(ref description) = self.description {
            debug_struct.field("description", description);
        }
        if let Some(ref label) = self.label {
            debug_struct.field("label", label);
        }
        if let Some(ref value) = self.value {
            debug_struct.field("value", value);
        }
        if let Some(ref identifier) = self.identifier {
            debug_struct.field("identifier", identifier);
        }
        if let Some(ref size) = self.size {
            debug_struct.field("size", size);
        }
        if !self.actions.is_empty() {
            debug_struct.field("actions", &self.actions);
        }
        debug_struct.finish()
    }
}

/// Immutable snapshot of one accessibility element and its subtree.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    pub id: ElementId,
    #[serde(flatten)]
    pub attributes: UIElementAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UIElement>,
}

impl Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug_with_depth(f, 0, 100)
    }
}

impl UIElement {
    fn debug_with_depth(
        &self,
        f: &mut fmt::Formatter<'_>,
        current_depth: usize,
        max_depth: usize,
    ) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElement");
        debug_struct.field("id", &self.id);
        debug_struct.field("attributes", &self.attributes);

        if !self.children.is_empty() {
            if current_depth < max_depth {
                let children: Vec<DebugNodeWithDepth<'_>> = self
                    .children
                    .iter()
                    .map(|node| DebugNodeWithDepth {
                        node,
                        current_depth: current_depth + 1,
                        max_depth,
                    })
                    .collect();
                debug_struct.field("children", &children);
            } else {
                debug_struct.field(
                    "children",
                    &format!("[{} children (depth limit reached)]", self.children.len()),
                );
            }
        }

        debug_struct.finish()
    }

    pub fn short_id(&self) -> &ElementId {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.attributes.role
    }

    pub fn center(&self) -> Option<Point> {
        let origin = self.attributes.position?;
        let size = self.attributes.size?;
        if size.width * size.height <= 1.0 {
            return None;
        }
        Some(Rect { origin, size }.center())
    }

    /// First match in depth-first pre-order. When `reflexive` is set the
    /// element itself is a candidate.
    pub fn find_first<F>(&self, reflexive: bool, condition: F) -> Option<&UIElement>
    where
        F: Fn(&UIElement) -> bool,
    {
        self.walk()
            .skip(usize::from(!reflexive))
            .map(|(_, node)| node)
            .find(|node| condition(node))
    }

    /// All matches. The subtree below a match is not searched.
    pub fn find_all<F>(&self, reflexive: bool, condition: F) -> Vec<&UIElement>
    where
        F: Fn(&UIElement) -> bool,
    {
        let mut matches = Vec::new();
        let mut stack: Vec<&UIElement> = if reflexive {
            vec![self]
        } else {
            self.children.iter().rev().collect()
        };

        while let Some(next) = stack.pop() {
            if condition(next) {
                matches.push(next);
            } else {
                stack.extend(next.children.iter().rev());
            }
        }
        matches
    }

    /// Depth-first pre-order walk with depth, starting at 0 for `self`.
    pub fn walk(&self) -> impl Iterator<Item = (usize, &UIElement)> {
        let mut stack = vec![(0usize, self)];
        std::iter::from_fn(move || {
            let (depth, node) = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
            Some((depth, node))
        })
    }
}

struct DebugNodeWithDepth<'a> {
    node: &'a UIElement,
    current_depth: usize,
    max_depth: usize,
}

impl Debug for DebugNodeWithDepth<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node
            .debug_with_depth(f, self.current_depth, self.max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, role: &str, children: Vec<UIElement>) -> UIElement {
        UIElement {
            id: ElementId::from(id),
            attributes: UIElementAttributes {
                role: role.to_string(),
                ..Default::default()
            },
            children,
        }
    }

    #[test]
    fn find_first_is_preorder_and_respects_reflexive() {
        let tree = node(
            "AXWindow1",
            "AXWindow",
            vec![
                node("AXGroup2", "AXGroup", vec![node("AXButton3", "AXButton", vec![])]),
                node("AXButton4", "AXButton", vec![]),
            ],
        );

        let first = tree.find_first(false, |e| e.role() == "AXButton");
        assert_eq!(first.map(|e| e.id.as_str()), Some("AXButton3"));
        assert!(tree.find_first(false, |e| e.role() == "AXWindow").is_none());
        assert!(tree.find_first(true, |e| e.role() == "AXWindow").is_some());
    }

    #[test]
    fn find_all_stops_descending_at_matches() {
        let tree = node(
            "AXWindow1",
            "AXWindow",
            vec![
                node("AXGroup2", "AXGroup", vec![node("AXGroup3", "AXGroup", vec![])]),
                node("AXGroup4", "AXGroup", vec![]),
            ],
        );
        let ids: Vec<&str> = tree
            .find_all(false, |e| e.role() == "AXGroup")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["AXGroup2", "AXGroup4"]);
    }

    #[test]
    fn serde_skips_empty_fields() {
        let element = node("AXButton1", "AXButton", vec![]);
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "AXButton1", "role": "AXButton" })
        );
    }
}
