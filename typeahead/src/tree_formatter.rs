use crate::element::{actions, roles, UIElement};

/// Longest static text rendered before truncation.
pub const MAX_TEXT_CHARS: usize = 4000;

/// Actions that every element tends to expose and that carry no signal for the model.
pub const DEFAULT_EXCLUDED_ACTIONS: &[&str] = &[
    actions::SHOW_MENU,
    actions::SCROLL_TO_VISIBLE,
    actions::CANCEL,
    actions::RAISE,
];

const BLANK_LINK: &str = "about:blank";

#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Prefix each line with `<shortId>: `.
    pub indexed: bool,
    /// Drop degenerate (width + height <= 1) elements together with their subtree.
    /// When unset the size is appended instead.
    pub visible_only: bool,
    /// Render `actions: [...]` instead of `actionable: true`.
    pub show_actions: bool,
    pub excluded_actions: Vec<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indexed: true,
            visible_only: true,
            show_actions: false,
            excluded_actions: DEFAULT_EXCLUDED_ACTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Renders a tree in depth-first pre-order, two spaces of indent per level.
///
/// Output format:
/// AXWindow1: Untitled
///   AXButton2: Save, actionable: true
///   AXStaticText3: Hello
pub fn format_tree(root: &UIElement, options: &SerializeOptions) -> Option<String> {
    let mut output: Option<String> = None;
    let mut stack: Vec<(usize, &UIElement)> = vec![(0, root)];

    while let Some((indent, element)) = stack.pop() {
        let Some(line) = format_element(element, options) else {
            continue;
        };

        match output.as_mut() {
            None => output = Some(line),
            Some(text) => {
                text.push('\n');
                text.push_str(&"  ".repeat(indent));
                text.push_str(&line);
            }
        }

        for child in element.children.iter().rev() {
            stack.push((indent + 1, child));
        }
    }

    output
}

/// Renders a single element, or `None` if it is hidden under `visible_only`.
pub fn format_element(element: &UIElement, options: &SerializeOptions) -> Option<String> {
    let attrs = &element.attributes;
    let mut text = if options.indexed {
        format!("{}: ", element.id)
    } else {
        String::new()
    };

    let link = attrs.link.as_deref().filter(|l| *l != BLANK_LINK);

    if attrs.role == roles::STATIC_TEXT {
        text.push_str(&truncate(attrs.value.as_deref().unwrap_or_default()));
    } else if let (true, Some(link)) = (attrs.role == roles::LINK, link) {
        match attrs.value.as_deref() {
            Some(value) => text.push_str(&format!("{value}, link: {link}")),
            None => text.push_str(link),
        }
    } else {
        let mut body = attrs.title.clone().unwrap_or_default();
        if let Some(ref description) = attrs.description {
            if body.is_empty() {
                body = description.clone();
            } else {
                body.push_str(&format!(" ({description})"));
            }
        }
        if let Some(ref label) = attrs.label {
            body.push_str(&format!(", label: {label}"));
        }
        if let Some(ref value) = attrs.value {
            body.push_str(&format!(", value: {value}"));
        }
        if let Some(ref dom_id) = attrs.dom_id {
            body.push_str(&format!(", domId: {dom_id}"));
        }
        if let Some(link) = link {
            body.push_str(&format!(", link: {link}"));
        }
        text.push_str(&body);
    }

    let remaining: Vec<&String> = attrs
        .actions
        .iter()
        .filter(|a| !options.excluded_actions.contains(a))
        .collect();
    if attrs.enabled && !remaining.is_empty() {
        if options.show_actions {
            text.push_str(&format!(", actions: {remaining:?}"));
        } else {
            text.push_str(", actionable: true");
        }
    }

    if let Some(size) = attrs.size {
        if options.visible_only {
            if size.is_degenerate() {
                return None;
            }
        } else {
            text.push_str(&format!(", size: ({}, {})", size.width, size.height));
        }
    }

    Some(text)
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_TEXT_CHARS {
        let truncated: String = text.chars().take(MAX_TEXT_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
