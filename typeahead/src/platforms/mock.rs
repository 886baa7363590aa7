//! In-memory platform for tests. Every synthetic event, accessibility action
//! and workspace call is appended to a shared [`EventLog`].

use crate::element::{attributes, AxElement, AxElementImpl};
use crate::geometry::{Point, Size};
use crate::input::{Clipboard, InputBackend, Key, Modifiers, MouseEventKind};
use crate::platforms::{AccessibilityEngine, Platform, RunningApplication, Workspace};
use crate::AutomationError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Key {
        key: Key,
        down: bool,
        modifiers: Modifiers,
    },
    Mouse {
        kind: MouseEventKind,
        at: Point,
    },
    CursorMoved(Point),
    AxAction {
        element: String,
        action: String,
    },
    SetValue {
        element: String,
        value: String,
    },
    Open(String),
    Activate(String),
}

impl RecordedEvent {
    /// Keyboard and mouse events, the ones a user would notice.
    pub fn is_input(&self) -> bool {
        matches!(self, RecordedEvent::Key { .. } | RecordedEvent::Mouse { .. })
    }
}

type EventHook = Box<dyn Fn(&RecordedEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    hook: Arc<Mutex<Option<EventHook>>>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventLog").field(&self.events()).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventLog {
    pub fn push(&self, event: RecordedEvent) {
        lock(&self.events).push(event.clone());
        if let Some(hook) = lock(&self.hook).as_ref() {
            hook(&event);
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }

    pub fn input_events(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.is_input()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Runs `hook` after every recorded event, e.g. to cancel a token mid-sequence.
    pub fn set_hook<F>(&self, hook: F)
    where
        F: Fn(&RecordedEvent) + Send + Sync + 'static,
    {
        *lock(&self.hook) = Some(Box::new(hook));
    }
}

/// Builder for a fake accessibility element.
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    role: String,
    subrole: Option<String>,
    strings: HashMap<String, String>,
    enabled: bool,
    position: Option<Point>,
    size: Option<Size>,
    url: Option<String>,
    title_element: Option<Box<MockNode>>,
    actions: Vec<String>,
    failures: Vec<AutomationError>,
    children: Vec<MockNode>,
}

impl MockNode {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            enabled: true,
            position: Some(Point::new(0.0, 0.0)),
            size: Some(Size::new(100.0, 20.0)),
            ..Default::default()
        }
    }

    pub fn subrole(mut self, subrole: &str) -> Self {
        self.subrole = Some(subrole.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.strings.insert(name.to_string(), value.to_string());
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.attribute(attributes::TITLE, title)
    }

    pub fn value(self, value: &str) -> Self {
        self.attribute(attributes::VALUE, value)
    }

    pub fn description(self, description: &str) -> Self {
        self.attribute(attributes::DESCRIPTION, description)
    }

    pub fn identifier(self, identifier: &str) -> Self {
        self.attribute(attributes::IDENTIFIER, identifier)
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn title_element(mut self, element: MockNode) -> Self {
        self.title_element = Some(Box::new(element));
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn no_frame(mut self) -> Self {
        self.position = None;
        self.size = None;
        self
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Queues an error returned by the next action performed on this element.
    pub fn fail_next_action(mut self, error: AutomationError) -> Self {
        self.failures.push(error);
        self
    }

    pub fn child(mut self, child: MockNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = MockNode>) -> Self {
        self.children.extend(children);
        self
    }

    fn into_shared(self, parent: Weak<SharedNode>) -> Arc<SharedNode> {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
        let MockNode {
            role,
            subrole,
            strings,
            enabled,
            position,
            size,
            url,
            title_element,
            actions,
            failures,
            children,
        } = self;

        Arc::new_cyclic(|me| SharedNode {
            object_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            role,
            subrole,
            strings: Mutex::new(strings),
            enabled,
            position,
            size,
            url,
            title_element: title_element.map(|t| t.into_shared(Weak::new())),
            actions,
            failures: Mutex::new(failures.into_iter().collect()),
            children: children
                .into_iter()
                .map(|c| c.into_shared(me.clone()))
                .collect(),
            parent,
        })
    }
}

#[derive(Debug)]
struct SharedNode {
    object_id: usize,
    role: String,
    subrole: Option<String>,
    strings: Mutex<HashMap<String, String>>,
    enabled: bool,
    position: Option<Point>,
    size: Option<Size>,
    url: Option<String>,
    title_element: Option<Arc<SharedNode>>,
    actions: Vec<String>,
    failures: Mutex<VecDeque<AutomationError>>,
    children: Vec<Arc<SharedNode>>,
    parent: Weak<SharedNode>,
}

impl SharedNode {
    /// Name used in the event log: identifier, then title, then value, then role.
    fn label(&self) -> String {
        let strings = lock(&self.strings);
        [attributes::IDENTIFIER, attributes::TITLE, attributes::VALUE]
            .iter()
            .find_map(|name| strings.get(*name).filter(|s| !s.is_empty()).cloned())
            .unwrap_or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone)]
pub struct MockElement {
    node: Arc<SharedNode>,
    log: EventLog,
}

impl MockElement {
    fn wrap(node: Arc<SharedNode>, log: &EventLog) -> AxElement {
        AxElement::new(Box::new(MockElement {
            node,
            log: log.clone(),
        }))
    }
}

impl AxElementImpl for MockElement {
    fn object_id(&self) -> usize {
        self.node.object_id
    }

    fn string_attribute(&self, name: &str) -> Option<String> {
        match name {
            attributes::ROLE => Some(self.node.role.clone()),
            attributes::SUBROLE => self.node.subrole.clone(),
            _ => lock(&self.node.strings).get(name).cloned(),
        }
    }

    fn bool_attribute(&self, name: &str) -> Option<bool> {
        (name == attributes::ENABLED).then_some(self.node.enabled)
    }

    fn point_attribute(&self, name: &str) -> Option<Point> {
        (name == attributes::POSITION)
            .then_some(self.node.position)
            .flatten()
    }

    fn size_attribute(&self, name: &str) -> Option<Size> {
        (name == attributes::SIZE).then_some(self.node.size).flatten()
    }

    fn url_attribute(&self, name: &str) -> Option<String> {
        (name == attributes::URL)
            .then(|| self.node.url.clone())
            .flatten()
    }

    fn element_attribute(&self, name: &str) -> Option<AxElement> {
        let node = match name {
            attributes::PARENT => self.node.parent.upgrade(),
            attributes::TITLE_UI_ELEMENT => self.node.title_element.clone(),
            _ => None,
        }?;
        Some(MockElement::wrap(node, &self.log))
    }

    fn elements_attribute(&self, name: &str) -> Vec<AxElement> {
        if name != attributes::CHILDREN {
            return Vec::new();
        }
        self.node
            .children
            .iter()
            .map(|child| MockElement::wrap(child.clone(), &self.log))
            .collect()
    }

    fn action_names(&self) -> Vec<String> {
        self.node.actions.clone()
    }

    fn perform_action(&self, action: &str) -> Result<(), AutomationError> {
        if !self.node.actions.iter().any(|a| a == action) {
            return Err(AutomationError::ActionUnsupported(format!(
                "{} on {}",
                action,
                self.node.label()
            )));
        }
        if let Some(error) = lock(&self.node.failures).pop_front() {
            return Err(error);
        }
        self.log.push(RecordedEvent::AxAction {
            element: self.node.label(),
            action: action.to_string(),
        });
        Ok(())
    }

    fn set_string_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        lock(&self.node.strings).insert(name.to_string(), value.to_string());
        self.log.push(RecordedEvent::SetValue {
            element: self.node.label(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn AxElementImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct MockEngine {
    log: EventLog,
    system: Mutex<Option<Arc<SharedNode>>>,
    applications: Mutex<HashMap<i32, Arc<SharedNode>>>,
    trusted: AtomicBool,
}

impl MockEngine {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            system: Mutex::new(None),
            applications: Mutex::new(HashMap::new()),
            trusted: AtomicBool::new(true),
        }
    }

    pub fn set_system_wide(&self, root: MockNode) {
        *lock(&self.system) = Some(root.into_shared(Weak::new()));
    }

    /// Installs (or replaces) the accessibility tree of a process.
    pub fn set_application(&self, pid: i32, root: MockNode) {
        lock(&self.applications).insert(pid, root.into_shared(Weak::new()));
    }

    pub fn remove_application(&self, pid: i32) {
        lock(&self.applications).remove(&pid);
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }
}

impl AccessibilityEngine for MockEngine {
    fn system_wide_element(&self) -> Result<AxElement, AutomationError> {
        lock(&self.system)
            .clone()
            .map(|node| MockElement::wrap(node, &self.log))
            .ok_or_else(|| AutomationError::ElementNotFound("system-wide element".to_string()))
    }

    fn application_element(&self, pid: i32) -> Result<AxElement, AutomationError> {
        lock(&self.applications)
            .get(&pid)
            .cloned()
            .map(|node| MockElement::wrap(node, &self.log))
            .ok_or_else(|| AutomationError::ElementNotFound(format!("application with pid {pid}")))
    }

    fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug, Default)]
struct ClipboardState {
    change_count: i64,
    text: Option<String>,
    html: Option<String>,
    writes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockClipboard {
    state: Mutex<ClipboardState>,
}

impl MockClipboard {
    /// Replaces the contents the way another app would, bumping the change count.
    pub fn set_contents(&self, text: Option<&str>, html: Option<&str>) {
        let mut state = lock(&self.state);
        state.change_count += 1;
        state.text = text.map(str::to_string);
        state.html = html.map(str::to_string);
    }

    /// Every string written through [`Clipboard::write_text`], oldest first.
    pub fn writes(&self) -> Vec<String> {
        lock(&self.state).writes.clone()
    }
}

impl Clipboard for MockClipboard {
    fn change_count(&self) -> i64 {
        lock(&self.state).change_count
    }

    fn read_text(&self) -> Option<String> {
        lock(&self.state).text.clone()
    }

    fn read_html(&self) -> Option<String> {
        lock(&self.state).html.clone()
    }

    fn write_text(&self, text: &str) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        state.change_count += 1;
        state.text = Some(text.to_string());
        state.html = None;
        state.writes.push(text.to_string());
        Ok(())
    }
}

pub struct MockInputBackend {
    log: EventLog,
    clipboard: Arc<MockClipboard>,
    cursor: Mutex<Point>,
    copy_result: Mutex<Option<(String, Option<String>)>>,
}

impl MockInputBackend {
    pub fn new(clipboard: Arc<MockClipboard>) -> Self {
        Self::with_log(clipboard, EventLog::default())
    }

    pub fn with_log(clipboard: Arc<MockClipboard>, log: EventLog) -> Self {
        Self {
            log,
            clipboard,
            cursor: Mutex::new(Point::default()),
            copy_result: Mutex::new(None),
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// What a ⌘C places on the clipboard. Without it a copy leaves the clipboard untouched.
    pub fn set_copy_result(&self, text: &str, html: Option<&str>) {
        *lock(&self.copy_result) = Some((text.to_string(), html.map(str::to_string)));
    }
}

impl InputBackend for MockInputBackend {
    fn post_key(&self, key: Key, down: bool, modifiers: Modifiers) -> Result<(), AutomationError> {
        if key == Key::C && down && modifiers == Modifiers::COMMAND {
            if let Some((text, html)) = lock(&self.copy_result).clone() {
                self.clipboard.set_contents(Some(&text), html.as_deref());
            }
        }
        self.log.push(RecordedEvent::Key {
            key,
            down,
            modifiers,
        });
        Ok(())
    }

    fn post_mouse(&self, kind: MouseEventKind, at: Point) -> Result<(), AutomationError> {
        *lock(&self.cursor) = at;
        self.log.push(RecordedEvent::Mouse { kind, at });
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point, AutomationError> {
        Ok(*lock(&self.cursor))
    }

    fn warp_cursor(&self, to: Point) -> Result<(), AutomationError> {
        *lock(&self.cursor) = to;
        self.log.push(RecordedEvent::CursorMoved(to));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct InstalledApp {
    url: String,
    app: RunningApplication,
}

pub struct MockWorkspace {
    log: EventLog,
    installed: Mutex<HashMap<String, InstalledApp>>,
    running: Mutex<HashMap<String, RunningApplication>>,
    frontmost: Mutex<Option<RunningApplication>>,
    voiceover: AtomicBool,
}

impl MockWorkspace {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            installed: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            frontmost: Mutex::new(None),
            voiceover: AtomicBool::new(false),
        }
    }

    /// Registers an app that `open` can launch.
    pub fn install(&self, bundle_identifier: &str, app_name: &str, pid: i32) {
        lock(&self.installed).insert(
            bundle_identifier.to_string(),
            InstalledApp {
                url: format!("file:///Applications/{app_name}.app"),
                app: RunningApplication {
                    app_name: Some(app_name.to_string()),
                    bundle_identifier: Some(bundle_identifier.to_string()),
                    pid,
                },
            },
        );
    }

    /// Marks an app as running and frontmost.
    pub fn launch(&self, app: RunningApplication) {
        if let Some(bundle_id) = app.bundle_identifier.clone() {
            lock(&self.running).insert(bundle_id, app.clone());
        }
        *lock(&self.frontmost) = Some(app);
    }

    pub fn set_voiceover_enabled(&self, enabled: bool) {
        self.voiceover.store(enabled, Ordering::SeqCst);
    }
}

impl Workspace for MockWorkspace {
    fn url_for_application(&self, bundle_identifier: &str) -> Option<String> {
        lock(&self.installed)
            .get(bundle_identifier)
            .map(|installed| installed.url.clone())
    }

    fn open(&self, target: &str) -> Result<(), AutomationError> {
        self.log.push(RecordedEvent::Open(target.to_string()));
        let launched = lock(&self.installed)
            .values()
            .find(|installed| installed.url == target)
            .map(|installed| installed.app.clone());
        if let Some(app) = launched {
            self.launch(app);
        }
        Ok(())
    }

    fn activate(&self, bundle_identifier: &str) -> Result<bool, AutomationError> {
        self.log
            .push(RecordedEvent::Activate(bundle_identifier.to_string()));
        let app = lock(&self.running).get(bundle_identifier).cloned();
        match app {
            Some(app) => {
                *lock(&self.frontmost) = Some(app);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn frontmost_application(&self) -> Option<RunningApplication> {
        lock(&self.frontmost).clone()
    }

    fn is_voiceover_enabled(&self) -> bool {
        self.voiceover.load(Ordering::SeqCst)
    }
}

/// A whole fake desktop sharing one event log.
#[derive(Clone)]
pub struct MockDesktop {
    pub log: EventLog,
    pub engine: Arc<MockEngine>,
    pub input: Arc<MockInputBackend>,
    pub clipboard: Arc<MockClipboard>,
    pub workspace: Arc<MockWorkspace>,
}

impl Default for MockDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDesktop {
    pub fn new() -> Self {
        let log = EventLog::default();
        let clipboard = Arc::new(MockClipboard::default());
        Self {
            engine: Arc::new(MockEngine::new(log.clone())),
            input: Arc::new(MockInputBackend::with_log(clipboard.clone(), log.clone())),
            workspace: Arc::new(MockWorkspace::new(log.clone())),
            clipboard,
            log,
        }
    }

    /// Installs, launches and focuses an app with the given accessibility tree.
    pub fn with_app(self, bundle_identifier: &str, app_name: &str, pid: i32, root: MockNode) -> Self {
        self.workspace.install(bundle_identifier, app_name, pid);
        self.workspace.launch(RunningApplication {
            app_name: Some(app_name.to_string()),
            bundle_identifier: Some(bundle_identifier.to_string()),
            pid,
        });
        self.engine.set_application(pid, root);
        self
    }

    pub fn platform(&self) -> Platform {
        Platform {
            engine: self.engine.clone(),
            input: self.input.clone(),
            clipboard: self.clipboard.clone(),
            workspace: self.workspace.clone(),
        }
    }
}
