#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use typeahead::platforms::mock::{MockDesktop, MockNode, RecordedEvent};
use typeahead::{InputTiming, SnapshotConfig, UIElementTree};
use typeahead_agent::app_info::{apps_by_bundle_id, AppContext, AppInfo, Application};
use typeahead_agent::client::{ChatRequest, ChunkPayload, ModelClient};
use typeahead_agent::errors::ClientError;
use typeahead_agent::functions::{Capabilities, ExecutorTiming, FunctionManager};
use typeahead_agent::ui::HeadlessWindow;

pub const NOTES: &str = "com.apple.Notes";
pub const NOTES_PID: i32 = 42;
pub const SAFARI: &str = "com.apple.Safari";
pub const SAFARI_PID: i32 = 77;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_test_writer()
        .try_init();
}

/// Notes window with a search field, a send button, a folder picker and a
/// button that fails its first press.
pub fn notes_window() -> MockNode {
    MockNode::new("AXWindow").title("Notes").children([
        MockNode::new("AXTextField")
            .identifier("search")
            .frame(10.0, 10.0, 200.0, 24.0),
        MockNode::new("AXButton")
            .title("Send")
            .actions(&["AXPress", "AXScrollToVisible"]),
        MockNode::new("AXComboBox")
            .title("Folder")
            .actions(&["AXPress"])
            .child(MockNode::new("AXList").children([
                MockNode::new("AXStaticText").value("Work").actions(&["AXPress"]),
                MockNode::new("AXStaticText").value("Personal").actions(&["AXPress"]),
            ])),
        MockNode::new("AXButton")
            .title("Flaky")
            .actions(&["AXPress"])
            .fail_next_action(typeahead::AutomationError::CannotComplete("busy".into())),
    ])
}

pub fn save_panel_window() -> MockNode {
    MockNode::new("AXWindow").title("Untitled").children([
        MockNode::new("AXTextArea").value("draft"),
        MockNode::new("AXSheet").title("Save").children([
            MockNode::new("AXTextField").title("Save As:"),
            MockNode::new("AXButton")
                .title("Replace")
                .identifier("action-button-1")
                .actions(&["AXPress"]),
        ]),
    ])
}

pub fn app(name: &str, window: MockNode) -> MockNode {
    MockNode::new("AXApplication").title(name).child(window)
}

pub struct Fixture {
    pub desktop: MockDesktop,
    pub window: Arc<HeadlessWindow>,
    pub functions: Arc<FunctionManager>,
}

impl Fixture {
    pub fn new(window: MockNode) -> Self {
        Self::with_timing(window, ExecutorTiming::instant())
    }

    pub fn with_timing(window: MockNode, timing: ExecutorTiming) -> Self {
        init_tracing();
        let desktop = MockDesktop::new().with_app(NOTES, "Notes", NOTES_PID, app("Notes", window));
        desktop.workspace.install(SAFARI, "Safari", SAFARI_PID);
        desktop.engine.set_application(
            SAFARI_PID,
            app("Safari", MockNode::new("AXWindow").title("Start Page").child(
                MockNode::new("AXTextField").title("Address").actions(&["AXConfirm"]),
            )),
        );

        let window = Arc::new(HeadlessWindow::new());
        let capabilities = Capabilities::new(
            &desktop.platform(),
            SnapshotConfig::default(),
            InputTiming::instant(),
            window.clone(),
        );
        Self {
            desktop,
            window,
            functions: Arc::new(FunctionManager::new(capabilities, timing)),
        }
    }

    pub fn apps() -> HashMap<String, Application> {
        apps_by_bundle_id([
            Application::new(NOTES, "Notes"),
            Application::new(SAFARI, "Safari"),
        ])
    }

    /// Fresh snapshot of Notes, plus the tree to look ids up in.
    pub fn snapshot(&self) -> (AppInfo, UIElementTree) {
        let context = AppContext::new(Some("Notes".into()), Some(NOTES.into()), Some(NOTES_PID));
        let (tree, map) = self
            .functions
            .capabilities()
            .snapshotter
            .get_ui_elements(Some(&context.snapshot_target()));
        let tree = tree.expect("Notes snapshot");
        let context = context.with_serialized_ui_element(tree.serialize());
        (AppInfo::new(Some(context), map, Self::apps()), tree)
    }

    pub fn ax_actions(&self) -> Vec<(String, String)> {
        self.desktop
            .log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::AxAction { element, action } => Some((element, action)),
                _ => None,
            })
            .collect()
    }

    pub fn activations(&self) -> usize {
        self.desktop
            .log
            .events()
            .iter()
            .filter(|e| matches!(e, RecordedEvent::Activate(_)))
            .count()
    }
}

pub fn id_titled(tree: &UIElementTree, title: &str) -> String {
    tree.find_first(|e| e.attributes.title.as_deref() == Some(title))
        .unwrap_or_else(|| panic!("no element titled {title}"))
        .id
        .to_string()
}

pub fn id_with_role(tree: &UIElementTree, role: &str) -> String {
    tree.find_first(|e| e.role() == role)
        .unwrap_or_else(|| panic!("no {role}"))
        .id
        .to_string()
}

pub fn call(name: &str, args: Value) -> String {
    json!({ "name": name, "args": args }).to_string()
}

pub fn click(id: &str) -> String {
    call(
        "perform_ui_action",
        json!({ "id": id, "narration": "Clicking", "delayInMillis": 0 }),
    )
}

/// Model client that plays back queued responses and records every request.
/// Once the queue is empty it answers "Done.".
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Vec<ChunkPayload>, ClientError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<Vec<ChunkPayload>, ClientError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn functions(payloads: Vec<String>) -> Self {
        Self::new(
            payloads
                .into_iter()
                .map(|json| Ok(vec![ChunkPayload::function(&json)]))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ChunkPayload, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![ChunkPayload::text("Done.")]));
        let mut buffered = ChunkPayload::default();
        for chunk in next? {
            if let Some(text) = buffered.absorb(chunk) {
                sink(&text);
            }
        }
        Ok(buffered)
    }
}
