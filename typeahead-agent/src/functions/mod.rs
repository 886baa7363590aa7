//! Function call dispatch: parse, resolve against the current snapshot,
//! execute, re-snapshot.

mod focus;
mod focus_ui_element;
mod open_application;
mod open_file;
mod open_url;
mod perform_ui_action;
mod save_file;

pub use perform_ui_action::{is_combo_box, pick_from_list};

use crate::app_info::{AppContext, AppInfo};
use crate::cancellation::CallContext;
use crate::errors::{FunctionError, ToolError};
use crate::function_call::{FunctionArgs, FunctionCall};
use crate::ui::AssistantWindow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use typeahead::{
    AxElement, Clipboard, ElementMap, InputBackend, InputDriver, InputTiming, Platform,
    SnapshotConfig, Snapshotter, Workspace,
};

/// Pauses between executor steps, chosen so that target apps keep up.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorTiming {
    /// After bringing the target app to the front.
    pub activation: Duration,
    /// After writing the clipboard.
    pub clipboard: Duration,
    pub short: Duration,
    pub step: Duration,
    pub long: Duration,
    pub page_load: Duration,
    /// Before the single retry of a press that could not complete.
    pub press_retry: Duration,
    pub focus: Duration,
    /// Between showing the narration and running the call.
    pub narration_pause: Duration,
}

impl Default for ExecutorTiming {
    fn default() -> Self {
        Self {
            activation: Duration::from_millis(100),
            clipboard: Duration::from_millis(100),
            short: Duration::from_millis(500),
            step: Duration::from_secs(1),
            long: Duration::from_secs(2),
            page_load: Duration::from_secs(5),
            press_retry: Duration::from_secs(1),
            focus: Duration::from_millis(100),
            narration_pause: Duration::from_secs(3),
        }
    }
}

impl ExecutorTiming {
    /// No pauses at all, for tests.
    pub fn instant() -> Self {
        Self {
            activation: Duration::ZERO,
            clipboard: Duration::ZERO,
            short: Duration::ZERO,
            step: Duration::ZERO,
            long: Duration::ZERO,
            page_load: Duration::ZERO,
            press_retry: Duration::ZERO,
            focus: Duration::ZERO,
            narration_pause: Duration::ZERO,
        }
    }
}

/// Everything an executor may touch, injected once.
pub struct Capabilities {
    pub snapshotter: Arc<Snapshotter>,
    pub input: InputDriver<Arc<dyn InputBackend>>,
    pub workspace: Arc<dyn Workspace>,
    pub window: Arc<dyn AssistantWindow>,
}

impl Capabilities {
    pub fn new(
        platform: &Platform,
        snapshot: SnapshotConfig,
        input_timing: InputTiming,
        window: Arc<dyn AssistantWindow>,
    ) -> Self {
        Self {
            snapshotter: Arc::new(Snapshotter::new(platform.engine.clone(), snapshot)),
            input: InputDriver::new(platform.input.clone(), platform.clipboard.clone(), input_timing),
            workspace: platform.workspace.clone(),
            window,
        }
    }

    pub fn clipboard(&self) -> &Arc<dyn Clipboard> {
        self.input.clipboard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Parsed,
    Resolving,
    Executing,
    Completed,
    Failed,
}

/// Every state a call went through, in order.
#[derive(Debug, Clone)]
pub struct CallTrace {
    request_id: String,
    states: Vec<CallState>,
}

impl CallTrace {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            states: vec![CallState::Received],
        }
    }

    pub fn record(&mut self, state: CallState) {
        debug!("[{}] {:?} -> {:?}", self.request_id, self.state(), state);
        self.states.push(state);
    }

    pub fn state(&self) -> CallState {
        self.states.last().copied().unwrap_or(CallState::Received)
    }

    pub fn states(&self) -> &[CallState] {
        &self.states
    }
}

/// A call that parsed and whose references resolved against the current snapshot.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub call: FunctionCall,
    pub args: FunctionArgs,
    element: Option<AxElement>,
    url: Option<reqwest::Url>,
}

impl PreparedCall {
    pub fn narration(&self) -> String {
        self.args.human_readable()
    }
}

/// Result of a completed call.
#[derive(Debug, Clone)]
pub struct Executed {
    pub app_info: AppInfo,
    /// `None` when the fresh snapshot could not be captured.
    pub serialized_state: Option<String>,
}

#[derive(Debug)]
pub struct CallOutcome {
    pub trace: CallTrace,
    pub result: Result<Executed, ToolError>,
}

/// State shared by the steps of one executor run.
pub(crate) struct StepEnv<'a> {
    pub caps: &'a Capabilities,
    pub timing: &'a ExecutorTiming,
    pub ctx: &'a CallContext,
    pub app_context: Option<&'a AppContext>,
}

impl StepEnv<'_> {
    pub async fn sleep(&self, duration: Duration) -> Result<(), FunctionError> {
        self.ctx.sleep(duration).await
    }

    pub fn checkpoint(&self) -> Result<(), FunctionError> {
        self.ctx.checkpoint()
    }

    pub fn input(&self) -> &InputDriver<Arc<dyn InputBackend>> {
        &self.caps.input
    }

    /// Brings the target app forward, then waits `timing.activation`.
    pub async fn activate_target(&self) -> Result<(), FunctionError> {
        self.checkpoint()?;
        let Some(bundle_id) = self.app_context.and_then(|c| c.bundle_identifier()) else {
            return Ok(());
        };
        match self.caps.workspace.activate(bundle_id) {
            Ok(true) => self.sleep(self.timing.activation).await,
            Ok(false) => {
                debug!("{} is not running, nothing to activate", bundle_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to activate {}: {}", bundle_id, e);
                Ok(())
            }
        }
    }

    pub async fn write_clipboard(&self, text: &str) -> Result<(), FunctionError> {
        self.checkpoint()?;
        self.caps.clipboard().write_text(text)?;
        self.sleep(self.timing.clipboard).await
    }

    pub fn max_depth(&self) -> usize {
        self.caps.snapshotter.config().max_depth
    }
}

/// Parses and runs function calls against the live desktop.
pub struct FunctionManager {
    caps: Capabilities,
    timing: ExecutorTiming,
}

impl FunctionManager {
    pub fn new(caps: Capabilities, timing: ExecutorTiming) -> Self {
        Self { caps, timing }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn timing(&self) -> &ExecutorTiming {
        &self.timing
    }

    pub fn is_voiceover_enabled(&self) -> bool {
        self.caps.workspace.is_voiceover_enabled()
    }

    /// Snapshot of `app_context` (or the frontmost app) with its serialized tree.
    pub fn capture(&self, app_context: Option<AppContext>) -> (Option<AppContext>, ElementMap) {
        let app_context = app_context.or_else(|| {
            self.caps
                .workspace
                .frontmost_application()
                .map(|app| AppContext::from_running(&app))
        });
        let target = app_context.as_ref().map(AppContext::snapshot_target);
        let (tree, map) = self.caps.snapshotter.get_ui_elements(target.as_ref());
        let serialized = tree.and_then(|t| t.serialize());
        let app_context = app_context.map(|c| c.with_serialized_ui_element(serialized));
        (app_context, map)
    }

    /// Received → Parsed → Resolving. Nothing here touches the desktop.
    #[instrument(skip(self, json, app_info, trace))]
    pub fn prepare(
        &self,
        json: &str,
        app_info: &AppInfo,
        trace: &mut CallTrace,
    ) -> Result<PreparedCall, ToolError> {
        let app_context = app_info.app_context.clone();
        let fail = |trace: &mut CallTrace, error: FunctionError, call: Option<&FunctionCall>| {
            trace.record(CallState::Failed);
            ToolError::new(error, call.cloned(), app_context.clone())
        };

        let call = FunctionCall::from_json(json).map_err(|e| fail(trace, e, None))?;
        let args = call.parse_args().map_err(|e| fail(trace, e, Some(&call)))?;
        trace.record(CallState::Parsed);

        trace.record(CallState::Resolving);
        let element = match args.element_id() {
            Some(id) => Some(
                self.caps
                    .snapshotter
                    .resolve(&app_info.element_map, id)
                    .map(Clone::clone)
                    .map_err(|_| fail(trace, FunctionError::NoSuchElement(id.to_string()), Some(&call)))?,
            ),
            None => None,
        };

        let mut url = None;
        match &args {
            FunctionArgs::OpenApplication { bundle_identifier } => {
                if app_info.app(bundle_identifier).is_none() {
                    return Err(fail(
                        trace,
                        FunctionError::Resolution("This app cannot be opened by Typeahead".to_string()),
                        Some(&call),
                    ));
                }
            }
            FunctionArgs::OpenUrl { url: Some(raw), .. } => {
                let parsed = reqwest::Url::parse(raw).map_err(|_| {
                    fail(trace, FunctionError::Resolution("URL not found".to_string()), Some(&call))
                })?;
                url = Some(parsed);
            }
            FunctionArgs::FocusUiElement {
                error_message: Some(message),
                ..
            } => {
                return Err(fail(
                    trace,
                    FunctionError::Resolution(message.clone()),
                    Some(&call),
                ));
            }
            _ => {}
        }

        Ok(PreparedCall {
            call,
            args,
            element,
            url,
        })
    }

    /// Resolving → Executing → Completed/Failed.
    #[instrument(skip_all, fields(function = %prepared.call.name))]
    pub async fn execute(
        &self,
        prepared: PreparedCall,
        app_info: &AppInfo,
        ctx: &CallContext,
        trace: &mut CallTrace,
    ) -> Result<Executed, ToolError> {
        let app_context = app_info.app_context.clone();
        let call = prepared.call.clone();
        let fail = |trace: &mut CallTrace, error: FunctionError| {
            trace.record(CallState::Failed);
            ToolError::new(error, Some(call.clone()), app_context.clone())
        };

        if let Err(e) = ctx.checkpoint() {
            return Err(fail(trace, e));
        }
        trace.record(CallState::Executing);

        let env = StepEnv {
            caps: &self.caps,
            timing: &self.timing,
            ctx,
            app_context: app_context.as_ref(),
        };

        self.caps.window.hide();
        let result = self.run_steps(&env, &prepared).await;
        self.caps.window.show();

        let next_context = match result {
            Ok(Some(context)) => Some(context),
            Ok(None) => app_context.clone(),
            Err(e) => {
                if e.is_cancelled() {
                    info!("{} cancelled", prepared.call.name);
                } else {
                    warn!("{} failed: {}", prepared.call.name, e);
                }
                return Err(fail(trace, e));
            }
        };

        if let Err(e) = ctx.checkpoint() {
            return Err(fail(trace, e));
        }

        let (next_context, element_map) = self.capture(next_context);
        let serialized_state = next_context
            .as_ref()
            .and_then(|c| c.serialized_ui_element())
            .map(str::to_string);
        trace.record(CallState::Completed);

        Ok(Executed {
            app_info: AppInfo::new(next_context, element_map, app_info.apps.clone()),
            serialized_state,
        })
    }

    /// [`prepare`](Self::prepare) and [`execute`](Self::execute) in one go.
    pub async fn call(&self, json: &str, app_info: &AppInfo, ctx: &CallContext) -> CallOutcome {
        let mut trace = CallTrace::new(&ctx.request_id);
        let result = match self.prepare(json, app_info, &mut trace) {
            Ok(prepared) => self.execute(prepared, app_info, ctx, &mut trace).await,
            Err(e) => Err(e),
        };
        CallOutcome { trace, result }
    }

    async fn run_steps(
        &self,
        env: &StepEnv<'_>,
        prepared: &PreparedCall,
    ) -> Result<Option<AppContext>, FunctionError> {
        let element = || {
            prepared
                .element
                .as_ref()
                .ok_or_else(|| FunctionError::Execution("Invalid app state".to_string()))
        };

        match &prepared.args {
            FunctionArgs::OpenApplication { bundle_identifier } => {
                open_application::run(env, bundle_identifier).await.map(Some)
            }
            FunctionArgs::OpenFile { file } => open_file::run(env, file).await.map(|_| None),
            FunctionArgs::OpenUrl { prompt, .. } => {
                open_url::run(env, prepared.url.as_ref(), prompt.as_deref()).await
            }
            FunctionArgs::PerformUiAction(action) => {
                perform_ui_action::run(env, element()?, action).await.map(|_| None)
            }
            FunctionArgs::SaveFile { file, .. } => {
                save_file::run(env, element()?, file).await.map(|_| None)
            }
            FunctionArgs::FocusUiElement { .. } => {
                focus_ui_element::run(env, element()?).await.map(|_| None)
            }
        }
    }
}
