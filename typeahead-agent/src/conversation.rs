//! One conversation: the transcript, the in-flight model/function chain and
//! persistence.

use crate::app_info::{AppContext, AppInfo};
use crate::cancellation::CallContext;
use crate::client::{ChatRequest, Mode, ModelClient, PROTOCOL_VERSION};
use crate::config::Settings;
use crate::errors::{AgentError, ClientError, ToolError};
use crate::functions::{CallTrace, FunctionManager};
use crate::message::{ImageData, Message};
use crate::store::ConversationStore;
use crate::transcript::Transcript;
use crate::ui::Narrator;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered in text.
    Text,
    Image,
    /// The model returned nothing usable.
    Stopped,
    Cancelled,
    /// A request or function failed; the error is on the transcript.
    Failed,
    /// Too many function calls in one turn.
    LimitReached,
}

struct Turn {
    token: CancellationToken,
    handle: Option<JoinHandle<TurnOutcome>>,
}

struct Inner {
    id: Mutex<Uuid>,
    transcript: Mutex<Transcript>,
    app_info: Mutex<AppInfo>,
    client: Arc<dyn ModelClient>,
    functions: Arc<FunctionManager>,
    store: Arc<dyn ConversationStore>,
    narrator: Arc<dyn Narrator>,
    settings: Settings,
    current: Mutex<Option<Turn>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a conversation. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

impl Conversation {
    pub fn new(
        client: Arc<dyn ModelClient>,
        functions: Arc<FunctionManager>,
        store: Arc<dyn ConversationStore>,
        narrator: Arc<dyn Narrator>,
        settings: Settings,
    ) -> Self {
        let transcript = Transcript::new(settings.max_intents);
        Self {
            inner: Arc::new(Inner {
                id: Mutex::new(Uuid::new_v4()),
                transcript: Mutex::new(transcript),
                app_info: Mutex::new(AppInfo::default()),
                client,
                functions,
                store,
                narrator,
                settings,
                current: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        *lock(&self.inner.id)
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.transcript).messages().to_vec()
    }

    pub fn transcript(&self) -> Transcript {
        lock(&self.inner.transcript).clone()
    }

    pub fn app_info(&self) -> AppInfo {
        lock(&self.inner.app_info).clone()
    }

    pub fn set_app_info(&self, app_info: AppInfo) {
        *lock(&self.inner.app_info) = app_info;
    }

    /// Cancels whatever is running, appends the user's message and starts a new turn.
    pub async fn add_user_message(
        &self,
        text: &str,
        quick_action_id: Option<Uuid>,
        is_hidden: bool,
        app_info: AppInfo,
    ) {
        self.cancel().await;
        self.inner.narrator.stop();
        let app_context = app_info.app_context.clone();
        self.set_app_info(app_info);
        lock(&self.inner.transcript).add_user_message(text, quick_action_id, is_hidden, app_context);
        self.start_turn();
    }

    /// Starts a turn on the transcript as it is.
    pub async fn reply(&self) {
        self.cancel().await;
        self.start_turn();
    }

    /// Edits a message. Editing a user message drops what followed and re-issues the turn.
    pub async fn update_message(&self, index: usize, text: &str) -> bool {
        self.cancel().await;
        let reissue = lock(&self.inner.transcript).update_message(index, text);
        if reissue {
            self.start_turn();
        }
        reissue
    }

    pub async fn rewind_to(&self, index: usize) -> bool {
        self.cancel().await;
        lock(&self.inner.transcript).rewind_to(index)
    }

    /// Cancels the running chain, if any, and waits for it to wind down.
    pub async fn cancel(&self) {
        let previous = lock(&self.inner.current).take();
        let Some(turn) = previous else {
            return;
        };
        turn.token.cancel();
        if let Some(handle) = turn.handle {
            if let Err(e) = handle.await {
                warn!("Turn task ended abnormally: {}", e);
            }
        }
    }

    /// Waits for the running turn to end.
    pub async fn wait(&self) -> Option<TurnOutcome> {
        let handle = lock(&self.inner.current)
            .as_mut()
            .and_then(|turn| turn.handle.take());
        match handle?.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Turn task failed: {}", e);
                Some(TurnOutcome::Failed)
            }
        }
    }

    pub async fn suggest_intents(&self) -> Result<Vec<String>, ClientError> {
        let request = self.inner.build_request();
        let intents = self.inner.client.suggest_intents(&request).await?;
        lock(&self.inner.transcript).set_user_intents(intents.clone());
        Ok(intents)
    }

    pub fn set_user_intents(&self, intents: Vec<String>) {
        lock(&self.inner.transcript).set_user_intents(intents);
    }

    pub fn append_user_intents(&self, intents: Vec<String>) {
        lock(&self.inner.transcript).append_user_intents(intents);
    }

    pub fn user_intents(&self) -> Option<Vec<String>> {
        lock(&self.inner.transcript).user_intents().map(<[String]>::to_vec)
    }

    /// Saves the current conversation, then switches to a stored one.
    /// Returns `false` when `root_id` is unknown.
    pub async fn load(&self, root_id: Uuid) -> Result<bool, AgentError> {
        self.cancel().await;
        self.save()?;
        let Some(messages) = self.inner.store.load(root_id)? else {
            warn!("No stored conversation {}", root_id);
            return Ok(false);
        };
        *lock(&self.inner.transcript) =
            Transcript::from_messages(messages, self.inner.settings.max_intents);
        *lock(&self.inner.id) = root_id;
        info!("Loaded conversation {}", root_id);
        Ok(true)
    }

    /// Saves and starts over with an empty transcript.
    pub async fn reset(&self) -> Result<(), AgentError> {
        self.cancel().await;
        self.save()?;
        lock(&self.inner.transcript).clear();
        *lock(&self.inner.id) = Uuid::new_v4();
        Ok(())
    }

    pub fn save(&self) -> Result<(), AgentError> {
        let messages = self.messages();
        self.inner.store.save(&messages)
    }

    /// Cancels the running chain and persists the transcript.
    pub async fn close(&self) -> Result<(), AgentError> {
        self.cancel().await;
        self.inner.narrator.stop();
        self.save()
    }

    fn start_turn(&self) {
        let token = CancellationToken::new();
        let ctx = CallContext::with_token(Uuid::new_v4().to_string(), token.clone());
        let handle = tokio::spawn(run_turn(self.inner.clone(), ctx));
        *lock(&self.inner.current) = Some(Turn {
            token,
            handle: Some(handle),
        });
    }
}

impl Inner {
    fn app_context(&self) -> Option<AppContext> {
        lock(&self.app_info).app_context.clone()
    }

    fn build_request(&self) -> ChatRequest {
        let settings = &self.settings;
        let app_info = lock(&self.app_info).clone();
        let messages: Vec<Message> = lock(&self.transcript)
            .messages()
            .iter()
            .map(Message::for_request)
            .collect();
        let user_objective = messages
            .iter()
            .find(|m| m.is_current_user && m.quick_action_id.is_some())
            .map(|m| m.text.clone());
        let copied_text = app_info
            .app_context
            .as_ref()
            .and_then(|c| c.copied_text())
            .unwrap_or_default()
            .to_string();

        ChatRequest {
            uuid: *lock(&self.id),
            username: settings.username.clone(),
            user_full_name: settings.user_full_name.clone(),
            user_objective,
            user_bio: settings.user_bio.clone(),
            user_lang: settings.user_lang.clone(),
            copied_text,
            messages,
            history: None,
            apps: app_info.bundle_identifiers(),
            app_context: app_info.app_context,
            version: PROTOCOL_VERSION.to_string(),
            is_autopilot_enabled: settings.is_autopilot_enabled,
            is_voice_over_enabled: self.functions.is_voiceover_enabled(),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            incognito: false,
        }
    }

    /// Puts a failed call on the transcript: a tool error when the call was
    /// decoded, a plain response error otherwise.
    fn record_tool_error(&self, error: ToolError) {
        let message = error.message();
        let mut transcript = lock(&self.transcript);
        match error.function_call {
            Some(call) => transcript.append_tool_error(&message, call, error.app_context),
            None => transcript.set_error(&message, false, error.app_context),
        }
    }

    fn cancelled(&self) -> TurnOutcome {
        let closed = lock(&self.transcript).close_dangling_calls(self.app_context());
        info!("Turn cancelled, closed {} pending call(s)", closed);
        TurnOutcome::Cancelled
    }
}

#[instrument(skip_all, fields(request_id = %ctx.request_id))]
async fn run_turn(inner: Arc<Inner>, ctx: CallContext) -> TurnOutcome {
    let max_calls = inner.settings.max_function_calls_per_turn;
    let mut calls = 0usize;

    loop {
        if ctx.is_cancelled() {
            return inner.cancelled();
        }

        let request = inner.build_request();
        let app_context = request.app_context.clone();
        let mut sink = {
            let inner = inner.clone();
            let app_context = app_context.clone();
            move |text: &str| lock(&inner.transcript).append_text(text, app_context.clone())
        };

        let result = tokio::select! {
            _ = ctx.cancellation_token.cancelled() => return inner.cancelled(),
            result = inner.client.stream(&request, &mut sink) => result,
        };
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Model request failed: {}", e);
                lock(&inner.transcript).set_error(&e.to_string(), false, app_context);
                return TurnOutcome::Failed;
            }
        };

        match payload.mode() {
            Mode::Text => {
                debug!("turn finished with text after {} call(s)", calls);
                return TurnOutcome::Text;
            }
            Mode::Image => {
                let Some(url) = payload.text else {
                    return TurnOutcome::Stopped;
                };
                let prompt = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.is_current_user)
                    .map(|m| m.text.clone())
                    .unwrap_or_default();
                lock(&inner.transcript).append_image(ImageData::Url(url), &prompt, None, app_context);
                return TurnOutcome::Image;
            }
            Mode::Function => {}
        }

        let Some(json) = payload.text else {
            warn!("Function payload without a body");
            return TurnOutcome::Stopped;
        };

        calls += 1;
        if calls > max_calls {
            warn!("Stopping after {} function calls", max_calls);
            lock(&inner.transcript).set_error(
                &format!("Stopped after {max_calls} actions in a row"),
                false,
                app_context,
            );
            return TurnOutcome::LimitReached;
        }

        let app_info = lock(&inner.app_info).clone();
        let mut trace = CallTrace::new(&ctx.request_id);
        let prepared = match inner.functions.prepare(&json, &app_info, &mut trace) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Function call rejected: {}", e);
                inner.record_tool_error(e);
                return TurnOutcome::Failed;
            }
        };

        let narration = prepared.narration();
        let call = prepared.call.clone();
        lock(&inner.transcript).append_function(&narration, call.clone(), app_context.clone());
        if inner.settings.is_narrate_enabled {
            inner.narrator.speak(&narration);
        }
        if ctx
            .sleep(inner.functions.timing().narration_pause)
            .await
            .is_err()
        {
            return inner.cancelled();
        }

        match inner
            .functions
            .execute(prepared, &app_info, &ctx, &mut trace)
            .await
        {
            Ok(executed) => {
                let next_context = executed.app_info.app_context.clone();
                *lock(&inner.app_info) = executed.app_info;
                match executed.serialized_state {
                    Some(state) => {
                        lock(&inner.transcript).append_tool(
                            &format!("Updated state\n{state}"),
                            call,
                            next_context,
                        );
                    }
                    None => {
                        lock(&inner.transcript).append_tool_error(
                            "Could not capture app state",
                            call,
                            next_context,
                        );
                        return TurnOutcome::Failed;
                    }
                }
            }
            Err(e) if e.is_cancelled() => return inner.cancelled(),
            Err(e) => {
                inner.record_tool_error(e);
                return TurnOutcome::Failed;
            }
        }
    }
}
