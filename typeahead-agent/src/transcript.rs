//! The ordered message list of one conversation and the rules for growing it.

use crate::app_info::AppContext;
use crate::errors::FunctionError;
use crate::function_call::FunctionCall;
use crate::message::{ImageData, Message, MessageType};
use tracing::{debug, warn};
use uuid::Uuid;

/// Text that replaces earlier tool results once a newer one is appended.
pub const PRUNED: &str = "<pruned>";

pub const DEFAULT_MAX_INTENTS: usize = 9;

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    intents: Option<Vec<String>>,
    max_intents: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTENTS)
    }
}

impl Transcript {
    pub fn new(max_intents: usize) -> Self {
        Self {
            messages: Vec::new(),
            intents: None,
            max_intents,
        }
    }

    pub fn from_messages(messages: Vec<Message>, max_intents: usize) -> Self {
        Self {
            messages,
            ..Self::new(max_intents)
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn root_id(&self) -> Option<Uuid> {
        self.messages.first().map(|m| m.root_id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.intents = None;
    }

    /// New message chained onto the last one, or a new root when empty.
    fn next_message(
        &self,
        text: &str,
        is_current_user: bool,
        is_hidden: bool,
        app_context: Option<AppContext>,
    ) -> Message {
        match self.messages.last() {
            Some(last) => Message::reply_to(last, text, is_current_user, is_hidden, app_context),
            None => Message::root(text, is_current_user, is_hidden, app_context),
        }
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        let index = self.messages.len() - 1;
        &self.messages[index]
    }

    /// Appends a user turn and drops any suggested intents.
    pub fn add_user_message(
        &mut self,
        text: &str,
        quick_action_id: Option<Uuid>,
        is_hidden: bool,
        app_context: Option<AppContext>,
    ) -> &Message {
        self.intents = None;
        let mut message = self.next_message(text, true, is_hidden, app_context);
        message.quick_action_id = quick_action_id;
        self.push(message)
    }

    /// Like [`add_user_message`](Self::add_user_message) with an explicit type,
    /// for user content that is not plain text.
    pub fn set_user_message(
        &mut self,
        text: &str,
        message_type: MessageType,
        is_hidden: bool,
        app_context: Option<AppContext>,
    ) -> &Message {
        self.intents = None;
        let message = self
            .next_message(text, true, is_hidden, app_context)
            .with_type(message_type);
        self.push(message)
    }

    /// Streams a chunk into the current assistant message.
    pub fn append_text(&mut self, text: &str, app_context: Option<AppContext>) {
        if let Some(last) = self.messages.last_mut().filter(|m| m.accepts_text()) {
            last.text.push_str(text);
            return;
        }
        self.intents = None;
        let message = self.next_message(text, false, false, app_context);
        self.push(message);
    }

    /// Adds a call to the visible batch. A batchable call joins the current
    /// batch when the previous batchable call of this turn just returned;
    /// anything else starts a new entry. The batch keeps its first narration.
    pub fn append_function(&mut self, narration: &str, call: FunctionCall, app_context: Option<AppContext>) {
        let follows_batchable_result = self.messages.last().is_some_and(|m| match &m.message_type {
            MessageType::ToolCall(previous) => previous.name.is_batchable(),
            _ => false,
        });
        if follows_batchable_result && call.name.is_batchable() {
            if let Some(batch) = self.messages.iter_mut().rev().find(|m| m.is_function_call()) {
                if let MessageType::FunctionCall(calls) = &mut batch.message_type {
                    if calls.last().is_some_and(|c| c.name.is_batchable()) {
                        calls.push(call);
                        debug!("batched call #{} into {}", calls.len(), batch.id);
                        return;
                    }
                }
            }
        }

        let message = self
            .next_message(narration, false, false, app_context)
            .with_type(MessageType::FunctionCall(vec![call]));
        self.push(message);
    }

    /// Hidden tool result. Earlier results are pruned so only the latest
    /// state is sent to the model.
    pub fn append_tool(&mut self, text: &str, call: FunctionCall, app_context: Option<AppContext>) {
        for message in self.messages.iter_mut().filter(|m| m.is_tool_call()) {
            message.text = PRUNED.to_string();
        }
        let message = self
            .next_message(text, false, true, app_context)
            .with_type(MessageType::ToolCall(call));
        self.push(message);
    }

    /// Visible tool result carrying the failure.
    pub fn append_tool_error(&mut self, error: &str, call: FunctionCall, app_context: Option<AppContext>) {
        let message = self
            .next_message("", false, false, app_context)
            .with_type(MessageType::ToolCall(call))
            .with_error(error.to_string());
        self.push(message);
    }

    /// Attaches an error to the current assistant message, or adds one.
    pub fn set_error(&mut self, error: &str, is_hidden: bool, app_context: Option<AppContext>) {
        if let Some(last) = self
            .messages
            .last_mut()
            .filter(|m| !m.is_current_user && !m.is_hidden)
        {
            last.response_error = Some(error.to_string());
            return;
        }
        let message = self
            .next_message("", false, is_hidden, app_context)
            .with_error(error.to_string());
        self.push(message);
    }

    pub fn append_image(
        &mut self,
        image: ImageData,
        prompt: &str,
        caption: Option<&str>,
        app_context: Option<AppContext>,
    ) {
        self.intents = None;
        let mut placeholder = format!("<image placeholder>\n - prompt used: {prompt}");
        if let Some(caption) = caption {
            placeholder.push_str(&format!(" - caption generated: {caption}"));
        }
        let message = self
            .next_message(&placeholder, false, false, app_context)
            .with_type(MessageType::Image(image));
        self.push(message);
    }

    /// Keeps the first `index` messages. Out-of-range indices are ignored.
    pub fn rewind_to(&mut self, index: usize) -> bool {
        if index >= self.messages.len() {
            warn!("Cannot rewind to {} of {} messages", index, self.messages.len());
            return false;
        }
        self.messages.truncate(index);
        self.intents = None;
        true
    }

    /// Replaces the text of a message. Editing a user message drops everything
    /// after it; returns `true` in that case so the turn can be re-issued.
    pub fn update_message(&mut self, index: usize, text: &str) -> bool {
        let Some(message) = self.messages.get_mut(index) else {
            warn!("Cannot update message {} of {}", index, self.messages.len());
            return false;
        };
        message.text = text.to_string();
        message.is_edited = true;
        if !message.is_current_user {
            return false;
        }
        self.messages.truncate(index + 1);
        self.intents = None;
        true
    }

    /// Whether the last message is assistant output with some text in it.
    pub fn has_text(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| !m.is_current_user && !m.text.is_empty())
    }

    pub fn user_intents(&self) -> Option<&[String]> {
        self.intents.as_deref()
    }

    pub fn set_user_intents(&mut self, intents: Vec<String>) {
        let mut intents = intents;
        intents.truncate(self.max_intents);
        self.intents = Some(intents);
    }

    /// Adds intents to an existing list, up to the cap. No-op when there is no list.
    pub fn append_user_intents(&mut self, more: Vec<String>) {
        let max = self.max_intents;
        if let Some(intents) = self.intents.as_mut() {
            let room = max.saturating_sub(intents.len());
            intents.extend(more.into_iter().take(room));
        }
    }

    /// Gives every call of the current turn that never got a result a hidden
    /// cancelled tool message. Returns how many were closed.
    pub fn close_dangling_calls(&mut self, app_context: Option<AppContext>) -> usize {
        let turn_start = self
            .messages
            .iter()
            .rposition(|m| m.is_current_user)
            .map_or(0, |i| i + 1);
        let turn = &self.messages[turn_start..];

        let calls: Vec<FunctionCall> = turn
            .iter()
            .flat_map(|m| m.function_calls().iter().cloned())
            .collect();
        let answered = turn.iter().filter(|m| m.is_tool_call()).count();
        let dangling: Vec<FunctionCall> = calls.into_iter().skip(answered).collect();

        let reason = FunctionError::Cancelled.to_string();
        for call in &dangling {
            let message = self
                .next_message("", false, true, app_context.clone())
                .with_type(MessageType::ToolCall(call.clone()))
                .with_error(reason.clone());
            self.push(message);
        }
        dangling.len()
    }
}
