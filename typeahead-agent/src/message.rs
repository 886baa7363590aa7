use crate::app_info::AppContext;
use crate::function_call::FunctionCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder stored instead of inline image data.
pub const IMAGE_NOT_SAVED: &str = "<Error: Images are not saved to history>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageData {
    Url(String),
    B64Json(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    String,
    Markdown(String),
    Html(String),
    Image(ImageData),
    Data(Vec<u8>),
    /// A batch of calls rendered as one entry.
    FunctionCall(Vec<FunctionCall>),
    /// Result of one call. Hidden unless it carries an error.
    ToolCall(FunctionCall),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub root_id: Uuid,
    pub in_reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub root_created_at: DateTime<Utc>,
    pub text: String,
    pub is_current_user: bool,
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_action_id: Option<Uuid>,
    #[serde(default)]
    pub app_context: Option<AppContext>,
    #[serde(default)]
    pub response_error: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub is_edited: bool,
}

impl Message {
    /// First message of a conversation: its own root.
    pub fn root(text: &str, is_current_user: bool, is_hidden: bool, app_context: Option<AppContext>) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            root_id: id,
            in_reply_to_id: None,
            created_at: now,
            root_created_at: now,
            text: text.to_string(),
            is_current_user,
            is_hidden,
            quick_action_id: None,
            app_context,
            response_error: None,
            message_type: MessageType::String,
            is_edited: false,
        }
    }

    pub fn reply_to(
        parent: &Message,
        text: &str,
        is_current_user: bool,
        is_hidden: bool,
        app_context: Option<AppContext>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            root_id: parent.root_id,
            in_reply_to_id: Some(parent.id),
            created_at: Utc::now(),
            root_created_at: parent.root_created_at,
            ..Self::root(text, is_current_user, is_hidden, app_context)
        }
    }

    pub fn with_type(self, message_type: MessageType) -> Self {
        Self {
            message_type,
            ..self
        }
    }

    pub fn with_error(self, response_error: String) -> Self {
        Self {
            response_error: Some(response_error),
            ..self
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self.message_type, MessageType::FunctionCall(_))
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.message_type, MessageType::ToolCall(_))
    }

    pub fn function_calls(&self) -> &[FunctionCall] {
        match &self.message_type {
            MessageType::FunctionCall(calls) => calls,
            _ => &[],
        }
    }

    /// Plain assistant text that streamed chunks may be appended to.
    pub fn accepts_text(&self) -> bool {
        !self.is_current_user
            && !self.is_hidden
            && matches!(
                self.message_type,
                MessageType::String | MessageType::Markdown(_)
            )
    }

    /// Copy suitable for persistence: inline image and binary data are dropped.
    pub fn for_storage(&self) -> Message {
        match &self.message_type {
            MessageType::Image(ImageData::B64Json(_)) | MessageType::Data(_) => Message {
                text: IMAGE_NOT_SAVED.to_string(),
                message_type: MessageType::String,
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    /// Copy suitable for a model request: heavy payloads become plain text.
    pub fn for_request(&self) -> Message {
        match &self.message_type {
            MessageType::Image(_) | MessageType::Data(_) => Message {
                message_type: MessageType::String,
                ..self.clone()
            },
            _ => self.clone(),
        }
    }
}
