use crate::app_info::AppContext;
use crate::function_call::FunctionCall;
use thiserror::Error;
use typeahead::AutomationError;

/// Why a function call did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// Malformed payload or missing/mistyped argument.
    #[error("{0}")]
    Parsing(String),

    /// Unknown or stale element id. The model has to re-plan from a fresh snapshot.
    #[error("No such element {0}")]
    NoSuchElement(String),

    /// Unknown bundle id or unusable URL.
    #[error("{0}")]
    Resolution(String),

    #[error("{0}")]
    Execution(String),

    #[error("Function was cancelled")]
    Cancelled,
}

impl FunctionError {
    /// Wraps a driver or accessibility failure so no raw platform text reaches the model.
    pub fn from_automation(error: AutomationError) -> Self {
        match error {
            AutomationError::NoSuchElement(id) => FunctionError::NoSuchElement(id),
            AutomationError::ElementNotFound(what) => FunctionError::NoSuchElement(what),
            AutomationError::ActionUnsupported(what) => {
                FunctionError::Execution(format!("No such action {what}"))
            }
            AutomationError::CannotComplete(_) => {
                FunctionError::Execution("Action could not be performed".to_string())
            }
            AutomationError::NoChangesDetected => {
                FunctionError::Execution("Nothing was copied to the clipboard".to_string())
            }
            AutomationError::PermissionDenied(_) => FunctionError::Execution(
                "Typeahead needs accessibility permissions to do this".to_string(),
            ),
            other => FunctionError::Execution(format!("Action could not be performed ({other})")),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FunctionError::Parsing(_) => "parsing",
            FunctionError::NoSuchElement(_) => "no_such_element",
            FunctionError::Resolution(_) => "resolution",
            FunctionError::Execution(_) => "execution",
            FunctionError::Cancelled => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FunctionError::Cancelled)
    }
}

impl From<AutomationError> for FunctionError {
    fn from(error: AutomationError) -> Self {
        FunctionError::from_automation(error)
    }
}

/// A [`FunctionError`] with the call and app state it happened in, ready to
/// be rendered as a tool error. `function_call` is `None` only when the
/// payload could not be decoded at all.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct ToolError {
    pub error: FunctionError,
    pub function_call: Option<FunctionCall>,
    pub app_context: Option<AppContext>,
}

impl ToolError {
    pub fn new(
        error: FunctionError,
        function_call: Option<FunctionCall>,
        app_context: Option<AppContext>,
    ) -> Self {
        Self {
            error,
            function_call,
            app_context,
        }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

/// Model backend failures. Surfaced as a response error on the transcript.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Server(String),

    #[error("{0}")]
    Client(String),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Timeout(error.to_string())
        } else if error.is_decode() {
            ClientError::Decode(error.to_string())
        } else if error.is_builder() {
            ClientError::Client(error.to_string())
        } else if let Some(status) = error.status() {
            ClientError::Server(format!("Server returned {status}"))
        } else {
            ClientError::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::Decode(error.to_string())
    }
}

/// Failures of the agent's own plumbing: settings, persistence, platform setup.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
