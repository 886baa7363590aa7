//! Function calls emitted by the model and their typed arguments.

use crate::errors::FunctionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use typeahead::ElementId;

/// Sentinel `url` meaning "whatever page is already in front".
pub const CURRENT_PAGE: &str = "current page";

/// Longest pause a `perform_ui_action` may ask for before it runs.
pub const MAX_DELAY_MILLIS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionName {
    OpenApplication,
    OpenFile,
    OpenUrl,
    PerformUiAction,
    SaveFile,
    FocusUiElement,
}

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::OpenApplication => "open_application",
            FunctionName::OpenFile => "open_file",
            FunctionName::OpenUrl => "open_url",
            FunctionName::PerformUiAction => "perform_ui_action",
            FunctionName::SaveFile => "save_file",
            FunctionName::FocusUiElement => "focus_ui_element",
        }
    }

    /// Calls that share one visible transcript entry when they follow each other.
    pub fn is_batchable(&self) -> bool {
        matches!(
            self,
            FunctionName::PerformUiAction
                | FunctionName::OpenApplication
                | FunctionName::OpenFile
                | FunctionName::SaveFile
        )
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "id"?, "name", "args" }` as sent by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: FunctionName,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Arguments of `perform_ui_action`.
#[derive(Debug, Clone, PartialEq)]
pub struct UiAction {
    pub id: ElementId,
    pub narration: String,
    pub delay_in_millis: u64,
    pub input_text: Option<String>,
    pub press_enter: bool,
}

/// Validated arguments, exactly one variant per [`FunctionName`].
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    OpenApplication {
        bundle_identifier: String,
    },
    OpenFile {
        file: String,
    },
    /// `url` is `None` for the current page. `prompt` turns on scraping.
    OpenUrl {
        url: Option<String>,
        prompt: Option<String>,
    },
    PerformUiAction(UiAction),
    SaveFile {
        id: ElementId,
        file: String,
    },
    FocusUiElement {
        id: Option<ElementId>,
        error_message: Option<String>,
    },
}

impl FunctionArgs {
    /// The element the call acts on, if any.
    pub fn element_id(&self) -> Option<&ElementId> {
        match self {
            FunctionArgs::PerformUiAction(action) => Some(&action.id),
            FunctionArgs::SaveFile { id, .. } => Some(id),
            FunctionArgs::FocusUiElement { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Narration shown (and spoken) before the call runs.
    pub fn human_readable(&self) -> String {
        match self {
            FunctionArgs::OpenApplication { bundle_identifier } => {
                format!("Opening {bundle_identifier}...")
            }
            FunctionArgs::OpenFile { file } => format!("Opening {file}..."),
            FunctionArgs::OpenUrl { url: None, .. } => "Reading the current page...".to_string(),
            FunctionArgs::OpenUrl {
                url: Some(url),
                prompt: Some(_),
            } => format!("Reading {url}..."),
            FunctionArgs::OpenUrl {
                url: Some(url),
                prompt: None,
            } => format!("Opening {url}..."),
            FunctionArgs::PerformUiAction(action) => action.narration.clone(),
            FunctionArgs::SaveFile { file, .. } => format!("Saving {file}..."),
            FunctionArgs::FocusUiElement { id: Some(id), .. } => format!("Focusing on {id}..."),
            FunctionArgs::FocusUiElement { id: None, .. } => "Looking for the element...".to_string(),
        }
    }
}

impl FunctionCall {
    pub fn new(name: FunctionName, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: None,
            name,
            args,
        }
    }

    /// Decodes the model's payload. Unknown names and non-object payloads fail here.
    pub fn from_json(json: &str) -> Result<Self, FunctionError> {
        serde_json::from_str(json.trim())
            .map_err(|e| FunctionError::Parsing(format!("Could not parse function payload: {e}")))
    }

    /// Checks the argument map against the required keys and scalar types of `name`.
    pub fn parse_args(&self) -> Result<FunctionArgs, FunctionError> {
        let args = ArgReader {
            name: self.name,
            args: &self.args,
        };
        match self.name {
            FunctionName::OpenApplication => Ok(FunctionArgs::OpenApplication {
                bundle_identifier: args.required_string("bundleIdentifier")?,
            }),
            FunctionName::OpenFile => Ok(FunctionArgs::OpenFile {
                file: args.required_string("file")?,
            }),
            FunctionName::OpenUrl => {
                let url = args.required_string("url")?;
                let url = (url.trim() != CURRENT_PAGE).then_some(url);
                Ok(FunctionArgs::OpenUrl {
                    url,
                    prompt: args.optional_string("prompt")?,
                })
            }
            FunctionName::PerformUiAction => Ok(FunctionArgs::PerformUiAction(UiAction {
                id: ElementId::from(args.required_string("id")?),
                narration: args.required_string("narration")?,
                delay_in_millis: args.required_millis("delayInMillis")?.min(MAX_DELAY_MILLIS),
                input_text: args.optional_string("inputText")?,
                press_enter: args.optional_bool("pressEnter")?.unwrap_or(false),
            })),
            FunctionName::SaveFile => Ok(FunctionArgs::SaveFile {
                id: ElementId::from(args.required_string("id")?),
                file: args.required_string("file")?,
            }),
            FunctionName::FocusUiElement => {
                let id = args.optional_string("id")?.map(ElementId::from);
                let error_message = args.optional_string("errorMessage")?;
                if id.is_none() && error_message.is_none() {
                    return Err(args.missing("id"));
                }
                Ok(FunctionArgs::FocusUiElement { id, error_message })
            }
        }
    }
}

struct ArgReader<'a> {
    name: FunctionName,
    args: &'a Map<String, Value>,
}

impl ArgReader<'_> {
    fn missing(&self, key: &str) -> FunctionError {
        FunctionError::Parsing(format!(
            "Missing required argument '{key}' for {}",
            self.name
        ))
    }

    fn mistyped(&self, key: &str, expected: &str) -> FunctionError {
        FunctionError::Parsing(format!(
            "Argument '{key}' for {} must be {expected}",
            self.name
        ))
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.args.get(key).filter(|v| !v.is_null())
    }

    fn required_string(&self, key: &str) -> Result<String, FunctionError> {
        self.optional_string(key)?.ok_or_else(|| self.missing(key))
    }

    /// Empty strings count as absent.
    fn optional_string(&self, key: &str) -> Result<Option<String>, FunctionError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.mistyped(key, "a string")),
        }
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>, FunctionError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.mistyped(key, "a boolean")),
        }
    }

    fn required_millis(&self, key: &str) -> Result<u64, FunctionError> {
        let value = self.present(key).ok_or_else(|| self.missing(key))?;
        if let Some(ms) = value.as_u64() {
            return Ok(ms);
        }
        match value.as_f64() {
            Some(ms) if ms >= 0.0 && ms.is_finite() => Ok(ms.round() as u64),
            _ => Err(self.mistyped(key, "a non-negative number")),
        }
    }
}
