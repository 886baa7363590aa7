use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Lookup of a snapshot id that is unknown or belongs to an older snapshot.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The element does not support the requested action.
    #[error("Action unsupported: {0}")]
    ActionUnsupported(String),

    /// Transient accessibility failure, usually worth one retry.
    #[error("Cannot complete: {0}")]
    CannotComplete(String),

    #[error("Accessibility API error {code}: {message}")]
    AccessibilityApiError { code: i32, message: String },

    /// A copy did not change the clipboard.
    #[error("No changes detected on the clipboard")]
    NoChangesDetected,
}

impl AutomationError {
    /// Errors worth a single retry after a pause.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AutomationError::CannotComplete(_))
    }
}
