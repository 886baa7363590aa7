use crate::element::AxElement;
use crate::input::{Clipboard, InputBackend};
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The common trait that all platform-specific engines must implement
pub trait AccessibilityEngine: Send + Sync {
    /// The system-wide element, root of everything on screen.
    fn system_wide_element(&self) -> Result<AxElement, AutomationError>;

    /// The application element for a process.
    fn application_element(&self, pid: i32) -> Result<AxElement, AutomationError>;

    /// Whether this process may use the accessibility API at all.
    fn is_trusted(&self) -> bool;

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A running application as reported by the window server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningApplication {
    pub app_name: Option<String>,
    pub bundle_identifier: Option<String>,
    pub pid: i32,
}

/// Launch services and session state.
pub trait Workspace: Send + Sync {
    /// Location of the installed app for a bundle id.
    fn url_for_application(&self, bundle_identifier: &str) -> Option<String>;

    /// Opens a URL or an application location with its default handler.
    fn open(&self, target: &str) -> Result<(), AutomationError>;

    /// Brings a running app to the front. Returns `false` when it is not running.
    fn activate(&self, bundle_identifier: &str) -> Result<bool, AutomationError>;

    fn frontmost_application(&self) -> Option<RunningApplication>;

    fn is_voiceover_enabled(&self) -> bool;
}

/// Everything a platform provides, bundled for injection.
#[derive(Clone)]
pub struct Platform {
    pub engine: Arc<dyn AccessibilityEngine>,
    pub input: Arc<dyn InputBackend>,
    pub clipboard: Arc<dyn Clipboard>,
    pub workspace: Arc<dyn Workspace>,
}

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Create the appropriate engine for the current platform
pub fn create_engine() -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::MacOSEngine::new()?))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "Current platform is not supported".to_string(),
        ))
    }
}

/// Create the engine plus input, clipboard and workspace for the current platform.
pub fn create_platform() -> Result<Platform, AutomationError> {
    #[cfg(target_os = "macos")]
    {
        let clipboard: Arc<dyn Clipboard> = Arc::new(macos::MacOSClipboard::new());
        Ok(Platform {
            engine: create_engine()?,
            input: Arc::new(macos::MacOSInputBackend::new()?),
            clipboard,
            workspace: Arc::new(macos::MacOSWorkspace::new()),
        })
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "Current platform is not supported".to_string(),
        ))
    }
}
