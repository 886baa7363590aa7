use crate::platforms::{RunningApplication, Workspace};
use crate::AutomationError;
use objc::runtime::{Object, BOOL, NO};
use objc::{class, msg_send, sel, sel_impl};
use objc_foundation::{INSString, NSString};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::process::Command;
use tracing::debug;

unsafe fn ns_string_to_string(value: *mut Object) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let utf8: *const c_char = msg_send![value, UTF8String];
    if utf8.is_null() {
        return None;
    }
    Some(CStr::from_ptr(utf8).to_string_lossy().into_owned())
}

/// `NSWorkspace` plus the `open` and `osascript` tools.
pub struct MacOSWorkspace;

impl MacOSWorkspace {
    pub fn new() -> Self {
        Self
    }

    fn shared() -> *mut Object {
        unsafe { msg_send![class!(NSWorkspace), sharedWorkspace] }
    }

    fn run(program: &str, args: &[&str]) -> Result<String, AutomationError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| AutomationError::PlatformError(format!("{program}: {e}")))?;
        if !output.status.success() {
            return Err(AutomationError::PlatformError(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for MacOSWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace for MacOSWorkspace {
    fn url_for_application(&self, bundle_identifier: &str) -> Option<String> {
        unsafe {
            let bundle_id = NSString::from_str(bundle_identifier);
            let url: *mut Object =
                msg_send![Self::shared(), URLForApplicationWithBundleIdentifier: &*bundle_id];
            if url.is_null() {
                return None;
            }
            let path: *mut Object = msg_send![url, path];
            ns_string_to_string(path)
        }
    }

    fn open(&self, target: &str) -> Result<(), AutomationError> {
        debug!("open {}", target);
        Self::run("open", &[target]).map(|_| ())
    }

    fn activate(&self, bundle_identifier: &str) -> Result<bool, AutomationError> {
        let running = self
            .frontmost_application()
            .is_some_and(|app| app.bundle_identifier.as_deref() == Some(bundle_identifier))
            || Self::run(
                "osascript",
                &[
                    "-e",
                    &format!("application id \"{bundle_identifier}\" is running"),
                ],
            )? == "true";
        if !running {
            return Ok(false);
        }
        Self::run(
            "osascript",
            &["-e", &format!("tell application id \"{bundle_identifier}\" to activate")],
        )?;
        Ok(true)
    }

    fn frontmost_application(&self) -> Option<RunningApplication> {
        unsafe {
            let app: *mut Object = msg_send![Self::shared(), frontmostApplication];
            if app.is_null() {
                return None;
            }
            let name: *mut Object = msg_send![app, localizedName];
            let bundle_id: *mut Object = msg_send![app, bundleIdentifier];
            let pid: i32 = msg_send![app, processIdentifier];
            Some(RunningApplication {
                app_name: ns_string_to_string(name),
                bundle_identifier: ns_string_to_string(bundle_id),
                pid,
            })
        }
    }

    fn is_voiceover_enabled(&self) -> bool {
        let enabled: BOOL = unsafe { msg_send![Self::shared(), isVoiceOverEnabled] };
        enabled != NO
    }
}
