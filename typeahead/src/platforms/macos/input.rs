use crate::geometry::Point;
use crate::input::{Clipboard, InputBackend, Key, Modifiers, MouseEventKind};
use crate::AutomationError;
use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use objc::runtime::{Object, BOOL, NO};
use objc::{class, msg_send, sel, sel_impl};
use objc_foundation::{INSString, NSString};
use std::ffi::CStr;
use std::os::raw::c_char;

fn event_source() -> Result<CGEventSource, AutomationError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| AutomationError::PlatformError("Failed to create event source".to_string()))
}

fn flags(modifiers: Modifiers) -> CGEventFlags {
    let mut flags = CGEventFlags::empty();
    if modifiers.command {
        flags |= CGEventFlags::CGEventFlagCommand;
    }
    if modifiers.shift {
        flags |= CGEventFlags::CGEventFlagShift;
    }
    if modifiers.control {
        flags |= CGEventFlags::CGEventFlagControl;
    }
    if modifiers.option {
        flags |= CGEventFlags::CGEventFlagAlternate;
    }
    flags
}

/// Posts CGEvents at the HID tap.
pub struct MacOSInputBackend;

impl MacOSInputBackend {
    pub fn new() -> Result<Self, AutomationError> {
        event_source()?;
        Ok(Self)
    }
}

impl InputBackend for MacOSInputBackend {
    fn post_key(&self, key: Key, down: bool, modifiers: Modifiers) -> Result<(), AutomationError> {
        let event = CGEvent::new_keyboard_event(event_source()?, key.key_code(), down)
            .map_err(|_| AutomationError::PlatformError(format!("Failed to create {key:?} event")))?;
        if !modifiers.is_empty() {
            event.set_flags(flags(modifiers));
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn post_mouse(&self, kind: MouseEventKind, at: Point) -> Result<(), AutomationError> {
        let event_type = match kind {
            MouseEventKind::LeftDown => CGEventType::LeftMouseDown,
            MouseEventKind::LeftUp => CGEventType::LeftMouseUp,
        };
        let event = CGEvent::new_mouse_event(
            event_source()?,
            event_type,
            CGPoint::new(at.x, at.y),
            CGMouseButton::Left,
        )
        .map_err(|_| AutomationError::PlatformError("Failed to create mouse event".to_string()))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point, AutomationError> {
        let event = CGEvent::new(event_source()?)
            .map_err(|_| AutomationError::PlatformError("Failed to read cursor".to_string()))?;
        let location = event.location();
        Ok(Point::new(location.x, location.y))
    }

    fn warp_cursor(&self, to: Point) -> Result<(), AutomationError> {
        CGDisplay::warp_mouse_cursor_position(CGPoint::new(to.x, to.y))
            .map_err(|code| AutomationError::PlatformError(format!("CGWarpMouseCursorPosition: {code}")))
    }
}

const PLAIN_TEXT_TYPE: &str = "public.utf8-plain-text";
const HTML_TYPE: &str = "public.html";

/// `NSPasteboard.generalPasteboard`.
pub struct MacOSClipboard;

impl MacOSClipboard {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, pasteboard_type: &str) -> Option<String> {
        unsafe {
            let pasteboard: *mut Object = msg_send![class!(NSPasteboard), generalPasteboard];
            let ty = NSString::from_str(pasteboard_type);
            let value: *mut Object = msg_send![pasteboard, stringForType: &*ty];
            if value.is_null() {
                return None;
            }
            let utf8: *const c_char = msg_send![value, UTF8String];
            if utf8.is_null() {
                return None;
            }
            Some(CStr::from_ptr(utf8).to_string_lossy().into_owned())
        }
    }
}

impl Default for MacOSClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for MacOSClipboard {
    fn change_count(&self) -> i64 {
        unsafe {
            let pasteboard: *mut Object = msg_send![class!(NSPasteboard), generalPasteboard];
            msg_send![pasteboard, changeCount]
        }
    }

    fn read_text(&self) -> Option<String> {
        self.read(PLAIN_TEXT_TYPE)
    }

    fn read_html(&self) -> Option<String> {
        self.read(HTML_TYPE)
    }

    fn write_text(&self, text: &str) -> Result<(), AutomationError> {
        let written: BOOL = unsafe {
            let pasteboard: *mut Object = msg_send![class!(NSPasteboard), generalPasteboard];
            let _: i64 = msg_send![pasteboard, clearContents];
            let value = NSString::from_str(text);
            let ty = NSString::from_str(PLAIN_TEXT_TYPE);
            msg_send![pasteboard, setString: &*value forType: &*ty]
        };
        if written == NO {
            return Err(AutomationError::PlatformError(
                "Failed to write to the pasteboard".to_string(),
            ));
        }
        Ok(())
    }
}
