//! macOS accessibility engine on top of the AXUIElement C API.

mod input;
mod workspace;

pub use input::{MacOSClipboard, MacOSInputBackend};
pub use workspace::MacOSWorkspace;

use crate::element::{AxElement, AxElementImpl};
use crate::geometry::{Point, Size};
use crate::platforms::AccessibilityEngine;
use crate::AutomationError;
use accessibility_sys::{
    kAXValueTypeCGPoint, kAXValueTypeCGSize, AXIsProcessTrusted, AXUIElementCopyActionNames,
    AXUIElementCopyAttributeValue, AXUIElementCreateApplication, AXUIElementCreateSystemWide,
    AXUIElementGetTypeID, AXUIElementPerformAction, AXUIElementRef, AXUIElementSetAttributeValue,
    AXValueGetType, AXValueGetTypeID, AXValueGetValue, AXValueRef,
};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFGetTypeID, CFRelease, CFRetain, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::string::CFString;
use core_foundation::url::CFURL;
use core_graphics::geometry::{CGPoint, CGSize};
use std::ffi::c_void;
use std::ptr;
use tracing::{debug, warn};

// AXError codes from HIServices/AXError.h
const AX_SUCCESS: i32 = 0;
const AX_ILLEGAL_ARGUMENT: i32 = -25201;
const AX_INVALID_UI_ELEMENT: i32 = -25202;
const AX_CANNOT_COMPLETE: i32 = -25204;
const AX_ATTRIBUTE_UNSUPPORTED: i32 = -25205;
const AX_ACTION_UNSUPPORTED: i32 = -25206;
const AX_API_DISABLED: i32 = -25211;

fn map_ax_error(code: i32, context: String) -> AutomationError {
    match code {
        AX_CANNOT_COMPLETE => AutomationError::CannotComplete(context),
        AX_ACTION_UNSUPPORTED => AutomationError::ActionUnsupported(context),
        AX_ATTRIBUTE_UNSUPPORTED => AutomationError::UnsupportedOperation(context),
        AX_INVALID_UI_ELEMENT => AutomationError::ElementNotFound(context),
        AX_ILLEGAL_ARGUMENT => AutomationError::InvalidArgument(context),
        AX_API_DISABLED => AutomationError::PermissionDenied(context),
        _ => AutomationError::AccessibilityApiError {
            code,
            message: context,
        },
    }
}

/// Owned reference to an AXUIElement.
#[derive(Debug)]
pub struct MacOSElement {
    element: AXUIElementRef,
}

// AXUIElement references are CF objects and may be messaged from any thread.
unsafe impl Send for MacOSElement {}
unsafe impl Sync for MacOSElement {}

impl Drop for MacOSElement {
    fn drop(&mut self) {
        unsafe { CFRelease(self.element as CFTypeRef) };
    }
}

impl Clone for MacOSElement {
    fn clone(&self) -> Self {
        unsafe { CFRetain(self.element as CFTypeRef) };
        Self {
            element: self.element,
        }
    }
}

impl MacOSElement {
    /// Takes ownership of a +1 reference.
    fn from_create_rule(element: AXUIElementRef) -> Option<Self> {
        (!element.is_null()).then_some(Self { element })
    }

    /// Retains a borrowed reference.
    fn from_get_rule(element: AXUIElementRef) -> Option<Self> {
        if element.is_null() {
            return None;
        }
        unsafe { CFRetain(element as CFTypeRef) };
        Some(Self { element })
    }

    fn into_element(self) -> AxElement {
        AxElement::new(Box::new(self))
    }

    fn copy_attribute(&self, name: &str) -> Option<CFType> {
        let attribute = CFString::new(name);
        let mut value: CFTypeRef = ptr::null();
        let err = unsafe {
            AXUIElementCopyAttributeValue(self.element, attribute.as_concrete_TypeRef(), &mut value)
        };
        if err != AX_SUCCESS || value.is_null() {
            return None;
        }
        Some(unsafe { CFType::wrap_under_create_rule(value) })
    }

    fn ax_value<T: Default>(&self, name: &str, value_type: u32) -> Option<T> {
        let value = self.copy_attribute(name)?;
        let raw = value.as_CFTypeRef();
        unsafe {
            if CFGetTypeID(raw) != AXValueGetTypeID() {
                return None;
            }
            let ax_value = raw as AXValueRef;
            if AXValueGetType(ax_value) != value_type {
                return None;
            }
            let mut out = T::default();
            let ok = AXValueGetValue(ax_value, value_type, &mut out as *mut T as *mut c_void);
            ok.then_some(out)
        }
    }
}

impl AxElementImpl for MacOSElement {
    fn object_id(&self) -> usize {
        self.element as usize
    }

    fn string_attribute(&self, name: &str) -> Option<String> {
        self.copy_attribute(name)?
            .downcast::<CFString>()
            .map(|s| s.to_string())
    }

    fn bool_attribute(&self, name: &str) -> Option<bool> {
        self.copy_attribute(name)?
            .downcast::<CFBoolean>()
            .map(bool::from)
    }

    fn point_attribute(&self, name: &str) -> Option<Point> {
        self.ax_value::<CGPoint>(name, kAXValueTypeCGPoint)
            .map(|p| Point::new(p.x, p.y))
    }

    fn size_attribute(&self, name: &str) -> Option<Size> {
        self.ax_value::<CGSize>(name, kAXValueTypeCGSize)
            .map(|s| Size::new(s.width, s.height))
    }

    fn url_attribute(&self, name: &str) -> Option<String> {
        let value = self.copy_attribute(name)?;
        if let Some(url) = value.downcast::<CFURL>() {
            return Some(url.get_string().to_string());
        }
        value.downcast::<CFString>().map(|s| s.to_string())
    }

    fn element_attribute(&self, name: &str) -> Option<AxElement> {
        let value = self.copy_attribute(name)?;
        let raw = value.as_CFTypeRef();
        if unsafe { CFGetTypeID(raw) != AXUIElementGetTypeID() } {
            return None;
        }
        MacOSElement::from_get_rule(raw as AXUIElementRef).map(MacOSElement::into_element)
    }

    fn elements_attribute(&self, name: &str) -> Vec<AxElement> {
        let Some(value) = self.copy_attribute(name) else {
            return Vec::new();
        };
        let raw = value.as_CFTypeRef();
        if unsafe { CFGetTypeID(raw) != CFArray::<CFType>::type_id() } {
            return Vec::new();
        }
        let array = unsafe { CFArray::<CFType>::wrap_under_get_rule(raw as CFArrayRef) };
        let element_type = unsafe { AXUIElementGetTypeID() };
        array
            .iter()
            .filter_map(|item| {
                let item = item.as_CFTypeRef();
                if unsafe { CFGetTypeID(item) } != element_type {
                    return None;
                }
                MacOSElement::from_get_rule(item as AXUIElementRef)
            })
            .map(MacOSElement::into_element)
            .collect()
    }

    fn action_names(&self) -> Vec<String> {
        let mut names: CFArrayRef = ptr::null();
        let err = unsafe { AXUIElementCopyActionNames(self.element, &mut names) };
        if err != AX_SUCCESS || names.is_null() {
            return Vec::new();
        }
        let names = unsafe { CFArray::<CFString>::wrap_under_create_rule(names) };
        names.iter().map(|name| name.to_string()).collect()
    }

    fn perform_action(&self, action: &str) -> Result<(), AutomationError> {
        let action_name = CFString::new(action);
        let err = unsafe { AXUIElementPerformAction(self.element, action_name.as_concrete_TypeRef()) };
        if err != AX_SUCCESS {
            debug!("{} failed with AXError {}", action, err);
            return Err(map_ax_error(err, action.to_string()));
        }
        Ok(())
    }

    fn set_string_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        let attribute = CFString::new(name);
        let value = CFString::new(value);
        let err = unsafe {
            AXUIElementSetAttributeValue(
                self.element,
                attribute.as_concrete_TypeRef(),
                value.as_CFTypeRef(),
            )
        };
        if err != AX_SUCCESS {
            return Err(map_ax_error(err, format!("set {name}")));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn AxElementImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct MacOSEngine;

impl MacOSEngine {
    pub fn new() -> Result<Self, AutomationError> {
        if !unsafe { AXIsProcessTrusted() } {
            warn!("Accessibility permission has not been granted to this process");
        }
        Ok(Self)
    }
}

impl AccessibilityEngine for MacOSEngine {
    fn system_wide_element(&self) -> Result<AxElement, AutomationError> {
        MacOSElement::from_create_rule(unsafe { AXUIElementCreateSystemWide() })
            .map(MacOSElement::into_element)
            .ok_or_else(|| AutomationError::PlatformError("AXUIElementCreateSystemWide".to_string()))
    }

    fn application_element(&self, pid: i32) -> Result<AxElement, AutomationError> {
        MacOSElement::from_create_rule(unsafe { AXUIElementCreateApplication(pid) })
            .map(MacOSElement::into_element)
            .ok_or_else(|| {
                AutomationError::ElementNotFound(format!("application with pid {pid}"))
            })
    }

    fn is_trusted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
