//! What the assistant knows about the app it is acting on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use typeahead::{ElementMap, RunningApplication, SnapshotTarget};

/// Immutable description of the target app at one point in time. Modified
/// copies are made with the `with_*` methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContext {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    bundle_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<i32>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serialized_ui_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ocr_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    copied_text: Option<String>,
}

impl AppContext {
    pub fn new(app_name: Option<String>, bundle_identifier: Option<String>, pid: Option<i32>) -> Self {
        Self {
            app_name,
            bundle_identifier,
            pid,
            ..Default::default()
        }
    }

    pub fn from_running(app: &RunningApplication) -> Self {
        Self::new(
            app.app_name.clone(),
            app.bundle_identifier.clone(),
            Some(app.pid),
        )
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn bundle_identifier(&self) -> Option<&str> {
        self.bundle_identifier.as_deref()
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn serialized_ui_element(&self) -> Option<&str> {
        self.serialized_ui_element.as_deref()
    }

    pub fn ocr_text(&self) -> Option<&str> {
        self.ocr_text.as_deref()
    }

    pub fn copied_text(&self) -> Option<&str> {
        self.copied_text.as_deref()
    }

    pub fn with_url(self, url: Option<String>) -> Self {
        Self { url, ..self }
    }

    pub fn with_serialized_ui_element(self, serialized_ui_element: Option<String>) -> Self {
        Self {
            serialized_ui_element,
            ..self
        }
    }

    pub fn with_ocr_text(self, ocr_text: Option<String>) -> Self {
        Self { ocr_text, ..self }
    }

    pub fn with_copied_text(self, copied_text: Option<String>) -> Self {
        Self {
            copied_text,
            ..self
        }
    }

    pub fn snapshot_target(&self) -> SnapshotTarget {
        SnapshotTarget {
            pid: self.pid,
            bundle_identifier: self.bundle_identifier.clone(),
        }
    }
}

/// An installed app the model may open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub bundle_identifier: String,
    pub app_name: String,
    #[serde(default)]
    pub is_whitelisted: bool,
}

impl Application {
    pub fn new(bundle_identifier: &str, app_name: &str) -> Self {
        Self {
            bundle_identifier: bundle_identifier.to_string(),
            app_name: app_name.to_string(),
            is_whitelisted: true,
        }
    }
}

/// App context plus the element map of the snapshot it was serialized from.
/// Each executor consumes one and produces the next.
#[derive(Debug, Clone, Default)]
pub struct AppInfo {
    pub app_context: Option<AppContext>,
    pub element_map: ElementMap,
    pub apps: HashMap<String, Application>,
}

impl AppInfo {
    pub fn new(
        app_context: Option<AppContext>,
        element_map: ElementMap,
        apps: HashMap<String, Application>,
    ) -> Self {
        Self {
            app_context,
            element_map,
            apps,
        }
    }

    pub fn app(&self, bundle_identifier: &str) -> Option<&Application> {
        self.apps.get(bundle_identifier)
    }

    /// Bundle ids in a stable order, for the request payload.
    pub fn bundle_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.apps.keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub fn apps_by_bundle_id(apps: impl IntoIterator<Item = Application>) -> HashMap<String, Application> {
    apps.into_iter()
        .map(|app| (app.bundle_identifier.clone(), app))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_return_modified_copies() {
        let base = AppContext::new(Some("Safari".into()), Some("com.apple.Safari".into()), Some(12));
        let with_ocr = base.clone().with_ocr_text(Some("Sign in".into()));
        assert_eq!(base.ocr_text(), None);
        assert_eq!(with_ocr.ocr_text(), Some("Sign in"));
        assert_eq!(with_ocr.bundle_identifier(), Some("com.apple.Safari"));

        let target = with_ocr.snapshot_target();
        assert_eq!(target.pid, Some(12));
    }

    #[test]
    fn serializes_camel_case_without_empty_extras() {
        let ctx = AppContext::new(Some("Notes".into()), Some("com.apple.Notes".into()), None);
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["bundleIdentifier"], "com.apple.Notes");
        assert!(json.get("ocrText").is_none());
        assert!(json.get("pid").is_none());
    }
}
