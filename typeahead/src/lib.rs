//! Accessibility primitives for the Typeahead assistant
//!
//! This crate captures bounded snapshots of the macOS accessibility tree,
//! groups OCR observations into paragraphs and drives synthetic keyboard and
//! mouse input. The agent crate builds the function-execution loop on top.

pub mod element;
pub mod errors;
pub mod geometry;
pub mod input;
pub mod ocr;
pub mod platforms;
pub mod snapshot;
#[cfg(test)]
mod tests;
pub mod tree_formatter;

pub use element::{AxElement, AxElementImpl, ElementId, UIElement, UIElementAttributes};
pub use errors::AutomationError;
pub use geometry::{Point, Rect, Size};
pub use input::{Clipboard, InputBackend, InputDriver, InputTiming, Key, Modifiers};
pub use ocr::{group_text_regions, OcrEngine, TextObservation, TextRegion};
pub use platforms::{AccessibilityEngine, Platform, RunningApplication, Workspace};
pub use snapshot::{ElementMap, SnapshotConfig, SnapshotTarget, Snapshotter, UIElementTree};
pub use tree_formatter::SerializeOptions;

/// Captured screen pixels, as handed to an [`OcrEngine`].
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// RGBA, row-major.
    pub image_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}
