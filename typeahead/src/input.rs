//! Synthetic keyboard and mouse input with fixed settle delays.

use crate::errors::AutomationError;
use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Keys the driver knows how to post, with their macOS virtual key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    A,
    C,
    G,
    V,
    W,
    Return,
    Escape,
    Control,
    Option,
    Shift,
    F5,
    Dictation,
}

impl Key {
    pub fn key_code(self) -> u16 {
        match self {
            Key::A => 0x00,
            Key::C => 0x08,
            Key::G => 0x05,
            Key::V => 0x09,
            Key::W => 0x0D,
            Key::Return => 0x24,
            Key::Escape => 0x35,
            Key::Control => 0x3B,
            Key::Option => 0x3A,
            Key::Shift => 0x38,
            Key::F5 => 0x60,
            Key::Dictation => 0xB0,
        }
    }
}

/// Modifier flags attached to a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub command: bool,
    pub shift: bool,
    pub control: bool,
    pub option: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        command: false,
        shift: false,
        control: false,
        option: false,
    };

    pub const COMMAND: Modifiers = Modifiers {
        command: true,
        ..Modifiers::NONE
    };

    pub const SHIFT_COMMAND: Modifiers = Modifiers {
        command: true,
        shift: true,
        ..Modifiers::NONE
    };

    pub const OPTION_SHIFT_COMMAND: Modifiers = Modifiers {
        command: true,
        shift: true,
        option: true,
        control: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Modifiers::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEventKind {
    LeftDown,
    LeftUp,
}

/// Posts raw events to the OS.
pub trait InputBackend: Send + Sync {
    fn post_key(&self, key: Key, down: bool, modifiers: Modifiers) -> Result<(), AutomationError>;
    fn post_mouse(&self, kind: MouseEventKind, at: Point) -> Result<(), AutomationError>;
    fn cursor_position(&self) -> Result<Point, AutomationError>;
    /// Moves the pointer without clicking.
    fn warp_cursor(&self, to: Point) -> Result<(), AutomationError>;
}

impl<T: InputBackend + ?Sized> InputBackend for Arc<T> {
    fn post_key(&self, key: Key, down: bool, modifiers: Modifiers) -> Result<(), AutomationError> {
        (**self).post_key(key, down, modifiers)
    }

    fn post_mouse(&self, kind: MouseEventKind, at: Point) -> Result<(), AutomationError> {
        (**self).post_mouse(kind, at)
    }

    fn cursor_position(&self) -> Result<Point, AutomationError> {
        (**self).cursor_position()
    }

    fn warp_cursor(&self, to: Point) -> Result<(), AutomationError> {
        (**self).warp_cursor(to)
    }
}

/// The general pasteboard.
pub trait Clipboard: Send + Sync {
    /// Monotonic counter bumped by every write.
    fn change_count(&self) -> i64;
    fn read_text(&self) -> Option<String>;
    fn read_html(&self) -> Option<String>;
    fn write_text(&self, text: &str) -> Result<(), AutomationError>;
}

/// Settle delays. The defaults match what target apps need to register a keystroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputTiming {
    #[serde(with = "millis")]
    pub key_hold: Duration,
    #[serde(with = "millis")]
    pub post_key: Duration,
    /// Pause between keys of a chord that is posted key by key.
    #[serde(with = "millis")]
    pub chord_step: Duration,
}

impl Default for InputTiming {
    fn default() -> Self {
        Self {
            key_hold: Duration::from_millis(20),
            post_key: Duration::from_millis(200),
            chord_step: Duration::from_millis(50),
        }
    }
}

impl InputTiming {
    /// No delays at all, for tests.
    pub fn instant() -> Self {
        Self {
            key_hold: Duration::ZERO,
            post_key: Duration::ZERO,
            chord_step: Duration::ZERO,
        }
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

async fn settle(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed catalog of keystrokes and clicks the executors rely on.
pub struct InputDriver<B: InputBackend> {
    backend: B,
    clipboard: Arc<dyn Clipboard>,
    timing: InputTiming,
}

impl<B: InputBackend> InputDriver<B> {
    pub fn new(backend: B, clipboard: Arc<dyn Clipboard>, timing: InputTiming) -> Self {
        Self {
            backend,
            clipboard,
            timing,
        }
    }

    pub fn clipboard(&self) -> &Arc<dyn Clipboard> {
        &self.clipboard
    }

    pub fn timing(&self) -> &InputTiming {
        &self.timing
    }

    /// Key down, hold, key up, settle.
    pub async fn keystroke(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError> {
        debug!("keystroke {:?} {:?}", key, modifiers);
        self.backend.post_key(key, true, modifiers)?;
        settle(self.timing.key_hold).await;
        self.backend.post_key(key, false, modifiers)?;
        settle(self.timing.post_key).await;
        Ok(())
    }

    pub async fn select_all(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::A, Modifiers::COMMAND).await
    }

    /// ⌘C, failing with [`AutomationError::NoChangesDetected`] if the clipboard did not change.
    #[instrument(skip(self))]
    pub async fn copy(&self) -> Result<(), AutomationError> {
        let before = self.clipboard.change_count();
        self.keystroke(Key::C, Modifiers::COMMAND).await?;
        if self.clipboard.change_count() == before {
            return Err(AutomationError::NoChangesDetected);
        }
        Ok(())
    }

    /// ⌘V by default. Pass other flags for variants such as paste-and-match-style.
    pub async fn paste(&self, flags: Option<Modifiers>) -> Result<(), AutomationError> {
        self.keystroke(Key::V, flags.unwrap_or(Modifiers::COMMAND))
            .await
    }

    pub async fn enter(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::Return, Modifiers::NONE).await
    }

    pub async fn escape(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::Escape, Modifiers::NONE).await
    }

    /// ⌘W
    pub async fn close(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::W, Modifiers::COMMAND).await
    }

    /// ⇧⌘G, the "Go to folder" sheet of open and save panels.
    pub async fn go_to_file(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::G, Modifiers::SHIFT_COMMAND).await
    }

    /// A bare Control tap, which also silences VoiceOver speech.
    pub async fn control(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::Control, Modifiers::NONE).await
    }

    pub async fn dictation(&self) -> Result<(), AutomationError> {
        self.keystroke(Key::Dictation, Modifiers::NONE).await
    }

    pub async fn stop_dictation(&self) -> Result<(), AutomationError> {
        self.escape().await
    }

    /// Control-Option-Shift-F5: moves the VoiceOver cursor to the mouse pointer.
    /// Keys go down in order and come up in reverse, one step apart.
    pub async fn voiceover_focus_shortcut(&self) -> Result<(), AutomationError> {
        let keys = [Key::Control, Key::Option, Key::Shift, Key::F5];
        for key in keys {
            self.backend.post_key(key, true, Modifiers::NONE)?;
            settle(self.timing.chord_step).await;
        }
        for key in keys.iter().rev() {
            self.backend.post_key(*key, false, Modifiers::NONE)?;
            settle(self.timing.chord_step).await;
        }
        Ok(())
    }

    /// Left click at `point`, then puts the pointer back where it was.
    #[instrument(skip(self))]
    pub async fn click_at(&self, point: Point) -> Result<(), AutomationError> {
        let saved = self.backend.cursor_position()?;
        self.backend.post_mouse(MouseEventKind::LeftDown, point)?;
        settle(self.timing.key_hold).await;
        self.backend.post_mouse(MouseEventKind::LeftUp, point)?;
        settle(self.timing.key_hold).await;
        self.backend.warp_cursor(saved)?;
        settle(self.timing.post_key).await;
        Ok(())
    }

    pub async fn move_pointer(&self, to: Point) -> Result<(), AutomationError> {
        self.backend.warp_cursor(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockClipboard, MockInputBackend, RecordedEvent};

    fn driver(copy_changes_clipboard: bool) -> (InputDriver<Arc<MockInputBackend>>, Arc<MockInputBackend>) {
        let clipboard = Arc::new(MockClipboard::default());
        let backend = Arc::new(MockInputBackend::new(clipboard.clone()));
        if copy_changes_clipboard {
            backend.set_copy_result("copied", None);
        }
        (
            InputDriver::new(backend.clone(), clipboard, InputTiming::instant()),
            backend,
        )
    }

    #[tokio::test]
    async fn keystroke_posts_down_then_up_with_flags() {
        let (driver, backend) = driver(false);
        driver.go_to_file().await.unwrap();
        assert_eq!(
            backend.log().events(),
            vec![
                RecordedEvent::Key {
                    key: Key::G,
                    down: true,
                    modifiers: Modifiers::SHIFT_COMMAND
                },
                RecordedEvent::Key {
                    key: Key::G,
                    down: false,
                    modifiers: Modifiers::SHIFT_COMMAND
                },
            ]
        );
    }

    #[tokio::test]
    async fn copy_without_clipboard_change_fails() {
        let (driver, _) = driver(false);
        assert_eq!(driver.copy().await, Err(AutomationError::NoChangesDetected));
    }

    #[tokio::test]
    async fn copy_with_clipboard_change_succeeds() {
        let (driver, _) = driver(true);
        driver.copy().await.unwrap();
        assert_eq!(driver.clipboard().read_text().as_deref(), Some("copied"));
    }

    #[tokio::test]
    async fn voiceover_shortcut_releases_in_reverse_order() {
        let (driver, backend) = driver(false);
        driver.voiceover_focus_shortcut().await.unwrap();
        let keys: Vec<(Key, bool)> = backend
            .log()
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Key { key, down, .. } => Some((key, down)),
                _ => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                (Key::Control, true),
                (Key::Option, true),
                (Key::Shift, true),
                (Key::F5, true),
                (Key::F5, false),
                (Key::Shift, false),
                (Key::Option, false),
                (Key::Control, false),
            ]
        );
    }

    #[tokio::test]
    async fn click_restores_pointer() {
        let (driver, backend) = driver(false);
        backend.warp_cursor(Point::new(5.0, 5.0)).unwrap();
        backend.log().clear();

        driver.click_at(Point::new(50.0, 60.0)).await.unwrap();
        assert_eq!(
            backend.log().events(),
            vec![
                RecordedEvent::Mouse {
                    kind: MouseEventKind::LeftDown,
                    at: Point::new(50.0, 60.0)
                },
                RecordedEvent::Mouse {
                    kind: MouseEventKind::LeftUp,
                    at: Point::new(50.0, 60.0)
                },
                RecordedEvent::CursorMoved(Point::new(5.0, 5.0)),
            ]
        );
        assert_eq!(backend.cursor_position().unwrap(), Point::new(5.0, 5.0));
    }
}
