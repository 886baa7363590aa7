//! Assistant window and speech, the two bits of UI the function loop touches.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// The assistant's own window. Hidden while an executor drives another app.
pub trait AssistantWindow: Send + Sync {
    fn show(&self);
    fn hide(&self);
    fn is_visible(&self) -> bool;
}

/// Window state for the terminal front end, which has no window of its own.
#[derive(Debug)]
pub struct HeadlessWindow {
    visible: AtomicBool,
    toggles: AtomicUsize,
}

impl HeadlessWindow {
    pub fn new() -> Self {
        Self {
            visible: AtomicBool::new(true),
            toggles: AtomicUsize::new(0),
        }
    }

    /// How many times the window changed visibility.
    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }

    fn set(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::SeqCst) != visible {
            self.toggles.fetch_add(1, Ordering::SeqCst);
            debug!("assistant window {}", if visible { "shown" } else { "hidden" });
        }
    }
}

impl Default for HeadlessWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantWindow for HeadlessWindow {
    fn show(&self) {
        self.set(true);
    }

    fn hide(&self) {
        self.set(false);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

pub trait Narrator: Send + Sync {
    fn speak(&self, text: &str);
    fn stop(&self);
}

#[derive(Debug, Default)]
pub struct NoopNarrator;

impl Narrator for NoopNarrator {
    fn speak(&self, _text: &str) {}
    fn stop(&self) {}
}

/// Speaks through the system `say` command. A new utterance interrupts the previous one.
#[derive(Debug, Default)]
pub struct SayNarrator {
    current: Mutex<Option<Child>>,
}

impl SayNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_current(&self) -> Option<Child> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Narrator for SayNarrator {
    fn speak(&self, text: &str) {
        self.stop();
        match Command::new("say").arg(text).kill_on_drop(true).spawn() {
            Ok(child) => {
                *self
                    .current
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(child);
            }
            Err(e) => warn!("Failed to start narration: {}", e),
        }
    }

    fn stop(&self) {
        if let Some(mut child) = self.take_current() {
            if let Err(e) = child.start_kill() {
                debug!("narration already finished: {}", e);
            }
        }
    }
}
