use super::StepEnv;
use crate::errors::FunctionError;
use tracing::{debug, warn};
use typeahead::element::actions;
use typeahead::AxElement;

/// Asks the element to scroll itself into view. Failures are not fatal.
pub(super) async fn scroll_into_view(env: &StepEnv<'_>, element: &AxElement) -> Result<(), FunctionError> {
    env.checkpoint()?;
    if element.supports_action(actions::SCROLL_TO_VISIBLE) {
        if let Err(e) = element.perform_action(actions::SCROLL_TO_VISIBLE) {
            debug!("scroll to visible failed: {}", e);
        }
    }
    Ok(())
}

/// Presses the element, or clicks its center when it cannot be pressed.
/// A press that could not complete is retried once.
pub(super) async fn press_or_click(env: &StepEnv<'_>, element: &AxElement) -> Result<(), FunctionError> {
    env.checkpoint()?;
    if element.supports_action(actions::PRESS) {
        return match element.press() {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => {
                warn!("press failed ({}), retrying once", e);
                env.sleep(env.timing.press_retry).await?;
                element.press().map_err(FunctionError::from)
            }
            Err(e) => Err(e.into()),
        };
    }

    match element.center() {
        Some(center) => Ok(env.input().click_at(center).await?),
        None => Err(FunctionError::Execution(
            "Element cannot be pressed or clicked".to_string(),
        )),
    }
}

/// Moves the VoiceOver cursor onto the element through the pointer.
pub(super) async fn sync_voiceover_cursor(
    env: &StepEnv<'_>,
    element: &AxElement,
) -> Result<(), FunctionError> {
    let Some(center) = element.center() else {
        debug!("element has no frame, VoiceOver cursor left in place");
        return Ok(());
    };
    env.checkpoint()?;
    env.input().move_pointer(center).await?;
    env.sleep(env.timing.focus).await?;
    env.input().voiceover_focus_shortcut().await?;
    Ok(())
}
