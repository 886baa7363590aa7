use super::{focus, StepEnv};
use crate::errors::FunctionError;
use crate::function_call::UiAction;
use std::time::Duration;
use tracing::debug;
use typeahead::element::roles;
use typeahead::AxElement;

pub(super) async fn run(env: &StepEnv<'_>, element: &AxElement, action: &UiAction) -> Result<(), FunctionError> {
    env.activate_target().await?;
    focus::scroll_into_view(env, element).await?;
    env.sleep(env.timing.focus).await?;
    focus::press_or_click(env, element).await?;

    if env.caps.workspace.is_voiceover_enabled() {
        focus::sync_voiceover_cursor(env, element).await?;
    }

    env.sleep(Duration::from_millis(action.delay_in_millis)).await?;

    let Some(text) = action.input_text.as_deref() else {
        return Ok(());
    };

    if is_combo_box(element) {
        env.checkpoint()?;
        return pick_from_list(element, text, env.max_depth());
    }

    env.write_clipboard(text).await?;
    env.checkpoint()?;
    env.input().select_all().await?;
    env.checkpoint()?;
    env.input().paste(None).await?;
    if action.press_enter {
        env.checkpoint()?;
        env.input().enter().await?;
    }
    Ok(())
}

/// Combo boxes and pop-ups that expose their options as a child list.
pub fn is_combo_box(element: &AxElement) -> bool {
    element.role().as_deref() == Some(roles::COMBO_BOX)
        || element
            .children()
            .iter()
            .any(|child| child.role().as_deref() == Some(roles::LIST))
}

/// Presses the first option below `element` whose value or title is `text`.
pub fn pick_from_list(element: &AxElement, text: &str, max_depth: usize) -> Result<(), FunctionError> {
    let option = element
        .find_first(false, max_depth, |candidate| {
            candidate.value().as_deref() == Some(text) || candidate.title().as_deref() == Some(text)
        })
        .ok_or_else(|| FunctionError::Execution(format!("Could not find option '{text}'")))?;
    debug!("picking option {:?}", option.role());
    option.press()?;
    Ok(())
}
