use super::{focus, StepEnv};
use crate::errors::FunctionError;
use typeahead::AxElement;

/// Puts the VoiceOver cursor on an element without activating it.
pub(super) async fn run(env: &StepEnv<'_>, element: &AxElement) -> Result<(), FunctionError> {
    if !env.caps.workspace.is_voiceover_enabled() {
        return Err(FunctionError::Execution(
            "VoiceOver must be enabled".to_string(),
        ));
    }

    env.activate_target().await?;
    env.checkpoint()?;
    // silences whatever VoiceOver is reading
    env.input().control().await?;
    focus::scroll_into_view(env, element).await?;
    env.sleep(env.timing.focus).await?;

    let center = element
        .center()
        .ok_or_else(|| FunctionError::Execution("Failed to focus on element".to_string()))?;
    env.input().move_pointer(center).await?;
    env.sleep(env.timing.focus).await?;
    env.input().voiceover_focus_shortcut().await?;
    Ok(())
}
