use super::StepEnv;
use crate::errors::FunctionError;
use tracing::debug;
use typeahead::AxElement;

/// Identifier of the default button ("Save"/"Replace") in system save panels.
const ACTION_BUTTON_IDENTIFIER: &str = "action-button-1";

pub(super) async fn run(env: &StepEnv<'_>, panel: &AxElement, file: &str) -> Result<(), FunctionError> {
    env.activate_target().await?;
    env.write_clipboard(file).await?;

    env.checkpoint()?;
    env.input().go_to_file().await?;
    env.sleep(env.timing.short).await?;

    env.input().paste(None).await?;
    env.checkpoint()?;
    env.input().enter().await?;
    env.sleep(env.timing.short).await?;

    env.input().enter().await?;
    env.sleep(env.timing.step).await?;

    let button = panel.find_first(false, env.max_depth(), |e| {
        e.identifier().as_deref() == Some(ACTION_BUTTON_IDENTIFIER)
    });
    match button {
        Some(button) => {
            env.checkpoint()?;
            button.press()?;
            env.sleep(env.timing.step).await?;
        }
        None => debug!("save panel closed without a confirmation button"),
    }
    Ok(())
}
