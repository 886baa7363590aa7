use super::StepEnv;
use crate::errors::FunctionError;

/// Types `file` into the open panel's "Go to folder" sheet and confirms twice.
pub(super) async fn run(env: &StepEnv<'_>, file: &str) -> Result<(), FunctionError> {
    env.activate_target().await?;
    env.write_clipboard(file).await?;

    env.checkpoint()?;
    env.input().go_to_file().await?;
    env.sleep(env.timing.step).await?;

    env.input().paste(None).await?;
    env.sleep(env.timing.step).await?;

    env.input().enter().await?;
    env.sleep(env.timing.step).await?;

    env.input().enter().await?;
    env.sleep(env.timing.long).await?;
    Ok(())
}
