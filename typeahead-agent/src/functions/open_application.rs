use super::StepEnv;
use crate::app_info::AppContext;
use crate::errors::FunctionError;
use tracing::info;

pub(super) async fn run(env: &StepEnv<'_>, bundle_identifier: &str) -> Result<AppContext, FunctionError> {
    let url = env
        .caps
        .workspace
        .url_for_application(bundle_identifier)
        .ok_or_else(|| FunctionError::Execution(format!("Failed to open {bundle_identifier}")))?;

    env.checkpoint()?;
    info!("Opening {} from {}", bundle_identifier, url);
    env.caps.workspace.open(&url)?;
    env.sleep(env.timing.long).await?;

    let context = match env.caps.workspace.frontmost_application() {
        Some(app) => AppContext::from_running(&app),
        None => AppContext::new(None, Some(bundle_identifier.to_string()), None),
    };
    Ok(context)
}
