use super::StepEnv;
use crate::app_info::AppContext;
use crate::errors::FunctionError;
use crate::html::{extract_links, scraped_text};
use tracing::{debug, info};

/// Opens `url` (or stays on the current page) and, with a prompt, copies the
/// page text and links for the model. Tabs opened here are closed again.
pub(super) async fn run(
    env: &StepEnv<'_>,
    url: Option<&reqwest::Url>,
    prompt: Option<&str>,
) -> Result<Option<AppContext>, FunctionError> {
    match url {
        Some(url) => {
            env.checkpoint()?;
            info!("Opening {}", url);
            env.caps.workspace.open(url.as_str())?;
            env.sleep(env.timing.page_load).await?;
        }
        None => env.activate_target().await?,
    }

    let copied_text = match prompt {
        Some(prompt) => {
            debug!("scraping page for: {}", prompt);
            env.checkpoint()?;
            env.input().select_all().await?;
            env.checkpoint()?;
            env.input().copy().await?;

            let clipboard = env.caps.clipboard();
            let text = clipboard.read_text().unwrap_or_default();
            let links = clipboard
                .read_html()
                .map(|html| extract_links(&html))
                .unwrap_or_default();

            if url.is_some() {
                env.checkpoint()?;
                env.input().close().await?;
            }
            Some(scraped_text(&text, &links))
        }
        None => None,
    };

    let context = match env.caps.workspace.frontmost_application() {
        Some(app) => AppContext::from_running(&app),
        None => env.app_context.cloned().unwrap_or_default(),
    };
    let page_url = url
        .map(|u| u.to_string())
        .or_else(|| env.app_context.and_then(|c| c.url()).map(str::to_string));
    Ok(Some(
        context.with_url(page_url).with_copied_text(copied_text),
    ))
}
