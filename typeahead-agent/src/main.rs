use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use typeahead_agent::app_info::{apps_by_bundle_id, AppInfo};
use typeahead_agent::client::{HttpModelClient, ModelClient};
use typeahead_agent::config::{JsonFileStore, Settings};
use typeahead_agent::conversation::{Conversation, TurnOutcome};
use typeahead_agent::functions::{Capabilities, ExecutorTiming, FunctionManager};
use typeahead_agent::local_model::{CommandModel, LocalModelClient};
use typeahead_agent::message::Message;
use typeahead_agent::store::{ConversationStore, JsonConversationStore};
use typeahead_agent::ui::{AssistantWindow, HeadlessWindow, Narrator, NoopNarrator, SayNarrator};
use typeahead_agent::utils::init_logging;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Typeahead - an assistant that reads and drives macOS apps through accessibility"
)]
struct Args {
    /// Settings file (defaults to ~/.typeahead/settings.json)
    #[arg(long, env = "TYPEAHEAD_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the model backend
    #[arg(long, env = "TYPEAHEAD_API_URL")]
    api_url: Option<String>,

    /// Use a local model instead of the backend
    #[arg(long)]
    offline: bool,

    /// Command that reads a prompt on stdin and streams the answer to stdout
    #[arg(long, env = "TYPEAHEAD_LOCAL_MODEL")]
    local_model_command: Option<String>,

    /// Speak function narrations aloud
    #[arg(long)]
    narrate: bool,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Where conversations are saved
    #[arg(long)]
    history_dir: Option<PathBuf>,
}

fn base_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".typeahead")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| base_dir().join("settings.json"));
    tracing::info!("Reading settings from {}", config_path.display());
    let mut settings = Settings::load(&JsonFileStore::new(&config_path))?;
    if let Some(url) = args.api_url.clone() {
        settings.api_base_url = url;
    }
    if args.offline {
        settings.online = false;
    }
    if args.narrate {
        settings.is_narrate_enabled = true;
    }
    settings.validate()?;

    let platform = typeahead::platforms::create_platform()?;
    if !platform.engine.is_trusted() {
        tracing::warn!("Accessibility access is not granted; snapshots will be empty");
    }

    let window: Arc<dyn AssistantWindow> = Arc::new(HeadlessWindow::new());
    let capabilities = Capabilities::new(
        &platform,
        settings.snapshot.clone(),
        settings.input_timing.clone(),
        window,
    );
    let functions = Arc::new(FunctionManager::new(capabilities, ExecutorTiming::default()));

    let client: Arc<dyn ModelClient> = if settings.online {
        tracing::info!("Using model backend at {}", settings.api_base_url);
        Arc::new(HttpModelClient::new(
            &settings.api_base_url,
            settings.request_timeout(),
        )?)
    } else {
        let command = args
            .local_model_command
            .as_deref()
            .ok_or_else(|| anyhow!("--local-model-command is required when offline"))?;
        Arc::new(LocalModelClient::new(CommandModel::from_command_line(command)?))
    };

    let history_dir = args
        .history_dir
        .clone()
        .or_else(|| settings.history_dir.clone())
        .unwrap_or_else(|| base_dir().join("history"));
    let store = Arc::new(JsonConversationStore::new(history_dir)?);

    let narrator: Arc<dyn Narrator> = if settings.is_narrate_enabled {
        Arc::new(SayNarrator::new())
    } else {
        Arc::new(NoopNarrator)
    };

    let apps = apps_by_bundle_id(settings.apps.clone());
    let conversation = Conversation::new(client, functions.clone(), store.clone(), narrator, settings);

    repl(&conversation, &functions, store.as_ref(), apps).await?;

    conversation.close().await?;
    tracing::info!("Conversation {} saved", conversation.id());
    Ok(())
}

async fn repl(
    conversation: &Conversation,
    functions: &FunctionManager,
    store: &dyn ConversationStore,
    apps: std::collections::HashMap<String, typeahead_agent::Application>,
) -> Result<()> {
    println!("Type a message. Commands: /new, /history, /load <id>, /quit. Ctrl+C stops a running turn.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/new" => {
                conversation.reset().await?;
                println!("Started a new conversation.");
            }
            "/history" => {
                for root_id in store.list()? {
                    println!("  {root_id}");
                }
            }
            command if command.starts_with("/load ") => {
                let id = Uuid::parse_str(command.trim_start_matches("/load ").trim())?;
                if conversation.load(id).await? {
                    print_messages(&conversation.messages());
                } else {
                    println!("No conversation {id}");
                }
            }
            text => {
                let (app_context, element_map) = functions.capture(None);
                let app_info = AppInfo::new(app_context, element_map, apps.clone());
                let seen = conversation.messages().len();

                conversation.add_user_message(text, None, false, app_info).await;
                let outcome = tokio::select! {
                    outcome = conversation.wait() => outcome,
                    _ = tokio::signal::ctrl_c() => {
                        conversation.cancel().await;
                        Some(TurnOutcome::Cancelled)
                    }
                };
                tracing::debug!("turn ended: {:?}", outcome);

                let messages = conversation.messages();
                print_messages(messages.get(seen + 1..).unwrap_or_default());
                if outcome == Some(TurnOutcome::Cancelled) {
                    println!("(cancelled)");
                }
            }
        }
    }
    Ok(())
}

fn print_messages(messages: &[Message]) {
    for message in messages.iter().filter(|m| !m.is_hidden) {
        let who = if message.is_current_user { "you" } else { "typeahead" };
        if message.is_function_call() {
            println!("{who} > [{}]", message.text);
        } else if !message.text.is_empty() {
            println!("{who} > {}", message.text);
        }
        if let Some(error) = &message.response_error {
            println!("{who} ! {error}");
        }
    }
}
