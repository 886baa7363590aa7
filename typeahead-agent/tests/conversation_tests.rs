mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use typeahead_agent::client::{ChunkPayload, PROTOCOL_VERSION};
use typeahead_agent::config::Settings;
use typeahead_agent::conversation::{Conversation, TurnOutcome};
use typeahead_agent::errors::ClientError;
use typeahead_agent::functions::ExecutorTiming;
use typeahead_agent::message::{Message, MessageType};
use typeahead_agent::store::{ConversationStore, JsonConversationStore, MemoryConversationStore};
use typeahead_agent::transcript::PRUNED;
use typeahead_agent::ui::NoopNarrator;

fn conversation_with(
    fixture: &Fixture,
    client: Arc<ScriptedClient>,
    store: Arc<dyn ConversationStore>,
    settings: Settings,
) -> Conversation {
    Conversation::new(
        client,
        fixture.functions.clone(),
        store,
        Arc::new(NoopNarrator),
        settings,
    )
}

fn conversation(fixture: &Fixture, client: Arc<ScriptedClient>) -> Conversation {
    conversation_with(
        fixture,
        client,
        Arc::new(MemoryConversationStore::new()),
        Settings::default(),
    )
}

fn visible(messages: &[Message]) -> Vec<&Message> {
    messages.iter().filter(|m| !m.is_hidden).collect()
}

fn presses(fixture: &Fixture) -> usize {
    fixture
        .ax_actions()
        .iter()
        .filter(|(_, action)| action == "AXPress")
        .count()
}

#[tokio::test]
async fn consecutive_calls_batch_into_one_entry_and_prune_old_state() {
    let fixture = Fixture::new(notes_window());
    let (app_info, tree) = fixture.snapshot();
    let send = id_titled(&tree, "Send");
    let client = Arc::new(ScriptedClient::functions(vec![click(&send); 3]));
    let conversation = conversation(&fixture, client.clone());

    conversation
        .add_user_message("Send it three times", None, false, app_info)
        .await;
    assert_eq!(conversation.wait().await, Some(TurnOutcome::Text));

    let messages = conversation.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(visible(&messages).len(), 3);

    let batches: Vec<&Message> = messages.iter().filter(|m| m.is_function_call()).collect();
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].is_hidden);
    assert_eq!(batches[0].function_calls().len(), 3);

    let tools: Vec<&Message> = messages.iter().filter(|m| m.is_tool_call()).collect();
    assert_eq!(tools.len(), 3);
    assert!(tools.iter().all(|m| m.is_hidden && m.response_error.is_none()));
    assert_eq!(tools[0].text, PRUNED);
    assert_eq!(tools[1].text, PRUNED);
    assert!(tools[2].text.starts_with("Updated state\n"));
    assert!(tools[2].text.contains("Send"));

    assert_eq!(messages.last().unwrap().text, "Done.");
    assert_eq!(client.requests().len(), 4);
    assert_eq!(presses(&fixture), 3);
}

#[tokio::test]
async fn request_failures_land_on_the_transcript() {
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::new(vec![Err(ClientError::Network(
        "offline".into(),
    ))]));
    let conversation = conversation(&fixture, client);

    conversation.add_user_message("Hello", None, false, app_info).await;
    assert_eq!(conversation.wait().await, Some(TurnOutcome::Failed));

    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[1].response_error.as_deref(),
        Some("Network error: offline")
    );
    assert!(!messages[1].is_current_user);
}

#[tokio::test]
async fn unknown_elements_become_visible_tool_errors() {
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::functions(vec![click("AXButton999")]));
    let conversation = conversation(&fixture, client);

    conversation.add_user_message("Press it", None, false, app_info).await;
    assert_eq!(conversation.wait().await, Some(TurnOutcome::Failed));

    let last = conversation.messages().last().cloned().unwrap();
    assert!(last.is_tool_call());
    assert!(!last.is_hidden);
    assert_eq!(last.response_error.as_deref(), Some("No such element AXButton999"));
    assert!(fixture.desktop.log.is_empty());
}

#[tokio::test]
async fn undecodable_payloads_set_a_response_error() {
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::new(vec![Ok(vec![ChunkPayload::function(
        "{\"name\": \"perform_ui_action\", ",
    )])]));
    let conversation = conversation(&fixture, client);

    conversation.add_user_message("Do something", None, false, app_info).await;
    assert_eq!(conversation.wait().await, Some(TurnOutcome::Failed));

    let last = conversation.messages().last().cloned().unwrap();
    assert!(!last.is_tool_call());
    assert!(last
        .response_error
        .as_deref()
        .is_some_and(|e| e.contains("Could not parse")));
}

#[tokio::test]
async fn cancelling_during_narration_closes_the_pending_call() {
    let timing = ExecutorTiming {
        narration_pause: Duration::from_secs(30),
        ..ExecutorTiming::instant()
    };
    let fixture = Fixture::with_timing(notes_window(), timing);
    let (app_info, tree) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::functions(vec![click(&id_titled(&tree, "Send"))]));
    let conversation = conversation(&fixture, client.clone());

    conversation.add_user_message("Send it", None, false, app_info).await;
    let mut waited = 0;
    while !conversation.messages().iter().any(Message::is_function_call) {
        assert!(waited < 500, "function call never appeared");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    conversation.cancel().await;

    let messages = conversation.messages();
    let last = messages.last().unwrap();
    assert!(last.is_tool_call());
    assert!(last.is_hidden);
    assert_eq!(last.response_error.as_deref(), Some("Function was cancelled"));
    assert!(fixture.desktop.log.input_events().is_empty());
    assert!(fixture.ax_actions().is_empty());
    assert_eq!(client.requests().len(), 1);
    assert_eq!(conversation.wait().await, None);
}

#[tokio::test]
async fn runaway_turns_stop_at_the_call_limit() {
    let fixture = Fixture::new(notes_window());
    let (app_info, tree) = fixture.snapshot();
    let send = id_titled(&tree, "Send");
    let client = Arc::new(ScriptedClient::functions(vec![click(&send); 3]));
    let settings = Settings {
        max_function_calls_per_turn: 2,
        ..Settings::default()
    };
    let conversation = conversation_with(
        &fixture,
        client.clone(),
        Arc::new(MemoryConversationStore::new()),
        settings,
    );

    conversation.add_user_message("Keep pressing", None, false, app_info).await;
    assert_eq!(conversation.wait().await, Some(TurnOutcome::LimitReached));

    let last = conversation.messages().last().cloned().unwrap();
    assert_eq!(
        last.response_error.as_deref(),
        Some("Stopped after 2 actions in a row")
    );
    assert_eq!(presses(&fixture), 2);
    assert_eq!(client.requests().len(), 3);
}

#[tokio::test]
async fn close_persists_the_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonConversationStore::new(dir.path()).unwrap());
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let conversation = conversation_with(
        &fixture,
        Arc::new(ScriptedClient::default()),
        store.clone(),
        Settings::default(),
    );

    conversation.add_user_message("Hi", None, false, app_info).await;
    conversation.wait().await;
    conversation.close().await.unwrap();

    let root_id = conversation.messages()[0].root_id;
    assert_eq!(store.list().unwrap(), vec![root_id]);
    let stored = store.load(root_id).unwrap().expect("stored conversation");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].text, "Hi");
    assert_eq!(stored[1].text, "Done.");
}

#[tokio::test]
async fn editing_a_user_message_reissues_the_turn() {
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(vec![ChunkPayload::text("First "), ChunkPayload::text("answer")]),
        Ok(vec![ChunkPayload::text("Second answer")]),
    ]));
    let conversation = conversation(&fixture, client.clone());

    conversation.add_user_message("Question", None, false, app_info).await;
    conversation.wait().await;
    assert_eq!(conversation.messages()[1].text, "First answer");

    assert!(conversation.update_message(0, "Better question").await);
    assert_eq!(conversation.wait().await, Some(TurnOutcome::Text));

    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_edited);
    assert_eq!(messages[1].text, "Second answer");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 1);
    assert_eq!(requests[1].messages[0].text, "Better question");
}

#[tokio::test]
async fn requests_describe_the_app_and_the_allowed_apps() {
    let fixture = Fixture::new(notes_window());
    let (app_info, _) = fixture.snapshot();
    let client = Arc::new(ScriptedClient::default());
    let conversation = conversation(&fixture, client.clone());

    conversation.add_user_message("What is open?", None, false, app_info).await;
    conversation.wait().await;

    let request = client.requests().remove(0);
    assert_eq!(request.version, PROTOCOL_VERSION);
    assert_eq!(request.version, "v3");
    assert_eq!(request.uuid, conversation.id());
    assert_eq!(request.apps, vec![NOTES.to_string(), SAFARI.to_string()]);
    let context = request.app_context.expect("app context");
    assert_eq!(context.bundle_identifier(), Some(NOTES));
    assert!(context.serialized_ui_element().is_some_and(|s| s.contains("Send")));
    assert_eq!(request.messages.len(), 1);
    assert!(matches!(request.messages[0].message_type, MessageType::String));
    assert!(request.user_objective.is_none());
    assert!(!request.is_voice_over_enabled);
}

#[tokio::test]
async fn intents_default_to_an_empty_list() {
    let fixture = Fixture::new(notes_window());
    let conversation = conversation(&fixture, Arc::new(ScriptedClient::default()));

    assert_eq!(conversation.user_intents(), None);
    assert!(conversation.suggest_intents().await.unwrap().is_empty());
    assert_eq!(conversation.user_intents(), Some(Vec::new()));

    conversation.set_user_intents(vec!["Summarize".into(), "Reply".into()]);
    conversation.append_user_intents(vec!["Archive".into()]);
    assert_eq!(conversation.user_intents().unwrap().len(), 3);
}
