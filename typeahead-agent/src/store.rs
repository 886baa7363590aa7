//! Conversation history on disk.

use crate::errors::AgentError;
use crate::message::Message;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub trait ConversationStore: Send + Sync {
    /// Persists a whole conversation, keyed by the root id of its first message.
    /// Saving an empty conversation is a no-op.
    fn save(&self, messages: &[Message]) -> Result<(), AgentError>;

    fn load(&self, root_id: Uuid) -> Result<Option<Vec<Message>>, AgentError>;

    /// Stored root ids, newest first.
    fn list(&self) -> Result<Vec<Uuid>, AgentError>;
}

/// One pretty-printed `<root id>.json` per conversation.
#[derive(Debug, Clone)]
pub struct JsonConversationStore {
    dir: PathBuf,
}

impl JsonConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, root_id: Uuid) -> PathBuf {
        self.dir.join(format!("{root_id}.json"))
    }
}

impl ConversationStore for JsonConversationStore {
    fn save(&self, messages: &[Message]) -> Result<(), AgentError> {
        let Some(first) = messages.first() else {
            return Ok(());
        };
        let stored: Vec<Message> = messages.iter().map(Message::for_storage).collect();
        let path = self.path_for(first.root_id);
        fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
        debug!("saved {} messages to {}", stored.len(), path.display());
        Ok(())
    }

    fn load(&self, root_id: Uuid) -> Result<Option<Vec<Message>>, AgentError> {
        let path = self.path_for(root_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn list(&self) -> Result<Vec<Uuid>, AgentError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(root_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                warn!("Skipping unexpected file {}", path.display());
                continue;
            };
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            entries.push((modified, root_id));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }
}

/// Keeps conversations in memory, for tests and incognito sessions.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn save(&self, messages: &[Message]) -> Result<(), AgentError> {
        let Some(first) = messages.first() else {
            return Ok(());
        };
        let stored = messages.iter().map(Message::for_storage).collect();
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(first.root_id, stored);
        Ok(())
    }

    fn load(&self, root_id: Uuid) -> Result<Option<Vec<Message>>, AgentError> {
        Ok(self
            .conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&root_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<Uuid>, AgentError> {
        let conversations = self
            .conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut roots: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = conversations
            .iter()
            .filter_map(|(id, messages)| messages.first().map(|m| (m.root_created_at, *id)))
            .collect();
        roots.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(roots.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ImageData, MessageType, IMAGE_NOT_SAVED};

    #[test]
    fn json_store_round_trips_without_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().join("history")).unwrap();

        let user = Message::root("draw a cat", true, false, None);
        let image = Message::reply_to(&user, "", false, false, None)
            .with_type(MessageType::Image(ImageData::B64Json("aGk=".into())));
        store.save(&[user.clone(), image]).unwrap();

        let loaded = store.load(user.root_id).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], user);
        assert_eq!(loaded[1].text, IMAGE_NOT_SAVED);
        assert_eq!(store.list().unwrap(), vec![user.root_id]);
        assert!(store.load(Uuid::new_v4()).unwrap().is_none());

        let raw = std::fs::read_to_string(dir.path().join("history").join(format!("{}.json", user.root_id))).unwrap();
        assert!(raw.contains("\n  "), "expected pretty JSON");
    }

    #[test]
    fn empty_conversations_are_not_saved() {
        let store = MemoryConversationStore::new();
        store.save(&[]).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
