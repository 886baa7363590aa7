//! User settings, read and written through a small key-value store.

use crate::app_info::Application;
use crate::errors::AgentError;
use crate::transcript::DEFAULT_MAX_INTENTS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use typeahead::{InputTiming, SnapshotConfig};

const SETTINGS_KEY: &str = "settings";

pub const DEFAULT_API_BASE_URL: &str = "https://typeahead-ai.fly.dev";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, AgentError>;
    fn set(&self, key: &str, value: Value) -> Result<(), AgentError>;
}

/// A JSON object on disk. Missing files read as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, AgentError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(AgentError::Config(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, AgentError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AgentError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(all))?)?;
        debug!("wrote {} to {}", key, self.path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, AgentError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AgentError> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Use the hosted backend. When off, a local model answers.
    pub online: bool,
    pub is_narrate_enabled: bool,
    pub is_autopilot_enabled: bool,
    pub username: String,
    pub user_full_name: String,
    pub user_bio: String,
    pub user_lang: String,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub max_intents: usize,
    pub max_function_calls_per_turn: usize,
    pub snapshot: SnapshotConfig,
    pub input_timing: InputTiming,
    /// Apps the model may open.
    pub apps: Vec<Application>,
    pub history_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            online: true,
            is_narrate_enabled: false,
            is_autopilot_enabled: true,
            username: String::new(),
            user_full_name: String::new(),
            user_bio: String::new(),
            user_lang: "en".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
            max_intents: DEFAULT_MAX_INTENTS,
            max_function_calls_per_turn: 25,
            snapshot: SnapshotConfig::default(),
            input_timing: InputTiming::default(),
            apps: Vec::new(),
            history_dir: None,
        }
    }
}

impl Settings {
    /// Stored settings, or the defaults when nothing was saved yet.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, AgentError> {
        match store.get(SETTINGS_KEY)? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AgentError::Config(format!("Invalid settings: {e}"))),
            None => {
                info!("No saved settings, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), AgentError> {
        store.set(SETTINGS_KEY, serde_json::to_value(self)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.online && reqwest::Url::parse(&self.api_base_url).is_err() {
            return Err(AgentError::Config(format!(
                "apiBaseUrl '{}' is not a valid URL",
                self.api_base_url
            )));
        }
        if self.max_function_calls_per_turn == 0 {
            return Err(AgentError::Config(
                "maxFunctionCallsPerTurn must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_when_nothing_is_stored() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_intents, 9);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        store
            .set("settings", json!({"online": false, "username": "ada", "snapshot": {"maxDepth": 5}}))
            .unwrap();
        store.set("unrelated", json!(1)).unwrap();

        let settings = Settings::load(&store).unwrap();
        assert!(!settings.online);
        assert_eq!(settings.username, "ada");
        assert_eq!(settings.snapshot.max_depth, 5);
        assert_eq!(settings.snapshot.max_children, SnapshotConfig::default().max_children);
        assert_eq!(store.get("unrelated").unwrap(), Some(json!(1)));
    }

    #[test]
    fn save_then_load() {
        let store = MemoryStore::new();
        let mut settings = Settings::default();
        settings.is_narrate_enabled = true;
        settings.apps.push(Application::new("com.apple.Notes", "Notes"));
        settings.save(&store).unwrap();
        assert_eq!(Settings::load(&store).unwrap(), settings);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let settings = Settings {
            api_base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(AgentError::Config(_))));
        assert!(Settings::default().validate().is_ok());
    }
}
