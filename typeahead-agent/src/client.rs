//! Model backend: request payload, streamed chunk handling and the HTTP client.

use crate::app_info::AppContext;
use crate::errors::ClientError;
use crate::message::Message;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Protocol version sent with every request.
pub const PROTOCOL_VERSION: &str = "v3";

const GENERIC_SERVER_ERROR: &str = "Something went wrong...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Text,
    Image,
    /// `text` holds a function call JSON payload.
    Function,
}

/// One line of the response stream, and also the buffered result of a whole stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChunkPayload {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            mode: Some(Mode::Text),
            finish_reason: None,
        }
    }

    pub fn function(json: &str) -> Self {
        Self {
            text: Some(json.to_string()),
            mode: Some(Mode::Function),
            finish_reason: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    /// Folds a streamed chunk into this buffer. Text chunks accumulate unless a
    /// special (image/function) payload is already buffered; special chunks
    /// replace the buffer. Returns the text to display, if any.
    pub fn absorb(&mut self, chunk: ChunkPayload) -> Option<String> {
        let text = chunk.text.clone()?;
        match chunk.mode() {
            Mode::Text => {
                if self.mode() == Mode::Text {
                    self.text.get_or_insert_with(String::new).push_str(&text);
                    self.mode = Some(Mode::Text);
                }
                if chunk.finish_reason.is_some() {
                    self.finish_reason = chunk.finish_reason;
                }
                Some(text)
            }
            Mode::Image | Mode::Function => {
                *self = chunk;
                None
            }
        }
    }
}

/// Everything the backend needs for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation id.
    pub uuid: Uuid,
    pub username: String,
    pub user_full_name: String,
    pub user_objective: Option<String>,
    pub user_bio: String,
    pub user_lang: String,
    pub copied_text: String,
    pub messages: Vec<Message>,
    pub history: Option<Vec<Message>>,
    pub app_context: Option<AppContext>,
    pub version: String,
    pub is_autopilot_enabled: bool,
    /// Bundle ids the model may open.
    pub apps: Vec<String>,
    pub is_voice_over_enabled: bool,
    pub client_version: Option<String>,
    pub incognito: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct SuggestIntentsResponse {
    #[serde(default)]
    intents: Vec<String>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Streams one response. Text chunks go to `sink` as they arrive; the
    /// buffered payload is returned at the end.
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ChunkPayload, ClientError>;

    async fn suggest_intents(&self, _request: &ChatRequest) -> Result<Vec<String>, ClientError> {
        Ok(Vec::new())
    }
}

/// Splits a byte stream into lines. Partial lines are kept until the next push.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left after the stream ended without a trailing newline.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Decodes one stream line. Blank lines are skipped.
pub fn parse_stream_line(line: &str) -> Result<Option<ChunkPayload>, ClientError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| ClientError::Decode(format!("{e} in line {}", crate::utils::preview(line, 80))))
}

/// Client for the hosted backend.
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpModelClient {
    /// `timeout` bounds connecting and single-shot calls; streams run until the server closes them.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.json::<ErrorResponse>().await.ok().map(|e| e.detail);
        warn!("Model backend returned {}: {:?}", status, detail);
        Err(ClientError::Server(
            detail.unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string()),
        ))
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    #[instrument(skip_all, fields(conversation = %request.uuid))]
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ChunkPayload, ClientError> {
        let response = self
            .client
            .post(self.endpoint("get_stream"))
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut body = Box::pin(response.bytes_stream());
        let mut lines = LineBuffer::default();
        let mut buffered = ChunkPayload::default();
        let mut absorb = |line: &str, buffered: &mut ChunkPayload| -> Result<(), ClientError> {
            if let Some(chunk) = parse_stream_line(line)? {
                if let Some(text) = buffered.absorb(chunk) {
                    sink(&text);
                }
            }
            Ok(())
        };

        while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for line in lines.push(&bytes) {
                absorb(&line, &mut buffered)?;
            }
        }
        if let Some(rest) = lines.finish() {
            absorb(&rest, &mut buffered)?;
        }

        debug!("stream finished in {:?} mode", buffered.mode());
        Ok(buffered)
    }

    async fn suggest_intents(&self, request: &ChatRequest) -> Result<Vec<String>, ClientError> {
        let response = self
            .client
            .post(self.endpoint("suggest_intents"))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let payload: SuggestIntentsResponse = response.json().await?;
        Ok(payload.intents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunks_accumulate() {
        let mut buffered = ChunkPayload::default();
        assert_eq!(buffered.absorb(ChunkPayload::text("Hel")).as_deref(), Some("Hel"));
        assert_eq!(buffered.absorb(ChunkPayload::text("lo")).as_deref(), Some("lo"));
        assert_eq!(buffered.text.as_deref(), Some("Hello"));
        assert_eq!(buffered.mode(), Mode::Text);
    }

    #[test]
    fn function_payload_wins_over_later_text() {
        let mut buffered = ChunkPayload::default();
        buffered.absorb(ChunkPayload::text("Let me click that. "));
        assert_eq!(buffered.absorb(ChunkPayload::function(r#"{"name":"open_file"}"#)), None);
        // still shown, not buffered
        assert_eq!(buffered.absorb(ChunkPayload::text("ok")).as_deref(), Some("ok"));
        assert_eq!(buffered.mode(), Mode::Function);
        assert_eq!(buffered.text.as_deref(), Some(r#"{"name":"open_file"}"#));
    }

    #[test]
    fn lines_may_span_chunks() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(b"{\"text\":\"a\"").is_empty());
        assert_eq!(lines.push(b"}\r\n{\"te"), vec![r#"{"text":"a"}"#.to_string()]);
        assert!(lines.push(b"xt\":\"b\"}").is_empty());
        assert_eq!(lines.finish().as_deref(), Some(r#"{"text":"b"}"#));
    }

    #[test]
    fn stream_lines_decode_camel_case() {
        let chunk = parse_stream_line(r#"{"text":"x","mode":"function","finishReason":"stop"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.mode(), Mode::Function);
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert!(parse_stream_line("   ").unwrap().is_none());
        assert!(matches!(parse_stream_line("<html>"), Err(ClientError::Decode(_))));
    }

    #[test]
    fn request_uses_wire_names() {
        let request = ChatRequest {
            user_full_name: "Ada Lovelace".into(),
            is_voice_over_enabled: true,
            version: PROTOCOL_VERSION.into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["userFullName"], "Ada Lovelace");
        assert_eq!(value["isVoiceOverEnabled"], true);
        assert_eq!(value["version"], "v3");
    }
}
