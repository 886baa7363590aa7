//! Offline mode: the request is rendered into an instruction prompt and fed
//! to a local model that streams tokens back.

use crate::client::{ChatRequest, ChunkPayload, ModelClient};
use crate::errors::ClientError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

const INSTRUCTION: &str = "Below is an instruction that describes a task. Write a response that appropriately completes the request.";

/// A model that turns a prompt into a stream of tokens.
#[async_trait]
pub trait LocalModel: Send + Sync {
    async fn predict(
        &self,
        prompt: &str,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<(), ClientError>;
}

/// Instruction template, the request without its messages as JSON, then the
/// messages replayed as alternating response/input turns.
pub fn build_prompt(request: &ChatRequest) -> Result<String, ClientError> {
    let context = ChatRequest {
        messages: Vec::new(),
        ..request.clone()
    };
    let json = serde_json::to_string(&context)
        .map_err(|e| ClientError::Client(format!("Encoding error: {e}")))?;

    let mut refinements = String::new();
    for message in &request.messages {
        refinements.push_str(&message.text);
        if message.is_current_user {
            refinements.push_str("\n\n### Response:");
        } else {
            refinements.push_str("\n\n### Input:\n");
        }
    }

    Ok(format!(
        "### Instruction:\n{INSTRUCTION}\n\n### Input:\n{json}\n\n### Response:\n{refinements}\n"
    ))
}

/// [`ModelClient`] backed by a [`LocalModel`]. Always answers in text mode
/// and suggests no intents.
pub struct LocalModelClient<M: LocalModel> {
    model: M,
}

impl<M: LocalModel> LocalModelClient<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: LocalModel> ModelClient for LocalModelClient<M> {
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ChunkPayload, ClientError> {
        let prompt = build_prompt(request)?;
        debug!("local prompt is {} bytes", prompt.len());

        let mut buffered = ChunkPayload::default();
        let mut forward = |token: &str| {
            if let Some(text) = buffered.absorb(ChunkPayload::text(token)) {
                sink(&text);
            }
        };
        self.model.predict(&prompt, &mut forward).await?;
        Ok(buffered)
    }
}

/// Runs an external command with the prompt on stdin and streams its stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    /// Splits `command_line` on whitespace into program and arguments.
    pub fn from_command_line(command_line: &str) -> Result<Self, ClientError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ClientError::Client("Empty local model command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl LocalModel for CommandModel {
    async fn predict(
        &self,
        prompt: &str,
        sink: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<(), ClientError> {
        info!("Running local model {}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::Client(format!("Failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ClientError::Client(format!("Failed to send prompt: {e}")))?;
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Client("Local model has no stdout".to_string()))?;
        let mut buf = [0u8; 1024];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let read = stdout
                .read(&mut buf)
                .await
                .map_err(|e| ClientError::Network(e.to_string()))?;
            if read == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..read]);
            // only forward complete UTF-8 sequences
            let valid = match std::str::from_utf8(&pending) {
                Ok(s) => s.len(),
                Err(e) => e.valid_up_to(),
            };
            if valid > 0 {
                let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
                pending.drain(..valid);
                sink(&text);
            }
        }
        if !pending.is_empty() {
            sink(&String::from_utf8_lossy(&pending));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ClientError::Client(e.to_string()))?;
        if !status.success() {
            return Err(ClientError::Server(format!("Local model exited with {status}")));
        }
        Ok(())
    }
}
