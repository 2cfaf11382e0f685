//! Backend client contract and the HTTP implementation for OpenAI-compatible
//! local model servers.
//!
//! The session manager only needs three things from a backend: connect to it,
//! resolve the concrete model id behind the configured alias, and stream one
//! chat turn as incremental text chunks.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatResponse, ModelInfo, ModelsResponse};
use crate::utils::url::construct_api_url;

/// Error from any backend operation. Transport and protocol failures are
/// collapsed into a message; the session layer only displays them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Opaque connection handle returned by [`ChatBackend::start_and_connect`].
/// After model resolution the session stores the concrete model id here.
#[derive(Debug, Clone)]
pub struct BackendHandle {
    pub base_url: String,
    pub model: String,
}

/// A finite, non-restartable stream of response chunks for one turn.
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

/// Minimal client contract for a model-serving backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start/connect to the backend for the given model alias.
    async fn start_and_connect(&self, model: &str) -> Result<BackendHandle, BackendError>;

    /// Resolve the concrete model id published by the backend.
    async fn resolve_model_info(&self, handle: &BackendHandle) -> Result<String, BackendError>;

    /// Open a streaming chat call for one user message.
    fn stream_chat(&self, handle: &BackendHandle, message: &str) -> ChunkStream;
}

/// What a single SSE line contributes to the chunk stream.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SsePayload {
    Chunk(String),
    Done,
    Error(String),
    Ignore,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn parse_sse_line(line: &str) -> SsePayload {
    let Some(payload) = extract_data_payload(line) else {
        return SsePayload::Ignore;
    };

    if payload == "[DONE]" {
        return SsePayload::Done;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => match response.choices.first().and_then(|c| c.delta.content.clone()) {
            Some(content) => SsePayload::Chunk(content),
            None => SsePayload::Ignore,
        },
        Err(_) => {
            if payload.trim().is_empty() {
                SsePayload::Ignore
            } else {
                SsePayload::Error(format_api_error(payload))
            }
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "backend error: <empty response>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("backend error: {summary}");
            }
        }
    }

    format!("backend error: {trimmed}")
}

/// Pick the concrete model id for a requested alias from a `/models` listing.
///
/// Local servers publish decorated variant ids (hardware suffix, quantization
/// tag) for a short alias, so an exact match wins but a case-insensitive
/// substring match is accepted.
fn pick_model<'a>(models: &'a [ModelInfo], requested: &str) -> Option<&'a str> {
    if let Some(exact) = models.iter().find(|m| m.id == requested) {
        return Some(&exact.id);
    }

    let needle = requested.to_ascii_lowercase();
    models
        .iter()
        .find(|m| m.id.to_ascii_lowercase().contains(&needle))
        .map(|m| m.id.as_str())
}

/// Client for an OpenAI-compatible local server (Foundry Local, llama.cpp
/// server, Ollama's compatibility endpoint, and similar).
pub struct LocalBackend {
    client: reqwest::Client,
    base_url: String,
}

impl LocalBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: crate::utils::url::normalize_base_url(base_url),
        }
    }

    async fn fetch_models(&self, base_url: &str) -> Result<Vec<ModelInfo>, BackendError> {
        let url = construct_api_url(base_url, "models");
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(BackendError::new(format!(
                "model listing failed with status {} at {url}",
                response.status()
            )));
        }

        let listing: ModelsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::new(format!("invalid model listing: {e}")))?;
        Ok(listing.data)
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn start_and_connect(&self, model: &str) -> Result<BackendHandle, BackendError> {
        debug!(%model, base_url = %self.base_url, "connecting to local backend");

        // A reachable /models endpoint is the readiness signal; local servers
        // answer it as soon as the model host is up.
        self.fetch_models(&self.base_url).await.map_err(|e| {
            BackendError::new(format!("backend unreachable at {}: {e}", self.base_url))
        })?;

        Ok(BackendHandle {
            base_url: self.base_url.clone(),
            model: model.to_string(),
        })
    }

    async fn resolve_model_info(&self, handle: &BackendHandle) -> Result<String, BackendError> {
        let models = self.fetch_models(&handle.base_url).await?;
        let resolved = pick_model(&models, &handle.model).ok_or_else(|| {
            BackendError::new(format!(
                "model '{}' not available on {}",
                handle.model, handle.base_url
            ))
        })?;
        debug!(requested = %handle.model, %resolved, "resolved model id");
        Ok(resolved.to_string())
    }

    fn stream_chat(&self, handle: &BackendHandle, message: &str) -> ChunkStream {
        let client = self.client.clone();
        let url = construct_api_url(&handle.base_url, "chat/completions");
        let request = ChatRequest {
            model: handle.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: message.to_string(),
            }],
            stream: true,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            run_chat_stream(client, url, request, tx).await;
        });

        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }
}

async fn run_chat_stream(
    client: reqwest::Client,
    url: String,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<Result<String, BackendError>>,
) {
    let response = match client.post(&url).json(&request).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(Err(BackendError::from(e)));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send(Err(BackendError::new(format!(
            "chat request failed ({status}): {}",
            format_api_error(&body)
        ))));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(Err(BackendError::from(e)));
                return;
            }
        };
        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(e) => {
                    debug!("invalid UTF-8 in stream: {e}");
                    buffer.drain(..=newline_pos);
                    continue;
                }
            };
            buffer.drain(..=newline_pos);

            match parse_sse_line(&line) {
                SsePayload::Chunk(content) => {
                    // A closed receiver means the caller abandoned the turn.
                    if tx.send(Ok(content)).is_err() {
                        return;
                    }
                }
                SsePayload::Done => return,
                SsePayload::Error(message) => {
                    let _ = tx.send(Err(BackendError::new(message)));
                    return;
                }
                SsePayload::Ignore => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sse_line_handles_spacing_variants() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#),
            SsePayload::Chunk("Hello".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data:{"choices":[{"delta":{"content":"World"}}]}"#),
            SsePayload::Chunk("World".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SsePayload::Done);
        assert_eq!(parse_sse_line("data:[DONE]"), SsePayload::Done);
    }

    #[test]
    fn parse_sse_line_ignores_non_data_lines() {
        assert_eq!(parse_sse_line(""), SsePayload::Ignore);
        assert_eq!(parse_sse_line(": keep-alive"), SsePayload::Ignore);
        assert_eq!(parse_sse_line("event: ping"), SsePayload::Ignore);
    }

    #[test]
    fn parse_sse_line_ignores_empty_deltas() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            SsePayload::Ignore
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[]}"#),
            SsePayload::Ignore
        );
    }

    #[test]
    fn parse_sse_line_surfaces_error_payloads() {
        let parsed = parse_sse_line(r#"data: {"error":{"message":"model overloaded"}}"#);
        assert_eq!(
            parsed,
            SsePayload::Error("backend error: model overloaded".to_string())
        );
    }

    #[test]
    fn format_api_error_summarizes_json_shapes() {
        assert_eq!(
            format_api_error(r#"{"error":{"message":"too   many\nrequests"}}"#),
            "backend error: too many requests"
        );
        assert_eq!(
            format_api_error(r#"{"error":"boom"}"#),
            "backend error: boom"
        );
        assert_eq!(
            format_api_error(r#"{"message":"not found"}"#),
            "backend error: not found"
        );
        assert_eq!(format_api_error("plain failure"), "backend error: plain failure");
        assert_eq!(format_api_error("  "), "backend error: <empty response>");
    }

    fn listing(ids: &[&str]) -> Vec<ModelInfo> {
        ids.iter()
            .map(|id| ModelInfo {
                id: id.to_string(),
                owned_by: None,
            })
            .collect()
    }

    #[test]
    fn pick_model_prefers_exact_match() {
        let models = listing(&["phi-3.5-mini-instruct-cpu", "phi-3.5-mini"]);
        assert_eq!(pick_model(&models, "phi-3.5-mini"), Some("phi-3.5-mini"));
    }

    #[test]
    fn pick_model_falls_back_to_substring_match() {
        let models = listing(&["Phi-3.5-mini-instruct-generic-cpu", "qwen2.5-0.5b"]);
        assert_eq!(
            pick_model(&models, "phi-3.5-mini"),
            Some("Phi-3.5-mini-instruct-generic-cpu")
        );
    }

    #[test]
    fn pick_model_reports_no_match() {
        let models = listing(&["qwen2.5-0.5b"]);
        assert_eq!(pick_model(&models, "phi-3.5-mini"), None);
    }
}
