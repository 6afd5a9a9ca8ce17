//! Upstream client and stream plumbing for the AI relay.

use axum::http::StatusCode;
use tracing::warn;

use crate::config::Config;
use crate::error::{ErrorKind, RetryPolicy};
use crate::models::ai::ChatMessagePayload;

/// Rough provider price used for the analytics log.
const COST_PER_1K_TOKENS: f64 = 0.002;

pub fn estimate_cost(tokens: i32) -> f64 {
    f64::from(tokens.max(0)) * COST_PER_1K_TOKENS / 1000.0
}

/// Incremental decoder for newline-framed SSE byte streams.
///
/// Network reads do not align with frame boundaries: a `data:` line can be
/// split across two chunks, including mid-codepoint. Bytes are buffered and
/// only cut at `\n`, so every complete line comes out exactly once no matter
/// how the input was chunked.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, get back every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = &raw[..raw.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    /// Unterminated trailing line, if any (useful at end of stream).
    pub fn remainder(&self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

/// Payload of a `data:` SSE line; other lines (comments, event names,
/// blank keep-alives) yield `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}")]
    Status { status: StatusCode },
}

impl AiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AiError::Transport(e) => ErrorKind::from_status(e.status()),
            AiError::Status { status } => ErrorKind::from_status(Some(*status)),
        }
    }
}

/// Client for an OpenAI-style completions API.
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    pub model: String,
    max_tokens: u32,
    temperature_materials: f32,
    retry: RetryPolicy,
}

impl AiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.openai_api_key.clone(),
            api_base: config.openai_api_base.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            temperature_materials: config.openai_temperature_materials,
            retry: RetryPolicy::default(),
        }
    }

    pub fn provider_id(&self) -> &'static str {
        "openai"
    }

    /// Temperature used for material generation (worksheets etc.).
    pub fn materials_temperature(&self) -> f32 {
        self.temperature_materials
    }

    /// Opens a streaming completion. The connection attempt is retried with
    /// backoff on retryable failures; once the stream is open, errors are the
    /// relay's to report.
    pub async fn stream_chat(
        &self,
        operation: &str,
        messages: &[ChatMessagePayload],
        temperature: f32,
    ) -> Result<reqwest::Response, AiError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "max_tokens": self.max_tokens,
            "temperature": temperature,
            "stream_options": { "include_usage": true },
        });

        let mut attempt: u32 = 0;
        loop {
            let err = match self
                .http
                .post(format!("{}/chat/completions", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => AiError::Status {
                    status: resp.status(),
                },
                Err(e) => AiError::Transport(e),
            };

            let kind = err.kind();
            if !self.retry.should_retry(attempt, kind) {
                return Err(err);
            }
            let delay = self.retry.delay_for(attempt);
            warn!(
                "{operation}: upstream attempt {} failed ({kind:?}), retrying in {:?}",
                attempt + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_come_out_as_fed() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: {\"b\":2}"]);
        assert_eq!(buf.remainder(), None);
    }

    #[test]
    fn line_split_across_chunks_is_reassembled() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: {\"content\":\"Ah").is_empty());
        assert_eq!(buf.remainder().as_deref(), Some("data: {\"content\":\"Ah"));
        let lines = buf.push(b"oj\"}\n");
        assert_eq!(lines, vec!["data: {\"content\":\"Ahoj\"}"]);
    }

    #[test]
    fn multibyte_codepoint_split_across_chunks_survives() {
        let text = "data: příliš\n".as_bytes();
        // Split inside the two-byte 'ř'.
        let split = text.iter().position(|&b| b == 0xC5).unwrap() + 1;
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(&text[..split]).is_empty());
        let lines = buf.push(&text[split..]);
        assert_eq!(lines, vec!["data: příliš"]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.push(b"data: x\r\ndata: y\r\n");
        assert_eq!(lines, vec!["data: x", "data: y"]);
    }

    #[test]
    fn data_payload_extraction() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data: [DONE]"), Some("[DONE]"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn cost_estimate_is_proportional_and_never_negative() {
        assert_eq!(estimate_cost(0), 0.0);
        assert_eq!(estimate_cost(-5), 0.0);
        assert!((estimate_cost(1000) - COST_PER_1K_TOKENS).abs() < f64::EPSILON);
    }
}
