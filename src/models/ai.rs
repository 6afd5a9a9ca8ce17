use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message in the OpenAI-style chat payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessagePayload {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessagePayload {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// One frame of the relay's outgoing SSE stream.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        request_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        model: String,
    },
    Chunk {
        content: String,
    },
    End {
        tokens_used: i32,
        credits_cost: i32,
        processing_time_ms: i64,
    },
    Error {
        message: String,
    },
}

/// Token accounting block of the upstream stream (`stream_options.include_usage`).
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i32,
    #[serde(default)]
    pub completion_tokens: i32,
    #[serde(default)]
    pub total_tokens: i32,
}

/// What one upstream `data:` payload amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamChunk {
    Delta(String),
    Usage(Usage),
    Done,
    /// Parsed fine but carried nothing we relay (role preamble, empty delta).
    Empty,
}

impl UpstreamChunk {
    /// Decode one `data:` payload of an OpenAI-style completion stream.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        if payload.trim() == "[DONE]" {
            return Ok(UpstreamChunk::Done);
        }
        let value: Value = serde_json::from_str(payload)?;
        if let Some(content) = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            if !content.is_empty() {
                return Ok(UpstreamChunk::Delta(content.to_string()));
            }
        }
        if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
            let usage: Usage = serde_json::from_value(usage.clone())?;
            return Ok(UpstreamChunk::Usage(usage));
        }
        Ok(UpstreamChunk::Empty)
    }
}

#[derive(Debug, Deserialize)]
pub struct WorksheetRequest {
    pub topic: String,
    pub grade_level: Option<String>,
    pub question_count: Option<u32>,
}

/// Append-only analytics record for one AI request.
#[derive(Debug, Clone)]
pub struct AiRequestRecord {
    pub user_id: Option<Uuid>,
    pub request_type: String,
    pub provider_id: String,
    pub model_used: String,
    pub priority: String,
    pub parameters: Option<Value>,
    pub tokens_used: i32,
    pub processing_time_ms: i64,
    pub cost: f64,
    pub success: bool,
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let chunk =
            UpstreamChunk::parse(r#"{"choices":[{"delta":{"content":"Ahoj"},"index":0}]}"#)
                .unwrap();
        assert_eq!(chunk, UpstreamChunk::Delta("Ahoj".into()));
    }

    #[test]
    fn parses_done_sentinel() {
        assert_eq!(UpstreamChunk::parse("[DONE]").unwrap(), UpstreamChunk::Done);
        assert_eq!(
            UpstreamChunk::parse(" [DONE] ").unwrap(),
            UpstreamChunk::Done
        );
    }

    #[test]
    fn parses_usage_frame() {
        let chunk = UpstreamChunk::parse(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#,
        )
        .unwrap();
        assert_eq!(
            chunk,
            UpstreamChunk::Usage(Usage {
                prompt_tokens: 12,
                completion_tokens: 34,
                total_tokens: 46
            })
        );
    }

    #[test]
    fn role_preamble_is_empty() {
        let chunk =
            UpstreamChunk::parse(r#"{"choices":[{"delta":{"role":"assistant"},"index":0}]}"#)
                .unwrap();
        assert_eq!(chunk, UpstreamChunk::Empty);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(UpstreamChunk::parse(r#"{"choices":"#).is_err());
    }

    #[test]
    fn stream_events_serialize_with_type_tag() {
        let event = StreamEvent::Chunk {
            content: "text".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["content"], "text");

        let end = StreamEvent::End {
            tokens_used: 10,
            credits_cost: 1,
            processing_time_ms: 1200,
        };
        let json = serde_json::to_value(&end).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["tokens_used"], 10);
    }
}
