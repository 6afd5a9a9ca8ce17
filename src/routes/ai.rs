//! SSE relay for the OpenAI-style completions upstream.
//!
//! Requests are charged and persisted up front, then the handler returns an
//! SSE stream fed by a background task: `start`, then `chunk` frames as the
//! upstream deltas arrive, then `end` with token usage, or `error`.

use std::convert::Infallible;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::{
    models::ai::{
        AiRequestRecord, ChatMessagePayload, StreamEvent, UpstreamChunk, Usage, WorksheetRequest,
    },
    models::auth::AuthenticatedUser,
    models::chat::{ChatMessage, ChatSession, ChatStreamRequest},
    routes::{fail, internal, not_found, ApiError},
    services::ai::{data_payload, estimate_cost, SseLineBuffer},
    services::analytics,
    services::credits::{CreditService, CHAT_MESSAGE_COST, WORKSHEET_COST},
    AppState,
};

const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_HISTORY_LIMIT: i64 = 20;

const CHAT_SYSTEM_PROMPT: &str = "Jsi EduAI Asistent, přátelský výukový asistent pro učitele \
     a žáky. Odpovídej česky, stručně a věcně; u výkladu uváděj příklady.";

type EventStream = Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>;

fn event_stream() -> (mpsc::Sender<Result<Event, Infallible>>, EventStream) {
    let (tx, rx) = mpsc::channel(32);
    let sse = Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default());
    (tx, sse)
}

async fn send_event(tx: &mpsc::Sender<Result<Event, Infallible>>, event: &StreamEvent) {
    match serde_json::to_string(event) {
        // A send error just means the client went away.
        Ok(payload) => {
            let _ = tx.send(Ok(Event::default().data(payload))).await;
        }
        Err(e) => warn!("failed to serialize stream event: {e}"),
    }
}

/// Drains the upstream body through the line buffer, forwarding deltas as
/// `chunk` frames. Returns the accumulated text and the usage block, if the
/// upstream sent one.
async fn pump_upstream(
    response: reqwest::Response,
    tx: &mpsc::Sender<Result<Event, Infallible>>,
) -> Result<(String, Option<Usage>), reqwest::Error> {
    let mut buffer = SseLineBuffer::new();
    let mut content = String::new();
    let mut usage: Option<Usage> = None;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for line in buffer.push(&chunk) {
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            match UpstreamChunk::parse(payload) {
                Ok(UpstreamChunk::Delta(text)) => {
                    content.push_str(&text);
                    send_event(tx, &StreamEvent::Chunk { content: text }).await;
                }
                Ok(UpstreamChunk::Usage(u)) => usage = Some(u),
                Ok(UpstreamChunk::Done) => return Ok((content, usage)),
                Ok(UpstreamChunk::Empty) => {}
                // The frame arrived complete; a parse failure here is an
                // upstream defect worth logging, not a stream-fatal error.
                Err(e) => warn!("unparseable upstream frame: {e}"),
            }
        }
    }
    Ok((content, usage))
}

fn log_failure(state: &AppState, user_id: Uuid, request_type: &str, started: Instant) {
    analytics::log_request(
        state.db.clone(),
        AiRequestRecord {
            user_id: Some(user_id),
            request_type: request_type.to_string(),
            provider_id: state.ai.provider_id().to_string(),
            model_used: state.ai.model.clone(),
            priority: "normal".to_string(),
            parameters: None,
            tokens_used: 0,
            processing_time_ms: started.elapsed().as_millis() as i64,
            cost: 0.0,
            success: false,
            cached: false,
        },
    );
}

/// POST /api/ai/chat — streamed tutoring reply within a chat session.
pub async fn chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChatStreamRequest>,
) -> Result<EventStream, ApiError> {
    let message = body.message.trim().to_string();
    if message.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Zpráva nesmí být prázdná"));
    }

    let session: ChatSession = match body.session_id {
        Some(id) => sqlx::query_as(
            "SELECT * FROM chat_sessions WHERE id = $1 AND user_id = $2 AND is_active = TRUE",
        )
        .bind(id)
        .bind(user.user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?,
        None => {
            let title: String = message.chars().take(60).collect();
            sqlx::query_as(
                "INSERT INTO chat_sessions (user_id, title) VALUES ($1, $2) RETURNING *",
            )
            .bind(user.user_id)
            .bind(title)
            .fetch_one(&state.db)
            .await
            .map_err(internal)?
        }
    };

    // Charge before any upstream work; insufficient credits never start a stream.
    CreditService::charge(&state.db, user.user_id, CHAT_MESSAGE_COST, "Chat zpráva")
        .await
        .map_err(crate::routes::credits::map_credit_error)?;

    sqlx::query(
        "INSERT INTO chat_messages (session_id, message_type, content, credits_cost)
         VALUES ($1, 'user', $2, $3)",
    )
    .bind(session.id)
    .bind(&message)
    .bind(CHAT_MESSAGE_COST)
    .execute(&state.db)
    .await
    .map_err(internal)?;

    // Most recent history, oldest first, with the new message included.
    let mut history: Vec<ChatMessage> = sqlx::query_as(
        "SELECT * FROM chat_messages
         WHERE session_id = $1
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(session.id)
    .bind(CHAT_HISTORY_LIMIT)
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;
    history.reverse();

    let mut messages = vec![ChatMessagePayload::system(CHAT_SYSTEM_PROMPT)];
    for m in &history {
        messages.push(match m.message_type.as_str() {
            "assistant" => ChatMessagePayload::assistant(m.content.clone()),
            _ => ChatMessagePayload::user(m.content.clone()),
        });
    }

    let (tx, sse) = event_stream();
    let session_id = session.id;
    let user_id = user.user_id;
    tokio::spawn(async move {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        send_event(
            &tx,
            &StreamEvent::Start {
                request_id,
                session_id: Some(session_id),
                model: state.ai.model.clone(),
            },
        )
        .await;

        let response = match state
            .ai
            .stream_chat("ai.chat", &messages, CHAT_TEMPERATURE)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("ai.chat upstream failed: {e}");
                send_event(
                    &tx,
                    &StreamEvent::Error {
                        message: e.kind().user_message().to_string(),
                    },
                )
                .await;
                log_failure(&state, user_id, "chat", started);
                return;
            }
        };

        let (content, usage) = match pump_upstream(response, &tx).await {
            Ok(out) => out,
            Err(e) => {
                warn!("ai.chat stream broke: {e}");
                send_event(
                    &tx,
                    &StreamEvent::Error {
                        message: crate::error::ErrorKind::Network.user_message().to_string(),
                    },
                )
                .await;
                log_failure(&state, user_id, "chat", started);
                return;
            }
        };

        let tokens = usage.map(|u| u.total_tokens).unwrap_or(0);
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let persisted = async {
            sqlx::query(
                "INSERT INTO chat_messages (session_id, message_type, content, credits_cost)
                 VALUES ($1, 'assistant', $2, 0)",
            )
            .bind(session_id)
            .bind(&content)
            .execute(&state.db)
            .await?;

            sqlx::query(
                "UPDATE chat_sessions
                 SET total_messages = total_messages + 2,
                     credits_used = credits_used + $2,
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(session_id)
            .bind(CHAT_MESSAGE_COST)
            .execute(&state.db)
            .await?;
            Ok::<_, sqlx::Error>(())
        }
        .await;
        if let Err(e) = persisted {
            warn!("ai.chat persistence failed for session {session_id}: {e}");
        }

        analytics::log_request(
            state.db.clone(),
            AiRequestRecord {
                user_id: Some(user_id),
                request_type: "chat".to_string(),
                provider_id: state.ai.provider_id().to_string(),
                model_used: state.ai.model.clone(),
                priority: "normal".to_string(),
                parameters: Some(json!({ "session_id": session_id })),
                tokens_used: tokens,
                processing_time_ms: elapsed_ms,
                cost: estimate_cost(tokens),
                success: true,
                cached: false,
            },
        );

        send_event(
            &tx,
            &StreamEvent::End {
                tokens_used: tokens,
                credits_cost: CHAT_MESSAGE_COST,
                processing_time_ms: elapsed_ms,
            },
        )
        .await;
    });

    Ok(sse)
}

/// POST /api/ai/generate-worksheet — streamed worksheet generation; the
/// result is stored as a generated file when the stream completes.
pub async fn generate_worksheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<WorksheetRequest>,
) -> Result<EventStream, ApiError> {
    let topic = body.topic.trim().to_string();
    if topic.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Téma nesmí být prázdné"));
    }
    let question_count = body.question_count.unwrap_or(10).clamp(1, 50);

    CreditService::charge(&state.db, user.user_id, WORKSHEET_COST, "Pracovní list")
        .await
        .map_err(crate::routes::credits::map_credit_error)?;

    let mut prompt = format!(
        "Vytvoř pracovní list na téma „{topic}“ s {question_count} úlohami. \
         Použij markdown: nadpis, zadání, úlohy, na konci sekci s řešením."
    );
    if let Some(grade) = body.grade_level.as_deref().filter(|g| !g.trim().is_empty()) {
        prompt.push_str(&format!(" Cílová skupina: {grade}."));
    }

    let messages = vec![
        ChatMessagePayload::system(
            "Jsi EduAI Asistent. Připravuješ kvalitní výukové materiály v češtině.",
        ),
        ChatMessagePayload::user(prompt),
    ];

    let (tx, sse) = event_stream();
    let user_id = user.user_id;
    let grade_level = body.grade_level.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        send_event(
            &tx,
            &StreamEvent::Start {
                request_id,
                session_id: None,
                model: state.ai.model.clone(),
            },
        )
        .await;

        let temperature = state.ai.materials_temperature();
        let response = match state
            .ai
            .stream_chat("ai.generate_worksheet", &messages, temperature)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("ai.generate_worksheet upstream failed: {e}");
                send_event(
                    &tx,
                    &StreamEvent::Error {
                        message: e.kind().user_message().to_string(),
                    },
                )
                .await;
                log_failure(&state, user_id, "generate_worksheet", started);
                return;
            }
        };

        let (content, usage) = match pump_upstream(response, &tx).await {
            Ok(out) => out,
            Err(e) => {
                warn!("ai.generate_worksheet stream broke: {e}");
                send_event(
                    &tx,
                    &StreamEvent::Error {
                        message: crate::error::ErrorKind::Network.user_message().to_string(),
                    },
                )
                .await;
                log_failure(&state, user_id, "generate_worksheet", started);
                return;
            }
        };

        let tokens = usage.map(|u| u.total_tokens).unwrap_or(0);
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let stored = sqlx::query(
            "INSERT INTO generated_files (user_id, file_type, title, content)
             VALUES ($1, 'worksheet', $2, $3)",
        )
        .bind(user_id)
        .bind(format!("Pracovní list: {topic}"))
        .bind(json!({
            "markdown": content,
            "topic": topic.clone(),
            "grade_level": grade_level,
        }))
        .execute(&state.db)
        .await;
        if let Err(e) = stored {
            warn!("worksheet persistence failed: {e}");
        }

        analytics::log_request(
            state.db.clone(),
            AiRequestRecord {
                user_id: Some(user_id),
                request_type: "generate_worksheet".to_string(),
                provider_id: state.ai.provider_id().to_string(),
                model_used: state.ai.model.clone(),
                priority: "normal".to_string(),
                parameters: Some(json!({
                    "topic": topic,
                    "question_count": question_count,
                })),
                tokens_used: tokens,
                processing_time_ms: elapsed_ms,
                cost: estimate_cost(tokens),
                success: true,
                cached: false,
            },
        );

        send_event(
            &tx,
            &StreamEvent::End {
                tokens_used: tokens,
                credits_cost: WORKSHEET_COST,
                processing_time_ms: elapsed_ms,
            },
        )
        .await;
    });

    Ok(sse)
}
