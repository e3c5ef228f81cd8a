use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use lawdesk_core::types::ConversationTurn;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct PostMessageBody {
    content: String,
}

#[derive(Deserialize)]
pub(crate) struct EventsQuery {
    session: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": state.start_time.elapsed().as_secs(),
        "sessions": state.session_count(),
        "model": state.pipeline.llm.name(),
    }))
}

// Sessions

pub(crate) async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let turns: Vec<ConversationTurn> = match state.existing_session(&key) {
        Some(session) => session.lock().await.render().cloned().collect(),
        None => Vec::new(),
    };
    let messages = serde_json::to_value(turns).map_err(internal)?;
    Ok(Json(json!({ "session": key, "messages": messages })))
}

/// Run one turn. The session lock is held for the whole pipeline, so a
/// second message for the same session is refused instead of queued.
pub(crate) async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<PostMessageBody>,
) -> Response {
    if body.content.trim().is_empty() {
        return reject(StatusCode::BAD_REQUEST, "content is empty");
    }

    let session = state.session(&key);
    let Ok(mut conversation) = session.try_lock() else {
        return busy(&key, "message");
    };

    match state
        .pipeline
        .run_turn(&key, &mut conversation, &body.content)
        .await
    {
        Ok(report) => Json(json!({
            "message": conversation.last(),
            "keywords": report.keywords,
            "retrievals_found": report.retrievals_found,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": e.to_string(),
                "stage": e.stage,
            })),
        )
            .into_response(),
    }
}

/// Busy sessions answer 409, the same as a second message.
fn busy(key: &str, action: &str) -> Response {
    warn!(session = %key, action, "rejected: turn already in progress");
    reject(StatusCode::CONFLICT, "a turn is already in progress for this session")
}

pub(crate) async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Some(session) = state.existing_session(&key) {
        let Ok(mut conversation) = session.try_lock() else {
            return busy(&key, "reset");
        };
        conversation.reset();
        info!(session = %key, "session reset");
    }
    Json(json!({ "session": key, "messages": [] })).into_response()
}

pub(crate) async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    let Some(session) = state.existing_session(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    // Hold the lock across removal so no turn starts on the entry being dropped
    let Ok(_conversation) = session.try_lock() else {
        return busy(&key, "delete");
    };
    state.remove_session(&key, &session);
    info!(session = %key, "session destroyed");
    StatusCode::NO_CONTENT.into_response()
}

// SSE pipeline events

pub(crate) async fn sse_events(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EventsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.pipeline.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| {
        let ev = msg.ok()?;
        if q.session.as_deref().is_some_and(|s| s != ev.session()) {
            return None;
        }
        Event::default()
            .event(ev.kind())
            .json_data(&ev)
            .ok()
            .map(Ok::<_, std::convert::Infallible>)
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

// SSE logs

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe first so nothing falls between the snapshot and the live feed
    let mut live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx).map(|line| Ok(Event::default().data(line)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use lawdesk_core::{
        backend::{LegalDataSource, LlmBackend},
        pacing::NoPacer,
        pipeline::Pipeline,
        types::ContentType,
    };
    use serde_json::{json, Value};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use crate::{router, AppState};

    /// Keywords on the first call, echo on the filter call, a fixed report after.
    struct StepLlm {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LlmBackend for StepLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if self.fail {
                bail!("quota exhausted");
            }
            Ok(match self.calls.fetch_add(1, Ordering::SeqCst) % 3 {
                0 => "개인정보보호법 동의, 전자금융거래법 선불지급수단".into(),
                1 => prompt.to_string(),
                _ => "분석 보고서".into(),
            })
        }

        fn name(&self) -> &str {
            "step"
        }
    }

    struct EmptySource;

    #[async_trait]
    impl LegalDataSource for EmptySource {
        async fn search(&self, _keyword: &str, _content_type: ContentType) -> Option<Value> {
            None
        }
    }

    fn state(fail: bool) -> Arc<AppState> {
        let llm = Arc::new(StepLlm {
            calls: AtomicUsize::new(0),
            fail,
        });
        let (pipeline, _rx) = Pipeline::new(llm, Arc::new(EmptySource), Arc::new(NoPacer));
        let (log_tx, _) = broadcast::channel(16);
        Arc::new(AppState::new(
            pipeline,
            log_tx,
            Arc::new(std::sync::Mutex::new(VecDeque::new())),
        ))
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let s = state(false);
        let (status, body) = call(&s, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "step");
    }

    #[tokio::test]
    async fn unknown_session_renders_empty() {
        let s = state(false);
        let (status, body) = call(&s, "GET", "/api/sessions/nobody/messages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"], json!([]));
        assert_eq!(s.session_count(), 0);
    }

    #[tokio::test]
    async fn turn_appends_user_and_assistant() {
        let s = state(false);
        let (status, body) = call(
            &s,
            "POST",
            "/api/sessions/a/messages",
            Some(json!({ "content": "선불충전 앱을 만들려고 합니다" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["role"], "assistant");
        assert_eq!(body["message"]["content"], "분석 보고서");
        assert_eq!(body["keywords"].as_array().unwrap().len(), 2);
        assert_eq!(body["retrievals_found"], 0);

        let (_, body) = call(&s, "GET", "/api/sessions/a/messages", None).await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "선불충전 앱을 만들려고 합니다");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn empty_content_is_bad_request() {
        let s = state(false);
        let (status, _) = call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn busy_session_is_conflict() {
        let s = state(false);
        let session = s.session("a");
        let _guard = session.lock().await;
        let (status, _) = call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_while_busy_is_conflict_and_keeps_session() {
        let s = state(false);
        let session = s.session("a");
        let guard = session.lock().await;

        let (status, _) = call(&s, "DELETE", "/api/sessions/a", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(s.session_count(), 1);

        // the running turn still owns the session, so a new message is refused too
        let (status, _) = call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        drop(guard);
        let (status, _) = call(&s, "DELETE", "/api/sessions/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(s.session_count(), 0);
    }

    #[tokio::test]
    async fn reset_while_busy_is_conflict_and_keeps_history() {
        let s = state(false);
        call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;

        let session = s.session("a");
        let guard = session.lock().await;
        let (status, _) = call(&s, "POST", "/api/sessions/a/reset", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        drop(guard);

        let (_, body) = call(&s, "GET", "/api/sessions/a/messages", None).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn llm_failure_is_bad_gateway_and_history_unchanged() {
        let s = state(true);
        let (status, body) = call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["stage"], "keyword_extraction");
        assert!(body["error"].as_str().unwrap().contains("quota exhausted"));

        let (_, body) = call(&s, "GET", "/api/sessions/a/messages", None).await;
        assert_eq!(body["messages"], json!([]));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let s = state(false);
        call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;
        let (status, _) = call(&s, "POST", "/api/sessions/a/reset", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&s, "GET", "/api/sessions/a/messages", None).await;
        assert_eq!(body["messages"], json!([]));
    }

    #[tokio::test]
    async fn delete_destroys_session() {
        let s = state(false);
        call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;
        assert_eq!(s.session_count(), 1);

        let (status, _) = call(&s, "DELETE", "/api/sessions/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(s.session_count(), 0);

        let (status, _) = call(&s, "DELETE", "/api/sessions/a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let s = state(false);
        call(&s, "POST", "/api/sessions/a/messages", Some(json!({ "content": "질문" }))).await;

        let (_, body) = call(&s, "GET", "/api/sessions/b/messages", None).await;
        assert_eq!(body["messages"], json!([]));
    }
}
