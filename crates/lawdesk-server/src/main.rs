mod logging;
mod routes;

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Instant,
};

use axum::{
    routing::{delete, get, post},
    Router,
};
use lawdesk_agent::GeminiBackend;
use lawdesk_core::{config::Config, conversation::Conversation, pipeline::Pipeline};
use lawdesk_lawdata::LawClient;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    logging::BroadcastLayer,
    routes::{
        delete_session, get_messages, health, post_message, reset_session, sse_events, sse_logs,
    },
};

// ── AppState ──────────────────────────────────────────────────────────────

/// One conversation per session key. The inner lock is held for a whole turn.
type SessionMap = HashMap<String, Arc<TokioMutex<Conversation>>>;

pub struct AppState {
    pub pipeline: Pipeline,
    pub sessions: std::sync::Mutex<SessionMap>,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<std::sync::Mutex<VecDeque<String>>>,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        log_tx: broadcast::Sender<String>,
        log_ring: Arc<std::sync::Mutex<VecDeque<String>>>,
    ) -> Self {
        Self {
            pipeline,
            sessions: std::sync::Mutex::new(HashMap::new()),
            start_time: Instant::now(),
            log_tx,
            log_ring,
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the session's conversation, creating an empty one on first use.
    pub fn session(&self, key: &str) -> Arc<TokioMutex<Conversation>> {
        let mut sessions = self.sessions();
        let entry = sessions.entry(key.to_string()).or_insert_with(|| {
            info!(session = %key, "session created");
            Arc::new(TokioMutex::new(Conversation::new()))
        });
        Arc::clone(entry)
    }

    pub fn existing_session(&self, key: &str) -> Option<Arc<TokioMutex<Conversation>>> {
        self.sessions().get(key).cloned()
    }

    /// Drop `key` only if it still maps to `expected`.
    pub fn remove_session(&self, key: &str, expected: &Arc<TokioMutex<Conversation>>) -> bool {
        let mut sessions = self.sessions();
        match sessions.get(key) {
            Some(current) if Arc::ptr_eq(current, expected) => sessions.remove(key).is_some(),
            _ => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Sessions
        .route(
            "/api/sessions/:key/messages",
            get(get_messages).post(post_message),
        )
        .route("/api/sessions/:key/reset", post(reset_session))
        .route("/api/sessions/:key", delete(delete_session))
        // SSE
        .route("/api/events", get(sse_events))
        .route("/api/logs", get(sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, _) = broadcast::channel::<String>(1024);
    let log_ring = Arc::new(std::sync::Mutex::new(VecDeque::new()));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "lawdesk_server=info,lawdesk_core=info,lawdesk_lawdata=info,lawdesk_agent=info,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    let config = Config::from_env()?;

    let llm = Arc::new(GeminiBackend::from_config(&config));
    let source = Arc::new(LawClient::from_config(&config)?);
    let pacer = Arc::new(config.pacer());
    info!(
        model = %config.gemini_model,
        law_api = %config.law_api_base,
        retrieval_delay_ms = pacer.retrieval.as_millis() as u64,
        synthesis_delay_ms = pacer.synthesis.as_millis() as u64,
        "pipeline configured"
    );
    if config.law_api_accept_invalid_certs {
        warn!("law API certificate verification disabled");
    }

    // Subscribers attach through `/api/events`.
    let (pipeline, _events) = Pipeline::new(llm, source, pacer);
    let state = Arc::new(AppState::new(pipeline, log_tx, log_ring));

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
