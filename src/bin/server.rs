//! divinesense chat server.
//!
//! Exposes the Chat interface (spec §6): a unary-input, server-streaming
//! RPC. Build and run: `cargo run --features server --bin divinesense-server`.
//!
//! Routes:
//! - `POST /chat` — classify + dispatch one turn, streamed as SSE
//! - `GET  /health` — server status
//! - `GET  /registry` — priority-sorted intent table dump
//! - `GET  /cache/stats` — routing-cache hit/miss counters

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use divinesense::cache::RoutingCache;
use divinesense::capability::KeywordCapabilitySource;
use divinesense::dispatch::agent_runtime::{RespondImmediately, ToolSet};
use divinesense::dispatch::events::EventEnvelope;
use divinesense::dispatch::{DispatchOptions, StreamingDispatcher};
use divinesense::feedback::{FeedbackCollector, FlatDefaults, InMemoryWeightStore};
use divinesense::lifecycle::LifecycleManager;
use divinesense::registry::IntentRegistry;
use divinesense::router::Router;
use divinesense::types::{AgentType, Utterance};

struct ServerState {
    router: Router,
    next_block_id: std::sync::atomic::AtomicI64,
}

impl ServerState {
    fn next_block_id(&self) -> i64 {
        self.next_block_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Request body for `POST /chat` (spec §6, Chat interface fields).
#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    user_timezone: Option<String>,
    #[serde(default)]
    conversation_id: Option<i64>,
    #[serde(default)]
    geek_mode: bool,
    #[serde(default)]
    evolution_mode: bool,
    #[serde(default)]
    device_context: Option<serde_json::Value>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn registry_dump(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let dump = state.router.registry_dump();
    Json(serde_json::json!(dump
        .into_iter()
        .map(|(intent, agent_type, priority, route_type)| {
            serde_json::json!({
                "intent": intent.to_string(),
                "agent_type": agent_type.to_string(),
                "priority": priority,
                "route_type": route_type,
            })
        })
        .collect::<Vec<_>>()))
}

async fn cache_stats(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let stats = state.router.cache_stats();
    Json(serde_json::json!({
        "hits": stats.hits,
        "misses": stats.misses,
        "hit_rate": stats.hit_rate,
        "size": stats.size,
        "capacity": stats.capacity,
        "uptime_sec": stats.uptime_sec,
    }))
}

/// Classify, then dispatch to the resolved (or caller-overridden) agent type,
/// relaying the dispatcher's ordered event stream as SSE (spec §4.5, §6).
async fn chat(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, (StatusCode, String)> {
    let ctx = CancellationToken::new();
    let utterance = Utterance {
        text: req.message.clone(),
        user_id: req.user_id,
        timezone: req.user_timezone.clone(),
        conversation_id: req.conversation_id,
        device_context: req.device_context.clone(),
    };

    let decision = state
        .router
        .classify(&ctx, &utterance)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let agent_type = req
        .agent_type
        .and_then(|raw| parse_agent_type(&raw))
        .unwrap_or_else(|| {
            state
                .router
                .registry_dump()
                .into_iter()
                .find(|(intent, ..)| *intent == decision.intent)
                .map(|(_, agent_type, ..)| agent_type)
                .unwrap_or(AgentType::General)
        });

    let block_id = state.next_block_id();
    let dispatcher = StreamingDispatcher::new(format!("block-{block_id}"));
    let agent = Arc::new(RespondImmediately(format!(
        "routed to {agent_type} via {} (confidence {:.2})",
        decision.source.as_str(),
        decision.confidence
    )));

    let mut options = DispatchOptions::new();
    options.geek_mode = req.geek_mode;
    options.evolution_mode = req.evolution_mode;
    options.conversation_id = req.conversation_id;
    options.user_timezone = req.user_timezone.clone();
    options.device_context = req.device_context.clone();

    let streaming = matches!(agent_type, AgentType::Ideation);
    let rx = dispatcher.dispatch(ctx, block_id, req.message, agent_type, agent, ToolSet::new(), options, streaming);

    let events = ReceiverStream::new(rx).map(|envelope: EventEnvelope| {
        let payload = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn parse_agent_type(raw: &str) -> Option<AgentType> {
    match raw {
        "memo" => Some(AgentType::Memo),
        "schedule" => Some(AgentType::Schedule),
        "general" => Some(AgentType::General),
        "ideation" => Some(AgentType::Ideation),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let registry = Arc::new(IntentRegistry::with_defaults().expect("built-in registry patterns are valid regex"));
    let cache = Arc::new(RoutingCache::with_default_capacity());
    let capability_source = Arc::new(KeywordCapabilitySource::defaults());
    let lifecycle = LifecycleManager::new();

    let store = Arc::new(InMemoryWeightStore::new());
    let _collector = FeedbackCollector::new(store.clone(), Box::new(FlatDefaults::default()), &lifecycle);
    let router = Router::new(registry, cache, capability_source, lifecycle.clone()).with_weight_store(store);

    let state = Arc::new(ServerState {
        router,
        next_block_id: std::sync::atomic::AtomicI64::new(1),
    });

    let app = AxumRouter::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/registry", get(registry_dump))
        .route("/cache/stats", get(cache_stats))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8787").await.expect("bind 0.0.0.0:8787");
    tracing::info!("divinesense-server listening on 0.0.0.0:8787");

    axum::serve(listener, app).await.expect("server error");
}
