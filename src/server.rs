//! Webhook server.
//!
//! `POST /bot` receives Twilio's incoming-message webhook and answers with
//! TwiML; `GET /health` reports liveness and translation counters.

use crate::pipeline::{InboundMessage, Pipeline};
use crate::whatsapp::{twiml_reply, IncomingForm};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    webhook_secret: Option<String>,
    started: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, webhook_secret: Option<String>) -> Self {
        Self {
            pipeline,
            webhook_secret,
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecretQuery {
    secret: Option<String>,
}

/// Constant-time string comparison for the webhook secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn twiml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// `POST /bot`
async fn bot(
    State(state): State<AppState>,
    Query(query): Query<SecretQuery>,
    Form(form): Form<IncomingForm>,
) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let authorized = query
            .secret
            .as_deref()
            .is_some_and(|given| constant_time_compare(given, expected));
        if !authorized {
            warn!("Rejected webhook call with a missing or wrong secret");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    if form.from.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing From").into_response();
    }
    if form.has_media() {
        info!("Ignoring media attachment from {}", form.from);
    }

    let dispatch = state
        .pipeline
        .handle(InboundMessage::new(form.from, form.body))
        .await;

    twiml(twiml_reply(dispatch.reply.as_deref()))
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started.elapsed().as_secs(),
        "members": state.pipeline.store().member_count(),
        "translation": state.pipeline.translator().metrics().report(),
    }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/bot", post(bot))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process exits.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, build_router(state)).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
