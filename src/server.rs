//! HTTP boundary.
//!
//! - `POST /api/chat`  - run one user message through the agent loop
//! - `POST /api/login` - exchange the site password for a session cookie
//!
//! A gate in front of both routes answers 503 in maintenance mode and,
//! when a site password is configured, requires the session cookie on
//! everything except the login route.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::ServerConfig;
use crate::types::Message;

pub const SESSION_COOKIE: &str = "smartmove_auth";
const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24;
const MAINTENANCE_NOTICE: &str = "🚧 Site en maintenance, reviens bientôt !";

/// Who may reach the API.
pub struct Access {
    password: Option<String>,
    /// Issued on login; a restart invalidates every session.
    session_token: String,
    maintenance: bool,
    secure_cookie: bool,
}

impl Access {
    pub fn new(password: Option<String>, maintenance: bool, secure_cookie: bool) -> Self {
        Self {
            password,
            session_token: Uuid::new_v4().to_string(),
            maintenance,
            secure_cookie,
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.site_password(), server.maintenance, server.secure_cookie)
    }

    fn session_cookie(&self) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, self.session_token, SESSION_MAX_AGE_SECS
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn has_session(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| {
                name == SESSION_COOKIE && constant_time_eq(value, &self.session_token)
            })
    }
}

/// Compares without exiting on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Clone)]
pub struct AppState {
    agent: Arc<Agent>,
    access: Arc<Access>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, access: Access) -> Self {
        Self {
            agent,
            access: Arc::new(access),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/login", post(login))
        .layer(middleware::from_fn_with_state(state.clone(), gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")
}

async fn gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let access = &state.access;
    if access.maintenance {
        return (StatusCode::SERVICE_UNAVAILABLE, MAINTENANCE_NOTICE).into_response();
    }
    let is_login = request.uri().path() == "/api/login";
    if access.password.is_some() && !is_login && !access.has_session(request.headers()) {
        warn!(path = %request.uri().path(), "request without a session");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "Authentification requise" })),
        )
            .into_response();
    }
    next.run(request).await
}

// --- Chat ---

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    position: Option<Position>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct Position {
    lat: f64,
    lng: f64,
}

fn bad_request(reason: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": reason.into() })),
    )
        .into_response()
}

/// Client history may only replay user and assistant text; anything else
/// (system prompts, tool turns) is dropped.
fn replayable_history(entries: Vec<HistoryEntry>) -> Vec<Message> {
    entries
        .into_iter()
        .filter_map(|entry| match entry.role.as_str() {
            "user" => Some(Message::user(entry.content)),
            "assistant" => Some(Message::assistant(entry.content)),
            _ => None,
        })
        .collect()
}

fn with_position(message: &str, position: Option<&Position>) -> String {
    match position {
        Some(p) => format!("{}\n\n[User position: {}, {}]", message, p.lat, p.lng),
        None => message.to_string(),
    }
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if body.message.trim().is_empty() {
        return bad_request("message must not be empty");
    }

    let history = replayable_history(body.history);
    let input = with_position(&body.message, body.position.as_ref());

    match state.agent.process_message(&history, &input).await {
        Ok(reply) => Json(json!({ "success": true, "response": reply.text })).into_response(),
        Err(e) => {
            error!(error = %format!("{:#}", e), "chat request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

// --- Login ---

#[derive(Debug, Deserialize)]
struct LoginBody {
    password: String,
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let access = &state.access;
    let Some(expected) = &access.password else {
        return Json(json!({ "success": true })).into_response();
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if !constant_time_eq(&body.password, expected) {
        warn!("login rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Mot de passe incorrect" })),
        )
            .into_response();
    }

    let mut response = Json(json!({ "success": true })).into_response();
    match HeaderValue::from_str(&access.session_cookie()) {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
            response
        }
        Err(e) => {
            error!(error = %e, "session cookie is not a valid header");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
