//! Axum-based REST gateway.
//!
//! Stateless request handlers over the user and journal stores plus the
//! media relay. Every class/entry operation authenticates the bearer token,
//! then passes through a single ownership predicate (`owned_class`) before
//! touching data — ownership failures are deliberately indistinguishable
//! from non-existence (404, never 403).

pub mod error;

use crate::auth::{TokenSigner, User, UserStore};
use crate::journal::{Class, DailyEntry, EntryAudio, JournalStore};
use crate::media::MediaRelay;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use error::ApiError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Per-attachment ceiling, enforced before any relay call.
pub const MAX_AUDIO_BYTES: usize = 15 * 1024 * 1024;
/// Maximum request body size — two audio attachments plus form overhead.
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;
/// Request timeout — bounds a stuck relay upload.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Shared handler context. Stores and the relay are constructed once at
/// startup and injected here; no module-level globals.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub journal: Arc<JournalStore>,
    pub relay: Arc<dyn MediaRelay>,
    pub tokens: TokenSigner,
}

/// Bind and serve until ctrl-c.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on http://{}", listener.local_addr()?);

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Gateway shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Build the full route table with middleware.
pub fn router(state: AppState) -> Router {
    // CORS — the browser client runs on a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/me", get(handle_me))
        .route("/api/classes", get(handle_classes_list))
        .route("/api/classes", post(handle_class_create))
        .route("/api/classes/{id}", get(handle_class_get))
        .route("/api/classes/{id}/entries", get(handle_entries_list))
        .route("/api/classes/{id}/entries", post(handle_entry_create))
        .route(
            "/api/classes/{id}/entries/{entry_id}",
            put(handle_entry_update),
        )
        .route(
            "/api/classes/{id}/entries/{entry_id}",
            delete(handle_entry_delete),
        )
        .fallback(handle_not_found)
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

async fn handle_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"message": "Resource not found"})),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// AUTH HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize, Default)]
#[serde(default)]
struct RegisterBody {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LoginBody {
    email: String,
    password: String,
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authenticate the request: verify token signature + expiry, then resolve
/// the embedded identity to a live user record.
fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    let user_id = state
        .tokens
        .verify(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
    state
        .users
        .get_user(&user_id)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))
}

/// POST /api/auth/register — create a user, returning a fresh token.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, axum::extract::rejection::JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;

    let user = state
        .users
        .register(&body.name, &body.email, &body.password)?;
    let token = state.tokens.issue(&user.id);
    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "token": token,
        })),
    ))
}

/// POST /api/auth/login — verify credentials, returning a fresh token.
///
/// Unknown email and wrong password share one message so accounts can't be
/// enumerated.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide email and password".to_string(),
        ));
    }

    let user = state
        .users
        .verify_credentials(&body.email, &body.password)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;
    let token = state.tokens.issue(&user.id);

    Ok(Json(serde_json::json!({
        "message": "login Successfully",
        "result": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "token": token,
        },
    })))
}

/// GET /api/auth/me — current user profile.
async fn handle_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(user))
}

// ══════════════════════════════════════════════════════════════════════════════
// CLASS HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize, Default)]
#[serde(default)]
struct ClassCreateBody {
    name: String,
    location: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EntryUpdateBody {
    topic: Option<String>,
}

/// The one ownership gate: a class is only visible to its owner; anything
/// else is NotFound.
fn owned_class(state: &AppState, user: &User, class_id: &str) -> Result<Class, ApiError> {
    state
        .journal
        .get_class(&user.id, class_id)?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))
}

/// GET /api/classes — caller's classes, newest first.
async fn handle_classes_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Class>>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(state.journal.list_classes(&user.id)?))
}

/// POST /api/classes — create a class for the caller.
async fn handle_class_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ClassCreateBody>, axum::extract::rejection::JsonRejection>,
) -> Result<(StatusCode, Json<Class>), ApiError> {
    let user = require_user(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;

    let class = state
        .journal
        .create_class(&user.id, &body.name, &body.location)?;
    tracing::info!(class_id = %class.id, user_id = %user.id, "Class created");
    Ok((StatusCode::CREATED, Json(class)))
}

/// GET /api/classes/{id}.
async fn handle_class_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(class_id): Path<String>,
) -> Result<Json<Class>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(owned_class(&state, &user, &class_id)?))
}

// ══════════════════════════════════════════════════════════════════════════════
// DAILY ENTRY HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /api/classes/{id}/entries — entries by date, most recent first.
async fn handle_entries_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(class_id): Path<String>,
) -> Result<Json<Vec<DailyEntry>>, ApiError> {
    let user = require_user(&state, &headers)?;
    let class = owned_class(&state, &user, &class_id)?;
    Ok(Json(state.journal.list_entries(&class.id)?))
}

/// One parsed audio part from the entry-create form.
struct AudioPart {
    bytes: Vec<u8>,
    slot: u8,
}

/// POST /api/classes/{id}/entries — multipart form `date`, `topic`,
/// `audio1?`, `audio2?`.
///
/// Uploads are all-or-nothing: if the second attachment fails after the
/// first uploaded, the first object is deleted remotely and no entry row is
/// written.
async fn handle_entry_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(class_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DailyEntry>), ApiError> {
    let user = require_user(&state, &headers)?;
    let class = owned_class(&state, &user, &class_id)?;

    let mut date: Option<String> = None;
    let mut topic: Option<String> = None;
    let mut audio_parts: Vec<AudioPart> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "date" => {
                date = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid form data: {e}"))
                })?);
            }
            "topic" => {
                topic = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid form data: {e}"))
                })?);
            }
            "audio1" | "audio2" => {
                let slot = if name == "audio1" { 1 } else { 2 };
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("audio/") {
                    return Err(ApiError::Validation(
                        "Only audio files are allowed".to_string(),
                    ));
                }
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("Invalid form data: {e}"))
                })?;
                if bytes.len() > MAX_AUDIO_BYTES {
                    return Err(ApiError::Validation(
                        "Audio file size cannot exceed 15MB".to_string(),
                    ));
                }
                if !bytes.is_empty() {
                    audio_parts.push(AudioPart {
                        bytes: bytes.to_vec(),
                        slot,
                    });
                }
            }
            _ => {}
        }
    }

    let (date, topic) = match (date, topic) {
        (Some(d), Some(t)) if !d.trim().is_empty() && !t.trim().is_empty() => (d, t),
        _ => {
            return Err(ApiError::Validation(
                "Please provide date and topic".to_string(),
            ));
        }
    };
    let date: chrono::NaiveDate = date
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation("Invalid date".to_string()))?;

    // Relay uploads, sequential, all-or-nothing
    let mut audio_1 = EntryAudio::default();
    let mut audio_2 = EntryAudio::default();
    let mut uploaded: Vec<String> = Vec::new();
    for part in audio_parts {
        let filename = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            class.id,
            part.slot
        );
        match state.relay.upload(part.bytes, &filename).await {
            Ok(stored) => {
                uploaded.push(stored.public_id.clone());
                let target = if part.slot == 1 {
                    &mut audio_1
                } else {
                    &mut audio_2
                };
                *target = EntryAudio {
                    url: stored.secure_url,
                    public_id: stored.public_id,
                };
            }
            Err(e) => {
                tracing::error!(class_id = %class.id, "Audio upload failed: {e:#}");
                // Roll back whatever already made it to remote storage
                for public_id in uploaded {
                    state.relay.delete(&public_id).await;
                }
                return Err(ApiError::Upload("Failed to upload audio file".to_string()));
            }
        }
    }

    let entry = state
        .journal
        .create_entry(&class.id, date, &topic, audio_1, audio_2)?;
    tracing::info!(entry_id = %entry.id, class_id = %class.id, "Daily entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// PUT /api/classes/{id}/entries/{entry_id} — replace the topic only; audio
/// is write-once at creation.
async fn handle_entry_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((class_id, entry_id)): Path<(String, String)>,
    body: Result<Json<EntryUpdateBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<DailyEntry>, ApiError> {
    let user = require_user(&state, &headers)?;
    let class = owned_class(&state, &user, &class_id)?;
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;

    state
        .journal
        .update_entry_topic(&class.id, &entry_id, body.topic.as_deref())?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Daily entry not found".to_string()))
}

/// DELETE /api/classes/{id}/entries/{entry_id} — remove the row, then
/// best-effort async deletion of its remote audio objects.
async fn handle_entry_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((class_id, entry_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    let class = owned_class(&state, &user, &class_id)?;

    let entry = state
        .journal
        .delete_entry(&class.id, &entry_id)?
        .ok_or_else(|| ApiError::NotFound("Daily entry not found".to_string()))?;

    // Fire-and-forget remote cleanup; failures are logged by the relay
    let relay = Arc::clone(&state.relay);
    let public_ids: Vec<String> = [entry.audio_public_id_1, entry.audio_public_id_2]
        .into_iter()
        .filter(|id| !id.is_empty())
        .collect();
    if !public_ids.is_empty() {
        tokio::spawn(async move {
            for public_id in public_ids {
                relay.delete(&public_id).await;
            }
        });
    }

    tracing::info!(entry_id = %entry_id, class_id = %class.id, "Daily entry deleted");
    Ok(Json(serde_json::json!({
        "message": "Daily entry deleted successfully"
    })))
}

// ══════════════════════════════════════════════════════════════════════════════
// TESTS
// ══════════════════════════════════════════════════════════════════════════════
