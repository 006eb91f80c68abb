// HTTP routes: login/logout, roster state, draws, and the screenshot gallery.
//
// Handlers resolve the caller's role from the session cookie and turn it
// into a core `Grant` before touching the roster or the archive.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clandraw_core::archive::{check_image_mime, ArchiveError, ScreenshotArchive};
use clandraw_core::auth::{authorize, Grant, Operation, Role};
use clandraw_core::config::Config;
use clandraw_core::import;
use clandraw_core::roster::{parse_draw_count, PoolEntry, RosterHandle, RosterState, RosterStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::{self, Credentials, SessionStore};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state behind every handler.
pub struct AppState {
    pub roster: RosterHandle,
    pub archive: ScreenshotArchive,
    pub sessions: SessionStore,
    pub credentials: Credentials,
    pub default_draw_count: i64,
}

impl AppState {
    /// Build the state from config and spawn the roster task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self, ArchiveError> {
        let archive = ScreenshotArchive::new(&config.archive.dir, config.archive.max_bytes)?;
        let (roster, _task) = RosterHandle::spawn(RosterStore::new());
        let ttl = match config.server.session_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(AppState {
            roster,
            archive,
            sessions: SessionStore::new(ttl, config.server.max_sessions),
            credentials: Credentials::new(config.users.clone()),
            default_draw_count: config.draw.default_count,
        })
    }

    fn caller_role(&self, headers: &HeaderMap) -> Option<Role> {
        session::session_id(headers).and_then(|id| self.sessions.role_of(&id))
    }

    fn grant(&self, headers: &HeaderMap, operation: Operation) -> Result<Grant, ApiError> {
        authorize(self.caller_role(headers), operation).map_err(|e| {
            warn!("Refused {}: {}", operation, e);
            ApiError::from(e)
        })
    }
}

/// Assemble the full router: API, page redirects and static files.
pub fn router(state: Arc<AppState>, public_dir: impl AsRef<Path>) -> Router {
    let upload_limit = usize::try_from(state.archive.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let screenshots_dir = state.archive.root().to_path_buf();

    Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/state", get(roster_state))
        .route(
            "/api/upload",
            post(upload_roster).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/draw", post(draw))
        .route("/api/clear-winners", post(clear_winners))
        .route("/api/clear-list", post(clear_list))
        .route(
            "/api/upload-screenshot",
            post(upload_screenshot).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/screenshots", get(list_screenshots))
        .route("/api/screenshots/:filename", delete(delete_screenshot))
        .route("/", get(|| async { Redirect::to("/public/view.html") }))
        .route("/admin", get(|| async { Redirect::to("/public/admin.html") }))
        .route("/login", get(|| async { Redirect::to("/public/login.html") }))
        .nest_service("/public", ServeDir::new(public_dir.as_ref()))
        .nest_service("/screenshots", ServeDir::new(screenshots_dir))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

#[derive(Debug, Serialize)]
struct DrawResponse {
    ok: bool,
    winners: Vec<PoolEntry>,
}

#[derive(Debug, Serialize)]
struct ScreenshotList {
    screenshots: Vec<String>,
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    ok()
}

async fn login(
    State(state): State<Arc<AppState>>,
    Payload(req): Payload<LoginRequest>,
) -> Result<Response, ApiError> {
    let LoginRequest { username, password } = req;
    let checker = Arc::clone(&state);
    let (username, role) = tokio::task::spawn_blocking(move || {
        let role = checker.credentials.verify(&username, &password);
        (username, role)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("login check failed: {e}")))?;

    let Some(role) = role else {
        warn!("Failed login for {:?}", username);
        return Ok(Json(LoginResponse {
            ok: false,
            role: None,
        })
        .into_response());
    };

    let id = state.sessions.create(&username, role);
    Ok((
        [(header::SET_COOKIE, session::session_cookie(&id))],
        Json(LoginResponse {
            ok: true,
            role: Some(role),
        }),
    )
        .into_response())
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session::session_id(&headers) {
        state.sessions.remove(&id);
    }
    (
        [(header::SET_COOKIE, session::expired_session_cookie())],
        ok(),
    )
        .into_response()
}

async fn roster_state(State(state): State<Arc<AppState>>) -> Result<Json<RosterState>, ApiError> {
    Ok(Json(state.roster.snapshot().await?))
}

async fn upload_roster(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let grant = state.grant(&headers, Operation::ImportRoster)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        let rows = import::parse_rows(&bytes)?;
        let count = state.roster.import(grant, rows).await?;
        info!("Roster imported from {:?}: {} entries", name, count);
        return Ok(Json(json!({ "ok": true, "count": count })));
    }

    Err(ApiError::Validation("no file uploaded".into()))
}

async fn draw(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Payload(body): Payload<Value>,
) -> Result<Json<DrawResponse>, ApiError> {
    let grant = state.grant(&headers, Operation::Draw)?;

    let requested = parse_draw_count(body.get("count"), state.default_draw_count)?;

    let winners = state.roster.draw(grant, requested).await?;
    Ok(Json(DrawResponse { ok: true, winners }))
}

async fn clear_winners(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let grant = state.grant(&headers, Operation::ClearWinners)?;
    state.roster.clear_winners(grant).await?;
    Ok(ok())
}

async fn clear_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let grant = state.grant(&headers, Operation::ClearRoster)?;
    state.roster.clear_roster(grant).await?;
    Ok(ok())
}

async fn upload_screenshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let grant = state.grant(&headers, Operation::StoreScreenshot)?;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("screenshot") {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let original_name = field.file_name().unwrap_or_default().to_string();
        check_image_mime(&mime)?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            data.extend_from_slice(&chunk);
            state.archive.check_size(data.len() as u64)?;
        }

        let filename = state
            .archive
            .store(&grant, &data, &mime, &original_name)
            .await?;
        return Ok(Json(json!({ "ok": true, "filename": filename })));
    }

    Err(ApiError::Validation("no file uploaded".into()))
}

async fn list_screenshots(State(state): State<Arc<AppState>>) -> Json<ScreenshotList> {
    Json(ScreenshotList {
        screenshots: state.archive.list().await,
    })
}

async fn delete_screenshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    UrlPath(filename): UrlPath<String>,
) -> Result<Json<Value>, ApiError> {
    let grant = state.grant(&headers, Operation::DeleteScreenshot)?;
    state.archive.delete(&grant, &filename).await?;
    Ok(ok())
}
