//!
//! atticd HTTP server
//! ------------------
//! This module defines the Axum-based HTTP API for the file manager.
//!
//! Responsibilities:
//! - Explicit route table mapping method + path to one operation.
//! - Stateless per-request Basic-Auth gate when a password is configured.
//! - Parameter extraction from query strings, JSON bodies and multipart
//!   forms, delegating to the resolver/listing/mutation components.
//! - Error translation: every component failure becomes a short JSON body
//!   and a status code, with no internal detail leaked to the client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::resolve::Root;
use crate::{archive, entries, ops, perms, search, security};

/// Text previews are capped at this many bytes.
const PREVIEW_LIMIT: u64 = 200_000;

/// Shared server state injected into all handlers. The root and the
/// optional shared password are fixed at startup; there is no other
/// cross-request state.
#[derive(Clone)]
pub struct AppState {
    root: Arc<Root>,
    password: Option<Arc<str>>,
}

impl AppState {
    pub fn new(root: Root, password: Option<String>) -> Self {
        AppState {
            root: Arc::new(root),
            password: password.map(Into::into),
        }
    }

    fn gate(&self, headers: &HeaderMap) -> ApiResult<()> {
        security::require(headers, self.password.as_deref())
    }
}

/// Mount the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/list", get(list))
        .route("/api/search", get(search_names))
        .route("/api/download", get(download))
        .route("/api/preview", get(preview))
        .route("/api/edit", get(edit))
        .route(
            "/api/permissions",
            get(get_permissions).post(set_permissions),
        )
        .route("/api/upload", post(upload))
        .route("/api/mkdir", post(mkdir))
        .route("/api/delete", post(delete))
        .route("/api/rename", post(rename))
        .route("/api/move", post(move_one))
        .route("/api/move-multiple", post(move_multiple))
        .route("/api/save", post(save))
        .fallback(not_found)
        // Uploads and saves are not size-capped; the deployment model is a
        // trusted small share, not a public endpoint.
        .layer(axum::extract::DefaultBodyLimit::disable())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Serving {} on http://{}",
        state.root.as_path().display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    #[serde(default = "default_path")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct MkdirPayload {
    path: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeletePayload {
    path: String,
}

#[derive(Debug, Deserialize)]
struct RenamePayload {
    path: String,
    new: String,
}

#[derive(Debug, Deserialize)]
struct MovePayload {
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct MoveMultiplePayload {
    sources: Vec<String>,
    target: String,
}

#[derive(Debug, Deserialize)]
struct SavePayload {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PermissionsPayload {
    path: String,
    permissions: perms::PermissionSet,
    owner: Option<String>,
    group: Option<String>,
}

fn ok_body() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

fn join_error(err: tokio::task::JoinError) -> ApiError {
    ApiError::Io(std::io::Error::other(err))
}

fn attachment(name: &str) -> String {
    format!("attachment; filename=\"{}\"", name.replace('"', "'"))
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<&'static str> {
    state.gate(&headers)?;
    Ok("atticd ok")
}

async fn not_found(State(state): State<AppState>, headers: HeaderMap) -> ApiError {
    if let Err(unauthorized) = state.gate(&headers) {
        return unauthorized;
    }
    ApiError::NotFound
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    let dir = state.root.resolve(&query.path)?;
    let root = state.root.clone();
    let files = tokio::task::spawn_blocking(move || entries::list_dir(&root, &dir))
        .await
        .map_err(join_error)??;
    Ok(Json(json!({
        "root": state.root.as_path().display().to_string(),
        "files": files,
    })))
}

async fn search_names(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    let root = state.root.clone();
    let files = tokio::task::spawn_blocking(move || search::search(&root, &query.q))
        .await
        .map_err(join_error)?;
    Ok(Json(json!({
        "root": state.root.as_path().display().to_string(),
        "files": files,
    })))
}

async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    state.gate(&headers)?;
    let target = state.root.resolve(&query.path)?;
    let meta = tokio::fs::metadata(&target).await.map_err(ApiError::from)?;

    if meta.is_dir() {
        let name = archive::zip_name(&target);
        let dir = target.clone();
        let data = tokio::task::spawn_blocking(move || archive::zip_dir(&dir))
            .await
            .map_err(join_error)??;
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (header::CONTENT_LENGTH, data.len().to_string()),
                (header::CONTENT_DISPOSITION, attachment(&name)),
            ],
            data,
        )
            .into_response());
    }

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    let file = tokio::fs::File::open(&target).await.map_err(ApiError::from)?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, archive::content_type(&target)),
            (header::CONTENT_LENGTH, meta.len().to_string()),
            (header::CONTENT_DISPOSITION, attachment(&name)),
        ],
        body,
    )
        .into_response())
}

async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    state.gate(&headers)?;
    let target = state.root.resolve(&query.path)?;
    let meta = tokio::fs::metadata(&target).await.map_err(ApiError::from)?;

    if meta.is_dir() {
        return Ok(plain_text("Directory"));
    }

    let ctype = archive::content_type(&target);
    if ctype.starts_with("text/") || ctype == "application/json" || ctype == "application/javascript"
    {
        let file = tokio::fs::File::open(&target).await.map_err(ApiError::from)?;
        let mut data = Vec::new();
        file.take(PREVIEW_LIMIT)
            .read_to_end(&mut data)
            .await
            .map_err(ApiError::from)?;
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, format!("{ctype}; charset=utf-8"))],
            data,
        )
            .into_response());
    }
    if ctype.starts_with("image/") {
        let file = tokio::fs::File::open(&target).await.map_err(ApiError::from)?;
        let body = Body::from_stream(ReaderStream::new(file));
        return Ok((StatusCode::OK, [(header::CONTENT_TYPE, ctype)], body).into_response());
    }
    Ok(plain_text("No preview"))
}

fn plain_text(msg: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        msg,
    )
        .into_response()
}

async fn edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    state.gate(&headers)?;
    let target = state.root.resolve(&query.path)?;
    let meta = tokio::fs::metadata(&target).await.map_err(ApiError::from)?;
    if meta.is_dir() {
        return Err(ApiError::bad_request("target is a directory"));
    }
    let bytes = tokio::fs::read(&target).await.map_err(ApiError::from)?;
    let text =
        String::from_utf8(bytes).map_err(|_| ApiError::bad_request("file is not UTF-8 text"))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response())
}

async fn get_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<perms::PermissionReport>> {
    state.gate(&headers)?;
    let target = state.root.resolve(&query.path)?;
    Ok(Json(perms::read_permissions(&target)?))
}

async fn set_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PermissionsPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    let target = state.root.resolve(&payload.path)?;
    perms::apply_permissions(
        &target,
        &payload.permissions,
        payload.owner.as_deref(),
        payload.group.as_deref(),
    )?;
    Ok(ok_body())
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    // Parts arrive in wire order and clients send file parts before the
    // `path` field, so the whole form is buffered and the destination is
    // resolved once after all fields are read.
    let mut dest_path = default_path();
    let mut files: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        tracing::warn!("malformed multipart body: {err}");
        ApiError::bad_request("malformed upload")
    })? {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("path") => {
                dest_path = field.text().await.map_err(|err| {
                    tracing::warn!("unreadable upload path field: {err}");
                    ApiError::bad_request("malformed upload")
                })?;
            }
            Some("file") => {
                let Some(raw) = field.file_name().map(|s| s.to_string()) else {
                    continue;
                };
                let Some(name) = ops::sanitize_upload_name(&raw) else {
                    continue;
                };
                let data = field.bytes().await.map_err(|err| {
                    tracing::warn!("upload aborted mid-stream: {err}");
                    ApiError::bad_request("malformed upload")
                })?;
                files.push((name, data));
            }
            _ => {}
        }
    }

    let dest = ops::upload_dir(&state.root, &dest_path).await?;
    let mut saved = 0usize;
    for (name, data) in files {
        let target = dest.join(&name);
        tokio::fs::write(&target, &data)
            .await
            .map_err(ApiError::from)?;
        info!(
            "uploaded {} ({} bytes)",
            state.root.virtual_path(&target),
            data.len()
        );
        saved += 1;
    }

    if saved == 0 {
        return Err(ApiError::bad_request("no files uploaded"));
    }
    Ok(Json(json!({ "saved": saved })))
}

async fn mkdir(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MkdirPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    ops::mkdir(&state.root, &payload.path, &payload.name).await?;
    Ok(ok_body())
}

async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DeletePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    ops::delete(&state.root, &payload.path).await?;
    Ok(ok_body())
}

async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RenamePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    ops::rename(&state.root, &payload.path, &payload.new).await?;
    Ok(ok_body())
}

async fn move_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MovePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    ops::move_entry(&state.root, &payload.source, &payload.target).await?;
    Ok(ok_body())
}

async fn move_multiple(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MoveMultiplePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    let outcome = ops::move_many(&state.root, &payload.sources, &payload.target).await?;
    if !outcome.failed.is_empty() {
        return Err(ApiError::bad_request(format!(
            "move failed for: {}",
            outcome.failed.join(", ")
        )));
    }
    Ok(ok_body())
}

async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SavePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.gate(&headers)?;
    ops::save(&state.root, &payload.path, &payload.content).await?;
    Ok(ok_body())
}
