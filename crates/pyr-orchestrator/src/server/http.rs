//! HTTP control plane handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use pyr_core::ipc::{ExternalProcess, ScriptRecord};
use pyr_core::{RunnerError, ScriptName};

use crate::state::AppState;

/// Error returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Runner(err) => match err {
                RunnerError::NotFound(_) => StatusCode::NOT_FOUND,
                RunnerError::Busy(_)
                | RunnerError::AlreadyRunning(_)
                | RunnerError::NotRunning(_)
                | RunnerError::InputBacklog(_)
                | RunnerError::InputClosed(_) => StatusCode::CONFLICT,
                RunnerError::InvalidName(_)
                | RunnerError::UnsupportedFileType(_)
                | RunnerError::NotUtf8(_)
                | RunnerError::ValidationFailure { .. }
                | RunnerError::MissingDependency(_)
                | RunnerError::NotExecutable { .. }
                | RunnerError::NotExternal(_) => StatusCode::BAD_REQUEST,
                RunnerError::ProcessSpawnFailure { .. } | RunnerError::Io(_) => {
                    tracing::error!("Request failed: {}", err);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Multipart(err) => err.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            ApiError::Multipart(err) => err.body_text(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Script name from a URL path; anything that is not a script name
/// cannot exist
fn path_name(raw: String) -> ApiResult<ScriptName> {
    ScriptName::parse(raw).map_err(|e| match e {
        RunnerError::InvalidName(raw) | RunnerError::UnsupportedFileType(raw) => {
            RunnerError::NotFound(raw).into()
        }
        other => other.into(),
    })
}

/// Run filesystem and parsing work off the async workers
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, RunnerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

#[derive(Debug, Serialize)]
pub struct ScriptListing {
    pub scripts: Vec<ScriptRecord>,
    pub external_processes: Vec<ExternalProcess>,
}

#[derive(Debug, Serialize)]
pub struct ScriptDetail {
    #[serde(flatten)]
    pub record: ScriptRecord,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub is_valid: bool,
    pub is_executable: bool,
    pub errors: Vec<String>,
    pub missing_deps: Vec<String>,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutobootRequest {
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// GET /api/hostname
pub async fn hostname(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "hostname": state.hostname }))
}

/// GET /api/scripts
pub async fn list_scripts(State(state): State<Arc<AppState>>) -> ApiResult<Json<ScriptListing>> {
    let scripts = {
        let state = Arc::clone(&state);
        blocking(move || state.list_scripts()).await?
    };
    let external_processes = state.external_processes().await;

    Ok(Json(ScriptListing {
        scripts,
        external_processes,
    }))
}

/// GET /api/scripts/{name}
pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ScriptDetail>> {
    let name = path_name(name)?;
    let detail = blocking(move || {
        let record = state.script_record(&name)?;
        let content = state.registry.read_source(&name)?;
        Ok(ScriptDetail { record, content })
    })
    .await?;
    Ok(Json(detail))
}

/// DELETE /api/scripts/{name}
pub async fn delete_script(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = path_name(name)?;
    blocking(move || state.delete_script(&name)).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/scripts/{name}/log
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = path_name(name)?;
    let log = blocking(move || {
        state
            .registry
            .read_log(&name)?
            .ok_or_else(|| RunnerError::NotFound(format!("log for {}", name)))
    })
    .await?;
    Ok(Json(json!({ "log": log })))
}

/// POST /api/scripts/{name}/autoboot
///
/// Body `{"enabled": bool}`; an empty body enables.
pub async fn set_autoboot(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let name = path_name(name)?;
    let request: AutobootRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AutobootRequest { enabled: true }
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let autoboot = blocking(move || {
        if !state.registry.exists(&name) {
            return Err(RunnerError::NotFound(name.to_string()));
        }
        state.set_autoboot(&name, request.enabled)
    })
    .await?;

    Ok(Json(json!({ "success": true, "autoboot": autoboot })))
}

/// POST /api/upload
///
/// Multipart body with one `file` field. Only scripts that pass
/// validation are saved; the verdict is returned either way.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((file_name, data));
        break;
    }

    let Some((file_name, data)) = upload else {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    };
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }

    let outcome = blocking(move || state.save_upload(&file_name, &data)).await?;

    let saved = outcome.saved_to.is_some();
    Ok(Json(UploadResponse {
        filename: outcome.name.to_string(),
        is_valid: outcome.verdict.is_valid,
        is_executable: outcome.verdict.is_executable(),
        message: outcome
            .saved_to
            .map(|path| format!("File saved to {}", path.display())),
        errors: outcome.verdict.errors,
        missing_deps: outcome.verdict.missing_deps,
        saved,
    }))
}

/// GET /api/config/blocked
pub async fn blocked(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let policy = &state.config.validation;
    Json(json!({
        "blocked_modules": policy.blocked_modules,
        "blocked_builtins": policy.blocked_builtins,
        "blocked_functions": policy.blocked_functions,
    }))
}
