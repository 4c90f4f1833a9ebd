//! REST surface over the engine.
//!
//! Handlers translate HTTP into engine calls and map [`EngineError`] kinds
//! onto status codes. Caller identity arrives in the `x-caller-id` and
//! `x-caller-role` headers, set by the authenticating proxy in front of us.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{error, info, warn};

use crate::auth::{Caller, Role};
use crate::engine::{ProcessEngine, ProcessFilter};
use crate::error::{EngineError, ErrorKind};
use crate::state_machine::{Action, NewProcess, Process, ProcessPatch, ProcessStatus};

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: ProcessEngine,
    pub default_speed_factor: i64,
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Unauthenticated => {
                warn!("request without caller identity");
                let body = ErrorBody {
                    message: "Unauthorized".to_string(),
                    kind: None,
                    field: None,
                };
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            ApiError::Engine(err) => err,
        };

        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error_type = %kind, error = %err, "request failed");
        } else {
            warn!(error_type = %kind, error = %err, "request rejected");
        }

        let field = match &err {
            EngineError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        let message = match &err {
            EngineError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            message,
            kind: Some(kind),
            field,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Reads the caller identity headers. A missing id is unauthenticated; a
/// missing role means `user`.
pub fn caller_from_headers(headers: &HeaderMap) -> ApiResult<Caller> {
    let id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthenticated)?;
    let role = match headers.get(CALLER_ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::User,
    };
    Ok(Caller::new(id, role))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Engine(EngineError::validation("body", e.to_string())))
}

// Bodies on action endpoints are optional.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        Ok(T::default())
    } else {
        parse_body(body)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    /// A status name, or `all`.
    pub status: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> ApiResult<ProcessFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<ProcessStatus>()?),
        };
        Ok(ProcessFilter {
            search: self.search,
            status,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForceStopRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpeedBoostRequest {
    pub speed_factor: Option<i64>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/processes", get(list_processes).post(create_process))
        .route("/api/processes/stats", get(process_stats))
        .route(
            "/api/processes/:id",
            get(get_process).patch(update_process).delete(delete_process),
        )
        .route("/api/processes/:id/start", post(start_process))
        .route("/api/processes/:id/pause", post(pause_process))
        .route("/api/processes/:id/resume", post(resume_process))
        .route("/api/processes/:id/stop", post(stop_process))
        .route("/api/processes/:id/fix", post(fix_process))
        .route("/api/processes/:id/complete", post(complete_process))
        .route("/api/processes/:id/force-stop", post(force_stop_process))
        .route("/api/processes/:id/speed-boost", post(speed_boost_process))
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "process API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down process API");
        })
        .await?;
    Ok(())
}

async fn list_processes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    caller_from_headers(&headers)?;
    let filter = query.into_filter()?;
    Ok(Json(state.engine.list(&filter)?))
}

async fn process_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    caller_from_headers(&headers)?;
    Ok(Json(state.engine.stats()?))
}

async fn get_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller_from_headers(&headers)?;
    Ok(Json(state.engine.get(&id)?))
}

async fn create_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let caller = caller_from_headers(&headers)?;
    let fields: NewProcess = parse_body(&body)?;
    let process = state.engine.create(&caller, fields)?;
    Ok((StatusCode::CREATED, Json(process)))
}

async fn update_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let caller = caller_from_headers(&headers)?;
    let patch: ProcessPatch = parse_body(&body)?;
    Ok(Json(state.engine.update(&caller, &id, patch)?))
}

async fn delete_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let caller = caller_from_headers(&headers)?;
    if !state.engine.delete(&caller, &id)? {
        return Err(EngineError::NotFound(id).into());
    }
    Ok(Json(MessageBody {
        message: "Process deleted successfully",
    }))
}

fn run_action(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    action: Action,
) -> ApiResult<Json<Process>> {
    let caller = caller_from_headers(headers)?;
    Ok(Json(state.engine.perform(&caller, id, action)?))
}

async fn start_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::Start)
}

async fn pause_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::Pause)
}

async fn resume_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::Resume)
}

async fn stop_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::Stop)
}

async fn fix_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::Fix)
}

async fn complete_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_action(&state, &headers, &id, Action::MarkCompleted)
}

async fn force_stop_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let caller = caller_from_headers(&headers)?;
    let request: ForceStopRequest = parse_optional_body(&body)?;
    Ok(Json(state.engine.force_stop(&caller, &id, request.reason)?))
}

async fn speed_boost_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let caller = caller_from_headers(&headers)?;
    let request: SpeedBoostRequest = parse_optional_body(&body)?;
    let factor = request.speed_factor.unwrap_or(state.default_speed_factor);
    Ok(Json(state.engine.speed_boost(&caller, &id, factor)?))
}
