//! REST endpoints for employee provisioning and the submission workflow.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use super::engine::OnboardingEngine;
use super::model::{Employee, ProfileForm};
use crate::error::{DatabaseError, WorkflowError};
use crate::storage::Attachment;
use crate::store::Database;

/// Upper bound for a profile submission (form fields plus all files).
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Longest accepted user id. Ids end up in storage object keys.
pub const MAX_USER_ID_LEN: usize = 128;

/// Header carrying the admin token for provisioning routes.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct RouteState {
    pub engine: Arc<OnboardingEngine>,
    pub db: Arc<dyn Database>,
    /// When unset, admin routes are open.
    pub admin_token: Option<SecretString>,
}

/// Build the portal router.
pub fn onboarding_routes(state: RouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/admin/employees", get(list_employees).post(create_employee))
        .route("/api/onboarding/{user_id}", get(get_status))
        .route("/api/onboarding/{user_id}/profile", post(stage_profile))
        .route("/api/onboarding/{user_id}/otp", post(issue_otp))
        .route("/api/onboarding/{user_id}/otp/verify", post(verify_otp))
        .route("/api/onboarding/{user_id}/reset", post(reset_profile))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// JSON error body: `{"error": kind, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::UploadFailed { .. } | WorkflowError::DeliveryFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            WorkflowError::InvalidCode { .. } => StatusCode::UNAUTHORIZED,
            WorkflowError::ChallengeExpired => StatusCode::GONE,
            WorkflowError::AttemptsExceeded => StatusCode::TOO_MANY_REQUESTS,
            WorkflowError::AlreadySubmitted
            | WorkflowError::NothingStaged
            | WorkflowError::NoChallenge => StatusCode::CONFLICT,
            WorkflowError::EmployeeNotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::WriteError(_) | WorkflowError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Constraint(_) => Self::new(
                StatusCode::CONFLICT,
                "employee_exists",
                "An employee with this user id or email already exists",
            ),
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                other.to_string(),
            ),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "bad_request", rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::new(rejection.status(), "bad_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"error": self.kind, "message": self.message})),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "onboarding-portal"
    }))
}

// ── Admin ───────────────────────────────────────────────────────────────

fn require_admin(state: &RouteState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = &state.admin_token else {
        return Ok(());
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided == expected.expose_secret() {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid admin token",
        ))
    }
}

/// User ids are limited to ASCII letters, digits, `-`, `_` and `.`, and may
/// not be a dot-only path segment, so object keys stay under their prefix.
fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && !user_id.chars().all(|c| c == '.')
        && !user_id.contains("..")
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Deserialize)]
struct CreateEmployeeRequest {
    user_id: String,
    email: String,
}

async fn create_employee(
    State(state): State<RouteState>,
    headers: HeaderMap,
    body: Result<Json<CreateEmployeeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    require_admin(&state, &headers)?;
    let Json(body) = body?;

    let user_id = body.user_id.trim();
    let email = body.email.trim();
    if !is_valid_user_id(user_id) {
        warn!(user_id = %user_id, "Rejected malformed user id");
        return Err(WorkflowError::Validation {
            field: "user_id".into(),
        }
        .into());
    }
    if email.parse::<lettre::Address>().is_err() {
        return Err(WorkflowError::Validation {
            field: "email".into(),
        }
        .into());
    }

    let employee = state.db.create_employee(user_id, email).await?;
    info!(user_id = %employee.user_id, employee_id = %employee.id, "Employee provisioned");
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn list_employees(
    State(state): State<RouteState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Employee>>> {
    require_admin(&state, &headers)?;
    Ok(Json(state.db.list_employees().await?))
}

// ── Workflow ────────────────────────────────────────────────────────────

async fn get_status(
    State(state): State<RouteState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let status = state.engine.status(&user_id).await?;
    Ok(Json(status))
}

/// Form fields and files pulled out of a profile submission.
#[derive(Default)]
struct ProfileUpload {
    form: ProfileForm,
    profile_image: Option<Attachment>,
    documents: Vec<Attachment>,
}

async fn read_profile_upload(mut multipart: Multipart) -> ApiResult<ProfileUpload> {
    let mut upload = ProfileUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" | "email" | "department" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                match name.as_str() {
                    "name" => upload.form.name = value,
                    "email" => upload.form.email = value,
                    _ => upload.form.department = value,
                }
            }
            "profile_image" | "documents" => {
                // Browsers send an empty part for an untouched file input.
                let file_name = field.file_name().unwrap_or_default().to_string();
                if file_name.is_empty() {
                    continue;
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                let attachment = Attachment::new(&file_name, &content_type, bytes.to_vec());
                if name == "profile_image" {
                    upload.profile_image = Some(attachment);
                } else {
                    upload.documents.push(attachment);
                }
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(upload)
}

async fn stage_profile(
    State(state): State<RouteState>,
    Path(user_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let upload = read_profile_upload(multipart?).await?;
    let staged = state
        .engine
        .stage(&user_id, upload.form, upload.profile_image, upload.documents)
        .await?;
    Ok(Json(staged))
}

async fn issue_otp(
    State(state): State<RouteState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let issued = state.engine.issue_challenge(&user_id).await?;
    Ok(Json(issued))
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    message: &'static str,
    employee: Employee,
}

async fn verify_otp(
    State(state): State<RouteState>,
    Path(user_id): Path<String>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    match state.engine.verify(&user_id, &body.code).await {
        Ok(employee) => {
            info!(user_id = %user_id, "Profile submitted");
            Ok(Json(VerifyResponse {
                message: "Profile submitted successfully",
                employee,
            }))
        }
        Err(e) => {
            if !e.is_recoverable() {
                warn!(user_id = %user_id, kind = e.kind(), "Verification ended the submission attempt");
            }
            Err(e.into())
        }
    }
}

async fn reset_profile(
    State(state): State<RouteState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.engine.reset(&user_id).await?;
    Ok(Json(serde_json::json!({"status": "reset"})))
}
