use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::access::{Actor, Role};
use super::collaborators::FileUpload;
use super::diploma::DiplomaDetails;
use super::domain::{DocumentId, DocumentType, EducatorId, EducatorProfile, EducatorRegistration};
use super::errors::VerificationError;
use super::gating::SubscriptionGate;
use super::repository::{RepositoryError, VerificationRepository};
use super::review::{AdminReviewService, ReviewOutcome};
use super::service::EducatorVerificationService;
use super::views::{DocumentSummary, VerificationOverview};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Services shared by the verification routes.
pub struct VerificationState<R> {
    pub educators: Arc<EducatorVerificationService<R>>,
    pub review: Arc<AdminReviewService<R>>,
    pub gate: Arc<SubscriptionGate>,
}

impl<R> Clone for VerificationState<R> {
    fn clone(&self) -> Self {
        Self {
            educators: self.educators.clone(),
            review: self.review.clone(),
            gate: self.gate.clone(),
        }
    }
}

/// Router builder exposing the educator and admin verification endpoints.
pub fn verification_router<R>(state: VerificationState<R>) -> Router
where
    R: VerificationRepository + 'static,
{
    Router::new()
        .route("/api/v1/educators", post(register_handler::<R>))
        .route("/api/v1/educators/me", get(own_overview_handler::<R>))
        .route(
            "/api/v1/educators/:educator_id/verification",
            get(overview_handler::<R>),
        )
        .route(
            "/api/v1/educators/:educator_id/profile",
            get(public_profile_handler::<R>),
        )
        .route(
            "/api/v1/educators/:educator_id/capacity",
            get(capacity_handler::<R>),
        )
        .route(
            "/api/v1/educators/:educator_id/documents/:document_type",
            post(upload_handler::<R>),
        )
        .route(
            "/api/v1/educators/:educator_id/diploma",
            post(diploma_handler::<R>),
        )
        .route("/api/v1/admin/review-queue", get(review_queue_handler::<R>))
        .route(
            "/api/v1/admin/documents/:document_id",
            delete(delete_document_handler::<R>),
        )
        .route(
            "/api/v1/admin/documents/:document_id/approve",
            post(approve_document_handler::<R>),
        )
        .route(
            "/api/v1/admin/documents/:document_id/reject",
            post(reject_document_handler::<R>),
        )
        .route(
            "/api/v1/admin/documents/:document_id/link",
            get(document_link_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/interview",
            post(schedule_interview_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/approve",
            post(approve_educator_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/reject",
            post(reject_educator_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/notes",
            post(notes_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/regulator-response",
            post(regulator_response_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/recompute",
            post(recompute_handler::<R>),
        )
        .route(
            "/api/v1/admin/educators/:educator_id/criminal-record-checks",
            get(criminal_record_history_handler::<R>),
        )
        .with_state(state)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let unauthorized = |message: &str| {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
        };

        let user_id = header(USER_ID_HEADER).ok_or_else(|| unauthorized("missing user identity"))?;
        let role = header(USER_ROLE_HEADER)
            .as_deref()
            .and_then(Role::parse)
            .ok_or_else(|| unauthorized("missing or unknown user role"))?;

        Ok(Actor::new(user_id, role))
    }
}

/// File payload carried in JSON bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub content_base64: String,
}

impl UploadRequest {
    fn into_upload(self) -> Result<FileUpload, Response> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.content_base64.trim())
            .map_err(|err| {
                unprocessable(format!("content_base64 is not valid base64: {err}"))
            })?;
        Ok(FileUpload::new(self.file_name, self.content_type, bytes))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiplomaRequest {
    #[serde(flatten)]
    pub file: UploadRequest,
    #[serde(flatten)]
    pub details: DiplomaDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterviewRequest {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapacityQuery {
    #[serde(default)]
    pub active_conversations: u32,
    #[serde(default)]
    pub active_bookings: u32,
}

/// Accepts RFC 3339 timestamps and the `YYYY-MM-DDTHH:MM` form sent by
/// `datetime-local` inputs, the latter read as UTC.
pub fn parse_schedule(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("failed to parse '{raw}' as an interview date"))
}

pub(crate) async fn register_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Json(registration): Json<EducatorRegistration>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    match state.educators.register(&actor, registration) {
        Ok(profile) => {
            let overview = VerificationOverview::build(&profile, &[], None, actor.is_admin());
            (StatusCode::CREATED, Json(overview)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn overview_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    match state.educators.overview(&actor, &EducatorId(educator_id)) {
        Ok(overview) => (StatusCode::OK, Json(overview)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Verification overview of the caller's own educator account.
pub(crate) async fn own_overview_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let overview = state
        .educators
        .own_profile(&actor)
        .and_then(|profile| state.educators.overview(&actor, &profile.id));
    match overview {
        Ok(overview) => (StatusCode::OK, Json(overview)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn public_profile_handler<R>(
    State(state): State<VerificationState<R>>,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    match state.educators.public_profile(&EducatorId(educator_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn capacity_handler<R>(
    State(state): State<VerificationState<R>>,
    Path(educator_id): Path<String>,
    Query(query): Query<CapacityQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let educator_id = EducatorId(educator_id);
    let conversations = state
        .gate
        .can_open_conversation(&educator_id, query.active_conversations);
    let bookings = state
        .gate
        .can_accept_booking(&educator_id, query.active_bookings);
    let payload = json!({
        "educator_id": educator_id,
        "conversation": conversations,
        "booking": bookings,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn upload_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path((educator_id, document_type)): Path<(String, String)>,
    Json(request): Json<UploadRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let Some(kind) = DocumentType::parse(&document_type) else {
        return unprocessable(format!("unknown document type '{document_type}'"));
    };
    let upload = match request.into_upload() {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match state
        .educators
        .upload_document(&actor, &EducatorId(educator_id), kind, upload)
    {
        Ok(document) => (
            StatusCode::CREATED,
            Json(DocumentSummary::from(&document)),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn diploma_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
    Json(request): Json<DiplomaRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let DiplomaRequest { file, details } = request;
    let upload = match file.into_upload() {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match state
        .educators
        .submit_diploma(&actor, &EducatorId(educator_id), upload, details)
    {
        Ok(outcome) => {
            let payload = json!({
                "document": DocumentSummary::from(&outcome.document),
                "status": outcome.profile.verification_status.label(),
                "analysis": outcome.analysis,
                "regulator_notified": outcome.regulator_notified,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_queue_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Query(query): Query<QueueQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.review_queue(query.limit.unwrap_or(DEFAULT_QUEUE_LIMIT)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_document_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(document_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.approve_document(&DocumentId(document_id)) {
        Ok(outcome) => review_outcome_response(outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_document_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(document_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.reject_document(&DocumentId(document_id), &request.reason) {
        Ok(outcome) => review_outcome_response(outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_document_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(document_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.delete_document(&DocumentId(document_id)) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn document_link_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(document_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.document_link(&DocumentId(document_id)) {
        Ok(link) => (StatusCode::OK, Json(link)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn schedule_interview_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
    Json(request): Json<InterviewRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    let date = match request
        .date
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(parse_schedule)
        .transpose()
    {
        Ok(date) => date,
        Err(message) => return unprocessable(message),
    };

    match session.schedule_interview(&EducatorId(educator_id), date, request.notes) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_educator_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.approve_educator(&EducatorId(educator_id)) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_educator_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.reject_educator(&EducatorId(educator_id), &request.reason) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn notes_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
    Json(request): Json<NotesRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.update_notes(&EducatorId(educator_id), request.notes) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn regulator_response_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.mark_regulator_responded(&EducatorId(educator_id)) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn recompute_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.recompute(&EducatorId(educator_id)) {
        Ok(profile) => profile_response(&profile),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn criminal_record_history_handler<R>(
    State(state): State<VerificationState<R>>,
    actor: Actor,
    Path(educator_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
{
    let session = match state.review.authorize(&actor) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    match session.criminal_record_history(&EducatorId(educator_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

fn profile_response(profile: &EducatorProfile) -> Response {
    let visibility = profile.visibility();
    let payload = json!({
        "educator_id": profile.id,
        "status": profile.verification_status.label(),
        "verification_badge": visibility.verification_badge,
        "profile_visible": visibility.profile_visible,
        "interview_scheduled_date": profile.interview_scheduled_date,
        "admin_notes": profile.admin_notes,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn review_outcome_response(outcome: ReviewOutcome) -> Response {
    let visibility = outcome.profile.visibility();
    let payload = json!({
        "document": DocumentSummary::from(&outcome.document),
        "educator_id": outcome.profile.id,
        "status": outcome.profile.verification_status.label(),
        "verification_badge": visibility.verification_badge,
        "profile_visible": visibility.profile_visible,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn unprocessable(message: String) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": message })),
    )
        .into_response()
}

pub(crate) fn error_status(err: &VerificationError) -> StatusCode {
    match err {
        VerificationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VerificationError::Access(_) => StatusCode::FORBIDDEN,
        VerificationError::Transition(_)
        | VerificationError::AlreadyRegistered
        | VerificationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        err if err.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: VerificationError) -> Response {
    let status = error_status(&err);
    let payload = match &err {
        VerificationError::Recompute { document, .. } => json!({
            "error": err.to_string(),
            "document_id": document,
            "retry": "recompute",
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(payload)).into_response()
}
