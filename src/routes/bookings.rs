use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignment::AcceptOutcome;
use crate::auth::ActingUser;
use crate::domain::{Assignment, Job, JobStatus, UserProfile};
use crate::error::AppResult;
use crate::lifecycle::{AdminEdit, AdminEditOutcome, NewBooking, StatusChange, TranslatorRef};
use crate::notify::DispatchReport;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: JobStatus,
    pub admin_comment: Option<String>,
    pub session_time: Option<String>,
    pub translator: Option<TranslatorRef>,
}

#[derive(Serialize)]
pub struct CandidateResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<UserProfile> for CandidateResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            email: profile.email,
        }
    }
}

#[derive(Serialize)]
pub struct SmsResponse {
    pub sent: usize,
}

pub async fn create_job(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Json(payload): Json<NewBooking>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let job = state.service.create_job(&acting, payload).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    ActingUser(_): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.service.job(id).await?))
}

pub async fn list_assignments(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Assignment>>> {
    acting.require_admin()?;
    Ok(Json(state.service.assignments(id).await?))
}

/// Lost races answer 409 with the outcome in the body.
pub async fn accept_job(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<AcceptOutcome>)> {
    let outcome = state.service.accept_job(id, &acting).await?;
    let status = if outcome.is_accepted() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(outcome)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.service.cancel_job(id, &acting).await?))
}

pub async fn end_session(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.service.end_session(id, &acting).await?))
}

pub async fn customer_no_show(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.service.customer_no_show(id, &acting).await?))
}

pub async fn reopen_job(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    Ok(Json(state.service.reopen(id, &acting).await?))
}

pub async fn expire_job(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    acting.require_admin()?;
    Ok(Json(state.service.expire(id).await?))
}

pub async fn update_job(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminEdit>,
) -> AppResult<Json<AdminEditOutcome>> {
    Ok(Json(state.service.update_job(id, &acting, payload).await?))
}

pub async fn change_status(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> AppResult<Json<StatusChange>> {
    let context = AdminEdit {
        admin_comment: payload.admin_comment,
        session_time: payload.session_time,
        translator: payload.translator,
        ..AdminEdit::default()
    };
    let change = state
        .service
        .change_status(id, &acting, payload.status, context)
        .await?;
    Ok(Json(change))
}

pub async fn list_candidates(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<CandidateResponse>>> {
    acting.require_admin()?;
    let candidates = state.service.get_candidates(id).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

pub async fn resend_push(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DispatchReport>> {
    acting.require_admin()?;
    Ok(Json(state.service.resend_push(id).await?))
}

pub async fn resend_sms(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SmsResponse>> {
    acting.require_admin()?;
    let sent = state.service.resend_sms(id).await?;
    Ok(Json(SmsResponse { sent }))
}

pub async fn potential_jobs(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
) -> AppResult<Json<Vec<Job>>> {
    Ok(Json(state.service.potential_jobs(&acting).await?))
}
