use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use weave_service::{
	ConfirmDeduplicationRequest, Error as ServiceError, NoteCreateRequest, NoteCreateResponse,
	NoteDto,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/campaigns/{campaign_uuid}/notes", post(create_note))
		.route("/api/campaigns/{campaign_uuid}/notes/{note_id}", get(get_note))
		.route(
			"/api/campaigns/{campaign_uuid}/notes/{note_id}/confirm-deduplication",
			post(confirm_deduplication),
		)
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_note(
	State(state): State<AppState>,
	Path(campaign_uuid): Path<Uuid>,
	Json(payload): Json<NoteCreateRequest>,
) -> Result<(StatusCode, Json<NoteCreateResponse>), ApiError> {
	let response = state.service.ingest_note(campaign_uuid, payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn confirm_deduplication(
	State(state): State<AppState>,
	Path((campaign_uuid, note_id)): Path<(Uuid, Uuid)>,
	Json(payload): Json<ConfirmDeduplicationRequest>,
) -> Result<Json<NoteCreateResponse>, ApiError> {
	let response = state.service.confirm_deduplication(campaign_uuid, note_id, payload).await?;

	Ok(Json(response))
}

async fn get_note(
	State(state): State<AppState>,
	Path((campaign_uuid, note_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<NoteDto>, ApiError> {
	let response = state.service.get_note(campaign_uuid, note_id).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidNote { .. } => (StatusCode::BAD_REQUEST, "invalid_note"),
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::CampaignMismatch { .. } =>
				(StatusCode::BAD_REQUEST, "campaign_mismatch"),
			ServiceError::CampaignNotFound { .. } =>
				(StatusCode::NOT_FOUND, "campaign_not_found"),
			ServiceError::NoteNotFound { .. } => (StatusCode::NOT_FOUND, "note_not_found"),
			ServiceError::SessionNotFound { .. } => (StatusCode::NOT_FOUND, "session_not_found"),
			ServiceError::WorkflowTimeout { .. } | ServiceError::Provider { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "ingest_failed"),
			ServiceError::Storage { .. } | ServiceError::Vector { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
		};

		Self { status, error_code, message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}
