use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid note: {message}")]
	InvalidNote { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Campaign not found: {campaign_uuid}")]
	CampaignNotFound { campaign_uuid: Uuid },
	#[error("Note not found: {note_id}")]
	NoteNotFound { note_id: Uuid },
	#[error("No pending deduplication session for note {note_id}; re-ingest the note to continue.")]
	SessionNotFound { note_id: Uuid },
	#[error("Campaign UUID mismatch: the pending session belongs to campaign {expected}.")]
	CampaignMismatch { expected: Uuid },
	#[error("Workflow timed out during {stage}.")]
	WorkflowTimeout { stage: &'static str },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Vector store error: {message}")]
	Vector { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<weave_storage::Error> for Error {
	fn from(err: weave_storage::Error) -> Self {
		match err {
			weave_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			weave_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			weave_storage::Error::NotFound(message) => Self::InvalidRequest { message },
			weave_storage::Error::Qdrant(inner) => Self::Vector { message: inner.to_string() },
		}
	}
}

impl From<weave_providers::Error> for Error {
	fn from(err: weave_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
