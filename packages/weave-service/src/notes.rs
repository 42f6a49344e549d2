use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use weave_storage::vectors::VectorStore;

use crate::{Error, Result, WeaveService, types::note_from_payload};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteDto {
	pub note_id: Uuid,
	pub campaign_uuid: Uuid,
	pub title: String,
	pub content: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

impl WeaveService {
	/// Notes live as points in the campaign's vector collection; this serves
	/// one back from its stored payload.
	pub async fn get_note(&self, campaign_uuid: Uuid, note_id: Uuid) -> Result<NoteDto> {
		self.fetch_campaign(campaign_uuid).await?;

		let collection = VectorStore::collection_name(campaign_uuid);
		let Some(payload) = self.vectors.get_payload(&collection, note_id).await? else {
			return Err(Error::NoteNotFound { note_id });
		};
		let Some(note) = note_from_payload(note_id, &payload) else {
			return Err(Error::NoteNotFound { note_id });
		};

		if note.campaign_uuid != campaign_uuid {
			return Err(Error::NoteNotFound { note_id });
		}

		Ok(NoteDto {
			note_id: note.note_id,
			campaign_uuid: note.campaign_uuid,
			title: note.title,
			content: note.content,
			created_at: note.created_at,
		})
	}
}
