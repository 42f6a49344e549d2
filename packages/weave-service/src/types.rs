use std::collections::HashMap;

use qdrant_client::{Payload, qdrant::Value};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use weave_domain::classify::DedupClass;
use weave_storage::{
	models::{ArtifactRecord, RelationshipRecord},
	vectors::{format_timestamp, payload_rfc3339, payload_string, payload_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointType {
	Note,
	Artifact,
	Relation,
}
impl PointType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Note => "note",
			Self::Artifact => "artifact",
			Self::Relation => "relation",
		}
	}
}

#[derive(Clone, Debug)]
pub struct Note {
	pub note_id: Uuid,
	pub campaign_uuid: Uuid,
	pub title: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}
impl Note {
	pub fn text(&self) -> String {
		format!("{}\n\n{}", self.title, self.content)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewArtifact {
	pub artifact_id: Uuid,
	pub name: String,
	pub artifact_type: String,
	pub description: String,
	pub note_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRelationship {
	pub relationship_id: Uuid,
	pub source_name: String,
	pub target_name: String,
	pub label: String,
	pub description: String,
	pub reasoning: String,
	pub note_ids: Vec<Uuid>,
}

#[derive(Clone, Debug)]
pub struct ArtifactCandidate {
	pub artifact_id: Uuid,
	pub name: String,
	pub artifact_type: String,
	pub description: String,
	pub score: f32,
	pub note_ids: Vec<Uuid>,
}

#[derive(Clone, Debug)]
pub struct RelationshipCandidate {
	pub relationship_id: Uuid,
	pub source_name: String,
	pub target_name: String,
	pub label: String,
	pub description: String,
	pub score: f32,
	pub note_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeduplicationDecision {
	pub is_same: bool,
	pub confidence: u8,
	pub reasoning: String,
	pub candidate_id: Uuid,
	pub candidate_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
	Artifact,
	Relationship,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeProposal {
	pub proposal_id: Uuid,
	pub item_type: ItemKind,
	pub new_item_id: Uuid,
	pub existing_item_id: Uuid,
	pub existing_item_name: String,
	pub confidence: u8,
	pub reasoning: String,
	pub approved: bool,
}

#[derive(Clone, Debug)]
pub struct ArtifactMatch {
	pub artifact: NewArtifact,
	pub decision: DeduplicationDecision,
	pub class: DedupClass,
}

#[derive(Clone, Debug)]
pub struct RelationshipMatch {
	pub relationship: NewRelationship,
	pub decision: DeduplicationDecision,
	pub class: DedupClass,
}

#[derive(Debug, Default)]
pub struct DeduplicationResult {
	pub new_artifacts: Vec<NewArtifact>,
	pub new_relationships: Vec<NewRelationship>,
	pub artifact_decisions: Vec<ArtifactMatch>,
	pub relationship_decisions: Vec<RelationshipMatch>,
	pub phase1_ms: u64,
	pub phase2_ms: u64,
	pub total_ms: u64,
	pub tokens_used: u64,
}
impl DeduplicationResult {
	pub fn needs_confirmation(&self) -> bool {
		self.artifact_decisions
			.iter()
			.any(|decision| decision.class == DedupClass::NeedsConfirmation)
			|| self
				.relationship_decisions
				.iter()
				.any(|decision| decision.class == DedupClass::NeedsConfirmation)
	}
}

pub(crate) fn note_payload(note: &Note) -> Payload {
	Payload::from(note_payload_map(note))
}

fn note_payload_map(note: &Note) -> HashMap<String, Value> {
	let mut payload = HashMap::new();

	payload.insert("type".to_string(), Value::from(PointType::Note.as_str().to_string()));
	payload.insert("note_id".to_string(), Value::from(note.note_id.to_string()));
	payload.insert("campaign_uuid".to_string(), Value::from(note.campaign_uuid.to_string()));
	payload.insert("title".to_string(), Value::from(note.title.clone()));
	payload.insert("content".to_string(), Value::from(note.content.clone()));
	payload.insert("created_at".to_string(), Value::from(format_timestamp(note.created_at)));

	payload
}

pub(crate) fn note_from_payload(
	note_id: Uuid,
	payload: &HashMap<String, Value>,
) -> Option<Note> {
	if payload_string(payload, "type").as_deref() != Some(PointType::Note.as_str()) {
		return None;
	}

	Some(Note {
		note_id,
		campaign_uuid: payload_uuid(payload, "campaign_uuid")?,
		title: payload_string(payload, "title")?,
		content: payload_string(payload, "content")?,
		created_at: payload_rfc3339(payload, "created_at")
			.unwrap_or(OffsetDateTime::UNIX_EPOCH),
	})
}

pub(crate) fn artifact_payload(record: &ArtifactRecord) -> Payload {
	let mut payload = HashMap::new();

	payload.insert("type".to_string(), Value::from(PointType::Artifact.as_str().to_string()));
	payload.insert("campaign_uuid".to_string(), Value::from(record.campaign_uuid.to_string()));
	payload.insert("name".to_string(), Value::from(record.name.clone()));
	payload.insert("artifact_type".to_string(), Value::from(record.artifact_type.clone()));
	payload.insert("description".to_string(), Value::from(record.description.clone()));
	payload.insert("created_at".to_string(), Value::from(format_timestamp(record.created_at)));

	Payload::from(payload)
}

pub(crate) fn relationship_payload(record: &RelationshipRecord) -> Payload {
	let mut payload = HashMap::new();

	payload.insert("type".to_string(), Value::from(PointType::Relation.as_str().to_string()));
	payload.insert("campaign_uuid".to_string(), Value::from(record.campaign_uuid.to_string()));
	payload.insert("source_name".to_string(), Value::from(record.source_name.clone()));
	payload.insert("target_name".to_string(), Value::from(record.target_name.clone()));
	payload.insert("label".to_string(), Value::from(record.label.clone()));
	payload.insert("description".to_string(), Value::from(record.description.clone()));
	payload.insert("created_at".to_string(), Value::from(format_timestamp(record.created_at)));

	Payload::from(payload)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn note_payload_round_trips() {
		let note = Note {
			note_id: Uuid::new_v4(),
			campaign_uuid: Uuid::new_v4(),
			title: "Ambush at the Mill".to_string(),
			content: "Captain Vexa attacked Redfern Mill.".to_string(),
			created_at: OffsetDateTime::from_unix_timestamp(1_750_000_000)
				.expect("valid timestamp"),
		};
		let payload = note_payload_map(&note);
		let parsed = note_from_payload(note.note_id, &payload).expect("Expected a note payload.");

		assert_eq!(parsed.campaign_uuid, note.campaign_uuid);
		assert_eq!(parsed.title, note.title);
		assert_eq!(parsed.content, note.content);
		assert_eq!(parsed.created_at, note.created_at);
	}

	#[test]
	fn note_from_payload_rejects_other_point_types() {
		let mut payload = HashMap::new();

		payload.insert("type".to_string(), Value::from("artifact".to_string()));

		assert!(note_from_payload(Uuid::new_v4(), &payload).is_none());
	}
}
