use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use weave_domain::{classify::DedupClass, note_gate, sanitise};
use weave_storage::{graph, models::Campaign, vectors::VectorStore};

use crate::{
	Error, Result, WeaveService, WorkflowBudget,
	sessions::PendingDedupSession,
	tracer::Span as _,
	types::{
		DeduplicationDecision, DeduplicationResult, ItemKind, MergeProposal, NewArtifact,
		NewRelationship, Note, note_payload,
	},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteCreateRequest {
	pub title: String,
	pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteCreateResponse {
	pub note_id: Uuid,
	pub success: bool,
	pub message: String,
	pub artifact_count: usize,
	pub relationship_count: usize,
	pub merged_artifact_count: usize,
	pub merged_relationship_count: usize,
	pub requires_user_confirmation: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub proposals: Vec<MergeProposal>,
}

#[derive(Debug, Default)]
pub(crate) struct CommitPlan {
	pub new_artifacts: Vec<NewArtifact>,
	pub new_relationships: Vec<NewRelationship>,
	pub artifact_merges: Vec<(NewArtifact, DeduplicationDecision)>,
	pub relationship_merges: Vec<(NewRelationship, DeduplicationDecision)>,
}

#[derive(Debug, Default)]
pub(crate) struct CommitCounts {
	pub artifact_count: usize,
	pub relationship_count: usize,
	pub merged_artifact_count: usize,
	pub merged_relationship_count: usize,
}

impl WeaveService {
	/// The ingest state machine: validate, embed the note, extract,
	/// deduplicate, then either commit everything or park the whole set
	/// behind the user's confirmation.
	pub async fn ingest_note(
		&self,
		campaign_uuid: Uuid,
		req: NoteCreateRequest,
	) -> Result<NoteCreateResponse> {
		let mut span = self.tracer.span("ingest_note");

		span.set_attribute("campaign_uuid", campaign_uuid.to_string());

		let campaign = self.fetch_campaign(campaign_uuid).await?;

		note_gate::validate_note(&req.title, &req.content)
			.map_err(|reject| Error::InvalidNote { message: reject.message() })?;

		let now = OffsetDateTime::now_utc();
		let note = Note {
			note_id: note_gate::note_id(&req.title, &req.content),
			campaign_uuid,
			title: req.title,
			content: req.content,
			created_at: now,
		};

		span.set_attribute("note_id", note.note_id.to_string());

		let budget = WorkflowBudget::new(self.cfg.dedup.workflow_timeout_ms);
		// The note's own vector is written before any extracted entity and
		// is idempotent on retry because the id is content derived.
		let collection = VectorStore::collection_name(campaign_uuid);

		self.vectors.ensure_collection(&collection).await?;

		let (vector, _) = self.embed_one(&note.text()).await?;

		self.vectors.upsert_point(&collection, note.note_id, vector, note_payload(&note)).await?;
		span.add_event("note vector stored");

		let extraction = match self.extract_note(&campaign, &note, &budget).await {
			Ok(extraction) => extraction,
			Err(err) => {
				span.record_error(&err);

				return Err(err);
			},
		};

		span.add_event("extraction finished");

		let dedup = self.deduplicate(&campaign, &note, extraction, &budget).await?;

		tracing::info!(
			note_id = %note.note_id,
			phase1_ms = dedup.phase1_ms,
			phase2_ms = dedup.phase2_ms,
			total_ms = dedup.total_ms,
			tokens_used = dedup.tokens_used,
			"Note deduplication finished."
		);

		if dedup.needs_confirmation() {
			let session = build_session(&note, dedup, self.session_ttl(), now);
			let artifact_count = session.pending_artifacts.len();
			let relationship_count = session.pending_relationships.len();
			let proposals = session.proposals.clone();
			let note_id = session.note_id;

			// Nothing is committed while the session is pending: the graph
			// must not contain any artifact from this note yet.
			self.sessions.put(session);
			span.add_event("session parked");

			return Ok(NoteCreateResponse {
				note_id,
				success: true,
				message: "Deduplication requires user confirmation.".to_string(),
				artifact_count,
				relationship_count,
				merged_artifact_count: 0,
				merged_relationship_count: 0,
				requires_user_confirmation: true,
				proposals,
			});
		}

		let counts = self.commit_items(&campaign, commit_plan(dedup), now).await?;

		span.add_event("committed");

		Ok(committed_response(note.note_id, counts))
	}

	pub(crate) fn session_ttl(&self) -> Duration {
		Duration::seconds(self.cfg.dedup.session_ttl_seconds)
	}

	/// Commits artifacts before relationships, and merges before inserts, so
	/// relationship endpoints can be remapped onto merge survivors.
	pub(crate) async fn commit_items(
		&self,
		campaign: &Campaign,
		plan: CommitPlan,
		now: OffsetDateTime,
	) -> Result<CommitCounts> {
		let lock = self.commit_locks.lock_for(campaign.campaign_uuid);
		let _guard = lock.lock().await;
		let mut counts = CommitCounts::default();
		let mut renames: HashMap<String, String> = HashMap::new();
		let collection = VectorStore::collection_name(campaign.campaign_uuid);
		let node_label = campaign.node_label();

		for (artifact, decision) in plan.artifact_merges {
			self.merge_artifact(campaign, &decision.candidate_name, &artifact, now).await?;

			if artifact.name != decision.candidate_name {
				renames.insert(artifact.name.clone(), decision.candidate_name.clone());
			}

			counts.artifact_count += 1;
			counts.merged_artifact_count += 1;
		}

		for artifact in plan.new_artifacts {
			let row = graph::NewArtifactRow {
				artifact_id: artifact.artifact_id,
				name: &artifact.name,
				artifact_type: &artifact.artifact_type,
				description: &artifact.description,
				note_ids: &artifact.note_ids,
			};
			let artifact_id = graph::upsert_artifact(
				&self.db.pool,
				campaign.campaign_uuid,
				&node_label,
				&row,
				now,
			)
			.await?;

			self.refresh_artifact_vector(campaign, &collection, artifact_id).await;

			counts.artifact_count += 1;
		}

		for (relationship, decision) in plan.relationship_merges {
			let relationship = remap_endpoints(relationship, &renames);

			self.merge_relationship(campaign, decision.candidate_id, &relationship, now).await?;

			counts.relationship_count += 1;
			counts.merged_relationship_count += 1;
		}

		for relationship in plan.new_relationships {
			let relationship = remap_endpoints(relationship, &renames);
			let edge_type = sanitise::edge_type(&relationship.label);
			let row = graph::NewRelationshipRow {
				relationship_id: relationship.relationship_id,
				source_name: &relationship.source_name,
				target_name: &relationship.target_name,
				label: &relationship.label,
				edge_type: &edge_type,
				description: &relationship.description,
				reasoning: &relationship.reasoning,
				note_ids: &relationship.note_ids,
			};

			match graph::upsert_relationship(&self.db.pool, campaign.campaign_uuid, &row, now)
				.await?
			{
				Some(relationship_id) => {
					self.refresh_relationship_vector(campaign, &collection, relationship_id)
						.await;

					counts.relationship_count += 1;
				},
				None => {
					tracing::warn!(
						source = %relationship.source_name,
						target = %relationship.target_name,
						label = %relationship.label,
						"Skipping relationship with a missing endpoint."
					);
				},
			}
		}

		Ok(counts)
	}
}

pub(crate) fn committed_response(note_id: Uuid, counts: CommitCounts) -> NoteCreateResponse {
	NoteCreateResponse {
		note_id,
		success: true,
		message: "Note ingested.".to_string(),
		artifact_count: counts.artifact_count,
		relationship_count: counts.relationship_count,
		merged_artifact_count: counts.merged_artifact_count,
		merged_relationship_count: counts.merged_relationship_count,
		requires_user_confirmation: false,
		proposals: vec![],
	}
}

/// All of the note's items are parked. Auto-merge decisions ride along as
/// pre-approved proposals so the confirmation step executes them without
/// user action; needs-confirmation proposals default to unapproved.
pub(crate) fn build_session(
	note: &Note,
	dedup: DeduplicationResult,
	ttl: Duration,
	now: OffsetDateTime,
) -> PendingDedupSession {
	let mut pending_artifacts = dedup.new_artifacts;
	let mut pending_relationships = dedup.new_relationships;
	let mut proposals = Vec::new();

	for matched in dedup.artifact_decisions {
		proposals.push(MergeProposal {
			proposal_id: Uuid::new_v4(),
			item_type: ItemKind::Artifact,
			new_item_id: matched.artifact.artifact_id,
			existing_item_id: matched.decision.candidate_id,
			existing_item_name: matched.decision.candidate_name.clone(),
			confidence: matched.decision.confidence,
			reasoning: matched.decision.reasoning.clone(),
			approved: matched.class == DedupClass::AutoMerge,
		});
		pending_artifacts.push(matched.artifact);
	}

	for matched in dedup.relationship_decisions {
		proposals.push(MergeProposal {
			proposal_id: Uuid::new_v4(),
			item_type: ItemKind::Relationship,
			new_item_id: matched.relationship.relationship_id,
			existing_item_id: matched.decision.candidate_id,
			existing_item_name: matched.decision.candidate_name.clone(),
			confidence: matched.decision.confidence,
			reasoning: matched.decision.reasoning.clone(),
			approved: matched.class == DedupClass::AutoMerge,
		});
		pending_relationships.push(matched.relationship);
	}

	PendingDedupSession {
		note_id: note.note_id,
		campaign_uuid: note.campaign_uuid,
		pending_artifacts,
		pending_relationships,
		proposals,
		created_at: now,
		expires_at: now + ttl,
	}
}

/// Commit plan for the no-proposal path: every decision present is an
/// auto-merge.
pub(crate) fn commit_plan(dedup: DeduplicationResult) -> CommitPlan {
	CommitPlan {
		new_artifacts: dedup.new_artifacts,
		new_relationships: dedup.new_relationships,
		artifact_merges: dedup
			.artifact_decisions
			.into_iter()
			.map(|matched| (matched.artifact, matched.decision))
			.collect(),
		relationship_merges: dedup
			.relationship_decisions
			.into_iter()
			.map(|matched| (matched.relationship, matched.decision))
			.collect(),
	}
}

/// Relationships extracted against a merged-away spelling are rewired onto
/// the surviving artifact's name before they are written.
pub(crate) fn remap_endpoints(
	mut relationship: NewRelationship,
	renames: &HashMap<String, String>,
) -> NewRelationship {
	if let Some(survivor) = renames.get(&relationship.source_name) {
		relationship.source_name = survivor.clone();
	}
	if let Some(survivor) = renames.get(&relationship.target_name) {
		relationship.target_name = survivor.clone();
	}

	relationship
}
