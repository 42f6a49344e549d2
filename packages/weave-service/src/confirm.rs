use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result, WeaveService,
	ingest::{CommitPlan, NoteCreateResponse, committed_response},
	sessions::PendingDedupSession,
	tracer::Span as _,
	types::{DeduplicationDecision, ItemKind, MergeProposal},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmDeduplicationRequest {
	#[serde(default)]
	pub approved_merge_proposals: Vec<MergeProposal>,
}

impl WeaveService {
	/// Resolves a pending session: approved proposals merge into their
	/// existing items, everything else is inserted as new, and the session
	/// is destroyed.
	pub async fn confirm_deduplication(
		&self,
		campaign_uuid: Uuid,
		note_id: Uuid,
		req: ConfirmDeduplicationRequest,
	) -> Result<NoteCreateResponse> {
		let mut span = self.tracer.span("confirm_deduplication");

		span.set_attribute("campaign_uuid", campaign_uuid.to_string());
		span.set_attribute("note_id", note_id.to_string());

		let campaign = self.fetch_campaign(campaign_uuid).await?;
		let now = OffsetDateTime::now_utc();
		let Some(session) = self.sessions.get(note_id, now) else {
			return Err(Error::SessionNotFound { note_id });
		};

		if session.campaign_uuid != campaign_uuid {
			return Err(Error::CampaignMismatch { expected: session.campaign_uuid });
		}

		let proposals = resolve_approvals(&session.proposals, &req.approved_merge_proposals);
		let plan = confirm_plan(&session, &proposals);
		let counts = self.commit_items(&campaign, plan, now).await?;

		self.sessions.remove(note_id);
		span.add_event("session resolved");

		Ok(committed_response(note_id, counts))
	}
}

/// The session's proposals are authoritative; the client payload only flips
/// approval flags. Unknown proposal ids are ignored, and a proposal the
/// client does not mention keeps its server-side default.
pub(crate) fn resolve_approvals(
	session_proposals: &[MergeProposal],
	client_proposals: &[MergeProposal],
) -> Vec<MergeProposal> {
	session_proposals
		.iter()
		.map(|proposal| {
			let approved = client_proposals
				.iter()
				.find(|client| client.proposal_id == proposal.proposal_id)
				.map(|client| client.approved)
				.unwrap_or(proposal.approved);

			MergeProposal { approved, ..proposal.clone() }
		})
		.collect()
}

fn confirm_plan(session: &PendingDedupSession, proposals: &[MergeProposal]) -> CommitPlan {
	let mut plan = CommitPlan::default();

	for artifact in &session.pending_artifacts {
		match approved_proposal(proposals, ItemKind::Artifact, artifact.artifact_id) {
			Some(proposal) => plan
				.artifact_merges
				.push((artifact.clone(), decision_from_proposal(proposal))),
			None => plan.new_artifacts.push(artifact.clone()),
		}
	}

	for relationship in &session.pending_relationships {
		match approved_proposal(proposals, ItemKind::Relationship, relationship.relationship_id) {
			Some(proposal) => plan
				.relationship_merges
				.push((relationship.clone(), decision_from_proposal(proposal))),
			None => plan.new_relationships.push(relationship.clone()),
		}
	}

	plan
}

fn approved_proposal(
	proposals: &[MergeProposal],
	item_type: ItemKind,
	new_item_id: Uuid,
) -> Option<&MergeProposal> {
	proposals.iter().find(|proposal| {
		proposal.approved && proposal.item_type == item_type && proposal.new_item_id == new_item_id
	})
}

fn decision_from_proposal(proposal: &MergeProposal) -> DeduplicationDecision {
	DeduplicationDecision {
		is_same: true,
		confidence: proposal.confidence,
		reasoning: proposal.reasoning.clone(),
		candidate_id: proposal.existing_item_id,
		candidate_name: proposal.existing_item_name.clone(),
	}
}
