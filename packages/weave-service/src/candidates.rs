use weave_storage::{
	graph,
	models::Campaign,
	vectors::{SearchHit, VectorStore, payload_string},
};

use crate::{
	Result, WeaveService, artifact_embed_text, relationship_embed_text,
	types::{ArtifactCandidate, NewArtifact, NewRelationship, PointType, RelationshipCandidate},
};

impl WeaveService {
	/// Phase 1 for one artifact: ANN search over the campaign's collection,
	/// thresholded, then enriched with the graph's backing notes.
	pub(crate) async fn find_artifact_candidates(
		&self,
		campaign: &Campaign,
		artifact: &NewArtifact,
	) -> Result<(Vec<ArtifactCandidate>, u64)> {
		let text =
			artifact_embed_text(&artifact.name, &artifact.artifact_type, &artifact.description);
		let (vector, tokens) = self.embed_one(&text).await?;
		let collection = VectorStore::collection_name(campaign.campaign_uuid);
		let hits = self
			.vectors
			.search(
				&collection,
				vector,
				PointType::Artifact.as_str(),
				u64::from(self.cfg.dedup.candidate_limit),
			)
			.await?;
		let mut candidates = Vec::new();

		for hit in hits {
			if hit.score < self.cfg.dedup.similarity_threshold {
				continue;
			}

			let Some(mut candidate) = artifact_candidate_from_hit(&hit) else {
				tracing::warn!(point_id = %hit.id, "Artifact candidate payload is incomplete.");

				continue;
			};

			candidate.note_ids =
				graph::artifact_note_ids(&self.db.pool, campaign.campaign_uuid, hit.id).await?;
			candidates.push(candidate);
		}

		Ok((candidates, tokens))
	}

	pub(crate) async fn find_relationship_candidates(
		&self,
		campaign: &Campaign,
		relationship: &NewRelationship,
	) -> Result<(Vec<RelationshipCandidate>, u64)> {
		let text = relationship_embed_text(
			&relationship.source_name,
			&relationship.label,
			&relationship.target_name,
			&relationship.description,
		);
		let (vector, tokens) = self.embed_one(&text).await?;
		let collection = VectorStore::collection_name(campaign.campaign_uuid);
		let hits = self
			.vectors
			.search(
				&collection,
				vector,
				PointType::Relation.as_str(),
				u64::from(self.cfg.dedup.candidate_limit),
			)
			.await?;
		let mut candidates = Vec::new();

		for hit in hits {
			if hit.score < self.cfg.dedup.similarity_threshold {
				continue;
			}

			let Some(mut candidate) = relationship_candidate_from_hit(&hit) else {
				tracing::warn!(point_id = %hit.id, "Relationship candidate payload is incomplete.");

				continue;
			};

			candidate.note_ids =
				graph::relationship_note_ids(&self.db.pool, campaign.campaign_uuid, hit.id)
					.await?;
			candidates.push(candidate);
		}

		Ok((candidates, tokens))
	}
}

fn artifact_candidate_from_hit(hit: &SearchHit) -> Option<ArtifactCandidate> {
	Some(ArtifactCandidate {
		artifact_id: hit.id,
		name: payload_string(&hit.payload, "name")?,
		artifact_type: payload_string(&hit.payload, "artifact_type").unwrap_or_default(),
		description: payload_string(&hit.payload, "description").unwrap_or_default(),
		score: hit.score,
		note_ids: vec![],
	})
}

fn relationship_candidate_from_hit(hit: &SearchHit) -> Option<RelationshipCandidate> {
	Some(RelationshipCandidate {
		relationship_id: hit.id,
		source_name: payload_string(&hit.payload, "source_name")?,
		target_name: payload_string(&hit.payload, "target_name")?,
		label: payload_string(&hit.payload, "label")?,
		description: payload_string(&hit.payload, "description").unwrap_or_default(),
		score: hit.score,
		note_ids: vec![],
	})
}
