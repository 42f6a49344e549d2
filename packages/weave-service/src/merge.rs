use time::OffsetDateTime;
use uuid::Uuid;

use weave_domain::sanitise;
use weave_storage::{graph, models::Campaign, vectors::VectorStore};

use crate::{
	Error, Result, WeaveService, artifact_embed_text, relationship_embed_text,
	types::{NewArtifact, NewRelationship, artifact_payload, relationship_payload},
};

impl WeaveService {
	/// Merges a pending artifact into the survivor addressed by name. The
	/// graph write is the transaction; vector maintenance afterwards is best
	/// effort.
	pub(crate) async fn merge_artifact(
		&self,
		campaign: &Campaign,
		existing_name: &str,
		artifact: &NewArtifact,
		now: OffsetDateTime,
	) -> Result<Uuid> {
		let row = graph::NewArtifactRow {
			artifact_id: artifact.artifact_id,
			name: &artifact.name,
			artifact_type: &artifact.artifact_type,
			description: &artifact.description,
			note_ids: &artifact.note_ids,
		};
		let survivor_id = graph::merge_into_artifact(
			&self.db.pool,
			campaign.campaign_uuid,
			existing_name,
			&row,
			now,
		)
		.await?;
		let collection = VectorStore::collection_name(campaign.campaign_uuid);

		self.drop_obsolete_point(&collection, artifact.artifact_id).await;
		self.refresh_artifact_vector(campaign, &collection, survivor_id).await;

		Ok(survivor_id)
	}

	/// Same protocol for relationships; the survivor edge is addressed by
	/// the id the adjudicator matched, resolved to its
	/// `(source, label, target)` key.
	pub(crate) async fn merge_relationship(
		&self,
		campaign: &Campaign,
		existing_id: Uuid,
		relationship: &NewRelationship,
		now: OffsetDateTime,
	) -> Result<Uuid> {
		let existing =
			graph::fetch_relationship(&self.db.pool, campaign.campaign_uuid, existing_id).await?;
		let Some(existing) = existing else {
			return Err(Error::InvalidRequest {
				message: format!("Merge target relationship {existing_id} no longer exists."),
			});
		};
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
		let survivor_id = graph::merge_into_relationship(
			&self.db.pool,
			campaign.campaign_uuid,
			&existing.source_name,
			&existing.target_name,
			&existing.label,
			&row,
			now,
		)
		.await?;
		let collection = VectorStore::collection_name(campaign.campaign_uuid);

		self.drop_obsolete_point(&collection, relationship.relationship_id).await;
		self.refresh_relationship_vector(campaign, &collection, survivor_id).await;

		Ok(survivor_id)
	}

	async fn drop_obsolete_point(&self, collection: &str, point_id: Uuid) {
		if let Err(err) = self.vectors.delete_point(collection, point_id).await {
			tracing::warn!(point_id = %point_id, collection, error = %err, "Failed to delete an obsolete vector point.");
		}
	}

	/// Re-reads the survivor, re-embeds it, and upserts its vector point.
	/// Failures are logged, not propagated: the graph is the system of
	/// record and a reconciler can repair the vector side later.
	pub(crate) async fn refresh_artifact_vector(
		&self,
		campaign: &Campaign,
		collection: &str,
		artifact_id: Uuid,
	) {
		let record =
			match graph::fetch_artifact(&self.db.pool, campaign.campaign_uuid, artifact_id).await {
				Ok(Some(record)) => record,
				Ok(None) => {
					tracing::warn!(artifact_id = %artifact_id, "Artifact missing from the graph after write.");

					return;
				},
				Err(err) => {
					tracing::warn!(artifact_id = %artifact_id, error = %err, "Failed to re-read an artifact for vector refresh.");

					return;
				},
			};
		let text =
			artifact_embed_text(&record.name, &record.artifact_type, &record.description);
		let vector = match self.embed_one(&text).await {
			Ok((vector, _)) => vector,
			Err(err) => {
				tracing::warn!(artifact_id = %artifact_id, error = %err, "Failed to re-embed an artifact.");

				return;
			},
		};

		if let Err(err) = self
			.vectors
			.upsert_point(collection, artifact_id, vector, artifact_payload(&record))
			.await
		{
			tracing::warn!(artifact_id = %artifact_id, collection, error = %err, "Failed to upsert an artifact vector point.");
		}
	}

	pub(crate) async fn refresh_relationship_vector(
		&self,
		campaign: &Campaign,
		collection: &str,
		relationship_id: Uuid,
	) {
		let record = match graph::fetch_relationship(
			&self.db.pool,
			campaign.campaign_uuid,
			relationship_id,
		)
		.await
		{
			Ok(Some(record)) => record,
			Ok(None) => {
				tracing::warn!(relationship_id = %relationship_id, "Relationship missing from the graph after write.");

				return;
			},
			Err(err) => {
				tracing::warn!(relationship_id = %relationship_id, error = %err, "Failed to re-read a relationship for vector refresh.");

				return;
			},
		};
		let text = relationship_embed_text(
			&record.source_name,
			&record.label,
			&record.target_name,
			&record.description,
		);
		let vector = match self.embed_one(&text).await {
			Ok((vector, _)) => vector,
			Err(err) => {
				tracing::warn!(relationship_id = %relationship_id, error = %err, "Failed to re-embed a relationship.");

				return;
			},
		};

		if let Err(err) = self
			.vectors
			.upsert_point(collection, relationship_id, vector, relationship_payload(&record))
			.await
		{
			tracing::warn!(relationship_id = %relationship_id, collection, error = %err, "Failed to upsert a relationship vector point.");
		}
	}
}
