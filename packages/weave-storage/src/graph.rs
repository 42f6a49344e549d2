use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use weave_domain::classify::{merge_descriptions, union_note_ids};

use crate::{
	Error, Result,
	models::{ArtifactRecord, RelationshipRecord},
};

pub struct NewArtifactRow<'a> {
	pub artifact_id: Uuid,
	pub name: &'a str,
	pub artifact_type: &'a str,
	pub description: &'a str,
	pub note_ids: &'a [Uuid],
}

pub struct NewRelationshipRow<'a> {
	pub relationship_id: Uuid,
	pub source_name: &'a str,
	pub target_name: &'a str,
	pub label: &'a str,
	pub edge_type: &'a str,
	pub description: &'a str,
	pub reasoning: &'a str,
	pub note_ids: &'a [Uuid],
}

/// Upsert keyed by `(campaign_uuid, name)`: merges `note_ids` as an ordered
/// set, overwrites type and description, preserves `created_at`.
pub async fn upsert_artifact(
	pool: &PgPool,
	campaign_uuid: Uuid,
	node_label: &str,
	artifact: &NewArtifactRow<'_>,
	now: OffsetDateTime,
) -> Result<Uuid> {
	if artifact.name.trim().is_empty() {
		return Err(Error::InvalidArgument("Artifact name must be non-empty.".to_string()));
	}

	let mut tx = pool.begin().await?;
	let existing: Option<(Uuid, Vec<Uuid>)> = sqlx::query_as(
		"\
SELECT artifact_id, note_ids
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND name = $2
FOR UPDATE",
	)
	.bind(campaign_uuid)
	.bind(artifact.name)
	.fetch_optional(&mut *tx)
	.await?;
	let artifact_id = match existing {
		Some((artifact_id, note_ids)) => {
			let merged_ids = union_note_ids(&note_ids, artifact.note_ids);

			sqlx::query(
				"\
UPDATE graph_artifacts
SET
	artifact_type = $1,
	description = $2,
	note_ids = $3,
	updated_at = $4
WHERE artifact_id = $5",
			)
			.bind(artifact.artifact_type)
			.bind(artifact.description)
			.bind(&merged_ids)
			.bind(now)
			.bind(artifact_id)
			.execute(&mut *tx)
			.await?;

			artifact_id
		},
		None => {
			sqlx::query(
				"\
INSERT INTO graph_artifacts (
	artifact_id,
	campaign_uuid,
	node_label,
	name,
	artifact_type,
	description,
	note_ids,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
			)
			.bind(artifact.artifact_id)
			.bind(campaign_uuid)
			.bind(node_label)
			.bind(artifact.name)
			.bind(artifact.artifact_type)
			.bind(artifact.description)
			.bind(artifact.note_ids)
			.bind(now)
			.execute(&mut *tx)
			.await?;

			artifact.artifact_id
		},
	};

	tx.commit().await?;

	Ok(artifact_id)
}

/// Upsert keyed by `(campaign_uuid, source_name, label, target_name)`. Both
/// endpoints must exist as artifacts in the campaign; a missing endpoint
/// makes the call a no-op and returns `None`.
pub async fn upsert_relationship(
	pool: &PgPool,
	campaign_uuid: Uuid,
	rel: &NewRelationshipRow<'_>,
	now: OffsetDateTime,
) -> Result<Option<Uuid>> {
	if rel.source_name == rel.target_name {
		return Err(Error::InvalidArgument(
			"Relationship endpoints must be distinct.".to_string(),
		));
	}

	let mut tx = pool.begin().await?;
	let endpoints: Vec<(String,)> = sqlx::query_as(
		"\
SELECT name
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND name = ANY($2)",
	)
	.bind(campaign_uuid)
	.bind(vec![rel.source_name.to_string(), rel.target_name.to_string()])
	.fetch_all(&mut *tx)
	.await?;

	if endpoints.len() < 2 {
		tx.commit().await?;

		return Ok(None);
	}

	let existing: Option<(Uuid, Vec<Uuid>)> = sqlx::query_as(
		"\
SELECT relationship_id, note_ids
FROM graph_relationships
WHERE campaign_uuid = $1
	AND source_name = $2
	AND label = $3
	AND target_name = $4
FOR UPDATE",
	)
	.bind(campaign_uuid)
	.bind(rel.source_name)
	.bind(rel.label)
	.bind(rel.target_name)
	.fetch_optional(&mut *tx)
	.await?;
	let relationship_id = match existing {
		Some((relationship_id, note_ids)) => {
			let merged_ids = union_note_ids(&note_ids, rel.note_ids);

			sqlx::query(
				"\
UPDATE graph_relationships
SET
	description = $1,
	reasoning = $2,
	note_ids = $3,
	updated_at = $4
WHERE relationship_id = $5",
			)
			.bind(rel.description)
			.bind(rel.reasoning)
			.bind(&merged_ids)
			.bind(now)
			.bind(relationship_id)
			.execute(&mut *tx)
			.await?;

			relationship_id
		},
		None => {
			sqlx::query(
				"\
INSERT INTO graph_relationships (
	relationship_id,
	campaign_uuid,
	source_name,
	target_name,
	label,
	edge_type,
	description,
	reasoning,
	note_ids,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)",
			)
			.bind(rel.relationship_id)
			.bind(campaign_uuid)
			.bind(rel.source_name)
			.bind(rel.target_name)
			.bind(rel.label)
			.bind(rel.edge_type)
			.bind(rel.description)
			.bind(rel.reasoning)
			.bind(rel.note_ids)
			.bind(now)
			.execute(&mut *tx)
			.await?;

			rel.relationship_id
		},
	};

	tx.commit().await?;

	Ok(Some(relationship_id))
}

/// Merges a pending artifact into the survivor addressed by name: `note_ids`
/// union keeps the existing order first, the description follows the `" | "`
/// rule. Returns the survivor's id.
pub async fn merge_into_artifact(
	pool: &PgPool,
	campaign_uuid: Uuid,
	existing_name: &str,
	new: &NewArtifactRow<'_>,
	now: OffsetDateTime,
) -> Result<Uuid> {
	let mut tx = pool.begin().await?;
	let existing: Option<(Uuid, String, Vec<Uuid>)> = sqlx::query_as(
		"\
SELECT artifact_id, description, note_ids
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND name = $2
FOR UPDATE",
	)
	.bind(campaign_uuid)
	.bind(existing_name)
	.fetch_optional(&mut *tx)
	.await?;
	let Some((artifact_id, description, note_ids)) = existing else {
		return Err(Error::NotFound(format!(
			"Merge target artifact not found; campaign_uuid={campaign_uuid} name={existing_name}"
		)));
	};
	let merged_ids = union_note_ids(&note_ids, new.note_ids);
	let merged_description = merge_descriptions(&description, new.description);

	sqlx::query(
		"\
UPDATE graph_artifacts
SET
	description = $1,
	note_ids = $2,
	updated_at = $3
WHERE artifact_id = $4",
	)
	.bind(&merged_description)
	.bind(&merged_ids)
	.bind(now)
	.bind(artifact_id)
	.execute(&mut *tx)
	.await?;
	tx.commit().await?;

	Ok(artifact_id)
}

/// Same protocol as the artifact merge, keyed by the edge triple.
pub async fn merge_into_relationship(
	pool: &PgPool,
	campaign_uuid: Uuid,
	source_name: &str,
	target_name: &str,
	label: &str,
	new: &NewRelationshipRow<'_>,
	now: OffsetDateTime,
) -> Result<Uuid> {
	let mut tx = pool.begin().await?;
	let existing: Option<(Uuid, String, String, Vec<Uuid>)> = sqlx::query_as(
		"\
SELECT relationship_id, description, reasoning, note_ids
FROM graph_relationships
WHERE campaign_uuid = $1
	AND source_name = $2
	AND label = $3
	AND target_name = $4
FOR UPDATE",
	)
	.bind(campaign_uuid)
	.bind(source_name)
	.bind(label)
	.bind(target_name)
	.fetch_optional(&mut *tx)
	.await?;
	let Some((relationship_id, description, reasoning, note_ids)) = existing else {
		return Err(Error::NotFound(format!(
			"Merge target relationship not found; campaign_uuid={campaign_uuid} source={source_name} label={label} target={target_name}"
		)));
	};
	let merged_ids = union_note_ids(&note_ids, new.note_ids);
	let merged_description = merge_descriptions(&description, new.description);
	let merged_reasoning = merge_descriptions(&reasoning, new.reasoning);

	sqlx::query(
		"\
UPDATE graph_relationships
SET
	description = $1,
	reasoning = $2,
	note_ids = $3,
	updated_at = $4
WHERE relationship_id = $5",
	)
	.bind(&merged_description)
	.bind(&merged_reasoning)
	.bind(&merged_ids)
	.bind(now)
	.bind(relationship_id)
	.execute(&mut *tx)
	.await?;
	tx.commit().await?;

	Ok(relationship_id)
}

pub async fn fetch_artifact(
	pool: &PgPool,
	campaign_uuid: Uuid,
	artifact_id: Uuid,
) -> Result<Option<ArtifactRecord>> {
	let row = sqlx::query_as::<_, ArtifactRecord>(
		"\
SELECT *
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND artifact_id = $2",
	)
	.bind(campaign_uuid)
	.bind(artifact_id)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

pub async fn fetch_artifact_by_name(
	pool: &PgPool,
	campaign_uuid: Uuid,
	name: &str,
) -> Result<Option<ArtifactRecord>> {
	let row = sqlx::query_as::<_, ArtifactRecord>(
		"\
SELECT *
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND name = $2",
	)
	.bind(campaign_uuid)
	.bind(name)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

pub async fn fetch_relationship(
	pool: &PgPool,
	campaign_uuid: Uuid,
	relationship_id: Uuid,
) -> Result<Option<RelationshipRecord>> {
	let row = sqlx::query_as::<_, RelationshipRecord>(
		"\
SELECT *
FROM graph_relationships
WHERE campaign_uuid = $1
	AND relationship_id = $2",
	)
	.bind(campaign_uuid)
	.bind(relationship_id)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

/// Backing notes for an artifact, in stored order. A missing row yields an
/// empty list: the caller may hold a vector point whose graph row is gone.
pub async fn artifact_note_ids(
	pool: &PgPool,
	campaign_uuid: Uuid,
	artifact_id: Uuid,
) -> Result<Vec<Uuid>> {
	let row: Option<(Vec<Uuid>,)> = sqlx::query_as(
		"\
SELECT note_ids
FROM graph_artifacts
WHERE campaign_uuid = $1
	AND artifact_id = $2",
	)
	.bind(campaign_uuid)
	.bind(artifact_id)
	.fetch_optional(pool)
	.await?;

	Ok(row.map(|(note_ids,)| note_ids).unwrap_or_default())
}

pub async fn relationship_note_ids(
	pool: &PgPool,
	campaign_uuid: Uuid,
	relationship_id: Uuid,
) -> Result<Vec<Uuid>> {
	let row: Option<(Vec<Uuid>,)> = sqlx::query_as(
		"\
SELECT note_ids
FROM graph_relationships
WHERE campaign_uuid = $1
	AND relationship_id = $2",
	)
	.bind(campaign_uuid)
	.bind(relationship_id)
	.fetch_optional(pool)
	.await?;

	Ok(row.map(|(note_ids,)| note_ids).unwrap_or_default())
}

pub async fn delete_campaign_graph(pool: &PgPool, campaign_uuid: Uuid) -> Result<()> {
	let mut tx = pool.begin().await?;

	sqlx::query("DELETE FROM graph_relationships WHERE campaign_uuid = $1")
		.bind(campaign_uuid)
		.execute(&mut *tx)
		.await?;
	sqlx::query("DELETE FROM graph_artifacts WHERE campaign_uuid = $1")
		.bind(campaign_uuid)
		.execute(&mut *tx)
		.await?;
	tx.commit().await?;

	Ok(())
}
