use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use weave_domain::sanitise;

use crate::{
	Error, Result,
	models::{Campaign, CampaignCategory},
};

pub async fn fetch_campaign(pool: &PgPool, campaign_uuid: Uuid) -> Result<Option<Campaign>> {
	let row = sqlx::query_as::<_, Campaign>(
		"\
SELECT
	campaign_uuid,
	name,
	label_prefix,
	categories,
	created_at,
	updated_at
FROM campaigns
WHERE campaign_uuid = $1",
	)
	.bind(campaign_uuid)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

pub async fn create_campaign(
	pool: &PgPool,
	campaign_uuid: Uuid,
	name: &str,
	categories: &[CampaignCategory],
	now: OffsetDateTime,
) -> Result<Campaign> {
	let name = name.trim();

	if name.is_empty() {
		return Err(Error::InvalidArgument("Campaign name must be non-empty.".to_string()));
	}

	let label_prefix = sanitise::label_prefix(name);
	let categories = serde_json::to_value(categories)
		.map_err(|err| Error::InvalidArgument(format!("Invalid campaign categories: {err}.")))?;
	let row = sqlx::query_as::<_, Campaign>(
		"\
INSERT INTO campaigns (
	campaign_uuid,
	name,
	label_prefix,
	categories,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $5)
ON CONFLICT (campaign_uuid)
DO UPDATE
SET
	name = EXCLUDED.name,
	label_prefix = EXCLUDED.label_prefix,
	categories = EXCLUDED.categories,
	updated_at = EXCLUDED.updated_at
RETURNING
	campaign_uuid,
	name,
	label_prefix,
	categories,
	created_at,
	updated_at",
	)
	.bind(campaign_uuid)
	.bind(name)
	.bind(&label_prefix)
	.bind(&categories)
	.bind(now)
	.fetch_one(pool)
	.await?;

	Ok(row)
}

/// Deletes the campaign's metadata row and its whole subgraph. The campaign's
/// vector collection is dropped by the caller.
pub async fn delete_campaign(pool: &PgPool, campaign_uuid: Uuid) -> Result<()> {
	let mut tx = pool.begin().await?;

	sqlx::query("DELETE FROM graph_relationships WHERE campaign_uuid = $1")
		.bind(campaign_uuid)
		.execute(&mut *tx)
		.await?;
	sqlx::query("DELETE FROM graph_artifacts WHERE campaign_uuid = $1")
		.bind(campaign_uuid)
		.execute(&mut *tx)
		.await?;
	sqlx::query("DELETE FROM campaigns WHERE campaign_uuid = $1")
		.bind(campaign_uuid)
		.execute(&mut *tx)
		.await?;
	tx.commit().await?;

	Ok(())
}
