use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Campaign {
	pub campaign_uuid: Uuid,
	pub name: String,
	pub label_prefix: String,
	pub categories: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Campaign {
	/// Artifacts of this campaign live under the node label
	/// `<label_prefix>_Artifact`.
	pub fn node_label(&self) -> String {
		format!("{}_Artifact", self.label_prefix)
	}

	pub fn category_list(&self) -> Vec<CampaignCategory> {
		serde_json::from_value::<Vec<CampaignCategory>>(self.categories.clone())
			.ok()
			.filter(|categories| !categories.is_empty())
			.unwrap_or_else(default_categories)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignCategory {
	pub name: String,
	pub description: String,
}

pub fn default_categories() -> Vec<CampaignCategory> {
	[
		("characters", "People and creatures with narrative agency."),
		("locations", "Places the story visits or references."),
		("items", "Objects of narrative significance."),
		("events", "Happenings that shape the campaign."),
	]
	.into_iter()
	.map(|(name, description)| CampaignCategory {
		name: name.to_string(),
		description: description.to_string(),
	})
	.collect()
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ArtifactRecord {
	pub artifact_id: Uuid,
	pub campaign_uuid: Uuid,
	pub node_label: String,
	pub name: String,
	pub artifact_type: String,
	pub description: String,
	pub note_ids: Vec<Uuid>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct RelationshipRecord {
	pub relationship_id: Uuid,
	pub campaign_uuid: Uuid,
	pub source_name: String,
	pub target_name: String,
	pub label: String,
	pub edge_type: String,
	pub description: String,
	pub reasoning: String,
	pub note_ids: Vec<Uuid>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn falls_back_to_default_categories() {
		let campaign = Campaign {
			campaign_uuid: Uuid::new_v4(),
			name: "Test".to_string(),
			label_prefix: "Test".to_string(),
			categories: serde_json::json!([]),
			created_at: OffsetDateTime::UNIX_EPOCH,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		};
		let categories = campaign.category_list();

		assert_eq!(categories.len(), 4);
		assert_eq!(categories[0].name, "characters");
	}

	#[test]
	fn node_label_carries_the_campaign_prefix() {
		let campaign = Campaign {
			campaign_uuid: Uuid::new_v4(),
			name: "Curse of Strahd".to_string(),
			label_prefix: "Curse_of_Strahd".to_string(),
			categories: serde_json::json!([]),
			created_at: OffsetDateTime::UNIX_EPOCH,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		};

		assert_eq!(campaign.node_label(), "Curse_of_Strahd_Artifact");
	}
}
