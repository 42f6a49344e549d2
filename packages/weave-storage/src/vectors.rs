use std::collections::HashMap;

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
		GetPointsBuilder, PointId, PointStruct, ScoredPoint, SearchPointsBuilder,
		UpsertPointsBuilder, Value, VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::Result;

pub struct SearchHit {
	pub id: Uuid,
	pub score: f32,
	pub payload: HashMap<String, Value>,
}

pub struct VectorStore {
	pub client: Qdrant,
	pub vector_dim: u32,
}
impl VectorStore {
	pub fn new(cfg: &weave_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, vector_dim: cfg.vector_dim })
	}

	/// One collection per campaign; scoping by collection replaces any
	/// campaign filter in queries.
	pub fn collection_name(campaign_uuid: Uuid) -> String {
		format!("campaign_{}", campaign_uuid.simple())
	}

	pub async fn ensure_collection(&self, collection: &str) -> Result<()> {
		if self.client.collection_exists(collection).await? {
			return Ok(());
		}

		self.client
			.create_collection(CreateCollectionBuilder::new(collection).vectors_config(
				VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
			))
			.await?;

		Ok(())
	}

	pub async fn upsert_point(
		&self,
		collection: &str,
		id: Uuid,
		vector: Vec<f32>,
		payload: Payload,
	) -> Result<()> {
		let point = PointStruct::new(id.to_string(), vector, payload);

		self.client
			.upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
			.await?;

		Ok(())
	}

	pub async fn search(
		&self,
		collection: &str,
		vector: Vec<f32>,
		point_type: &str,
		limit: u64,
	) -> Result<Vec<SearchHit>> {
		let filter = Filter::must([Condition::matches("type", point_type.to_string())]);
		let request =
			SearchPointsBuilder::new(collection, vector, limit).filter(filter).with_payload(true);
		let response = self.client.search_points(request).await?;

		Ok(response.result.into_iter().filter_map(scored_point_to_hit).collect())
	}

	pub async fn get_payload(
		&self,
		collection: &str,
		id: Uuid,
	) -> Result<Option<HashMap<String, Value>>> {
		let request = GetPointsBuilder::new(collection, vec![PointId::from(id.to_string())])
			.with_payload(true);
		let response = match self.client.get_points(request).await {
			Ok(response) => response,
			Err(err) if is_missing_error(&err) => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		let mut result = response.result;

		Ok(result.pop().map(|point| point.payload))
	}

	pub async fn delete_point(&self, collection: &str, id: Uuid) -> Result<()> {
		let request = DeletePointsBuilder::new(collection).points([id.to_string()]).wait(true);

		match self.client.delete_points(request).await {
			Ok(_) => Ok(()),
			Err(err) if is_missing_error(&err) => {
				tracing::info!(point_id = %id, collection, "Vector point missing during delete.");

				Ok(())
			},
			Err(err) => Err(err.into()),
		}
	}

	pub async fn delete_collection(&self, collection: &str) -> Result<()> {
		self.client.delete_collection(collection).await?;

		Ok(())
	}
}

fn scored_point_to_hit(point: ScoredPoint) -> Option<SearchHit> {
	let id = point.id.as_ref().and_then(point_id_to_uuid)?;

	Some(SearchHit { id, score: point.score, payload: point.payload })
}

pub fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Uuid::parse_str(text).ok(),
		_ => None,
	}
}

pub fn payload_rfc3339(payload: &HashMap<String, Value>, key: &str) -> Option<OffsetDateTime> {
	let text = payload_string(payload, key)?;

	OffsetDateTime::parse(text.as_str(), &Rfc3339).ok()
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
	ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

fn is_missing_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();

	message.contains("not found") || message.contains("doesn't exist") || message.contains("404")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn point_id_round_trips_through_uuid() {
		let id = Uuid::new_v4();
		let point_id = PointId::from(id.to_string());

		assert_eq!(point_id_to_uuid(&point_id), Some(id));
	}

	#[test]
	fn payload_helpers_read_typed_values() {
		let id = Uuid::new_v4();
		let mut payload = HashMap::new();

		payload.insert("name".to_string(), Value::from("Captain Vexa".to_string()));
		payload.insert("artifact_id".to_string(), Value::from(id.to_string()));
		payload.insert("created_at".to_string(), Value::from("2025-06-01T12:00:00Z".to_string()));

		assert_eq!(payload_string(&payload, "name").as_deref(), Some("Captain Vexa"));
		assert_eq!(payload_uuid(&payload, "artifact_id"), Some(id));
		assert!(payload_rfc3339(&payload, "created_at").is_some());
		assert_eq!(payload_string(&payload, "missing"), None);
	}
}
