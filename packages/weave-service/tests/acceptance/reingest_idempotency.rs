use weave_service::NoteCreateRequest;
use weave_storage::graph;

use super::{ARE_MILL, NAE_MILL, SAME_95, ScriptedLlm};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set WEAVE_PG_DSN and WEAVE_QDRANT_URL to run."]
async fn exact_reingest_auto_merges_without_duplicates() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping exact_reingest_auto_merges_without_duplicates; set WEAVE_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = super::test_qdrant_url() else {
		eprintln!("Skipping exact_reingest_auto_merges_without_duplicates; set WEAVE_QDRANT_URL.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), qdrant_url, 900);
	// First ingest consumes the first two responses; the re-ingest replays
	// extraction and every adjudication reads the trailing SAME_95.
	let service = super::build_service(cfg, super::providers(ScriptedLlm::new(&[
		NAE_MILL, ARE_MILL, NAE_MILL, ARE_MILL, SAME_95,
	])))
	.await;
	let campaign_uuid = super::create_campaign(&service, &test_db).await;
	let request = NoteCreateRequest {
		title: "Ambush at the Mill".to_string(),
		content: "Captain Vexa attacked Redfern Mill at dawn.".to_string(),
	};

	let first = service.ingest_note(campaign_uuid, request.clone()).await.expect("First ingest failed.");
	let second =
		service.ingest_note(campaign_uuid, request).await.expect("Second ingest failed.");

	assert_eq!(second.note_id, first.note_id, "Deterministic note id changed between ingests.");
	assert_eq!(second.artifact_count, 2);
	assert_eq!(second.relationship_count, 1);
	assert_eq!(second.merged_artifact_count, 2);
	assert_eq!(second.merged_relationship_count, 1);
	assert!(!second.requires_user_confirmation);

	let artifact_rows: Vec<(String, Vec<uuid::Uuid>)> = sqlx::query_as(
		"SELECT name, note_ids FROM graph_artifacts WHERE campaign_uuid = $1 ORDER BY name",
	)
	.bind(campaign_uuid)
	.fetch_all(&service.db.pool)
	.await
	.expect("Graph query failed.");

	assert_eq!(artifact_rows.len(), 2, "Re-ingest must not duplicate artifacts.");

	for (name, note_ids) in &artifact_rows {
		assert_eq!(
			note_ids,
			&vec![first.note_id],
			"note_ids for {name} must contain the note id exactly once."
		);
	}

	let relationship_count: (i64,) =
		sqlx::query_as("SELECT COUNT(*) FROM graph_relationships WHERE campaign_uuid = $1")
			.bind(campaign_uuid)
			.fetch_one(&service.db.pool)
			.await
			.expect("Graph query failed.");

	assert_eq!(relationship_count.0, 1);

	let vexa = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Captain Vexa")
		.await
		.expect("Graph query failed.")
		.expect("Captain Vexa missing from the graph.");

	assert_eq!(
		vexa.description, "A pirate captain.",
		"Merging identical descriptions must not double them."
	);

	test_db.cleanup().await.expect("Failed to clean up the test database.");
}
