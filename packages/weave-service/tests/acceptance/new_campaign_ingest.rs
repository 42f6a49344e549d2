use weave_service::NoteCreateRequest;
use weave_storage::{graph, vectors::VectorStore};

use super::{ARE_MILL, NAE_MILL, ScriptedLlm};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set WEAVE_PG_DSN and WEAVE_QDRANT_URL to run."]
async fn new_campaign_ingests_artifacts_and_relationships() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping new_campaign_ingests_artifacts_and_relationships; set WEAVE_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = super::test_qdrant_url() else {
		eprintln!("Skipping new_campaign_ingests_artifacts_and_relationships; set WEAVE_QDRANT_URL.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), qdrant_url, 900);
	let service = super::build_service(cfg, super::providers(ScriptedLlm::new(&[
		NAE_MILL, ARE_MILL,
	])))
	.await;
	let campaign_uuid = super::create_campaign(&service, &test_db).await;

	let response = service
		.ingest_note(campaign_uuid, NoteCreateRequest {
			title: "Ambush at the Mill".to_string(),
			content: "Captain Vexa attacked Redfern Mill at dawn.".to_string(),
		})
		.await
		.expect("Ingest failed.");

	assert!(response.success);
	assert_eq!(response.artifact_count, 2);
	assert_eq!(response.relationship_count, 1);
	assert_eq!(response.merged_artifact_count, 0);
	assert_eq!(response.merged_relationship_count, 0);
	assert!(!response.requires_user_confirmation);
	assert!(response.proposals.is_empty());

	let vexa = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Captain Vexa")
		.await
		.expect("Graph query failed.")
		.expect("Captain Vexa missing from the graph.");

	assert_eq!(vexa.artifact_type, "characters");
	assert_eq!(vexa.note_ids, vec![response.note_id]);
	assert_eq!(vexa.node_label, "Testfall_Campaign_Artifact");

	let edge: (String, Vec<uuid::Uuid>) = sqlx::query_as(
		"SELECT edge_type, note_ids FROM graph_relationships WHERE campaign_uuid = $1",
	)
	.bind(campaign_uuid)
	.fetch_one(&service.db.pool)
	.await
	.expect("Relationship row missing.");

	assert_eq!(edge.0, "ATTACKED");
	assert_eq!(edge.1, vec![response.note_id]);

	let collection = VectorStore::collection_name(campaign_uuid);
	let note_point = service
		.vectors
		.get_payload(&collection, response.note_id)
		.await
		.expect("Qdrant query failed.");

	assert!(note_point.is_some(), "Expected the note's own vector point.");

	let vexa_point = service
		.vectors
		.get_payload(&collection, vexa.artifact_id)
		.await
		.expect("Qdrant query failed.");

	assert!(vexa_point.is_some(), "Expected an artifact vector point.");

	test_db.cleanup().await.expect("Failed to clean up the test database.");
}
