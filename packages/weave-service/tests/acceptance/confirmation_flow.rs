use weave_service::{ConfirmDeduplicationRequest, Error, NoteCreateRequest};
use weave_storage::{graph, models, vectors::VectorStore};

use super::{ARE_EMPTY, ARE_MILL, NAE_MILL, NAE_RED, SAME_72, ScriptedLlm};

fn mill_note() -> NoteCreateRequest {
	NoteCreateRequest {
		title: "Ambush at the Mill".to_string(),
		content: "Captain Vexa attacked Redfern Mill at dawn.".to_string(),
	}
}

fn red_note() -> NoteCreateRequest {
	NoteCreateRequest {
		title: "The Red Captain".to_string(),
		content: "Vexa the Red prowls the docks below Redfern Mill.".to_string(),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set WEAVE_PG_DSN and WEAVE_QDRANT_URL to run."]
async fn low_confidence_match_waits_for_confirmation_then_merges() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping low_confidence_match_waits_for_confirmation_then_merges; set WEAVE_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = super::test_qdrant_url() else {
		eprintln!("Skipping low_confidence_match_waits_for_confirmation_then_merges; set WEAVE_QDRANT_URL.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), qdrant_url, 900);
	let service = super::build_service(cfg, super::providers(ScriptedLlm::new(&[
		NAE_MILL, ARE_MILL, NAE_RED, ARE_EMPTY, SAME_72,
	])))
	.await;
	let campaign_uuid = super::create_campaign(&service, &test_db).await;

	let first = service.ingest_note(campaign_uuid, mill_note()).await.expect("First ingest failed.");
	let pending = service.ingest_note(campaign_uuid, red_note()).await.expect("Second ingest failed.");

	assert!(pending.requires_user_confirmation);
	assert_eq!(pending.proposals.len(), 1);

	let proposal = &pending.proposals[0];

	assert_eq!(proposal.existing_item_name, "Captain Vexa");
	assert_eq!(proposal.confidence, 72);
	assert!(!proposal.approved);

	// While the session is pending, nothing from the second note may exist
	// in the graph.
	let red = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Vexa the Red")
		.await
		.expect("Graph query failed.");

	assert!(red.is_none(), "Pending artifact must not be committed yet.");

	// Confirming against the wrong campaign is rejected and leaves the
	// session untouched.
	let other_campaign = weave_storage::campaigns::create_campaign(
		&service.db.pool,
		uuid::Uuid::new_v4(),
		"Other Campaign",
		&models::default_categories(),
		time::OffsetDateTime::now_utc(),
	)
	.await
	.expect("Failed to create the second campaign.");

	test_db.track_collection(VectorStore::collection_name(other_campaign.campaign_uuid));

	let mut approved = proposal.clone();

	approved.approved = true;

	let mismatch = service
		.confirm_deduplication(
			other_campaign.campaign_uuid,
			pending.note_id,
			ConfirmDeduplicationRequest { approved_merge_proposals: vec![approved.clone()] },
		)
		.await
		.expect_err("Expected a campaign mismatch rejection.");

	assert!(matches!(mismatch, Error::CampaignMismatch { .. }));

	let confirmed = service
		.confirm_deduplication(
			campaign_uuid,
			pending.note_id,
			ConfirmDeduplicationRequest { approved_merge_proposals: vec![approved] },
		)
		.await
		.expect("Confirmation failed.");

	assert_eq!(confirmed.merged_artifact_count, 1);
	assert_eq!(confirmed.artifact_count, 1);
	assert!(!confirmed.requires_user_confirmation);

	let vexa = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Captain Vexa")
		.await
		.expect("Graph query failed.")
		.expect("Captain Vexa missing from the graph.");

	// Survivor keeps the existing note order, with the new note appended.
	assert_eq!(vexa.note_ids, vec![first.note_id, pending.note_id]);

	let red = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Vexa the Red")
		.await
		.expect("Graph query failed.");

	assert!(red.is_none(), "Merged artifact must not appear as its own node.");

	// The session is gone after confirmation.
	let repeat = service
		.confirm_deduplication(
			campaign_uuid,
			pending.note_id,
			ConfirmDeduplicationRequest { approved_merge_proposals: vec![] },
		)
		.await
		.expect_err("Expected the session to be gone.");

	assert!(matches!(repeat, Error::SessionNotFound { .. }));

	test_db.cleanup().await.expect("Failed to clean up the test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set WEAVE_PG_DSN and WEAVE_QDRANT_URL to run."]
async fn rejected_proposal_creates_a_new_artifact() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping rejected_proposal_creates_a_new_artifact; set WEAVE_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = super::test_qdrant_url() else {
		eprintln!("Skipping rejected_proposal_creates_a_new_artifact; set WEAVE_QDRANT_URL.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), qdrant_url, 900);
	let service = super::build_service(cfg, super::providers(ScriptedLlm::new(&[
		NAE_MILL, ARE_MILL, NAE_RED, ARE_EMPTY, SAME_72,
	])))
	.await;
	let campaign_uuid = super::create_campaign(&service, &test_db).await;

	service.ingest_note(campaign_uuid, mill_note()).await.expect("First ingest failed.");

	let pending = service.ingest_note(campaign_uuid, red_note()).await.expect("Second ingest failed.");
	// Leaving the proposal unapproved inserts the pending item as new.
	let confirmed = service
		.confirm_deduplication(
			campaign_uuid,
			pending.note_id,
			ConfirmDeduplicationRequest { approved_merge_proposals: vec![] },
		)
		.await
		.expect("Confirmation failed.");

	assert_eq!(confirmed.merged_artifact_count, 0);
	assert_eq!(confirmed.artifact_count, 1);

	let red = graph::fetch_artifact_by_name(&service.db.pool, campaign_uuid, "Vexa the Red")
		.await
		.expect("Graph query failed.")
		.expect("Expected a new node for the rejected proposal.");

	assert_eq!(red.note_ids, vec![pending.note_id]);

	test_db.cleanup().await.expect("Failed to clean up the test database.");
}
