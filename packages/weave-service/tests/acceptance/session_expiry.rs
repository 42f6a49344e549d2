use std::time::Duration;

use tokio::time;

use weave_service::{ConfirmDeduplicationRequest, Error, NoteCreateRequest};

use super::{ARE_EMPTY, ARE_MILL, NAE_MILL, NAE_RED, SAME_72, ScriptedLlm};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set WEAVE_PG_DSN and WEAVE_QDRANT_URL to run."]
async fn expired_session_requires_reingest() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping expired_session_requires_reingest; set WEAVE_PG_DSN.");

		return;
	};
	let Some(qdrant_url) = super::test_qdrant_url() else {
		eprintln!("Skipping expired_session_requires_reingest; set WEAVE_QDRANT_URL.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), qdrant_url, 1);
	let service = super::build_service(cfg, super::providers(ScriptedLlm::new(&[
		NAE_MILL, ARE_MILL, NAE_RED, ARE_EMPTY, SAME_72, NAE_RED, ARE_EMPTY, SAME_72,
	])))
	.await;
	let campaign_uuid = super::create_campaign(&service, &test_db).await;

	service
		.ingest_note(campaign_uuid, NoteCreateRequest {
			title: "Ambush at the Mill".to_string(),
			content: "Captain Vexa attacked Redfern Mill at dawn.".to_string(),
		})
		.await
		.expect("First ingest failed.");

	let red_note = NoteCreateRequest {
		title: "The Red Captain".to_string(),
		content: "Vexa the Red prowls the docks below Redfern Mill.".to_string(),
	};
	let pending = service
		.ingest_note(campaign_uuid, red_note.clone())
		.await
		.expect("Second ingest failed.");

	assert!(pending.requires_user_confirmation);

	time::sleep(Duration::from_millis(1_200)).await;

	let expired = service
		.confirm_deduplication(
			campaign_uuid,
			pending.note_id,
			ConfirmDeduplicationRequest { approved_merge_proposals: vec![] },
		)
		.await
		.expect_err("Expected the session to have expired.");

	assert!(matches!(expired, Error::SessionNotFound { .. }));

	// Re-ingesting the same note reopens a session under the same
	// deterministic note id.
	let reopened =
		service.ingest_note(campaign_uuid, red_note).await.expect("Re-ingest failed.");

	assert_eq!(reopened.note_id, pending.note_id);
	assert!(reopened.requires_user_confirmation);
	assert_eq!(reopened.proposals.len(), 1);

	test_db.cleanup().await.expect("Failed to clean up the test database.");
}
