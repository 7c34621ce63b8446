use detour_domain::EventPayload;
use detour_service::{LearningLoop, RetrieveRequest};
use detour_storage::{EventFilter, EventStore};
use detour_testkit::events;

use super::{at, in_memory_loop, test_config};

#[tokio::test]
async fn lint_fix_is_retrieved_and_suggested() {
	let learning = in_memory_loop(test_config());
	let failure = events::command_result(
		"evt-lint-fail",
		"s-1",
		at(0),
		"npm run lint",
		true,
		"src/app.ts\n  3:7  error  'unused' is assigned a value but never used  no-unused-vars\n\n1 problem",
	);
	let fix = events::command_result("evt-lint-fix", "s-1", at(2), "npm run lint --fix", false, "");

	learning.ingest(&failure).await.expect("Failed to ingest failure.");

	let report = learning.ingest(&fix).await.expect("Failed to ingest fix.");
	let artifact = report.artifact.expect("The fix must complete a wrong turn.");

	assert!(report.artifact_created);
	assert_eq!(artifact.evidence_event_ids, vec!["evt-lint-fail", "evt-lint-fix"]);
	assert_eq!(artifact.kind, "wrong_turn_fix");

	let hits = learning
		.retrieve(&RetrieveRequest::new("lint failed"))
		.await
		.expect("Failed to retrieve.");

	assert!(!hits.is_empty());

	let suggestions = learning
		.suggest(&RetrieveRequest::new("lint failed"))
		.await
		.expect("Failed to suggest.");

	assert!(!suggestions.is_empty());
	assert!(suggestions.iter().all(|suggestion| suggestion.rationale.contains("Prior run used")));

	let wrong_turn = suggestions
		.iter()
		.find(|suggestion| suggestion.kind == "wrong_turn")
		.expect("The wrong-turn document must be suggested.");

	assert!(wrong_turn.playbook_markdown.contains("Run `npm run lint --fix` instead."));
	assert_eq!(wrong_turn.evidence_event_ids, vec!["evt-lint-fail", "evt-lint-fix"]);
}

#[tokio::test]
async fn unsafe_session_ids_are_rejected_before_storing() {
	let learning = in_memory_loop(test_config());
	let event = events::tool_result("evt-1", "../escape", at(0), "ls", true);

	assert!(learning.ingest(&event).await.is_err());

	let stored = learning
		.store()
		.query(&EventFilter::all())
		.await
		.expect("Failed to query store.");

	assert!(stored.is_empty());
}

#[tokio::test]
async fn invalid_fusion_weight_fails_construction() {
	let mut cfg = test_config();

	cfg.fusion.primary_weight = 0.0;

	assert!(LearningLoop::in_memory(cfg).is_err());
}

#[tokio::test]
async fn unstructured_events_are_stored_but_not_indexed() {
	let learning = in_memory_loop(test_config());
	let event = events::event(
		"evt-raw",
		"s-1",
		at(0),
		EventPayload::Unstructured {
			event_type: "heartbeat".to_string(),
			payload: serde_json::json!({ "beat": 1 }),
		},
	);
	let report = learning.ingest(&event).await.expect("Unstructured events must be accepted.");

	assert_eq!(report.document_count, 0);
	assert!(report.artifact.is_none());
}
