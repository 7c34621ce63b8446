use std::sync::Arc;

use detour_service::RetrieveRequest;
use detour_storage::{EventStore, MemoryStore};
use detour_testkit::events;

use super::{at, loop_over, test_config};

#[tokio::test]
async fn second_bootstrap_replays_nothing() {
	let store = Arc::new(MemoryStore::new());

	store
		.append_many(&[
			events::tool_result("ok", "s-1", at(5), "npm run lint --fix", false),
			events::tool_result("fail", "s-1", at(1), "npm run lint", true),
			events::message("note", "s-1", at(3), "Lint keeps failing on unused imports."),
		])
		.await
		.expect("Failed to seed store.");

	let learning = loop_over(test_config(), store);
	let first = learning.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(first.event_count, 3);
	assert_eq!(first.document_count, 4);
	assert_eq!(first.artifact_count, 1);

	let second = learning.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(second.event_count, 0);
	assert_eq!(second.document_count, 0);
	assert_eq!(learning.artifacts(None).len(), 1);
}

#[tokio::test]
async fn bootstrap_restores_retrieval_after_restart() {
	let store = Arc::new(MemoryStore::new());
	let before = loop_over(test_config(), store.clone());

	before
		.ingest(&events::tool_result("fail", "s-1", at(0), "cargo build", true))
		.await
		.expect("Failed to ingest failure.");
	before
		.ingest(&events::tool_result("ok", "s-1", at(1), "cargo build --locked", false))
		.await
		.expect("Failed to ingest success.");

	let replay = before.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(replay.event_count, 0);

	drop(before);

	let after = loop_over(test_config(), store);

	assert!(
		after
			.retrieve(&RetrieveRequest::new("cargo build failed"))
			.await
			.expect("Failed to retrieve.")
			.is_empty()
	);

	let report = after.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(report.event_count, 2);
	assert_eq!(report.artifact_count, 1);

	let hits = after
		.retrieve(&RetrieveRequest::new("cargo build failed"))
		.await
		.expect("Failed to retrieve.");

	assert!(!hits.is_empty());
}
