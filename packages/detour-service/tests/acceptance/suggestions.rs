use std::collections::HashSet;

use detour_service::RetrieveRequest;
use detour_testkit::events;

use super::{at, in_memory_loop, test_config};

async fn seeded(cfg: detour_config::Config) -> detour_service::LearningLoop {
	let learning = in_memory_loop(cfg);
	let batch = [
		events::tool_result("f1", "s-1", at(0), "npm run lint", true),
		events::tool_result("ok1", "s-1", at(1), "npm run lint --fix", false),
		events::tool_call("call1", "s-1", at(2), "npm run lint --fix"),
		events::message("note1", "s-1", at(3), "The lint failed until the fix flag was used."),
	];

	for event in &batch {
		learning.ingest(event).await.expect("Failed to ingest event.");
	}

	learning
}

#[tokio::test]
async fn suggestions_cite_distinct_source_events() {
	let learning = seeded(test_config()).await;
	let suggestions = learning
		.suggest(&RetrieveRequest::new("npm lint failed fix").with_limit(10))
		.await
		.expect("Failed to suggest.");
	let mut sources = HashSet::new();

	assert!(!suggestions.is_empty());

	for suggestion in &suggestions {
		assert!(
			sources.insert(suggestion.source_event_id.clone()),
			"Duplicate source {}.",
			suggestion.source_event_id
		);
		assert!(suggestion.rationale.contains("Prior run used"));
		assert!(suggestion.playbook_markdown.contains("Evidence:"));

		let unique: HashSet<_> = suggestion.evidence_event_ids.iter().collect();

		assert_eq!(unique.len(), suggestion.evidence_event_ids.len());
	}
}

#[tokio::test]
async fn suggestions_below_the_floor_are_dropped() {
	let mut cfg = test_config();

	cfg.learning.min_confidence = 0.33;

	let learning = seeded(cfg).await;
	let suggestions = learning
		.suggest(&RetrieveRequest::new("npm lint failed fix").with_limit(10))
		.await
		.expect("Failed to suggest.");

	assert!(!suggestions.is_empty());
	assert!(suggestions.iter().all(|suggestion| suggestion.confidence >= 0.33));
	assert!(suggestions.iter().all(|suggestion| suggestion.kind == "wrong_turn"));

	let mut cfg = test_config();

	cfg.learning.min_confidence = 0.9;

	let strict = seeded(cfg).await;
	let suggestions = strict
		.suggest(&RetrieveRequest::new("npm lint failed fix").with_limit(10))
		.await
		.expect("Failed to suggest.");

	assert!(suggestions.is_empty());
}
