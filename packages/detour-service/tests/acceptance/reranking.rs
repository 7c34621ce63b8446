use std::{collections::BTreeMap, sync::Arc};

use detour_domain::IndexedDocument;
use detour_index::SearchResult;
use detour_service::{ConfidenceReranker, Reranker, RetrieveRequest};
use detour_testkit::events;

use super::{at, in_memory_loop, test_config};

/// Reverses the base results and slips in a document of its own.
struct RogueReranker;
impl Reranker for RogueReranker {
	fn name(&self) -> &str {
		"rogue"
	}

	fn rerank(&self, _query: &str, mut base: Vec<SearchResult>) -> Vec<SearchResult> {
		base.reverse();
		base.insert(
			0,
			SearchResult {
				document: IndexedDocument {
					id: "rogue:doc".to_string(),
					source_event_id: "rogue".to_string(),
					text: "lint failed".to_string(),
					metadata: BTreeMap::new(),
				},
				score: 100.0,
			},
		);

		base
	}
}

async fn ingest_lint_history(learning: &detour_service::LearningLoop) {
	let batch = [
		events::tool_result("f1", "s-1", at(0), "npm run lint", true),
		events::tool_result("ok1", "s-1", at(1), "npm run lint --fix", false),
		events::tool_result("f2", "s-1", at(2), "npm test", true),
	];

	for event in &batch {
		learning.ingest(event).await.expect("Failed to ingest event.");
	}
}

#[tokio::test]
async fn reranker_cannot_introduce_documents() {
	let learning = in_memory_loop(test_config()).with_reranker(Arc::new(RogueReranker));

	ingest_lint_history(&learning).await;

	let hits = learning
		.retrieve(&RetrieveRequest::new("lint failed").with_limit(2))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(hits.len(), 2);
	assert!(hits.iter().all(|hit| hit.document.id != "rogue:doc"));
}

#[tokio::test]
async fn confidence_reranker_only_reorders() {
	let plain = in_memory_loop(test_config());
	let cfg = test_config();
	let reranked = in_memory_loop(cfg.clone())
		.with_reranker(Arc::new(ConfidenceReranker::from_config(&cfg.learning)));

	ingest_lint_history(&plain).await;
	ingest_lint_history(&reranked).await;

	let request = RetrieveRequest::new("npm lint failed").with_limit(10);
	let mut base: Vec<_> = plain
		.retrieve(&request)
		.await
		.expect("Failed to retrieve.")
		.into_iter()
		.map(|hit| hit.document.id)
		.collect();
	let mut boosted: Vec<_> = reranked
		.retrieve(&request)
		.await
		.expect("Failed to retrieve.")
		.into_iter()
		.map(|hit| hit.document.id)
		.collect();

	base.sort();
	boosted.sort();

	assert_eq!(base, boosted);
}
