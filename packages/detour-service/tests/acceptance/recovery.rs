use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use detour_domain::IndexedDocument;
use detour_index::{BoxFuture, Error, LexicalIndex, Result, SearchIndex, SearchQuery, SearchResult};
use detour_service::{LearningLoop, RetrieveRequest};
use detour_storage::MemoryStore;
use detour_testkit::events;

use super::{at, test_config};

/// Lexical index whose writes fail while `offline` is set.
struct FlakyIndex {
	inner: LexicalIndex,
	offline: AtomicBool,
}
impl SearchIndex for FlakyIndex {
	fn name(&self) -> &str {
		"flaky"
	}

	fn upsert_many<'a>(&'a self, documents: &'a [IndexedDocument]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if self.offline.load(Ordering::SeqCst) {
				return Err(Error::Backend {
					backend: "flaky".to_string(),
					message: "offline".to_string(),
				});
			}

			self.inner.upsert_many(documents).await
		})
	}

	fn search<'a>(&'a self, query: &'a SearchQuery) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		self.inner.search(query)
	}
}

#[tokio::test]
async fn failed_index_write_leaves_the_arc_for_replay() {
	let cfg = test_config();
	let index = Arc::new(FlakyIndex {
		inner: LexicalIndex::new(&cfg.index),
		offline: AtomicBool::new(false),
	});
	let learning = LearningLoop::new(cfg, Arc::new(MemoryStore::new()), index.clone())
		.expect("Failed to build learning loop.");

	learning
		.ingest(&events::tool_result("f", "s", at(0), "npm run lint", true))
		.await
		.expect("Failed to ingest failure.");

	index.offline.store(true, Ordering::SeqCst);

	let result =
		learning.ingest(&events::tool_result("ok", "s", at(1), "npm run lint --fix", false)).await;

	assert!(result.is_err());
	assert!(learning.artifacts(None).is_empty());

	index.offline.store(false, Ordering::SeqCst);

	let report = learning.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(report.event_count, 1);
	assert_eq!(report.artifact_count, 1);

	let artifacts = learning.artifacts(None);

	assert_eq!(artifacts[0].support_count, 1);
	assert_eq!(artifacts[0].evidence_event_ids, vec!["f", "ok"]);

	let hits = learning
		.retrieve(&RetrieveRequest::new("npm lint failed").with_filter("kind", "wrong_turn"))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(hits.len(), 1);
}
