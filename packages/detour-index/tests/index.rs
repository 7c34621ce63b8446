use std::{collections::BTreeMap, sync::Arc};

use proptest::prelude::*;

use detour_domain::IndexedDocument;
use detour_index::{
	BoxFuture, CompositeIndex, Error, LexicalIndex, Result, SearchIndex, SearchQuery, SearchResult,
	composite::fuse_reciprocal_rank,
};

fn doc(id: &str, text: &str) -> IndexedDocument {
	IndexedDocument {
		id: id.to_string(),
		source_event_id: id.to_string(),
		text: text.to_string(),
		metadata: BTreeMap::new(),
	}
}

fn doc_with(id: &str, text: &str, key: &str, value: &str) -> IndexedDocument {
	let mut document = doc(id, text);

	document.metadata.insert(key.to_string(), value.to_string());

	document
}

fn hit(id: &str) -> SearchResult {
	SearchResult { document: doc(id, id), score: 1.0 }
}

fn lexical() -> LexicalIndex {
	LexicalIndex::new(&detour_config::Index::default())
}

fn ids(hits: &[SearchResult]) -> Vec<&str> {
	hits.iter().map(|hit| hit.document.id.as_str()).collect()
}

struct FailingIndex;
impl SearchIndex for FailingIndex {
	fn name(&self) -> &str {
		"failing"
	}

	fn upsert_many<'a>(&'a self, _: &'a [IndexedDocument]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async {
			Err(Error::Backend { backend: "failing".to_string(), message: "offline".to_string() })
		})
	}

	fn search<'a>(&'a self, _: &'a SearchQuery) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

#[tokio::test]
async fn upsert_replaces_by_id() {
	let index = lexical();

	index.upsert(&doc("a", "npm run lint failed")).await.expect("Upsert must succeed.");
	index.upsert(&doc("a", "cargo build passed")).await.expect("Upsert must succeed.");

	assert_eq!(index.len(), 1);
	assert!(index.search(&SearchQuery::new("lint", 5)).await.expect("Search must succeed.").is_empty());
}

#[tokio::test]
async fn empty_and_stopword_queries_return_nothing() {
	let index = lexical();

	index.upsert(&doc("a", "the lint step")).await.expect("Upsert must succeed.");

	for text in ["", "   ", "the and of", "!!"] {
		let hits = index.search(&SearchQuery::new(text, 5)).await.expect("Search must succeed.");

		assert!(hits.is_empty(), "Query {text:?} must return nothing.");
	}
}

#[tokio::test]
async fn filters_apply_before_scoring() {
	let index = lexical();

	index
		.upsert_many(&[
			doc_with("a", "lint failed lint failed", "session_id", "s-1"),
			doc_with("b", "lint failed", "session_id", "s-2"),
		])
		.await
		.expect("Upsert must succeed.");

	let query = SearchQuery::new("lint failed", 5).with_filter("session_id", "s-2");
	let hits = index.search(&query).await.expect("Search must succeed.");

	assert_eq!(ids(&hits), vec!["b"]);
}

#[tokio::test]
async fn fuller_match_beats_term_repetition() {
	let index = lexical();

	index
		.upsert_many(&[
			doc("repeat", "lint lint lint lint lint lint lint lint output noise noise"),
			doc("full", "lint failed"),
		])
		.await
		.expect("Upsert must succeed.");

	let hits =
		index.search(&SearchQuery::new("lint failed", 5)).await.expect("Search must succeed.");

	assert_eq!(ids(&hits), vec!["full", "repeat"]);
}

#[test]
fn equal_scores_keep_insertion_order() {
	let index = lexical();

	index.insert_documents(&[doc("z", "lint"), doc("a", "lint"), doc("m", "lint")]);

	let hits = index.search_sync(&SearchQuery::new("lint", 5));

	assert_eq!(ids(&hits), vec!["z", "a", "m"]);
}

#[test]
fn query_cap_keeps_later_terms() {
	let cfg = detour_config::Index { max_query_terms: 1, ..Default::default() };
	let index = LexicalIndex::new(&cfg);

	index.insert_documents(&[doc("early", "cargo"), doc("late", "release")]);

	let hits = index.search_sync(&SearchQuery::new("cargo release", 5));

	assert_eq!(ids(&hits), vec!["late"]);
}

#[test]
fn composite_rejects_invalid_weights() {
	let primary: Arc<dyn SearchIndex> = Arc::new(lexical());

	for weight in [0.0, -1.0, f32::NAN, f32::INFINITY] {
		let fusion = detour_config::Fusion { secondary_weight: weight, ..Default::default() };
		let result = CompositeIndex::with_secondary(primary.clone(), Arc::new(lexical()), &fusion);

		assert!(matches!(result, Err(Error::Config { .. })), "Weight {weight} must be rejected.");
	}

	let fusion = detour_config::Fusion { primary_weight: 0.0, ..Default::default() };

	assert!(CompositeIndex::new(primary.clone(), &fusion).is_err());

	let fusion = detour_config::Fusion { k: -1.0, ..Default::default() };

	assert!(CompositeIndex::new(primary, &fusion).is_err());
}

#[tokio::test]
async fn composite_without_secondary_is_a_passthrough() {
	let primary = Arc::new(lexical());
	let composite =
		CompositeIndex::new(primary.clone(), &detour_config::Fusion::default()).expect("Valid.");

	composite
		.upsert_many(&[doc("a", "lint failed"), doc("b", "lint")])
		.await
		.expect("Upsert must succeed.");

	let query = SearchQuery::new("lint failed", 5);
	let direct = primary.search(&query).await.expect("Search must succeed.");
	let fused = composite.search(&query).await.expect("Search must succeed.");

	assert_eq!(ids(&direct), ids(&fused));
	assert_eq!(direct[0].score, fused[0].score);
}

#[tokio::test]
async fn composite_write_failure_propagates() {
	let composite = CompositeIndex::with_secondary(
		Arc::new(lexical()),
		Arc::new(FailingIndex),
		&detour_config::Fusion::default(),
	)
	.expect("Valid.");
	let result = composite.upsert(&doc("a", "lint")).await;

	assert!(matches!(result, Err(Error::Backend { .. })));
}

#[test]
fn shared_top_hit_stays_first_with_equal_weights() {
	let primary = vec![hit("top"), hit("p2"), hit("p3")];
	let secondary = vec![hit("top"), hit("s2")];
	let fused = fuse_reciprocal_rank(&[(primary, 1.0), (secondary, 1.0)], 0.0, 10);

	assert_eq!(fused[0].document.id, "top");
	assert!((fused[0].score - 2.0).abs() < f32::EPSILON);
}

#[test]
fn fused_ties_break_by_primary_rank() {
	let primary = vec![hit("a"), hit("b")];
	let secondary = vec![hit("b"), hit("a")];
	let fused = fuse_reciprocal_rank(&[(primary, 1.0), (secondary, 1.0)], 60.0, 10);

	assert_eq!(ids(&fused), vec!["a", "b"]);
}

proptest! {
	#[test]
	fn lexical_hits_are_sorted_and_matching(
		texts in prop::collection::vec("(lint|build|failed|passed|cargo|npm)( (lint|build|failed|passed|cargo|npm)){0,6}", 1..12),
		query in "(lint|build|failed|cargo)( (lint|build|failed|cargo)){0,2}",
	) {
		let index = lexical();
		let docs: Vec<_> = texts
			.iter()
			.enumerate()
			.map(|(idx, text)| doc(&format!("d{idx}"), text))
			.collect();

		index.insert_documents(&docs);

		let hits = index.search_sync(&SearchQuery::new(query.clone(), docs.len()));
		let query_terms: Vec<&str> = query.split(' ').collect();

		for pair in hits.windows(2) {
			prop_assert!(pair[0].score >= pair[1].score);
		}
		for hit in &hits {
			prop_assert!(hit.document.text.split(' ').any(|word| query_terms.contains(&word)));
		}
	}

	#[test]
	fn covering_every_term_beats_repeating_one(
		terms in prop::collection::btree_set("[a-z]{3,8}", 2..5),
		repeats in 2_usize..20,
	) {
		let terms: Vec<String> = terms.into_iter().filter(|term| !detour_index::text::DEFAULT_STOPWORDS.contains(&term.as_str())).collect();

		prop_assume!(terms.len() >= 2);

		let index = lexical();
		let full = terms.join(" ");
		let repeated = vec![terms[0].as_str(); repeats].join(" ");

		index.insert_documents(&[doc("repeat", &repeated), doc("full", &full)]);

		let hits = index.search_sync(&SearchQuery::new(full.clone(), 2));

		prop_assert_eq!(hits[0].document.id.as_str(), "full");
	}
}
