pub mod composite;
pub mod lexical;
pub mod text;

mod error;

pub use composite::CompositeIndex;
pub use error::{Error, Result};
pub use lexical::LexicalIndex;

use std::{cmp::Ordering, collections::BTreeMap, future::Future, pin::Pin};

use serde::Serialize;

use detour_domain::IndexedDocument;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage and retrieval contract shared by every index backend.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn name(&self) -> &str;

	/// Inserts or replaces documents by id. Resolves once every document is searchable.
	fn upsert_many<'a>(&'a self, documents: &'a [IndexedDocument]) -> BoxFuture<'a, Result<()>>;

	fn upsert<'a>(&'a self, document: &'a IndexedDocument) -> BoxFuture<'a, Result<()>> {
		self.upsert_many(std::slice::from_ref(document))
	}

	/// Ranked hits, best first. Empty queries yield an empty list.
	fn search<'a>(&'a self, query: &'a SearchQuery) -> BoxFuture<'a, Result<Vec<SearchResult>>>;
}

#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
	pub text: String,
	pub limit: usize,
	/// Exact-match metadata constraints.
	pub filters: BTreeMap<String, String>,
}
impl SearchQuery {
	pub fn new(text: impl Into<String>, limit: usize) -> Self {
		Self { text: text.into(), limit, filters: BTreeMap::new() }
	}

	pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(key.into(), value.into());

		self
	}

	pub fn matches(&self, document: &IndexedDocument) -> bool {
		self.filters
			.iter()
			.all(|(key, value)| document.metadata.get(key).is_some_and(|found| found == value))
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
	pub document: IndexedDocument,
	pub score: f32,
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
