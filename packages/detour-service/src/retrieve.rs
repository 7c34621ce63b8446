use std::collections::{BTreeMap, HashSet};

use crate::{LearningLoop, Result};
use detour_index::{SearchQuery, SearchResult};

#[derive(Clone, Debug, Default)]
pub struct RetrieveRequest {
	pub text: String,
	/// Falls back to `learning.default_limit`.
	pub limit: Option<usize>,
	pub filters: BTreeMap<String, String>,
}
impl RetrieveRequest {
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into(), ..Default::default() }
	}

	pub fn with_limit(mut self, limit: usize) -> Self {
		self.limit = Some(limit);

		self
	}

	pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(key.into(), value.into());

		self
	}
}

impl LearningLoop {
	pub async fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<SearchResult>> {
		let limit = request.limit.unwrap_or(self.cfg.learning.default_limit as usize);

		if limit == 0 {
			return Ok(Vec::new());
		}

		let factor = self.cfg.learning.rerank_candidate_factor.max(1) as usize;
		let candidate_limit =
			if self.reranker.is_some() { limit.saturating_mul(factor) } else { limit };
		let query = SearchQuery {
			text: request.text.clone(),
			limit: candidate_limit,
			filters: request.filters.clone(),
		};
		let base = self.index.search(&query).await?;
		let mut hits = match &self.reranker {
			Some(reranker) => {
				let reranked = reranker.rerank(&request.text, base.clone());

				constrain_reranked(reranker.name(), &base, reranked)
			},
			None => base,
		};

		hits.truncate(limit);

		Ok(hits)
	}
}

/// Keeps only reranked hits that were present in `base`, each at most once.
fn constrain_reranked(
	reranker: &str,
	base: &[SearchResult],
	reranked: Vec<SearchResult>,
) -> Vec<SearchResult> {
	let allowed: HashSet<&str> = base.iter().map(|hit| hit.document.id.as_str()).collect();
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(reranked.len());

	for hit in reranked {
		if !allowed.contains(hit.document.id.as_str()) {
			tracing::warn!(
				reranker,
				document_id = %hit.document.id,
				"Dropping document introduced by reranker."
			);

			continue;
		}
		if seen.insert(hit.document.id.clone()) {
			out.push(hit);
		}
	}

	out
}
