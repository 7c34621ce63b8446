use std::{collections::HashMap, sync::Arc};

use crate::{BoxFuture, Error, Result, SearchIndex, SearchQuery, SearchResult, cmp_f32_desc};
use detour_domain::IndexedDocument;

const NAME: &str = "composite";

/// A primary index plus an optional secondary one, fused with reciprocal rank fusion.
pub struct CompositeIndex {
	primary: Arc<dyn SearchIndex>,
	secondary: Option<Arc<dyn SearchIndex>>,
	fusion: detour_config::Fusion,
}
impl CompositeIndex {
	/// Passthrough over a single backend.
	pub fn new(primary: Arc<dyn SearchIndex>, fusion: &detour_config::Fusion) -> Result<Self> {
		validate_fusion(fusion)?;

		Ok(Self { primary, secondary: None, fusion: fusion.clone() })
	}

	pub fn with_secondary(
		primary: Arc<dyn SearchIndex>,
		secondary: Arc<dyn SearchIndex>,
		fusion: &detour_config::Fusion,
	) -> Result<Self> {
		validate_fusion(fusion)?;

		Ok(Self { primary, secondary: Some(secondary), fusion: fusion.clone() })
	}

	pub fn has_secondary(&self) -> bool {
		self.secondary.is_some()
	}

	async fn upsert_all(&self, documents: &[IndexedDocument]) -> Result<()> {
		self.primary.upsert_many(documents).await?;

		if let Some(secondary) = &self.secondary {
			secondary.upsert_many(documents).await?;
		}

		Ok(())
	}

	async fn search_fused(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
		let Some(secondary) = &self.secondary else { return self.primary.search(query).await };

		if query.limit == 0 {
			return Ok(Vec::new());
		}

		let candidates = SearchQuery {
			limit: query.limit.max(self.fusion.candidate_k as usize),
			..query.clone()
		};
		let primary_hits = self.primary.search(&candidates).await?;
		let secondary_hits = secondary.search(&candidates).await?;

		tracing::debug!(
			primary = self.primary.name(),
			secondary = secondary.name(),
			primary_hits = primary_hits.len(),
			secondary_hits = secondary_hits.len(),
			"Fusing ranked lists."
		);

		Ok(fuse_reciprocal_rank(
			&[
				(primary_hits, self.fusion.primary_weight),
				(secondary_hits, self.fusion.secondary_weight),
			],
			self.fusion.k,
			query.limit,
		))
	}
}
impl SearchIndex for CompositeIndex {
	fn name(&self) -> &str {
		NAME
	}

	fn upsert_many<'a>(&'a self, documents: &'a [IndexedDocument]) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.upsert_all(documents))
	}

	fn search<'a>(&'a self, query: &'a SearchQuery) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(self.search_fused(query))
	}
}

/// Sums `weight / (k + rank)` per document over ranked lists, where rank is 1-based. The first
/// list is the primary one and breaks score ties by its own rank.
pub fn fuse_reciprocal_rank(
	lists: &[(Vec<SearchResult>, f32)],
	k: f32,
	limit: usize,
) -> Vec<SearchResult> {
	struct Fused {
		document: IndexedDocument,
		score: f32,
		primary_rank: Option<usize>,
		first_seen: usize,
	}

	let mut by_id: HashMap<String, Fused> = HashMap::new();

	for (list_idx, (hits, weight)) in lists.iter().enumerate() {
		for (idx, hit) in hits.iter().enumerate() {
			let rank = idx + 1;
			let contribution = weight / (k + rank as f32);
			let seen = by_id.len();
			let fused = by_id.entry(hit.document.id.clone()).or_insert_with(|| Fused {
				document: hit.document.clone(),
				score: 0.0,
				primary_rank: None,
				first_seen: seen,
			});

			fused.score += contribution;

			if list_idx == 0 && fused.primary_rank.is_none() {
				fused.primary_rank = Some(rank);
			}
		}
	}

	let mut merged: Vec<Fused> = by_id.into_values().collect();

	merged.sort_by(|left, right| {
		cmp_f32_desc(left.score, right.score)
			.then_with(|| {
				left.primary_rank
					.unwrap_or(usize::MAX)
					.cmp(&right.primary_rank.unwrap_or(usize::MAX))
			})
			.then_with(|| left.first_seen.cmp(&right.first_seen))
	});

	merged
		.into_iter()
		.take(limit)
		.map(|fused| SearchResult { document: fused.document, score: fused.score })
		.collect()
}

fn validate_fusion(fusion: &detour_config::Fusion) -> Result<()> {
	for (label, weight) in
		[("primary_weight", fusion.primary_weight), ("secondary_weight", fusion.secondary_weight)]
	{
		if !weight.is_finite() || weight <= 0.0 {
			return Err(Error::Config {
				message: format!("fusion.{label} must be a finite number greater than zero."),
			});
		}
	}

	if !fusion.k.is_finite() || fusion.k < 0.0 {
		return Err(Error::Config {
			message: "fusion.k must be a finite number greater than or equal to zero.".to_string(),
		});
	}

	Ok(())
}
