use detour_domain::{IndexedDocument, documents::META_CONFIDENCE};
use detour_index::{SearchResult, cmp_f32_desc};

/// Reorders retrieval results. Implementations may reorder and drop results but never add any;
/// documents absent from `base` are discarded by the caller.
pub trait Reranker
where
	Self: Send + Sync,
{
	fn name(&self) -> &str;

	fn rerank(&self, query: &str, base: Vec<SearchResult>) -> Vec<SearchResult>;
}

/// Boosts each score by the confidence recorded on its document.
pub struct ConfidenceReranker {
	weight: f32,
	default_confidence: f32,
}
impl ConfidenceReranker {
	pub fn new(weight: f32, default_confidence: f32) -> Self {
		Self { weight: weight.max(0.0), default_confidence: default_confidence.clamp(0.0, 1.0) }
	}

	pub fn from_config(cfg: &detour_config::Learning) -> Self {
		Self::new(1.0, cfg.event_document_confidence)
	}
}
impl Reranker for ConfidenceReranker {
	fn name(&self) -> &str {
		"confidence"
	}

	fn rerank(&self, _query: &str, base: Vec<SearchResult>) -> Vec<SearchResult> {
		let mut out: Vec<SearchResult> = base
			.into_iter()
			.map(|mut hit| {
				let confidence = document_confidence(&hit.document, self.default_confidence);

				hit.score *= 1.0 + self.weight * confidence;

				hit
			})
			.collect();

		out.sort_by(|left, right| cmp_f32_desc(left.score, right.score));

		out
	}
}

/// Confidence stored on the document, or `default` when absent or unparsable.
pub fn document_confidence(document: &IndexedDocument, default: f32) -> f32 {
	document
		.meta(META_CONFIDENCE)
		.and_then(|raw| raw.parse::<f32>().ok())
		.filter(|value| value.is_finite())
		.map(|value| value.clamp(0.0, 1.0))
		.unwrap_or(default)
}
