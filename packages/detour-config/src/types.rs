use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub index: Index,
	pub fusion: Fusion,
	pub miner: Miner,
	pub learning: Learning,
	pub gate: Gate,
	pub review: Review,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
	/// Optional. Events stay in process memory when unset.
	pub postgres: Option<Postgres>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	#[serde(default = "default_pool_max_conns")]
	pub pool_max_conns: u32,
	/// SQL schema holding the `trace_events` table. Must be a plain identifier.
	#[serde(default = "default_pg_schema")]
	pub schema: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Index {
	pub max_query_terms: u32,
	pub min_token_chars: u32,
	/// Per-term saturation constant. Larger values let repeated terms keep adding score.
	pub saturation_k1: f32,
	/// Length normalization strength in the range 0.0-1.0.
	pub length_norm_b: f32,
	/// Optional. Replaces the built-in stopword list when set.
	pub stopwords: Option<Vec<String>>,
}
impl Default for Index {
	fn default() -> Self {
		Self {
			max_query_terms: 16,
			min_token_chars: 2,
			saturation_k1: 1.2,
			length_norm_b: 0.75,
			stopwords: None,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Fusion {
	/// Reciprocal rank smoothing constant. Zero means pure reciprocal rank.
	pub k: f32,
	pub primary_weight: f32,
	pub secondary_weight: f32,
	/// Minimum number of candidates pulled from each backend before fusing.
	pub candidate_k: u32,
}
impl Default for Fusion {
	fn default() -> Self {
		Self { k: 60.0, primary_weight: 1.0, secondary_weight: 1.0, candidate_k: 50 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Miner {
	pub near_dup_threshold: f32,
	pub family_prefix_tokens: u32,
	pub max_pending_failures: u32,
	pub base_confidence: f32,
	pub support_weight: f32,
	pub session_weight: f32,
}
impl Default for Miner {
	fn default() -> Self {
		Self {
			near_dup_threshold: 0.8,
			family_prefix_tokens: 3,
			max_pending_failures: 64,
			base_confidence: 0.2,
			support_weight: 0.3,
			session_weight: 0.5,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Learning {
	pub default_limit: u32,
	/// Suggestions whose confidence falls below this floor are dropped.
	pub min_confidence: f32,
	/// Confidence assigned to documents derived from a single event. Kept below a fresh artifact's
	/// confidence so mined fixes outrank the raw events they came from.
	pub event_document_confidence: f32,
	/// Candidate multiplier applied to the limit when a reranker is configured.
	pub rerank_candidate_factor: u32,
	pub max_excerpt_chars: u32,
}
impl Default for Learning {
	fn default() -> Self {
		Self {
			default_limit: 5,
			min_confidence: 0.3,
			event_document_confidence: 0.3,
			rerank_candidate_factor: 3,
			max_excerpt_chars: 480,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Gate {
	pub min_pairs: u32,
	pub min_recurrence: u32,
	pub require_cross_session: bool,
	pub min_harmful_retry_reduction: f64,
	pub min_wall_time_reduction: f64,
	pub min_token_reduction: f64,
	pub min_judgeable_coverage: f64,
	/// Compare reductions against the lower confidence bound instead of the point estimate.
	pub gate_on_lower_bound: bool,
	pub bootstrap_samples: u32,
	pub bootstrap_seed: u64,
	pub confidence_level: f64,
	/// Share of sessions (0-100) that receive hints when no explicit arm tag is present.
	pub canary_percent: u32,
}
impl Default for Gate {
	fn default() -> Self {
		Self {
			min_pairs: 5,
			min_recurrence: 2,
			require_cross_session: true,
			min_harmful_retry_reduction: 0.2,
			min_wall_time_reduction: 0.1,
			min_token_reduction: 0.1,
			min_judgeable_coverage: 0.8,
			gate_on_lower_bound: false,
			bootstrap_samples: 1_000,
			bootstrap_seed: 7,
			confidence_level: 0.95,
			canary_percent: 50,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Review {
	pub reviewer_ids: Vec<String>,
	/// Number of reviewers assigned to each sampled failure.
	pub overlap: u32,
	pub seed: u64,
}
impl Default for Review {
	fn default() -> Self {
		Self { reviewer_ids: Vec::new(), overlap: 2, seed: 11 }
	}
}

fn default_pool_max_conns() -> u32 {
	4
}

fn default_pg_schema() -> String {
	"detour".to_string()
}
