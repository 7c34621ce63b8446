pub mod bootstrap;
pub mod ingest;
pub mod miner;
pub mod rerank;
pub mod retrieve;
pub mod suggest;

mod error;

pub use bootstrap::BootstrapReport;
pub use error::{Error, Result};
pub use ingest::IngestReport;
pub use miner::{MinedArtifact, MinerUpdate, WrongTurnMiner};
pub use rerank::{ConfidenceReranker, Reranker};
pub use retrieve::RetrieveRequest;
pub use suggest::LearningSuggestion;

use std::{
	collections::HashSet,
	sync::{Arc, Mutex, MutexGuard},
};

use detour_config::Config;
use detour_domain::DocumentOptions;
use detour_index::{CompositeIndex, LexicalIndex, SearchIndex};
use detour_storage::{EventStore, MemoryStore};

/// Ingests trace events, keeps them searchable, and turns mined wrong turns into suggestions.
///
/// The index and miner state live in memory and are rebuilt from the store with
/// [`LearningLoop::bootstrap_from_store`].
pub struct LearningLoop {
	cfg: Config,
	store: Arc<dyn EventStore>,
	index: Arc<dyn SearchIndex>,
	reranker: Option<Arc<dyn Reranker>>,
	miner: Mutex<WrongTurnMiner>,
	processed: Mutex<HashSet<String>>,
	document_options: DocumentOptions,
}
impl LearningLoop {
	pub fn new(cfg: Config, store: Arc<dyn EventStore>, index: Arc<dyn SearchIndex>) -> Result<Self> {
		detour_config::validate(&cfg)?;

		let miner = WrongTurnMiner::new(&cfg.miner)?;
		let document_options = DocumentOptions {
			family_prefix_tokens: cfg.miner.family_prefix_tokens as usize,
			max_excerpt_chars: cfg.learning.max_excerpt_chars as usize,
		};

		Ok(Self {
			cfg,
			store,
			index,
			reranker: None,
			miner: Mutex::new(miner),
			processed: Mutex::new(HashSet::new()),
			document_options,
		})
	}

	/// In-memory store behind a lexical index wrapped in a passthrough composite.
	pub fn in_memory(cfg: Config) -> Result<Self> {
		let lexical: Arc<dyn SearchIndex> = Arc::new(LexicalIndex::new(&cfg.index));
		let index = Arc::new(CompositeIndex::new(lexical, &cfg.fusion)?);

		Self::new(cfg, Arc::new(MemoryStore::new()), index)
	}

	pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
		self.reranker = Some(reranker);

		self
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	pub fn store(&self) -> &Arc<dyn EventStore> {
		&self.store
	}

	/// Mined artifacts, strongest first.
	pub fn artifacts(&self, limit: Option<usize>) -> Vec<MinedArtifact> {
		self.lock_miner().mine(limit)
	}

	pub(crate) fn lock_miner(&self) -> MutexGuard<'_, WrongTurnMiner> {
		self.miner.lock().unwrap_or_else(|err| err.into_inner())
	}

	pub(crate) fn lock_processed(&self) -> MutexGuard<'_, HashSet<String>> {
		self.processed.lock().unwrap_or_else(|err| err.into_inner())
	}
}
