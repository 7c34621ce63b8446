//! In-memory lexical index with saturating, length-normalized term scoring.
//!
//! Each matched query term contributes `idf * tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg))`
//! and the sum is scaled by the fraction of query terms the document contains, so covering more
//! of the query always matters more than repeating one term.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::AHashMap;

use crate::{
	BoxFuture, Result, SearchIndex, SearchQuery, SearchResult, cmp_f32_desc, text::Tokenizer,
};
use detour_domain::IndexedDocument;

const NAME: &str = "lexical";

pub struct LexicalIndex {
	tokenizer: Tokenizer,
	max_query_terms: usize,
	k1: f32,
	b: f32,
	state: RwLock<State>,
}
impl LexicalIndex {
	pub fn new(cfg: &detour_config::Index) -> Self {
		Self {
			tokenizer: Tokenizer::new(cfg.min_token_chars as usize, cfg.stopwords.as_deref()),
			max_query_terms: (cfg.max_query_terms as usize).max(1),
			k1: cfg.saturation_k1,
			b: cfg.length_norm_b,
			state: RwLock::new(State::default()),
		}
	}

	pub fn len(&self) -> usize {
		self.read().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn get(&self, id: &str) -> Option<IndexedDocument> {
		self.read().entries.get(id).map(|entry| entry.document.clone())
	}

	pub fn insert_documents(&self, documents: &[IndexedDocument]) {
		let prepared: Vec<_> = documents
			.iter()
			.map(|document| (document.clone(), term_counts(&self.tokenizer.tokens(&document.text))))
			.collect();
		let mut state = self.write();

		for (document, terms) in prepared {
			state.insert(document, terms);
		}
	}

	pub fn search_sync(&self, query: &SearchQuery) -> Vec<SearchResult> {
		if query.limit == 0 {
			return Vec::new();
		}

		let terms = self.tokenizer.query_terms(&query.text, self.max_query_terms);

		if terms.is_empty() {
			return Vec::new();
		}

		let state = self.read();
		let doc_count = state.entries.len() as f32;

		if doc_count == 0.0 {
			return Vec::new();
		}

		let avg_len = (state.total_len as f32 / doc_count).max(1.0);
		let idf: Vec<f32> = terms
			.iter()
			.map(|term| {
				let df = state.doc_freq.get(term).copied().unwrap_or(0) as f32;

				((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln()
			})
			.collect();
		let mut scored = Vec::new();

		for entry in state.entries.values() {
			if !query.matches(&entry.document) {
				continue;
			}

			let len_norm = 1.0 - self.b + self.b * entry.len as f32 / avg_len;
			let mut sum = 0.0_f32;
			let mut matched = 0_usize;

			for (term, idf) in terms.iter().zip(&idf) {
				let Some(tf) = entry.terms.get(term) else { continue };
				let tf = *tf as f32;

				sum += idf * tf * (self.k1 + 1.0) / (tf + self.k1 * len_norm);
				matched += 1;
			}

			if matched == 0 {
				continue;
			}

			let coverage = matched as f32 / terms.len() as f32;

			scored.push((sum * coverage, entry.order, entry));
		}

		scored.sort_by(|left, right| cmp_f32_desc(left.0, right.0).then(left.1.cmp(&right.1)));

		scored
			.into_iter()
			.take(query.limit)
			.map(|(score, _, entry)| SearchResult { document: entry.document.clone(), score })
			.collect()
	}

	fn read(&self) -> RwLockReadGuard<'_, State> {
		self.state.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, State> {
		self.state.write().unwrap_or_else(|err| err.into_inner())
	}
}
impl SearchIndex for LexicalIndex {
	fn name(&self) -> &str {
		NAME
	}

	fn upsert_many<'a>(&'a self, documents: &'a [IndexedDocument]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.insert_documents(documents);

			Ok(())
		})
	}

	fn search<'a>(&'a self, query: &'a SearchQuery) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async move { Ok(self.search_sync(query)) })
	}
}

#[derive(Default)]
struct State {
	entries: AHashMap<String, Entry>,
	doc_freq: AHashMap<String, u32>,
	total_len: u64,
	next_order: u64,
}
impl State {
	fn insert(&mut self, document: IndexedDocument, terms: AHashMap<String, u32>) {
		let len: u32 = terms.values().sum();
		let order = match self.entries.remove(&document.id) {
			Some(previous) => {
				self.forget(&previous);

				previous.order
			},
			None => {
				let order = self.next_order;

				self.next_order += 1;

				order
			},
		};

		for term in terms.keys() {
			*self.doc_freq.entry(term.clone()).or_insert(0) += 1;
		}

		self.total_len += u64::from(len);
		self.entries.insert(document.id.clone(), Entry { document, terms, len, order });
	}

	fn forget(&mut self, entry: &Entry) {
		for term in entry.terms.keys() {
			if let Some(df) = self.doc_freq.get_mut(term) {
				*df = df.saturating_sub(1);

				if *df == 0 {
					self.doc_freq.remove(term);
				}
			}
		}

		self.total_len = self.total_len.saturating_sub(u64::from(entry.len));
	}
}

struct Entry {
	document: IndexedDocument,
	terms: AHashMap<String, u32>,
	len: u32,
	order: u64,
}

fn term_counts(tokens: &[String]) -> AHashMap<String, u32> {
	let mut counts = AHashMap::new();

	for token in tokens {
		*counts.entry(token.clone()).or_insert(0) += 1;
	}

	counts
}
