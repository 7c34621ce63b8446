use ahash::AHashSet;

pub const DEFAULT_STOPWORDS: [&str; 32] = [
	"a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "has", "have",
	"in", "into", "is", "it", "its", "of", "on", "or", "so", "that", "the", "then", "this", "to",
	"was", "were", "when", "with",
];

#[derive(Clone, Debug)]
pub struct Tokenizer {
	min_token_chars: usize,
	stopwords: AHashSet<String>,
}
impl Tokenizer {
	pub fn new(min_token_chars: usize, stopwords: Option<&[String]>) -> Self {
		let stopwords = match stopwords {
			Some(words) => words.iter().map(|word| word.to_lowercase()).collect(),
			None => DEFAULT_STOPWORDS.iter().map(|word| word.to_string()).collect(),
		};

		Self { min_token_chars: min_token_chars.max(1), stopwords }
	}

	/// Every kept token of `text`, in order, repeats included.
	pub fn tokens(&self, text: &str) -> Vec<String> {
		let mut normalized = String::with_capacity(text.len());

		for ch in text.chars() {
			if ch.is_alphanumeric() {
				normalized.extend(ch.to_lowercase());
			} else {
				normalized.push(' ');
			}
		}

		normalized
			.split_whitespace()
			.filter(|token| token.chars().count() >= self.min_token_chars)
			.filter(|token| !self.stopwords.contains(*token))
			.map(str::to_string)
			.collect()
	}

	/// Distinct query terms, capped at `max_terms`. The cap keeps the tail of the query.
	pub fn query_terms(&self, query: &str, max_terms: usize) -> Vec<String> {
		let mut seen = AHashSet::new();
		let mut out = Vec::new();

		for token in self.tokens(query) {
			if seen.insert(token.clone()) {
				out.push(token);
			}
		}

		if out.len() > max_terms {
			out.drain(..out.len() - max_terms);
		}

		out
	}
}
