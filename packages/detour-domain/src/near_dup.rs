use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::{Error, Result};

/// Symmetric near-duplicate judgment over word shingles.
#[derive(Clone, Copy, Debug)]
pub struct NearDupDetector {
	threshold: f64,
}
impl NearDupDetector {
	pub fn new(threshold: f64) -> Result<Self> {
		if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
			return Err(Error::Config {
				message: "Near-duplicate threshold must be in the range (0.0, 1.0].".to_string(),
			});
		}

		Ok(Self { threshold })
	}

	pub fn threshold(&self) -> f64 {
		self.threshold
	}

	pub fn similarity(&self, lhs: &str, rhs: &str) -> f64 {
		jaccard(&shingles(lhs), &shingles(rhs))
	}

	pub fn is_near_duplicate(&self, lhs: &str, rhs: &str) -> bool {
		self.similarity(lhs, rhs) >= self.threshold
	}
}

/// NFKC-normalized, lowercased words with digit runs folded to `0`.
pub fn normalize_words(text: &str) -> Vec<String> {
	let normalized: String = text.nfkc().collect::<String>().to_lowercase();
	let mut out = Vec::new();

	for word in normalized.unicode_words() {
		let mut folded = String::with_capacity(word.len());
		let mut in_digits = false;

		for ch in word.chars() {
			if ch.is_ascii_digit() {
				if !in_digits {
					folded.push('0');
				}

				in_digits = true;
			} else {
				folded.push(ch);

				in_digits = false;
			}
		}

		out.push(folded);
	}

	out
}

pub fn shingles(text: &str) -> BTreeSet<String> {
	let words = normalize_words(text);
	let mut out: BTreeSet<String> = words.iter().cloned().collect();

	for pair in words.windows(2) {
		out.insert(format!("{} {}", pair[0], pair[1]));
	}

	out
}

fn jaccard(lhs: &BTreeSet<String>, rhs: &BTreeSet<String>) -> f64 {
	if lhs.is_empty() && rhs.is_empty() {
		return 1.0;
	}

	let intersection = lhs.intersection(rhs).count();
	let union = lhs.len() + rhs.len() - intersection;

	if union == 0 {
		return 0.0;
	}

	intersection as f64 / union as f64
}
