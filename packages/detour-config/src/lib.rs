mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Fusion, Gate, Index, Learning, Miner, Postgres, Review, Service, Storage};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Built-in configuration used when no file is supplied.
pub fn defaults() -> Config {
	Config::default()
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	if let Some(postgres) = cfg.storage.postgres.as_ref() {
		if postgres.dsn.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.postgres.dsn must be non-empty.".to_string(),
			});
		}
		if postgres.pool_max_conns == 0 {
			return Err(Error::Validation {
				message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
			});
		}
		if !is_sql_identifier(&postgres.schema) {
			return Err(Error::Validation {
				message: "storage.postgres.schema must be a plain SQL identifier.".to_string(),
			});
		}
	}

	validate_index(cfg)?;
	validate_fusion(cfg)?;
	validate_miner(cfg)?;
	validate_learning(cfg)?;
	validate_gate(cfg)?;
	validate_review(cfg)?;

	Ok(())
}

/// ASCII letter or underscore first, then letters, digits, or underscores, within Postgres's
/// 63-byte limit.
fn is_sql_identifier(value: &str) -> bool {
	let mut chars = value.chars();
	let head = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');

	head && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') && value.len() <= 63
}

fn validate_index(cfg: &Config) -> Result<()> {
	if cfg.index.max_query_terms == 0 {
		return Err(Error::Validation {
			message: "index.max_query_terms must be greater than zero.".to_string(),
		});
	}
	if cfg.index.min_token_chars == 0 {
		return Err(Error::Validation {
			message: "index.min_token_chars must be greater than zero.".to_string(),
		});
	}
	if !cfg.index.saturation_k1.is_finite() || cfg.index.saturation_k1 <= 0.0 {
		return Err(Error::Validation {
			message: "index.saturation_k1 must be a finite number greater than zero.".to_string(),
		});
	}
	if !cfg.index.length_norm_b.is_finite() || !(0.0..=1.0).contains(&cfg.index.length_norm_b) {
		return Err(Error::Validation {
			message: "index.length_norm_b must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn validate_fusion(cfg: &Config) -> Result<()> {
	if !cfg.fusion.k.is_finite() || cfg.fusion.k < 0.0 {
		return Err(Error::Validation {
			message: "fusion.k must be a finite number, zero or greater.".to_string(),
		});
	}

	for (label, weight) in [
		("fusion.primary_weight", cfg.fusion.primary_weight),
		("fusion.secondary_weight", cfg.fusion.secondary_weight),
	] {
		if !weight.is_finite() || weight <= 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number greater than zero."),
			});
		}
	}

	if cfg.fusion.candidate_k == 0 {
		return Err(Error::Validation {
			message: "fusion.candidate_k must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_miner(cfg: &Config) -> Result<()> {
	let miner = &cfg.miner;

	if !miner.near_dup_threshold.is_finite()
		|| miner.near_dup_threshold <= 0.0
		|| miner.near_dup_threshold > 1.0
	{
		return Err(Error::Validation {
			message: "miner.near_dup_threshold must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if miner.family_prefix_tokens == 0 {
		return Err(Error::Validation {
			message: "miner.family_prefix_tokens must be greater than zero.".to_string(),
		});
	}
	if miner.max_pending_failures == 0 {
		return Err(Error::Validation {
			message: "miner.max_pending_failures must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("miner.base_confidence", miner.base_confidence),
		("miner.support_weight", miner.support_weight),
		("miner.session_weight", miner.session_weight),
	] {
		if !value.is_finite() || value < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	if miner.session_weight == 0.0 {
		return Err(Error::Validation {
			message: "miner.session_weight must be greater than zero.".to_string(),
		});
	}
	if miner.base_confidence + miner.support_weight + miner.session_weight > 1.0 + f32::EPSILON {
		return Err(Error::Validation {
			message:
				"miner.base_confidence, miner.support_weight, and miner.session_weight must sum to 1.0 or less."
					.to_string(),
		});
	}

	Ok(())
}

fn validate_learning(cfg: &Config) -> Result<()> {
	let learning = &cfg.learning;

	if learning.default_limit == 0 {
		return Err(Error::Validation {
			message: "learning.default_limit must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("learning.min_confidence", learning.min_confidence),
		("learning.event_document_confidence", learning.event_document_confidence),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if learning.rerank_candidate_factor == 0 {
		return Err(Error::Validation {
			message: "learning.rerank_candidate_factor must be greater than zero.".to_string(),
		});
	}
	if learning.max_excerpt_chars == 0 {
		return Err(Error::Validation {
			message: "learning.max_excerpt_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_gate(cfg: &Config) -> Result<()> {
	let gate = &cfg.gate;

	if gate.min_recurrence == 0 {
		return Err(Error::Validation {
			message: "gate.min_recurrence must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("gate.min_harmful_retry_reduction", gate.min_harmful_retry_reduction),
		("gate.min_wall_time_reduction", gate.min_wall_time_reduction),
		("gate.min_token_reduction", gate.min_token_reduction),
	] {
		if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range -1.0-1.0."),
			});
		}
	}

	if !gate.min_judgeable_coverage.is_finite()
		|| !(0.0..=1.0).contains(&gate.min_judgeable_coverage)
	{
		return Err(Error::Validation {
			message: "gate.min_judgeable_coverage must be in the range 0.0-1.0.".to_string(),
		});
	}
	if gate.bootstrap_samples == 0 {
		return Err(Error::Validation {
			message: "gate.bootstrap_samples must be greater than zero.".to_string(),
		});
	}
	if !gate.confidence_level.is_finite()
		|| gate.confidence_level <= 0.0
		|| gate.confidence_level >= 1.0
	{
		return Err(Error::Validation {
			message: "gate.confidence_level must be in the range (0.0, 1.0).".to_string(),
		});
	}
	if gate.canary_percent > 100 {
		return Err(Error::Validation {
			message: "gate.canary_percent must be 100 or less.".to_string(),
		});
	}

	Ok(())
}

fn validate_review(cfg: &Config) -> Result<()> {
	let mut seen = HashSet::new();

	for reviewer in &cfg.review.reviewer_ids {
		if reviewer.trim().is_empty() {
			return Err(Error::Validation {
				message: "review.reviewer_ids must not contain empty ids.".to_string(),
			});
		}
		if !seen.insert(reviewer.as_str()) {
			return Err(Error::Validation {
				message: format!("review.reviewer_ids contains duplicate id {reviewer:?}."),
			});
		}
	}

	if !cfg.review.reviewer_ids.is_empty() {
		if cfg.review.overlap == 0 {
			return Err(Error::Validation {
				message: "review.overlap must be greater than zero.".to_string(),
			});
		}
		if cfg.review.overlap as usize > cfg.review.reviewer_ids.len() {
			return Err(Error::Validation {
				message: "review.overlap must not exceed the number of reviewers.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for reviewer in &mut cfg.review.reviewer_ids {
		*reviewer = reviewer.trim().to_string();
	}

	if let Some(stopwords) = cfg.index.stopwords.as_mut() {
		for word in stopwords.iter_mut() {
			*word = word.trim().to_lowercase();
		}

		stopwords.retain(|word| !word.is_empty());
	}
}
