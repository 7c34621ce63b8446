use serde::{Deserialize, Serialize};

use crate::{Error, Result, TraceEvent};

pub const MAX_KEY_CHARS: usize = 128;
pub const CONTENT_HASH_HEX_CHARS: usize = 64;

/// Rejects identifiers that cannot be used verbatim inside a storage key: empty values, path
/// traversal segments, and anything outside `[A-Za-z0-9._:-]`.
pub fn validate_storage_key(field: &str, value: &str) -> Result<()> {
	let reason = if value.is_empty() {
		Some("must be non-empty.".to_string())
	} else if value.len() > MAX_KEY_CHARS {
		Some(format!("must be at most {MAX_KEY_CHARS} characters."))
	} else if value == "." || value == ".." {
		Some("must not be a relative path segment.".to_string())
	} else if let Some(ch) = value.chars().find(|ch| !is_key_char(*ch)) {
		Some(format!("contains unsupported character {ch:?}."))
	} else {
		None
	};

	match reason {
		Some(reason) => Err(Error::InvalidKey { field: field.to_string(), reason }),
		None => Ok(()),
	}
}

/// Checks the identifiers of `event` that end up in storage keys.
pub fn validate_event_keys(event: &TraceEvent) -> Result<()> {
	validate_storage_key("event id", &event.id)?;
	validate_storage_key("session_id", &event.session_id)
}

/// Plain SQL identifier: ASCII letter or underscore first, then letters, digits, underscores.
pub fn validate_sql_identifier(field: &str, value: &str) -> Result<()> {
	let mut chars = value.chars();
	let valid_head = chars.next().map(|ch| ch.is_ascii_alphabetic() || ch == '_').unwrap_or(false);
	let valid_tail = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');

	if !valid_head || !valid_tail || value.len() > 63 {
		return Err(Error::InvalidKey {
			field: field.to_string(),
			reason: format!("{value:?} is not a plain SQL identifier."),
		});
	}

	Ok(())
}

/// Content-addressed key of an uploaded event bundle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleKey {
	pub team_id: String,
	pub session_id: String,
	pub content_hash: String,
}
impl BundleKey {
	pub fn new(team_id: &str, session_id: &str, content_hash: &str) -> Result<Self> {
		validate_storage_key("team_id", team_id)?;
		validate_storage_key("session_id", session_id)?;

		let content_hash = content_hash.to_ascii_lowercase();

		if content_hash.len() != CONTENT_HASH_HEX_CHARS
			|| !content_hash.chars().all(|ch| ch.is_ascii_hexdigit())
		{
			return Err(Error::InvalidKey {
				field: "content_hash".to_string(),
				reason: format!("must be {CONTENT_HASH_HEX_CHARS} hexadecimal characters."),
			});
		}

		Ok(Self {
			team_id: team_id.to_string(),
			session_id: session_id.to_string(),
			content_hash,
		})
	}

	/// Key for the canonical JSONL encoding of `events`.
	pub fn for_events(team_id: &str, session_id: &str, events: &[TraceEvent]) -> Result<Self> {
		let body = encode_jsonl(events)?;
		let hash = blake3::hash(body.as_bytes());

		Self::new(team_id, session_id, hash.to_hex().as_str())
	}

	pub fn object_path(&self) -> String {
		format!("{}/{}/{}.jsonl", self.team_id, self.session_id, self.content_hash)
	}
}

pub fn encode_jsonl(events: &[TraceEvent]) -> Result<String> {
	let mut out = String::new();

	for event in events {
		out.push_str(&serde_json::to_string(event)?);
		out.push('\n');
	}

	Ok(out)
}

fn is_key_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | ':' | '-')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_traversal_and_separators() {
		assert!(validate_storage_key("session_id", "..").is_err());
		assert!(validate_storage_key("session_id", "a/b").is_err());
		assert!(validate_storage_key("session_id", "").is_err());
		assert!(validate_storage_key("session_id", &"x".repeat(129)).is_err());
		assert!(validate_storage_key("session_id", "sess-01:run.2").is_ok());
	}

	#[test]
	fn bundle_key_requires_hex_hash() {
		assert!(BundleKey::new("team", "s-1", "abc").is_err());

		let hash = "A".repeat(64);
		let key = BundleKey::new("team", "s-1", &hash).expect("Key must be valid.");

		assert_eq!(key.content_hash, "a".repeat(64));
		assert_eq!(key.object_path(), format!("team/s-1/{}.jsonl", "a".repeat(64)));
	}

	#[test]
	fn bundle_key_is_content_addressed() {
		let first = BundleKey::for_events("team", "s-1", &[]).expect("Key must be valid.");
		let second = BundleKey::for_events("team", "s-1", &[]).expect("Key must be valid.");

		assert_eq!(first, second);
	}

	#[test]
	fn sql_identifiers_are_strict() {
		assert!(validate_sql_identifier("schema", "detour_events").is_ok());
		assert!(validate_sql_identifier("schema", "1abc").is_err());
		assert!(validate_sql_identifier("schema", "bad;drop").is_err());
		assert!(validate_sql_identifier("schema", "").is_err());
	}
}
