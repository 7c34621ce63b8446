use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::trace::ToolResult;

const MAX_SIGNATURE_CHARS: usize = 160;
const FILE_EXTENSIONS: [&str; 24] = [
	"c", "cc", "cpp", "css", "go", "h", "html", "java", "js", "json", "jsx", "kt", "lock", "md",
	"mjs", "py", "rb", "rs", "sh", "sql", "toml", "ts", "tsx", "yaml",
];

static ERROR_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(
		r"(?i)\b(error|fatal|exception|panic(ked)?|failed|failure|traceback|denied|not found|no such|unknown|unrecognized|invalid|cannot|can't|undefined|refused|timed? ?out)\b",
	)
	.ok()
});
static UUID_LIKE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").ok()
});
static HEX_LIKE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?i)\b0x[0-9a-f]+\b").ok());
static PATH_LIKE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?:[A-Za-z]:)?(?:\.{0,2}/)?(?:[\w@.-]+/)+[\w@.-]+").ok());
static NUMBER_LIKE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d+\b").ok());
static FILE_MENTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?:\.{0,2}/)?(?:[\w@-][\w@.-]*/)*[\w@-][\w@.-]*\.([A-Za-z][A-Za-z0-9]{0,4})\b").ok()
});
static ENV_ASSIGNMENT: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").ok());

/// Normalized error lines from tool output, most specific first in order of appearance.
pub fn extract_error_signatures(output: &str, max: usize) -> Vec<String> {
	let Some(error_line) = ERROR_LINE.as_ref() else { return Vec::new() };
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for line in output.lines() {
		if out.len() >= max {
			break;
		}

		let trimmed = line.trim();

		if trimmed.is_empty() || !error_line.is_match(trimmed) {
			continue;
		}

		let normalized = normalize_error_line(trimmed);

		if normalized.is_empty() {
			continue;
		}
		if seen.insert(normalized.clone()) {
			out.push(normalized);
		}
	}

	out
}

/// First error signature of the output, if any.
pub fn error_signature(output: &str) -> Option<String> {
	extract_error_signatures(output, 1).into_iter().next()
}

/// Folds volatile fragments (ids, addresses, paths, numbers) so equivalent failures compare
/// equal across runs.
pub fn normalize_error_line(line: &str) -> String {
	let mut out = line.to_lowercase();

	for (pattern, replacement) in [
		(&UUID_LIKE, "<uuid>"),
		(&HEX_LIKE, "<hex>"),
		(&PATH_LIKE, "<path>"),
		(&NUMBER_LIKE, "<n>"),
	] {
		if let Some(re) = pattern.as_ref() {
			out = re.replace_all(&out, replacement).into_owned();
		}
	}

	let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");

	truncate_chars(&collapsed, MAX_SIGNATURE_CHARS)
}

/// File paths mentioned in free text. Bare names only count when their extension is a known
/// source or config extension.
pub fn extract_file_paths(text: &str, max: usize) -> Vec<String> {
	let Some(mention) = FILE_MENTION.as_ref() else { return Vec::new() };
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for captures in mention.captures_iter(text) {
		if out.len() >= max {
			break;
		}

		let Some(full) = captures.get(0) else { continue };
		let candidate = full.as_str().trim_end_matches('.');
		let extension =
			captures.get(1).map(|ext| ext.as_str().to_ascii_lowercase()).unwrap_or_default();

		if !candidate.contains('/') && !FILE_EXTENSIONS.contains(&extension.as_str()) {
			continue;
		}
		if seen.insert(candidate.to_string()) {
			out.push(candidate.to_string());
		}
	}

	out
}

pub fn normalize_command(command: &str) -> String {
	command.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Operation family of a shell command: its leading non-flag words, after dropping environment
/// assignments, `sudo`, and leading `cd` segments of a `&&` chain. Flags are skipped wherever they
/// sit, so `pytest -x tests/unit` and `pytest tests/unit` share a family.
pub fn command_family(command: &str, prefix_tokens: usize) -> Option<String> {
	let segment = command
		.split("&&")
		.map(str::trim)
		.find(|segment| !segment.is_empty() && !is_cd_segment(segment))
		.unwrap_or_else(|| command.trim());
	let mut words = Vec::new();

	for word in segment.split_whitespace() {
		if words.is_empty() && (word == "sudo" || is_env_assignment(word)) {
			continue;
		}
		if matches!(word, "|" | ";" | ">" | ">>" | "<") {
			break;
		}
		if word.starts_with('-') {
			continue;
		}

		words.push(word.to_lowercase());

		if words.len() >= prefix_tokens.max(1) {
			break;
		}
	}

	if words.is_empty() { None } else { Some(words.join(" ")) }
}

/// Whether one family is a word prefix of the other, as with `git push` and `git push origin`.
pub fn families_overlap(lhs: &str, rhs: &str) -> bool {
	let (short, long) = if lhs.len() <= rhs.len() { (lhs, rhs) } else { (rhs, lhs) };

	long.strip_prefix(short).is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

/// Family of a tool result: the command family, else the tool name.
pub fn operation_family(result: &ToolResult, prefix_tokens: usize) -> Option<String> {
	result
		.command()
		.and_then(|command| command_family(command, prefix_tokens))
		.or_else(|| result.tool().map(|tool| format!("tool:{}", tool.to_lowercase())))
}

/// What was attempted: the normalized command, else the canonical JSON of the tool input.
pub fn attempt_content(result: &ToolResult) -> Option<String> {
	if let Some(command) = result.command() {
		return Some(normalize_command(command));
	}

	result.input.as_ref().filter(|input| !input.is_null()).map(|input| input.to_string())
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => text[..idx].to_string(),
		None => text.to_string(),
	}
}

fn is_cd_segment(segment: &str) -> bool {
	segment == "cd" || segment.starts_with("cd ")
}

fn is_env_assignment(word: &str) -> bool {
	ENV_ASSIGNMENT.as_ref().map(|re| re.is_match(word)).unwrap_or(false)
}
