//! Derives searchable documents from trace events.
//!
//! Every structured event yields exactly one document whose id is `{event_id}:{kind}`, so
//! re-deriving an event replaces its document instead of adding another one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
	Result,
	signature::{self, operation_family},
	trace::{EventPayload, Message, ToolCall, ToolResult, TraceEvent},
};

pub const KIND_TOOL_CALL: &str = "tool_call";
pub const KIND_TOOL_RESULT: &str = "tool_result";
pub const KIND_MESSAGE: &str = "message";
pub const KIND_WRONG_TURN: &str = "wrong_turn";

pub const META_KIND: &str = "kind";
pub const META_SESSION_ID: &str = "session_id";
pub const META_SCOPE: &str = "scope";
pub const META_HARNESS: &str = "harness";
pub const META_EVENT_TYPE: &str = "event_type";
pub const META_OUTCOME: &str = "outcome";
pub const META_TOOL: &str = "tool";
pub const META_COMMAND: &str = "command";
pub const META_FAMILY: &str = "family";
pub const META_ERROR_SIGNATURE: &str = "error_signature";
pub const META_FILE_PATHS: &str = "file_paths";
pub const META_CONFIDENCE: &str = "confidence";
pub const META_EVIDENCE_EVENT_IDS: &str = "evidence_event_ids";
pub const META_FAILED_COMMAND: &str = "failed_command";
pub const META_FIX_COMMAND: &str = "fix_command";
pub const META_SUPPORT_COUNT: &str = "support_count";
pub const META_SUPPORT_SESSION_COUNT: &str = "support_session_count";

const MAX_FILE_PATHS: usize = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
	pub id: String,
	pub source_event_id: String,
	pub text: String,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
}
impl IndexedDocument {
	pub fn meta(&self, key: &str) -> Option<&str> {
		self.metadata.get(key).map(String::as_str).filter(|value| !value.is_empty())
	}

	pub fn kind(&self) -> Option<&str> {
		self.meta(META_KIND)
	}

	/// Comma-joined evidence ids, or the source event when the document carries none.
	pub fn evidence_event_ids(&self) -> Vec<String> {
		match self.meta(META_EVIDENCE_EVENT_IDS) {
			Some(raw) => raw
				.split(',')
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.map(str::to_string)
				.collect(),
			None => vec![self.source_event_id.clone()],
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub struct DocumentOptions {
	pub family_prefix_tokens: usize,
	pub max_excerpt_chars: usize,
}
impl Default for DocumentOptions {
	fn default() -> Self {
		Self { family_prefix_tokens: 3, max_excerpt_chars: 480 }
	}
}

pub fn document_id(event_id: &str, kind: &str) -> String {
	format!("{event_id}:{kind}")
}

/// Documents derived from one event. Unstructured payloads derive nothing; events without an id
/// or session are rejected.
pub fn build_documents(
	event: &TraceEvent,
	options: &DocumentOptions,
) -> Result<Vec<IndexedDocument>> {
	event.validate()?;

	let document = match &event.payload {
		EventPayload::ToolCall(call) => Some(tool_call_document(event, call, options)),
		EventPayload::ToolResult(result) => Some(tool_result_document(event, result, options)),
		EventPayload::Message(message) => message_document(event, message, options),
		EventPayload::Unstructured { .. } => None,
	};

	Ok(document.into_iter().collect())
}

/// Excerpt of at most `max_chars` grapheme clusters, marked with an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
	let mut graphemes = collapsed.graphemes(true);
	let mut out: String = graphemes.by_ref().take(max_chars).collect();

	if graphemes.next().is_some() {
		out.push('…');
	}

	out
}

fn tool_call_document(
	event: &TraceEvent,
	call: &ToolCall,
	options: &DocumentOptions,
) -> IndexedDocument {
	let tool = call.tool.as_deref().map(str::trim).filter(|tool| !tool.is_empty());
	let command = call.command.as_deref().map(str::trim).filter(|command| !command.is_empty());
	let mut metadata = base_metadata(event, KIND_TOOL_CALL);
	let mut text = match tool {
		Some(tool) => format!("Called tool {tool}."),
		None => "Called a tool.".to_string(),
	};

	if let Some(tool) = tool {
		metadata.insert(META_TOOL.to_string(), tool.to_string());
	}
	if let Some(command) = command {
		let command = signature::normalize_command(command);

		text.push_str(&format!(" Command `{command}`."));

		if let Some(family) = signature::command_family(&command, options.family_prefix_tokens) {
			metadata.insert(META_FAMILY.to_string(), family);
		}

		metadata.insert(META_COMMAND.to_string(), command);
	} else if let Some(input) = call.input.as_ref().filter(|input| !input.is_null()) {
		text.push_str(&format!(" Input: {}", excerpt(&input.to_string(), options.max_excerpt_chars)));
	}

	IndexedDocument {
		id: document_id(&event.id, KIND_TOOL_CALL),
		source_event_id: event.id.clone(),
		text,
		metadata,
	}
}

fn tool_result_document(
	event: &TraceEvent,
	result: &ToolResult,
	options: &DocumentOptions,
) -> IndexedDocument {
	let failed = event.is_failed_tool_result();
	let mut metadata = base_metadata(event, KIND_TOOL_RESULT);
	let verb = if failed { "failed" } else { "succeeded" };
	let mut text = match (result.command(), result.tool()) {
		(Some(command), _) => format!("Command `{}` {verb}", signature::normalize_command(command)),
		(None, Some(tool)) => format!("Tool {tool} {verb}"),
		(None, None) => format!("Tool call {verb}"),
	};

	if let Some(code) = result.exit_code {
		text.push_str(&format!(" with exit code {code}"));
	}

	text.push('.');

	if let Some(tool) = result.tool() {
		metadata.insert(META_TOOL.to_string(), tool.to_string());
	}
	if let Some(command) = result.command() {
		metadata.insert(META_COMMAND.to_string(), signature::normalize_command(command));
	}
	if let Some(family) = operation_family(result, options.family_prefix_tokens) {
		metadata.insert(META_FAMILY.to_string(), family);
	}

	let output = result.output();

	if failed && let Some(error) = signature::error_signature(output) {
		text.push_str(&format!(" Error: {error}."));
		metadata.insert(META_ERROR_SIGNATURE.to_string(), error);
	}

	let paths = signature::extract_file_paths(output, MAX_FILE_PATHS);

	if !paths.is_empty() {
		metadata.insert(META_FILE_PATHS.to_string(), paths.join(","));
	}
	if !output.trim().is_empty() {
		text.push_str(&format!(" Output: {}", excerpt(output, options.max_excerpt_chars)));
	}

	IndexedDocument {
		id: document_id(&event.id, KIND_TOOL_RESULT),
		source_event_id: event.id.clone(),
		text,
		metadata,
	}
}

fn message_document(
	event: &TraceEvent,
	message: &Message,
	options: &DocumentOptions,
) -> Option<IndexedDocument> {
	if message.text.trim().is_empty() {
		return None;
	}

	let role = message.role.as_deref().map(str::trim).filter(|role| !role.is_empty());
	let body = excerpt(&message.text, options.max_excerpt_chars);
	let text = match role {
		Some(role) => format!("{role} said: {body}"),
		None => body,
	};
	let mut metadata = base_metadata(event, KIND_MESSAGE);
	let paths = signature::extract_file_paths(&message.text, MAX_FILE_PATHS);

	if !paths.is_empty() {
		metadata.insert(META_FILE_PATHS.to_string(), paths.join(","));
	}

	Some(IndexedDocument {
		id: document_id(&event.id, KIND_MESSAGE),
		source_event_id: event.id.clone(),
		text,
		metadata,
	})
}

fn base_metadata(event: &TraceEvent, kind: &str) -> BTreeMap<String, String> {
	let mut metadata = BTreeMap::new();

	metadata.insert(META_KIND.to_string(), kind.to_string());
	metadata.insert(META_SESSION_ID.to_string(), event.session_id.clone());
	metadata.insert(META_SCOPE.to_string(), event.scope.as_str().to_string());
	metadata.insert(META_EVENT_TYPE.to_string(), event.event_type().to_string());

	if !event.harness.trim().is_empty() {
		metadata.insert(META_HARNESS.to_string(), event.harness.trim().to_string());
	}
	if let Some(outcome) = event.outcome() {
		metadata.insert(META_OUTCOME.to_string(), outcome.as_str().to_string());
	}

	metadata
}
