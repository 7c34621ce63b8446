//! Builders for trace events used across test suites.

use serde_json::Value;
use time::OffsetDateTime;

use detour_domain::{EventPayload, Message, Metrics, Scope, ToolCall, ToolResult, TraceEvent};

pub fn event(id: &str, session_id: &str, timestamp: OffsetDateTime, payload: EventPayload) -> TraceEvent {
	TraceEvent {
		id: id.to_string(),
		timestamp,
		session_id: session_id.to_string(),
		harness: "test".to_string(),
		scope: Scope::Team,
		payload,
		metrics: Metrics::default(),
		agent_id: None,
		actor_id: None,
		tags: Vec::new(),
	}
}

/// Shell tool result. Failures carry `is_error` and exit code 1.
pub fn tool_result(
	id: &str,
	session_id: &str,
	timestamp: OffsetDateTime,
	command: &str,
	failed: bool,
) -> TraceEvent {
	let output = if failed { format!("{command}: error: command failed") } else { "ok".to_string() };

	command_result(id, session_id, timestamp, command, failed, &output)
}

pub fn command_result(
	id: &str,
	session_id: &str,
	timestamp: OffsetDateTime,
	command: &str,
	failed: bool,
	output: &str,
) -> TraceEvent {
	let result = ToolResult {
		tool: Some("bash".to_string()),
		command: Some(command.to_string()),
		input: None,
		output: Some(output.to_string()),
		is_error: failed,
		exit_code: Some(if failed { 1 } else { 0 }),
	};

	event(id, session_id, timestamp, EventPayload::ToolResult(result))
}

/// Tool result without a command, identified by tool name and input only.
pub fn input_result(
	id: &str,
	session_id: &str,
	timestamp: OffsetDateTime,
	tool: &str,
	input: Value,
	failed: bool,
	output: &str,
) -> TraceEvent {
	let result = ToolResult {
		tool: Some(tool.to_string()),
		command: None,
		input: Some(input),
		output: Some(output.to_string()),
		is_error: failed,
		exit_code: None,
	};

	event(id, session_id, timestamp, EventPayload::ToolResult(result))
}

pub fn tool_call(id: &str, session_id: &str, timestamp: OffsetDateTime, command: &str) -> TraceEvent {
	let call = ToolCall {
		tool: Some("bash".to_string()),
		command: Some(command.to_string()),
		input: None,
	};

	event(id, session_id, timestamp, EventPayload::ToolCall(call))
}

pub fn message(id: &str, session_id: &str, timestamp: OffsetDateTime, text: &str) -> TraceEvent {
	let message = Message { role: Some("assistant".to_string()), text: text.to_string() };

	event(id, session_id, timestamp, EventPayload::Message(message))
}

pub fn with_tags(mut event: TraceEvent, tags: &[&str]) -> TraceEvent {
	event.tags.extend(tags.iter().map(|tag| tag.to_string()));

	event
}

pub fn with_usage(mut event: TraceEvent, latency_ms: u64, tokens: u64) -> TraceEvent {
	event.metrics.latency_ms = Some(latency_ms);
	event.metrics.input_tokens = Some(tokens);

	event
}
