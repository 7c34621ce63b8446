use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{Error, Result};

pub const EVENT_TYPE_TOOL_CALL: &str = "tool_call";
pub const EVENT_TYPE_TOOL_RESULT: &str = "tool_result";
pub const EVENT_TYPE_MESSAGE: &str = "message";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
	Personal,
	Team,
	Public,
}
impl Scope {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Personal => "personal",
			Self::Team => "team",
			Self::Public => "public",
		}
	}
}
impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Scope {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim() {
			"personal" => Ok(Self::Personal),
			"team" => Ok(Self::Team),
			"public" => Ok(Self::Public),
			other => Err(Error::InvalidKey {
				field: "scope".to_string(),
				reason: format!("{other:?} is not one of personal, team, or public."),
			}),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
	Success,
	Failure,
}
impl Outcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub outcome: Option<Outcome>,
	#[serde(default, alias = "latencyMs", skip_serializing_if = "Option::is_none")]
	pub latency_ms: Option<u64>,
	#[serde(default, alias = "inputTokens", skip_serializing_if = "Option::is_none")]
	pub input_tokens: Option<u64>,
	#[serde(default, alias = "outputTokens", skip_serializing_if = "Option::is_none")]
	pub output_tokens: Option<u64>,
	#[serde(default, alias = "costUsd", skip_serializing_if = "Option::is_none")]
	pub cost_usd: Option<f64>,
}
impl Metrics {
	pub fn total_tokens(&self) -> u64 {
		self.input_tokens.unwrap_or(0).saturating_add(self.output_tokens.unwrap_or(0))
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output: Option<String>,
	#[serde(default, alias = "isError")]
	pub is_error: bool,
	#[serde(default, alias = "exitCode", skip_serializing_if = "Option::is_none")]
	pub exit_code: Option<i32>,
}
impl ToolResult {
	pub fn command(&self) -> Option<&str> {
		self.command.as_deref().map(str::trim).filter(|command| !command.is_empty())
	}

	pub fn tool(&self) -> Option<&str> {
		self.tool.as_deref().map(str::trim).filter(|tool| !tool.is_empty())
	}

	pub fn output(&self) -> &str {
		self.output.as_deref().unwrap_or("")
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default)]
	pub text: String,
}

/// Event payload keyed by the event `type`. Unknown types, and known types whose payload does
/// not decode, are preserved verbatim as [`EventPayload::Unstructured`].
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
	ToolCall(ToolCall),
	ToolResult(ToolResult),
	Message(Message),
	Unstructured { event_type: String, payload: Value },
}
impl EventPayload {
	pub fn event_type(&self) -> &str {
		match self {
			Self::ToolCall(_) => EVENT_TYPE_TOOL_CALL,
			Self::ToolResult(_) => EVENT_TYPE_TOOL_RESULT,
			Self::Message(_) => EVENT_TYPE_MESSAGE,
			Self::Unstructured { event_type, .. } => event_type.as_str(),
		}
	}

	pub fn from_parts(event_type: String, payload: Value) -> Self {
		let decoded = match event_type.as_str() {
			EVENT_TYPE_TOOL_CALL =>
				serde_json::from_value::<ToolCall>(payload.clone()).map(Self::ToolCall).ok(),
			EVENT_TYPE_TOOL_RESULT =>
				serde_json::from_value::<ToolResult>(payload.clone()).map(Self::ToolResult).ok(),
			EVENT_TYPE_MESSAGE =>
				serde_json::from_value::<Message>(payload.clone()).map(Self::Message).ok(),
			_ => None,
		};

		decoded.unwrap_or(Self::Unstructured { event_type, payload })
	}

	pub fn into_parts(self) -> (String, Value) {
		let encoded = match &self {
			Self::ToolCall(call) => serde_json::to_value(call),
			Self::ToolResult(result) => serde_json::to_value(result),
			Self::Message(message) => serde_json::to_value(message),
			Self::Unstructured { .. } => Ok(Value::Null),
		};

		match self {
			Self::Unstructured { event_type, payload } => (event_type, payload),
			other => (other.event_type().to_string(), encoded.unwrap_or(Value::Null)),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTraceEvent", into = "RawTraceEvent")]
pub struct TraceEvent {
	pub id: String,
	pub timestamp: OffsetDateTime,
	pub session_id: String,
	pub harness: String,
	pub scope: Scope,
	pub payload: EventPayload,
	pub metrics: Metrics,
	pub agent_id: Option<String>,
	pub actor_id: Option<String>,
	pub tags: Vec<String>,
}
impl TraceEvent {
	pub fn event_type(&self) -> &str {
		self.payload.event_type()
	}

	pub fn tool_result(&self) -> Option<&ToolResult> {
		match &self.payload {
			EventPayload::ToolResult(result) => Some(result),
			_ => None,
		}
	}

	/// Outcome of the event. Tool results fail on `is_error`, a non-zero exit code, or a
	/// failure outcome in the metrics; other events only report what the metrics say.
	pub fn outcome(&self) -> Option<Outcome> {
		match &self.payload {
			EventPayload::ToolResult(result) => {
				let failed = result.is_error
					|| result.exit_code.is_some_and(|code| code != 0)
					|| self.metrics.outcome == Some(Outcome::Failure);

				Some(if failed { Outcome::Failure } else { Outcome::Success })
			},
			_ => self.metrics.outcome,
		}
	}

	pub fn is_failed_tool_result(&self) -> bool {
		self.tool_result().is_some() && self.outcome() == Some(Outcome::Failure)
	}

	pub fn is_successful_tool_result(&self) -> bool {
		self.tool_result().is_some() && self.outcome() == Some(Outcome::Success)
	}

	pub fn has_tag(&self, tag: &str) -> bool {
		self.tags.iter().any(|candidate| candidate == tag)
	}

	pub fn validate(&self) -> Result<()> {
		if self.id.trim().is_empty() {
			return Err(Error::MalformedEvent {
				event_id: self.id.clone(),
				reason: "id must be non-empty.".to_string(),
			});
		}
		if self.session_id.trim().is_empty() {
			return Err(Error::MalformedEvent {
				event_id: self.id.clone(),
				reason: "session_id must be non-empty.".to_string(),
			});
		}

		Ok(())
	}

	pub fn cmp_chronological(&self, other: &Self) -> Ordering {
		self.timestamp.cmp(&other.timestamp).then_with(|| self.id.cmp(&other.id))
	}
}

pub fn sort_chronological(events: &mut [TraceEvent]) {
	events.sort_by(TraceEvent::cmp_chronological);
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawTraceEvent {
	id: String,
	#[serde(with = "crate::time_serde")]
	timestamp: OffsetDateTime,
	#[serde(alias = "sessionId")]
	session_id: String,
	#[serde(default)]
	harness: String,
	scope: Scope,
	#[serde(rename = "type")]
	event_type: String,
	#[serde(default)]
	payload: Value,
	#[serde(default)]
	metrics: Metrics,
	#[serde(default, alias = "agentId", skip_serializing_if = "Option::is_none")]
	agent_id: Option<String>,
	#[serde(default, alias = "actorId", skip_serializing_if = "Option::is_none")]
	actor_id: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	tags: Vec<String>,
}
impl From<RawTraceEvent> for TraceEvent {
	fn from(raw: RawTraceEvent) -> Self {
		Self {
			payload: EventPayload::from_parts(raw.event_type, raw.payload),
			id: raw.id,
			timestamp: raw.timestamp,
			session_id: raw.session_id,
			harness: raw.harness,
			scope: raw.scope,
			metrics: raw.metrics,
			agent_id: raw.agent_id,
			actor_id: raw.actor_id,
			tags: raw.tags,
		}
	}
}
impl From<TraceEvent> for RawTraceEvent {
	fn from(event: TraceEvent) -> Self {
		let (event_type, payload) = event.payload.into_parts();

		Self {
			id: event.id,
			timestamp: event.timestamp,
			session_id: event.session_id,
			harness: event.harness,
			scope: event.scope,
			event_type,
			payload,
			metrics: event.metrics,
			agent_id: event.agent_id,
			actor_id: event.actor_id,
			tags: event.tags,
		}
	}
}
