//! Rule-based triage of failing tool results.
//!
//! The rules look at the command and the lowercased output. Reviewers can override the verdict
//! per event with an `issue:<kind>` tag, or withhold it with `issue:abstain`.

use serde::{Deserialize, Serialize};

use detour_domain::{TraceEvent, signature};

pub const ISSUE_TAG_PREFIX: &str = "issue:";
pub const ABSTAIN_TAG: &str = "issue:abstain";

const PROBE_COMMANDS: &[&str] = &[
	"curl", "wget", "http", "ping", "nc", "dig", "nslookup", "which", "whereis", "type", "command",
	"test", "[", "ls", "stat", "grep", "rg", "find",
];
const PROBE_TOOLS: &[&str] = &["webfetch", "web_fetch", "fetch", "glob", "grep", "ls"];
const PROBE_MISSES: &[&str] =
	&["404", "not found", "no such file", "does not exist", "no matches", "no results"];
const TRANSIENT_MARKERS: &[&str] = &[
	"timed out",
	"timeout",
	"connection reset",
	"connection refused",
	"connection aborted",
	"temporarily unavailable",
	"temporary failure",
	"service unavailable",
	"bad gateway",
	"too many requests",
	"rate limit",
	"econnreset",
	"etimedout",
	"eai_again",
	"network is unreachable",
	"could not resolve host",
	" 429",
	" 502",
	" 503",
	" 504",
];
const COMMAND_MISMATCH_MARKERS: &[&str] = &[
	"unrecognized option",
	"unknown option",
	"unrecognized argument",
	"unexpected argument",
	"invalid option",
	"illegal option",
	"unknown flag",
	"unknown command",
	"unknown subcommand",
	"no such subcommand",
	"no such option",
	"invalid argument",
	"usage:",
	"did you mean",
];
const ENVIRONMENT_MISMATCH_MARKERS: &[&str] = &[
	"command not found",
	"not installed",
	"no module named",
	"modulenotfounderror",
	"cannot find module",
	"permission denied",
	"operation not permitted",
	"unsupported engine",
	"requires python",
	"requires node",
	"version mismatch",
	"incompatible",
	"library not loaded",
	"shared object file",
];
const MISSING_CONTEXT_MARKERS: &[&str] = &[
	"no such file or directory",
	"not found",
	"does not exist",
	"cannot find",
	"could not find",
	"undefined",
	"unresolved",
	"not defined",
	"no matches",
	"is not set",
	"missing",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
	BenignProbe,
	TransientExternal,
	CommandMismatch,
	EnvironmentMismatch,
	MissingContext,
	UnknownFailure,
}
impl IssueKind {
	pub const ALL: [Self; 6] = [
		Self::BenignProbe,
		Self::TransientExternal,
		Self::CommandMismatch,
		Self::EnvironmentMismatch,
		Self::MissingContext,
		Self::UnknownFailure,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::BenignProbe => "benign_probe",
			Self::TransientExternal => "transient_external",
			Self::CommandMismatch => "command_mismatch",
			Self::EnvironmentMismatch => "environment_mismatch",
			Self::MissingContext => "missing_context",
			Self::UnknownFailure => "unknown_failure",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
	}

	/// Probes and outages are part of normal work. Everything else, unexplained failures
	/// included, costs the agent a retry it could have avoided.
	pub fn is_harmful(self) -> bool {
		!matches!(self, Self::BenignProbe | Self::TransientExternal)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TrajectoryIssue {
	pub issue_kind: IssueKind,
	pub harmful: bool,
}
impl TrajectoryIssue {
	pub fn new(issue_kind: IssueKind) -> Self {
		Self { issue_kind, harmful: issue_kind.is_harmful() }
	}

	/// Unknown failures carry no verdict a reviewer could check.
	pub fn is_abstained(&self) -> bool {
		self.issue_kind == IssueKind::UnknownFailure
	}
}

/// Classifies a failing tool result. Anything else yields `None`.
pub fn classify_trajectory_issue(event: &TraceEvent) -> Option<TrajectoryIssue> {
	if !event.is_failed_tool_result() {
		return None;
	}

	let result = event.tool_result()?;

	if event.has_tag(ABSTAIN_TAG) {
		return Some(TrajectoryIssue::new(IssueKind::UnknownFailure));
	}
	if let Some(kind) = tagged_kind(event) {
		return Some(TrajectoryIssue::new(kind));
	}

	let program = result.command().and_then(program_name);
	let tool = result.tool().map(str::to_lowercase);
	let output = result.output().to_lowercase();
	let probe = program.as_deref().is_some_and(|program| PROBE_COMMANDS.contains(&program))
		|| (program.is_none()
			&& tool.as_deref().is_some_and(|tool| PROBE_TOOLS.contains(&tool)));

	Some(TrajectoryIssue::new(classify_output(probe, &output)))
}

fn classify_output(probe: bool, output: &str) -> IssueKind {
	if probe && (output.trim().is_empty() || contains_any(output, PROBE_MISSES)) {
		return IssueKind::BenignProbe;
	}
	if contains_any(output, TRANSIENT_MARKERS) {
		return IssueKind::TransientExternal;
	}
	if contains_any(output, COMMAND_MISMATCH_MARKERS) {
		return IssueKind::CommandMismatch;
	}
	if contains_any(output, ENVIRONMENT_MISMATCH_MARKERS) {
		return IssueKind::EnvironmentMismatch;
	}
	if contains_any(output, MISSING_CONTEXT_MARKERS) {
		return IssueKind::MissingContext;
	}

	IssueKind::UnknownFailure
}

fn tagged_kind(event: &TraceEvent) -> Option<IssueKind> {
	event.tags.iter().find_map(|tag| tag.strip_prefix(ISSUE_TAG_PREFIX).and_then(IssueKind::parse))
}

/// Leading program of a command, without its directory.
fn program_name(command: &str) -> Option<String> {
	let family = signature::command_family(command, 1)?;

	family.rsplit('/').next().map(str::to_string)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
	needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn probe_misses_are_benign() {
		assert_eq!(
			classify_output(true, "curl: (22) the requested url returned error: 404"),
			IssueKind::BenignProbe
		);
		assert_eq!(classify_output(true, ""), IssueKind::BenignProbe);
		assert_eq!(classify_output(false, "404"), IssueKind::UnknownFailure);
	}

	#[test]
	fn environment_markers_win_over_missing_context() {
		assert_eq!(
			classify_output(false, "bash: rg: command not found"),
			IssueKind::EnvironmentMismatch
		);
		assert_eq!(
			classify_output(false, "cat: notes.md: no such file or directory"),
			IssueKind::MissingContext
		);
	}

	#[test]
	fn program_name_drops_the_directory() {
		assert_eq!(program_name("/usr/bin/curl -sf https://example.com").as_deref(), Some("curl"));
		assert_eq!(program_name("FOO=1 sudo wget x").as_deref(), Some("wget"));
	}

	#[test]
	fn kinds_parse_from_their_names() {
		for kind in IssueKind::ALL {
			assert_eq!(IssueKind::parse(kind.as_str()), Some(kind));
		}

		assert_eq!(IssueKind::parse("abstain"), None);
	}
}
