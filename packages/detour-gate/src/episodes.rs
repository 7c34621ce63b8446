use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::OffsetDateTime;

use crate::{Arm, canary, classify::classify_trajectory_issue};
use detour_domain::{TraceEvent, signature};

pub const HINTS_ON_TAG: &str = "hints:on";
pub const HINTS_OFF_TAG: &str = "hints:off";

/// A run of harmful failures in one family and the success that ended it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Episode {
	pub session_id: String,
	pub family: String,
	pub arm: Arm,
	pub harmful_retries: u32,
	/// Reported latency from the first failure through the success. Falls back to elapsed time
	/// when no event in the span reports latency.
	pub wall_time_ms: u64,
	pub tokens: u64,
	pub failure_event_ids: Vec<String>,
	pub success_event_id: String,
	#[serde(with = "detour_domain::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "detour_domain::time_serde")]
	pub ended_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug)]
pub struct EpisodeOptions {
	pub family_prefix_tokens: usize,
	pub canary_percent: u32,
}
impl EpisodeOptions {
	pub fn from_config(cfg: &detour_config::Config) -> Self {
		Self {
			family_prefix_tokens: cfg.miner.family_prefix_tokens as usize,
			canary_percent: cfg.gate.canary_percent,
		}
	}
}

struct OpenRun {
	start: usize,
	failure_event_ids: Vec<String>,
}

/// Episodes across all sessions, ordered by start time. Events are sorted per session first;
/// malformed events are skipped.
pub fn extract_trajectory_outcome_episodes(
	events: &[TraceEvent],
	options: &EpisodeOptions,
) -> Vec<Episode> {
	let mut sessions: BTreeMap<&str, Vec<&TraceEvent>> = BTreeMap::new();

	for event in events {
		if let Err(err) = event.validate() {
			tracing::warn!(event_id = %event.id, error = %err, "Skipping malformed trace event.");

			continue;
		}

		sessions.entry(event.session_id.as_str()).or_default().push(event);
	}

	let mut out = Vec::new();

	for (session_id, mut session) in sessions {
		session.sort_by(|lhs, rhs| lhs.cmp_chronological(rhs));

		let session_arm = tagged_arm(&session)
			.unwrap_or_else(|| canary::canary_arm(session_id, options.canary_percent));

		out.extend(session_episodes(session_id, &session, session_arm, options));
	}

	out.sort_by(|lhs, rhs| {
		lhs.started_at.cmp(&rhs.started_at).then_with(|| lhs.session_id.cmp(&rhs.session_id))
	});

	out
}

fn session_episodes(
	session_id: &str,
	session: &[&TraceEvent],
	session_arm: Arm,
	options: &EpisodeOptions,
) -> Vec<Episode> {
	let mut open: HashMap<String, OpenRun> = HashMap::new();
	let mut out = Vec::new();

	for (idx, event) in session.iter().enumerate() {
		let Some(result) = event.tool_result() else { continue };
		let Some(family) = signature::operation_family(result, options.family_prefix_tokens)
		else {
			continue;
		};

		if event.is_failed_tool_result() {
			let Some(issue) = classify_trajectory_issue(event) else { continue };

			if !issue.harmful {
				continue;
			}

			open.entry(family)
				.or_insert_with(|| OpenRun { start: idx, failure_event_ids: Vec::new() })
				.failure_event_ids
				.push(event.id.clone());
		} else if let Some(run) = open.remove(&family) {
			let span = &session[run.start..=idx];

			out.push(close_run(session_id, family, run, span, session_arm));
		}
	}

	out
}

fn close_run(
	session_id: &str,
	family: String,
	run: OpenRun,
	span: &[&TraceEvent],
	session_arm: Arm,
) -> Episode {
	let first = span[0];
	let last = span[span.len() - 1];
	let reported =
		span.iter().filter_map(|event| event.metrics.latency_ms).reduce(u64::saturating_add);
	let wall_time_ms = reported.unwrap_or_else(|| elapsed_ms(first.timestamp, last.timestamp));
	let tokens = span.iter().map(|event| event.metrics.total_tokens()).fold(0, u64::saturating_add);

	Episode {
		session_id: session_id.to_string(),
		family,
		arm: tagged_arm(span).unwrap_or(session_arm),
		harmful_retries: u32::try_from(run.failure_event_ids.len()).unwrap_or(u32::MAX),
		wall_time_ms,
		tokens,
		failure_event_ids: run.failure_event_ids,
		success_event_id: last.id.clone(),
		started_at: first.timestamp,
		ended_at: last.timestamp,
	}
}

/// Arm named by the first event carrying a hints tag.
fn tagged_arm(events: &[&TraceEvent]) -> Option<Arm> {
	events.iter().find_map(|event| {
		if event.has_tag(HINTS_ON_TAG) {
			Some(Arm::On)
		} else if event.has_tag(HINTS_OFF_TAG) {
			Some(Arm::Off)
		} else {
			None
		}
	})
}

fn elapsed_ms(start: OffsetDateTime, end: OffsetDateTime) -> u64 {
	u64::try_from((end - start).whole_milliseconds()).unwrap_or(0)
}
