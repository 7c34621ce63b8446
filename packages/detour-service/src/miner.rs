//! Streaming wrong-turn detection.
//!
//! A wrong turn is a failed tool result followed later in the same session by a successful one in
//! the same operation family whose attempt differs. Recurring arcs collapse into one artifact
//! whose support grows with every occurrence.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::Serialize;
use time::OffsetDateTime;

use crate::Result;
use detour_domain::{
	NearDupDetector, TraceEvent,
	signature::{attempt_content, error_signature, families_overlap, operation_family},
};

pub const ARTIFACT_KIND: &str = "wrong_turn_fix";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinedArtifact {
	pub id: String,
	pub kind: String,
	pub family: String,
	pub failed_attempt: String,
	pub fix_attempt: String,
	pub error_signature: Option<String>,
	/// `[failure_id, success_id]` of the first detected arc.
	pub evidence_event_ids: Vec<String>,
	pub confidence: f32,
	pub support_count: u32,
	pub support_session_count: u32,
	pub cross_session_support: bool,
	pub sessions: BTreeSet<String>,
	#[serde(with = "detour_domain::time_serde")]
	pub first_seen_at: OffsetDateTime,
	#[serde(with = "detour_domain::time_serde")]
	pub last_seen_at: OffsetDateTime,
	#[serde(skip)]
	signature: String,
	#[serde(skip)]
	seq: u64,
}
impl MinedArtifact {
	/// Text compared by the near-duplicate detector.
	pub fn signature(&self) -> &str {
		&self.signature
	}
}

#[derive(Clone, Debug)]
pub struct MinerUpdate {
	pub artifact: MinedArtifact,
	pub created: bool,
}

pub struct WrongTurnMiner {
	cfg: detour_config::Miner,
	detector: NearDupDetector,
	pending: HashMap<String, VecDeque<PendingFailure>>,
	artifacts: Vec<MinedArtifact>,
	next_seq: u64,
}
impl WrongTurnMiner {
	pub fn new(cfg: &detour_config::Miner) -> Result<Self> {
		let detector = NearDupDetector::new(f64::from(cfg.near_dup_threshold))?;

		Ok(Self {
			cfg: cfg.clone(),
			detector,
			pending: HashMap::new(),
			artifacts: Vec::new(),
			next_seq: 0,
		})
	}

	/// Feeds one event. Returns the artifact the event created or strengthened, if any.
	pub fn ingest(&mut self, event: &TraceEvent) -> Option<MinerUpdate> {
		let step = self.plan(event)?;

		self.commit(step)
	}

	/// Works out what `event` would change without changing anything. Malformed events and tool
	/// results without a family or attempt yield `None`.
	pub fn plan(&self, event: &TraceEvent) -> Option<MinerStep> {
		if let Err(err) = event.validate() {
			tracing::warn!(event_id = %event.id, error = %err, "Skipping malformed trace event.");

			return None;
		}

		let result = event.tool_result()?;
		let prefix_tokens = self.cfg.family_prefix_tokens as usize;
		let Some(family) = operation_family(result, prefix_tokens) else {
			tracing::warn!(event_id = %event.id, "Skipping tool result without command or tool.");

			return None;
		};
		let Some(attempt) = attempt_content(result) else {
			tracing::warn!(event_id = %event.id, "Skipping tool result without attempt content.");

			return None;
		};
		let session_id = event.session_id.clone();

		if event.is_failed_tool_result() {
			let failure = PendingFailure {
				event_id: event.id.clone(),
				family,
				attempt,
				has_command: result.command().is_some(),
				error_signature: error_signature(result.output()),
			};

			return Some(MinerStep { session_id, action: StepAction::Hold(failure) });
		}

		let queue = self.pending.get(&session_id)?;
		let resolved: Vec<String> = queue
			.iter()
			.filter(|failure| families_overlap(&failure.family, &family))
			.map(|failure| failure.event_id.clone())
			.collect();

		if resolved.is_empty() {
			return None;
		}

		let arc = queue
			.iter()
			.rev()
			.find(|failure| families_overlap(&failure.family, &family) && failure.attempt != attempt)
			.cloned()
			.map(|failure| {
				let family =
					if failure.family.len() <= family.len() { failure.family.clone() } else { family };

				WrongTurnArc {
					signature: arc_signature(&failure, &family, &attempt, result.command().is_some()),
					family,
					failure,
					fix_attempt: attempt,
					success_id: event.id.clone(),
					session_id: session_id.clone(),
					at: event.timestamp,
				}
			});

		if arc.is_none() {
			tracing::debug!(%session_id, event_id = %event.id, "Success resolved only bare retries.");
		}

		Some(MinerStep { session_id, action: StepAction::Resolve { resolved, arc } })
	}

	/// The artifact `step` would create or strengthen against the current state.
	pub fn preview(&self, step: &MinerStep) -> Option<MinerUpdate> {
		let StepAction::Resolve { arc: Some(arc), .. } = &step.action else { return None };

		Some(match self.find_artifact(arc) {
			Some(idx) => MinerUpdate {
				artifact: strengthened(&self.cfg, &self.artifacts[idx], arc),
				created: false,
			},
			None => MinerUpdate { artifact: new_artifact(&self.cfg, arc, self.next_seq), created: true },
		})
	}

	/// Applies a planned step.
	pub fn commit(&mut self, step: MinerStep) -> Option<MinerUpdate> {
		match step.action {
			StepAction::Hold(failure) => {
				self.push_pending(&step.session_id, failure);

				None
			},
			StepAction::Resolve { resolved, arc } => {
				if let Some(queue) = self.pending.get_mut(&step.session_id) {
					queue.retain(|failure| !resolved.contains(&failure.event_id));

					if queue.is_empty() {
						self.pending.remove(&step.session_id);
					}
				}

				arc.map(|arc| self.record(arc))
			},
		}
	}

	/// Up to `limit` artifacts, strongest first.
	pub fn mine(&self, limit: Option<usize>) -> Vec<MinedArtifact> {
		let mut out = self.artifacts.clone();

		out.sort_by(|left, right| {
			right
				.confidence
				.total_cmp(&left.confidence)
				.then_with(|| right.support_count.cmp(&left.support_count))
				.then_with(|| right.support_session_count.cmp(&left.support_session_count))
				.then_with(|| left.seq.cmp(&right.seq))
		});

		if let Some(limit) = limit {
			out.truncate(limit);
		}

		out
	}

	pub fn artifact_count(&self) -> usize {
		self.artifacts.len()
	}

	pub fn pending_failures(&self, session_id: &str) -> usize {
		self.pending.get(session_id).map(VecDeque::len).unwrap_or(0)
	}

	fn push_pending(&mut self, session_id: &str, failure: PendingFailure) {
		let cap = (self.cfg.max_pending_failures as usize).max(1);
		let queue = self.pending.entry(session_id.to_string()).or_default();

		queue.push_back(failure);

		while queue.len() > cap {
			if let Some(evicted) = queue.pop_front() {
				tracing::debug!(
					session_id,
					event_id = %evicted.event_id,
					"Evicted oldest pending failure."
				);
			}
		}
	}

	fn find_artifact(&self, arc: &WrongTurnArc) -> Option<usize> {
		self.artifacts.iter().position(|artifact| {
			artifact.family == arc.family
				&& self.detector.is_near_duplicate(&artifact.signature, &arc.signature)
		})
	}

	fn record(&mut self, arc: WrongTurnArc) -> MinerUpdate {
		match self.find_artifact(&arc) {
			Some(idx) => {
				let artifact = strengthened(&self.cfg, &self.artifacts[idx], &arc);

				tracing::debug!(
					artifact_id = %artifact.id,
					support_count = artifact.support_count,
					support_session_count = artifact.support_session_count,
					"Strengthened wrong-turn artifact."
				);

				self.artifacts[idx] = artifact.clone();

				MinerUpdate { artifact, created: false }
			},
			None => {
				let artifact = new_artifact(&self.cfg, &arc, self.next_seq);

				self.next_seq += 1;

				tracing::debug!(
					artifact_id = %artifact.id,
					family = %artifact.family,
					"Mined wrong-turn artifact."
				);

				self.artifacts.push(artifact.clone());

				MinerUpdate { artifact, created: true }
			},
		}
	}
}

/// A planned miner change, applied with [`WrongTurnMiner::commit`].
#[derive(Clone, Debug)]
pub struct MinerStep {
	session_id: String,
	action: StepAction,
}

#[derive(Clone, Debug)]
enum StepAction {
	Hold(PendingFailure),
	/// Pending failures the success resolves, and the arc it closes unless all were bare retries.
	Resolve { resolved: Vec<String>, arc: Option<WrongTurnArc> },
}

fn strengthened(
	cfg: &detour_config::Miner,
	artifact: &MinedArtifact,
	arc: &WrongTurnArc,
) -> MinedArtifact {
	let mut artifact = artifact.clone();

	artifact.support_count = artifact.support_count.saturating_add(1);
	artifact.sessions.insert(arc.session_id.clone());
	artifact.support_session_count = artifact.sessions.len() as u32;
	artifact.cross_session_support = artifact.support_session_count >= 2;
	artifact.last_seen_at = artifact.last_seen_at.max(arc.at);
	artifact.confidence = artifact.confidence.max(confidence(
		cfg,
		artifact.support_count,
		artifact.support_session_count,
	));

	artifact
}

fn new_artifact(cfg: &detour_config::Miner, arc: &WrongTurnArc, seq: u64) -> MinedArtifact {
	MinedArtifact {
		id: artifact_id(&arc.family, &arc.signature),
		kind: ARTIFACT_KIND.to_string(),
		family: arc.family.clone(),
		failed_attempt: arc.failure.attempt.clone(),
		fix_attempt: arc.fix_attempt.clone(),
		error_signature: arc.failure.error_signature.clone(),
		evidence_event_ids: vec![arc.failure.event_id.clone(), arc.success_id.clone()],
		confidence: confidence(cfg, 1, 1),
		support_count: 1,
		support_session_count: 1,
		cross_session_support: false,
		sessions: BTreeSet::from([arc.session_id.clone()]),
		first_seen_at: arc.at,
		last_seen_at: arc.at,
		signature: arc.signature.clone(),
		seq,
	}
}

/// `base + support_weight * s / (s + 1) + session_weight * (n - 1) / n`, clamped to `[0, 1]`.
pub fn confidence(cfg: &detour_config::Miner, support_count: u32, session_count: u32) -> f32 {
	let s = support_count as f32;
	let n = session_count.max(1) as f32;
	let raw = cfg.base_confidence
		+ cfg.support_weight * s / (s + 1.0)
		+ cfg.session_weight * (n - 1.0) / n;

	raw.clamp(0.0, 1.0)
}

#[derive(Clone, Debug)]
struct PendingFailure {
	event_id: String,
	family: String,
	attempt: String,
	has_command: bool,
	error_signature: Option<String>,
}

#[derive(Clone, Debug)]
struct WrongTurnArc {
	family: String,
	signature: String,
	failure: PendingFailure,
	fix_attempt: String,
	success_id: String,
	session_id: String,
	at: OffsetDateTime,
}

fn arc_signature(
	failure: &PendingFailure,
	family: &str,
	fix_attempt: &str,
	fix_has_command: bool,
) -> String {
	let mut signature = format!("{family} {} {fix_attempt}", failure.attempt);

	if (!failure.has_command || !fix_has_command)
		&& let Some(error) = &failure.error_signature
	{
		signature.push(' ');
		signature.push_str(error);
	}

	signature
}

fn artifact_id(family: &str, signature: &str) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(family.as_bytes());
	hasher.update(b"\n");
	hasher.update(signature.as_bytes());

	let hash = hasher.finalize().to_hex();

	format!("wt_{}", &hash.as_str()[..16])
}
