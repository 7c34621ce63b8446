use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
	ArmTotals, EpisodeOptions, FamilyEligibility, PairingOptions, ReductionIntervals, Reductions,
	Result, ReviewLabel,
	classify::classify_trajectory_issue,
	episodes::extract_trajectory_outcome_episodes,
	pairing::pair_episodes,
	stats::{arm_totals, bootstrap_intervals},
};
use detour_config::Config;
use detour_domain::TraceEvent;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Coverage {
	pub failure_count: usize,
	pub judged_count: usize,
	pub abstained_count: usize,
	/// Share of failures the classifier ruled on. `1.0` when there are no failures.
	pub judgeable_coverage: f64,
}

/// Classifier verdicts against merged review labels. Abstained verdicts and abstained or
/// missing labels are left out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
	pub true_positive: usize,
	pub false_positive: usize,
	pub true_negative: usize,
	pub false_negative: usize,
	pub unlabeled: usize,
}
impl ConfusionMatrix {
	pub fn labeled(&self) -> usize {
		self.true_positive + self.false_positive + self.true_negative + self.false_negative
	}

	pub fn precision(&self) -> Option<f64> {
		ratio(self.true_positive, self.true_positive + self.false_positive)
	}

	pub fn recall(&self) -> Option<f64> {
		ratio(self.true_positive, self.true_positive + self.false_negative)
	}

	pub fn accuracy(&self) -> Option<f64> {
		ratio(self.true_positive + self.true_negative, self.labeled())
	}

	fn record(&mut self, predicted_harmful: bool, label: Option<ReviewLabel>) {
		match (predicted_harmful, label) {
			(true, Some(ReviewLabel::Harmful)) => self.true_positive += 1,
			(true, Some(ReviewLabel::Harmless)) => self.false_positive += 1,
			(false, Some(ReviewLabel::Harmless)) => self.true_negative += 1,
			(false, Some(ReviewLabel::Harmful)) => self.false_negative += 1,
			(_, Some(ReviewLabel::Abstain) | None) => self.unlabeled += 1,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct GateReport {
	pub pass: bool,
	/// One entry per unmet threshold, prefixed with the threshold's config key.
	pub failures: Vec<String>,
	pub episode_count: usize,
	pub pair_count: usize,
	pub families: Vec<FamilyEligibility>,
	pub off: ArmTotals,
	pub on: ArmTotals,
	pub reductions: Reductions,
	pub intervals: ReductionIntervals,
	pub gated_on_lower_bound: bool,
	pub coverage: Coverage,
	pub issue_counts: BTreeMap<String, usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confusion: Option<ConfusionMatrix>,
}

struct Triage {
	coverage: Coverage,
	issue_counts: BTreeMap<String, usize>,
	confusion: Option<ConfusionMatrix>,
}

/// Compares hinted against unhinted episodes and checks the result against `cfg.gate`.
///
/// Unmet thresholds never error; they land in [`GateReport::failures`]. Only invalid
/// configuration is an error.
pub fn evaluate_gate(
	events: &[TraceEvent],
	labels: Option<&BTreeMap<String, ReviewLabel>>,
	cfg: &Config,
) -> Result<GateReport> {
	detour_config::validate(cfg)?;

	let gate = &cfg.gate;
	let episodes = extract_trajectory_outcome_episodes(events, &EpisodeOptions::from_config(cfg));
	let pairing = pair_episodes(&episodes, &PairingOptions::from_config(gate));
	let (off, on) = arm_totals(&pairing.pairs);
	let reductions = Reductions::between(&off, &on);
	let intervals = bootstrap_intervals(
		&pairing.pairs,
		gate.bootstrap_samples,
		gate.bootstrap_seed,
		gate.confidence_level,
	)?;
	let triage = triage_failures(events, labels);
	let failures =
		gate_failures(gate, pairing.pairs.len(), &reductions, &intervals, &triage.coverage);
	let report = GateReport {
		pass: failures.is_empty(),
		failures,
		episode_count: episodes.len(),
		pair_count: pairing.pairs.len(),
		families: pairing.families,
		off,
		on,
		reductions,
		intervals,
		gated_on_lower_bound: gate.gate_on_lower_bound,
		coverage: triage.coverage,
		issue_counts: triage.issue_counts,
		confusion: triage.confusion,
	};

	tracing::info!(
		pass = report.pass,
		pair_count = report.pair_count,
		failure_count = report.failures.len(),
		judgeable_coverage = report.coverage.judgeable_coverage,
		"Evaluated trajectory outcome gate."
	);

	Ok(report)
}

fn triage_failures(
	events: &[TraceEvent],
	labels: Option<&BTreeMap<String, ReviewLabel>>,
) -> Triage {
	let mut coverage = Coverage::default();
	let mut issue_counts = BTreeMap::new();
	let mut confusion = labels.map(|_| ConfusionMatrix::default());

	for event in events {
		if event.validate().is_err() {
			continue;
		}

		let Some(issue) = classify_trajectory_issue(event) else { continue };

		coverage.failure_count += 1;

		*issue_counts.entry(issue.issue_kind.as_str().to_string()).or_insert(0) += 1;

		if issue.is_abstained() {
			coverage.abstained_count += 1;

			continue;
		}

		coverage.judged_count += 1;

		if let (Some(matrix), Some(labels)) = (confusion.as_mut(), labels) {
			matrix.record(issue.harmful, labels.get(&event.id).copied());
		}
	}

	coverage.judgeable_coverage =
		ratio(coverage.judged_count, coverage.failure_count).unwrap_or(1.0);

	Triage { coverage, issue_counts, confusion }
}

fn gate_failures(
	gate: &detour_config::Gate,
	pair_count: usize,
	reductions: &Reductions,
	intervals: &ReductionIntervals,
	coverage: &Coverage,
) -> Vec<String> {
	let mut failures = Vec::new();

	if pair_count < gate.min_pairs as usize {
		failures.push(format!(
			"min_pairs: {pair_count} paired episodes is below the minimum of {}.",
			gate.min_pairs
		));
	}

	let (basis, observed) = if gate.gate_on_lower_bound {
		let lower = Reductions {
			harmful_retries: intervals.harmful_retries.lower,
			wall_time: intervals.wall_time.lower,
			tokens: intervals.tokens.lower,
		};

		("lower bound", lower)
	} else {
		("point estimate", *reductions)
	};

	for (key, label, value, threshold) in [
		(
			"min_harmful_retry_reduction",
			"harmful retry reduction",
			observed.harmful_retries,
			gate.min_harmful_retry_reduction,
		),
		(
			"min_wall_time_reduction",
			"wall time reduction",
			observed.wall_time,
			gate.min_wall_time_reduction,
		),
		("min_token_reduction", "token reduction", observed.tokens, gate.min_token_reduction),
	] {
		if value < threshold {
			failures.push(format!(
				"{key}: {label} {value:.3} ({basis}) is below the minimum of {threshold:.3}."
			));
		}
	}

	if coverage.judgeable_coverage < gate.min_judgeable_coverage {
		failures.push(format!(
			"min_judgeable_coverage: judgeable coverage {:.3} ({} of {} failures abstained) is below the minimum of {:.3}.",
			coverage.judgeable_coverage,
			coverage.abstained_count,
			coverage.failure_count,
			gate.min_judgeable_coverage
		));
	}

	failures
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
	(denominator > 0).then(|| numerator as f64 / denominator as f64)
}
