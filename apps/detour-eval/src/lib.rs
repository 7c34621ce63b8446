use std::{
	fs,
	path::{Path, PathBuf},
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Serialize, de::DeserializeOwned};
use tracing_subscriber::EnvFilter;

use detour_domain::TraceEvent;
use detour_gate::{GateReport, ReviewPlan, ReviewVote};

#[derive(Debug, Parser)]
#[command(
	version = detour_cli::VERSION,
	rename_all = "kebab",
	styles = detour_cli::styles(),
)]
pub struct Args {
	/// Built-in defaults apply when omitted.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: Option<PathBuf>,
	/// Trace events, one JSON object per line.
	#[arg(long, short = 'e', value_name = "FILE")]
	pub events: PathBuf,
	/// Reviewer votes, one JSON object per line.
	#[arg(long, short = 'l', value_name = "FILE")]
	pub labels: Option<PathBuf>,
	/// Writes a review plan for the judged failures.
	#[arg(long, value_name = "FILE")]
	pub review_plan: Option<PathBuf>,
	#[arg(long, value_name = "FILE")]
	pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct EvalOutput {
	config_path: Option<String>,
	events_path: String,
	labels_path: Option<String>,
	event_count: usize,
	skipped_event_lines: usize,
	vote_count: usize,
	report: GateReport,
}

/// Lines that parsed, and how many were skipped.
#[derive(Debug)]
pub struct JsonLines<T> {
	pub records: Vec<T>,
	pub skipped: usize,
}

pub fn run(args: Args) -> color_eyre::Result<()> {
	let cfg = match &args.config {
		Some(path) => detour_config::load(path)?,
		None => detour_config::defaults(),
	};
	let filter = EnvFilter::new(cfg.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let events: JsonLines<TraceEvent> = load_jsonl(&args.events, "trace event")?;
	let votes = match &args.labels {
		Some(path) => load_jsonl::<ReviewVote>(path, "review vote")?.records,
		None => Vec::new(),
	};
	let labels = (!votes.is_empty()).then(|| detour_gate::merge_review_votes(&votes));
	let report = detour_gate::evaluate_gate(&events.records, labels.as_ref(), &cfg)?;

	if let Some(path) = &args.review_plan {
		let plan = review_plan(&events.records, &cfg)?;

		fs::write(path, serde_json::to_string_pretty(&plan)?)?;

		tracing::info!(
			path = %path.display(),
			assignment_count = plan.assignments.len(),
			"Wrote review plan."
		);
	}

	let output = EvalOutput {
		config_path: args.config.as_ref().map(|path| path.display().to_string()),
		events_path: args.events.display().to_string(),
		labels_path: args.labels.as_ref().map(|path| path.display().to_string()),
		event_count: events.records.len(),
		skipped_event_lines: events.skipped,
		vote_count: votes.len(),
		report,
	};
	let json = serde_json::to_string_pretty(&output)?;

	if let Some(out_path) = &args.out {
		fs::write(out_path, &json)?;
	} else {
		println!("{json}");
	}

	if !output.report.pass {
		return Err(eyre::eyre!(
			"Trajectory outcome gate failed: {}",
			output.report.failures.join(" ")
		));
	}

	Ok(())
}

/// Parses JSON Lines, skipping blank lines and logging the ones that do not decode.
pub fn parse_jsonl<T>(raw: &str, kind: &str) -> JsonLines<T>
where
	T: DeserializeOwned,
{
	let mut out = JsonLines { records: Vec::new(), skipped: 0 };

	for (idx, line) in raw.lines().enumerate() {
		let line = line.trim();

		if line.is_empty() {
			continue;
		}

		match serde_json::from_str::<T>(line) {
			Ok(record) => out.records.push(record),
			Err(err) => {
				tracing::warn!(kind, line = idx + 1, error = %err, "Skipping malformed line.");

				out.skipped += 1;
			},
		}
	}

	out
}

fn load_jsonl<T>(path: &Path, kind: &str) -> color_eyre::Result<JsonLines<T>>
where
	T: DeserializeOwned,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read {}: {err}", path.display()))?;

	Ok(parse_jsonl(&raw, kind))
}

/// Judged failures go to review; abstained ones have no verdict to check.
fn review_plan(
	events: &[TraceEvent],
	cfg: &detour_config::Config,
) -> color_eyre::Result<ReviewPlan> {
	let failures: Vec<String> = events
		.iter()
		.filter(|event| {
			detour_gate::classify_trajectory_issue(event).is_some_and(|issue| !issue.is_abstained())
		})
		.map(|event| event.id.clone())
		.collect();

	Ok(detour_gate::build_review_plan(&failures, &cfg.review)?)
}
