//! Human review of classifier verdicts.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashSet},
};

use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewLabel {
	Harmful,
	Harmless,
	Abstain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVote {
	pub event_id: String,
	pub reviewer_id: String,
	pub label: ReviewLabel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReviewAssignment {
	pub event_id: String,
	pub reviewer_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReviewPlan {
	pub assignments: Vec<ReviewAssignment>,
}
impl ReviewPlan {
	pub fn for_reviewer(&self, reviewer_id: &str) -> Vec<&str> {
		self.assignments
			.iter()
			.filter(|assignment| assignment.reviewer_ids.iter().any(|id| id == reviewer_id))
			.map(|assignment| assignment.event_id.as_str())
			.collect()
	}
}

/// Assigns each failure to `review.overlap` distinct reviewers.
///
/// Failures and reviewers are shuffled once with `review.seed`; reviewers are then dealt in
/// rotation so the load stays within one assignment between reviewers. Duplicate event ids are
/// planned once.
pub fn build_review_plan(
	failure_event_ids: &[String],
	review: &detour_config::Review,
) -> Result<ReviewPlan> {
	let reviewer_count = review.reviewer_ids.len();
	let overlap = review.overlap as usize;

	if reviewer_count == 0 {
		return Err(Error::InvalidArgument {
			message: "review.reviewer_ids must list at least one reviewer.".to_string(),
		});
	}
	if overlap == 0 || overlap > reviewer_count {
		return Err(Error::InvalidArgument {
			message: "review.overlap must be between one and the number of reviewers.".to_string(),
		});
	}

	let mut seen = HashSet::new();
	let mut events: Vec<&String> =
		failure_event_ids.iter().filter(|&id| seen.insert(id.as_str())).collect();
	let mut reviewers: Vec<&String> = review.reviewer_ids.iter().collect();
	let mut rng = ChaCha8Rng::seed_from_u64(review.seed);

	events.shuffle(&mut rng);
	reviewers.shuffle(&mut rng);

	let assignments = events
		.into_iter()
		.enumerate()
		.map(|(idx, event_id)| {
			let start = idx * overlap;
			let reviewer_ids = (0..overlap)
				.map(|offset| reviewers[(start + offset) % reviewer_count].to_string())
				.collect();

			ReviewAssignment { event_id: event_id.to_string(), reviewer_ids }
		})
		.collect();

	Ok(ReviewPlan { assignments })
}

/// Majority label per event over harmful and harmless votes. Ties, abstain votes only, and no
/// votes all merge to [`ReviewLabel::Abstain`]. A reviewer's later vote on the same event
/// replaces the earlier one.
pub fn merge_review_votes(votes: &[ReviewVote]) -> BTreeMap<String, ReviewLabel> {
	let mut ballots: BTreeMap<&str, BTreeMap<&str, ReviewLabel>> = BTreeMap::new();

	for vote in votes {
		ballots
			.entry(vote.event_id.as_str())
			.or_default()
			.insert(vote.reviewer_id.as_str(), vote.label);
	}

	ballots
		.into_iter()
		.map(|(event_id, ballot)| {
			let harmful = ballot.values().filter(|label| **label == ReviewLabel::Harmful).count();
			let harmless = ballot.values().filter(|label| **label == ReviewLabel::Harmless).count();
			let label = match harmful.cmp(&harmless) {
				Ordering::Greater => ReviewLabel::Harmful,
				Ordering::Less => ReviewLabel::Harmless,
				Ordering::Equal => ReviewLabel::Abstain,
			};

			(event_id.to_string(), label)
		})
		.collect()
}
