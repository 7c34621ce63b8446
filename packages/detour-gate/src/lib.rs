//! Offline evaluation of whether surfacing hints shortens agent trajectories.
//!
//! Failing tool results are triaged by [`classify::classify_trajectory_issue`], grouped into
//! episodes, paired hints-off against hints-on per family, and summarized with seeded bootstrap
//! intervals. [`gate::evaluate_gate`] turns that into a pass or a list of named failures.

pub mod canary;
pub mod classify;
pub mod episodes;
pub mod gate;
pub mod pairing;
pub mod review;
pub mod stats;

mod error;

pub use classify::{IssueKind, TrajectoryIssue, classify_trajectory_issue};
pub use episodes::{Episode, EpisodeOptions, extract_trajectory_outcome_episodes};
pub use error::{Error, Result};
pub use gate::{ConfusionMatrix, Coverage, GateReport, evaluate_gate};
pub use pairing::{EpisodePair, FamilyEligibility, Pairing, PairingOptions, pair_episodes};
pub use review::{
	ReviewAssignment, ReviewLabel, ReviewPlan, ReviewVote, build_review_plan, merge_review_votes,
};
pub use stats::{
	ArmTotals, Interval, ReductionIntervals, Reductions, bootstrap_intervals, relative_reduction,
};

use serde::{Deserialize, Serialize};

/// Whether hints were surfaced to the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
	Off,
	On,
}
