use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::{Episode, EpisodePair, Error, Result};

/// `(off - on) / off`, with `0` when both arms are zero and `-1` when only the hinted arm is
/// nonzero.
pub fn relative_reduction(off: f64, on: f64) -> f64 {
	if off > 0.0 {
		(off - on) / off
	} else if on > 0.0 {
		-1.0
	} else {
		0.0
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ArmTotals {
	pub episodes: usize,
	pub harmful_retries: u64,
	pub wall_time_ms: u64,
	pub tokens: u64,
}
impl ArmTotals {
	pub fn add(&mut self, episode: &Episode) {
		self.episodes += 1;
		self.harmful_retries =
			self.harmful_retries.saturating_add(u64::from(episode.harmful_retries));
		self.wall_time_ms = self.wall_time_ms.saturating_add(episode.wall_time_ms);
		self.tokens = self.tokens.saturating_add(episode.tokens);
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Reductions {
	pub harmful_retries: f64,
	pub wall_time: f64,
	pub tokens: f64,
}
impl Reductions {
	pub fn between(off: &ArmTotals, on: &ArmTotals) -> Self {
		Self {
			harmful_retries: relative_reduction(
				off.harmful_retries as f64,
				on.harmful_retries as f64,
			),
			wall_time: relative_reduction(off.wall_time_ms as f64, on.wall_time_ms as f64),
			tokens: relative_reduction(off.tokens as f64, on.tokens as f64),
		}
	}
}

/// Per-arm sums over paired episodes.
pub fn arm_totals(pairs: &[EpisodePair]) -> (ArmTotals, ArmTotals) {
	let mut off = ArmTotals::default();
	let mut on = ArmTotals::default();

	for pair in pairs {
		off.add(&pair.off);
		on.add(&pair.on);
	}

	(off, on)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Interval {
	pub lower: f64,
	pub upper: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ReductionIntervals {
	pub harmful_retries: Interval,
	pub wall_time: Interval,
	pub tokens: Interval,
}

/// Percentile bootstrap over paired episodes. Each resample draws whole pairs with replacement,
/// so the three metrics share resamples. The result depends only on the pairs, `samples`, and
/// `seed`.
pub fn bootstrap_intervals(
	pairs: &[EpisodePair],
	samples: u32,
	seed: u64,
	confidence_level: f64,
) -> Result<ReductionIntervals> {
	if samples == 0 {
		return Err(Error::InvalidArgument {
			message: "Bootstrap needs at least one sample.".to_string(),
		});
	}
	if !confidence_level.is_finite() || confidence_level <= 0.0 || confidence_level >= 1.0 {
		return Err(Error::InvalidArgument {
			message: "Confidence level must be in the range (0.0, 1.0).".to_string(),
		});
	}
	if pairs.is_empty() {
		return Ok(ReductionIntervals::default());
	}

	let mut rng = ChaCha8Rng::seed_from_u64(seed);
	let mut retries = Vec::with_capacity(samples as usize);
	let mut wall_time = Vec::with_capacity(samples as usize);
	let mut tokens = Vec::with_capacity(samples as usize);

	for _ in 0..samples {
		let mut off = ArmTotals::default();
		let mut on = ArmTotals::default();

		for _ in 0..pairs.len() {
			let pair = &pairs[rng.random_range(0..pairs.len())];

			off.add(&pair.off);
			on.add(&pair.on);
		}

		let reductions = Reductions::between(&off, &on);

		retries.push(reductions.harmful_retries);
		wall_time.push(reductions.wall_time);
		tokens.push(reductions.tokens);
	}

	let tail = (1.0 - confidence_level) / 2.0;

	Ok(ReductionIntervals {
		harmful_retries: percentile_interval(retries, tail),
		wall_time: percentile_interval(wall_time, tail),
		tokens: percentile_interval(tokens, tail),
	})
}

fn percentile_interval(mut values: Vec<f64>, tail: f64) -> Interval {
	values.sort_by(f64::total_cmp);

	Interval { lower: quantile(&values, tail), upper: quantile(&values, 1.0 - tail) }
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
	let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
	let lower = position.floor() as usize;
	let upper = position.ceil() as usize;
	let weight = position - lower as f64;

	sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
