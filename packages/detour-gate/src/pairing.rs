use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{Arm, Episode};
use detour_domain::signature;

#[derive(Clone, Copy, Debug)]
pub struct PairingOptions {
	pub min_recurrence: usize,
	pub require_cross_session: bool,
}
impl PairingOptions {
	pub fn from_config(gate: &detour_config::Gate) -> Self {
		Self {
			min_recurrence: gate.min_recurrence as usize,
			require_cross_session: gate.require_cross_session,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct EpisodePair {
	pub family: String,
	pub off: Episode,
	pub on: Episode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FamilyEligibility {
	pub family: String,
	pub episode_count: usize,
	pub session_count: usize,
	pub off_count: usize,
	pub on_count: usize,
	pub eligible: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Pairing {
	pub pairs: Vec<EpisodePair>,
	pub families: Vec<FamilyEligibility>,
}

/// Whitespace-collapsed, lowercased family used as the pairing key.
pub fn family_signature(family: &str) -> String {
	signature::normalize_command(family).to_lowercase()
}

/// Pairs hints-off with hints-on episodes of each eligible family, both in chronological order.
/// Surplus episodes on the larger side stay unpaired.
pub fn pair_episodes(episodes: &[Episode], options: &PairingOptions) -> Pairing {
	let mut by_family: BTreeMap<String, Vec<&Episode>> = BTreeMap::new();

	for episode in episodes {
		by_family.entry(family_signature(&episode.family)).or_default().push(episode);
	}

	let mut out = Pairing::default();

	for (family, mut members) in by_family {
		members.sort_by(|lhs, rhs| {
			lhs.started_at.cmp(&rhs.started_at).then_with(|| lhs.session_id.cmp(&rhs.session_id))
		});

		let sessions: BTreeSet<&str> =
			members.iter().map(|episode| episode.session_id.as_str()).collect();
		let off: Vec<&Episode> =
			members.iter().copied().filter(|episode| episode.arm == Arm::Off).collect();
		let on: Vec<&Episode> =
			members.iter().copied().filter(|episode| episode.arm == Arm::On).collect();
		let eligible = members.len() >= options.min_recurrence
			&& !off.is_empty()
			&& !on.is_empty()
			&& (!options.require_cross_session || sessions.len() >= 2);

		if eligible {
			for (off, on) in off.iter().zip(on.iter()) {
				out.pairs.push(EpisodePair {
					family: family.clone(),
					off: (*off).clone(),
					on: (*on).clone(),
				});
			}
		} else {
			tracing::debug!(
				family = %family,
				episode_count = members.len(),
				session_count = sessions.len(),
				"Family is not eligible for pairing."
			);
		}

		out.families.push(FamilyEligibility {
			family,
			episode_count: members.len(),
			session_count: sessions.len(),
			off_count: off.len(),
			on_count: on.len(),
			eligible,
		});
	}

	out
}
