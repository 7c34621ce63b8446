use serde::Serialize;

use crate::{LearningLoop, Result};
use detour_domain::trace::sort_chronological;
use detour_storage::EventFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
	/// Events replayed by this call.
	pub event_count: usize,
	pub document_count: usize,
	pub artifact_count: usize,
}

impl LearningLoop {
	/// Replays stored events in `(timestamp, id)` order to rebuild the index and miner. Events this
	/// instance has already processed are skipped, so repeating the call replays nothing.
	pub async fn bootstrap_from_store(&self) -> Result<BootstrapReport> {
		let mut events = self.store.query(&EventFilter::all()).await?;

		sort_chronological(&mut events);

		let mut report = BootstrapReport::default();

		for event in &events {
			let Some(ingested) = self.process(event).await? else { continue };

			report.event_count += 1;
			report.document_count += ingested.document_count;
		}

		report.artifact_count = self.lock_miner().artifact_count();

		tracing::info!(
			event_count = report.event_count,
			document_count = report.document_count,
			artifact_count = report.artifact_count,
			"Bootstrapped learning loop from store."
		);

		Ok(report)
	}
}
