use std::collections::BTreeMap;

use serde::Serialize;

use crate::{LearningLoop, MinedArtifact, Result};
use detour_domain::{
	IndexedDocument, TraceEvent, build_documents,
	documents::{
		self, KIND_WRONG_TURN, META_CONFIDENCE, META_ERROR_SIGNATURE, META_EVIDENCE_EVENT_IDS,
		META_FAILED_COMMAND, META_FAMILY, META_FIX_COMMAND, META_KIND, META_SCOPE,
		META_SUPPORT_COUNT, META_SUPPORT_SESSION_COUNT,
	},
	validate_event_keys,
};

#[derive(Clone, Debug, Default, Serialize)]
pub struct IngestReport {
	pub event_id: String,
	/// Documents indexed for the event, the wrong-turn document included.
	pub document_count: usize,
	pub artifact: Option<MinedArtifact>,
	pub artifact_created: bool,
}

impl LearningLoop {
	/// Durably appends the event, then indexes and mines it. Every derived document is searchable
	/// once this resolves.
	pub async fn ingest(&self, event: &TraceEvent) -> Result<IngestReport> {
		validate_event_keys(event)?;

		self.store.append(event).await?;

		let report = self.process(event).await?;

		Ok(report.unwrap_or_else(|| IngestReport {
			event_id: event.id.clone(),
			..Default::default()
		}))
	}

	/// Indexes and mines an event that is already stored. Returns `None` when this instance has
	/// already processed the event.
	pub(crate) async fn process(&self, event: &TraceEvent) -> Result<Option<IngestReport>> {
		if !self.lock_processed().insert(event.id.clone()) {
			return Ok(None);
		}

		match self.index_and_mine(event).await {
			Ok(report) => Ok(Some(report)),
			Err(err) => {
				self.lock_processed().remove(&event.id);

				Err(err)
			},
		}
	}

	async fn index_and_mine(&self, event: &TraceEvent) -> Result<IngestReport> {
		let mut documents = match build_documents(event, &self.document_options) {
			Ok(documents) => documents,
			Err(err) => {
				tracing::warn!(
					event_id = %event.id,
					error = %err,
					"Skipping documents for malformed event."
				);

				Vec::new()
			},
		};
		// The miner only changes once the documents are indexed, so a failed write can be replayed.
		let (step, preview) = {
			let miner = self.lock_miner();
			let step = miner.plan(event);
			let preview = step.as_ref().and_then(|step| miner.preview(step));

			(step, preview)
		};

		if let Some(preview) = &preview {
			documents.push(wrong_turn_document(event, &preview.artifact));
		}

		if !documents.is_empty() {
			self.index.upsert_many(&documents).await?;
		}

		let update = step.and_then(|step| self.lock_miner().commit(step));
		let mut report = IngestReport { event_id: event.id.clone(), ..Default::default() };

		if let Some(update) = update {
			if preview.as_ref().is_some_and(|preview| preview.artifact != update.artifact) {
				self.refresh_wrong_turn(event, &update.artifact).await;
			}

			report.artifact_created = update.created;
			report.artifact = Some(update.artifact);
		}

		report.document_count = documents.len();

		tracing::debug!(
			event_id = %event.id,
			document_count = report.document_count,
			artifact = report.artifact.as_ref().map(|artifact| artifact.id.as_str()),
			"Ingested trace event."
		);

		Ok(report)
	}

	/// Another ingest changed the artifact between planning and commit. The indexed copy keeps its
	/// id, so a failed refresh only leaves its counts behind.
	async fn refresh_wrong_turn(&self, event: &TraceEvent, artifact: &MinedArtifact) {
		let document = wrong_turn_document(event, artifact);

		if let Err(err) = self.index.upsert(&document).await {
			tracing::warn!(
				artifact_id = %artifact.id,
				error = %err,
				"Failed to refresh wrong-turn document."
			);
		}
	}
}

/// Searchable form of a mined artifact. Re-derived whenever the artifact changes, under a stable
/// id so the index keeps one copy.
pub fn wrong_turn_document(event: &TraceEvent, artifact: &MinedArtifact) -> IndexedDocument {
	let mut text =
		format!("Wrong turn in {}: `{}` failed", artifact.family, artifact.failed_attempt);

	if let Some(error) = &artifact.error_signature {
		text.push_str(&format!(" with {error}"));
	}

	text.push_str(&format!(". Fixed by `{}`, which succeeded.", artifact.fix_attempt));

	let mut metadata = BTreeMap::new();
	let mut put = |key: &str, value: String| {
		metadata.insert(key.to_string(), value);
	};

	put(META_KIND, KIND_WRONG_TURN.to_string());
	put(META_SCOPE, event.scope.as_str().to_string());
	put(META_FAMILY, artifact.family.clone());
	put(META_FAILED_COMMAND, artifact.failed_attempt.clone());
	put(META_FIX_COMMAND, artifact.fix_attempt.clone());
	put(META_CONFIDENCE, format!("{:.4}", artifact.confidence));
	put(META_EVIDENCE_EVENT_IDS, artifact.evidence_event_ids.join(","));
	put(META_SUPPORT_COUNT, artifact.support_count.to_string());
	put(META_SUPPORT_SESSION_COUNT, artifact.support_session_count.to_string());

	if let Some(error) = &artifact.error_signature {
		put(META_ERROR_SIGNATURE, error.clone());
	}

	IndexedDocument {
		id: documents::document_id(&artifact.id, KIND_WRONG_TURN),
		source_event_id: artifact.evidence_event_ids.last().cloned().unwrap_or_default(),
		text,
		metadata,
	}
}
