use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{LearningLoop, Result, RetrieveRequest, rerank::document_confidence};
use detour_domain::{
	IndexedDocument,
	documents::{
		KIND_MESSAGE, KIND_TOOL_CALL, KIND_TOOL_RESULT, KIND_WRONG_TURN, META_COMMAND,
		META_ERROR_SIGNATURE, META_FAILED_COMMAND, META_FAMILY, META_FIX_COMMAND, META_OUTCOME,
		META_TOOL, excerpt,
	},
};
use detour_index::SearchResult;

const RATIONALE_EXCERPT_CHARS: usize = 160;

/// A hint rendered from one retrieved document.
#[derive(Clone, Debug, Serialize)]
pub struct LearningSuggestion {
	pub document_id: String,
	pub source_event_id: String,
	pub kind: String,
	pub family: Option<String>,
	pub rationale: String,
	pub playbook_markdown: String,
	pub evidence_event_ids: Vec<String>,
	pub confidence: f32,
	pub score: f32,
}

impl LearningLoop {
	/// One suggestion per distinct source event, above the confidence floor, in retrieval order.
	pub async fn suggest(&self, request: &RetrieveRequest) -> Result<Vec<LearningSuggestion>> {
		let hits = self.retrieve(request).await?;
		let floor = self.cfg.learning.min_confidence;
		let default_confidence = self.cfg.learning.event_document_confidence;
		let mut out = Vec::new();

		for hit in dedup_by_source_event(hits) {
			let confidence = document_confidence(&hit.document, default_confidence);

			if confidence < floor {
				tracing::debug!(
					document_id = %hit.document.id,
					confidence,
					floor,
					"Dropping suggestion below the confidence floor."
				);

				continue;
			}

			out.push(render(&hit, confidence));
		}

		Ok(out)
	}
}

/// Keeps the highest-scoring hit per `source_event_id`, at the position of that hit.
pub fn dedup_by_source_event(hits: Vec<SearchResult>) -> Vec<SearchResult> {
	let mut best: HashMap<String, usize> = HashMap::new();

	for (idx, hit) in hits.iter().enumerate() {
		let source = hit.document.source_event_id.clone();

		match best.get(&source) {
			Some(&current) if hits[current].score >= hit.score => {},
			_ => {
				best.insert(source, idx);
			},
		}
	}

	let keep: HashSet<usize> = best.into_values().collect();

	hits.into_iter().enumerate().filter(|(idx, _)| keep.contains(idx)).map(|(_, hit)| hit).collect()
}

fn render(hit: &SearchResult, confidence: f32) -> LearningSuggestion {
	let document = &hit.document;
	let kind = document.kind().unwrap_or(KIND_TOOL_RESULT);
	let (rationale, playbook) = match kind {
		KIND_WRONG_TURN => wrong_turn_text(document),
		KIND_TOOL_CALL => tool_call_text(document),
		KIND_MESSAGE => message_text(document),
		_ => tool_result_text(document),
	};
	let evidence = dedup_ids(document.evidence_event_ids());
	let evidence_line =
		evidence.iter().map(|id| format!("`{id}`")).collect::<Vec<_>>().join(", ");

	LearningSuggestion {
		document_id: document.id.clone(),
		source_event_id: document.source_event_id.clone(),
		kind: kind.to_string(),
		family: document.meta(META_FAMILY).map(str::to_string),
		rationale,
		playbook_markdown: format!("{playbook}\n\nEvidence: {evidence_line}\n"),
		evidence_event_ids: evidence,
		confidence,
		score: hit.score,
	}
}

fn wrong_turn_text(document: &IndexedDocument) -> (String, String) {
	let failed = document.meta(META_FAILED_COMMAND).unwrap_or("the failing attempt");
	let fix = document.meta(META_FIX_COMMAND).unwrap_or("the fixed attempt");
	let error = document.meta(META_ERROR_SIGNATURE);
	let mut rationale = format!("Prior run used `{fix}` after `{failed}` failed");

	if let Some(error) = error {
		rationale.push_str(&format!(" with `{error}`"));
	}

	rationale.push('.');

	let mut playbook = format!("### Skip the wrong turn on `{failed}`\n\n");

	match error {
		Some(error) => playbook.push_str(&format!(
			"1. If `{failed}` fails with `{error}`, do not retry it unchanged.\n"
		)),
		None => playbook.push_str(&format!("1. If `{failed}` fails, do not retry it unchanged.\n")),
	}

	playbook.push_str(&format!("2. Run `{fix}` instead.\n"));
	playbook.push_str("3. Check that the command succeeds before moving on.");

	(rationale, playbook)
}

fn tool_result_text(document: &IndexedDocument) -> (String, String) {
	let subject = attempt_label(document);
	let failed = document.meta(META_OUTCOME) == Some("failure");

	if failed {
		let error = document.meta(META_ERROR_SIGNATURE);
		let rationale = match error {
			Some(error) => format!("Prior run used {subject} and it failed with `{error}`."),
			None => format!("Prior run used {subject} and it failed."),
		};
		let playbook = format!(
			"### Expect {subject} to fail\n\n\
1. Check the preconditions of {subject} before running it.\n\
2. If it fails the same way, change the approach instead of retrying."
		);

		(rationale, playbook)
	} else {
		let rationale = format!("Prior run used {subject} and it succeeded.");
		let playbook = format!(
			"### Reuse {subject}\n\n\
1. Run {subject}.\n\
2. Confirm it succeeds as it did before."
		);

		(rationale, playbook)
	}
}

fn tool_call_text(document: &IndexedDocument) -> (String, String) {
	let subject = attempt_label(document);
	let rationale = format!("Prior run used {subject} in a similar situation.");
	let playbook = format!("### Consider {subject}\n\n1. Try {subject} and check its result.");

	(rationale, playbook)
}

fn message_text(document: &IndexedDocument) -> (String, String) {
	let note = excerpt(&document.text, RATIONALE_EXCERPT_CHARS);
	let rationale = format!("Prior run used this note: {note}");
	let playbook = format!("### Recall the earlier note\n\n1. {note}");

	(rationale, playbook)
}

fn attempt_label(document: &IndexedDocument) -> String {
	match (document.meta(META_COMMAND), document.meta(META_TOOL)) {
		(Some(command), _) => format!("`{command}`"),
		(None, Some(tool)) => format!("the {tool} tool"),
		(None, None) => "a tool call".to_string(),
	}
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
	let mut seen = HashSet::new();

	ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
