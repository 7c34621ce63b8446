use detour_service::RetrieveRequest;
use detour_testkit::events;

use super::{at, in_memory_loop, test_config};

#[tokio::test]
async fn differing_success_in_family_is_mined() {
	let learning = in_memory_loop(test_config());
	let cases = [
		("s-a", "cargo test", "cargo test --workspace"),
		("s-b", "pytest tests/unit", "pytest tests/unit -x"),
		("s-c", "git push", "git push --set-upstream origin main"),
	];
	let mut expected = Vec::new();

	for (idx, (session, failed, fixed)) in cases.iter().enumerate() {
		let base = idx as i64 * 10;
		let failure_id = format!("{session}-fail");
		let success_id = format!("{session}-ok");

		learning
			.ingest(&events::tool_result(&failure_id, session, at(base), failed, true))
			.await
			.expect("Failed to ingest failure.");
		learning
			.ingest(&events::message(&format!("{session}-note"), session, at(base + 1), "Retrying."))
			.await
			.expect("Failed to ingest message.");
		learning
			.ingest(&events::tool_result(&success_id, session, at(base + 2), fixed, false))
			.await
			.expect("Failed to ingest success.");

		expected.push(vec![failure_id, success_id]);
	}

	let artifacts = learning.artifacts(None);

	for evidence in expected {
		assert!(
			artifacts.iter().any(|artifact| artifact.evidence_event_ids == evidence),
			"Missing artifact for {evidence:?}."
		);
	}
}

#[tokio::test]
async fn fixes_that_add_a_leading_flag_stay_in_family() {
	let learning = in_memory_loop(test_config());
	let cases = [
		("s", "pytest tests/unit", "pytest -x tests/unit"),
		("s2", "git push origin main", "git push --force-with-lease origin main"),
	];

	for (idx, (session, failed, fixed)) in cases.iter().enumerate() {
		let base = idx as i64 * 10;

		learning
			.ingest(&events::tool_result(&format!("{session}-f"), session, at(base), failed, true))
			.await
			.expect("Failed to ingest failure.");
		learning
			.ingest(&events::tool_result(&format!("{session}-ok"), session, at(base + 1), fixed, false))
			.await
			.expect("Failed to ingest success.");
	}

	let mut families: Vec<String> =
		learning.artifacts(None).into_iter().map(|artifact| artifact.family).collect();

	families.sort();

	assert_eq!(families, vec!["git push origin", "pytest tests/unit"]);
}

#[tokio::test]
async fn family_must_match_for_an_arc() {
	let learning = in_memory_loop(test_config());

	learning
		.ingest(&events::tool_result("f", "s", at(0), "npm run lint", true))
		.await
		.expect("Failed to ingest failure.");
	learning
		.ingest(&events::tool_result("ok", "s", at(1), "npm run build", false))
		.await
		.expect("Failed to ingest success.");

	assert!(learning.artifacts(None).is_empty());
}

#[tokio::test]
async fn tool_only_failures_pair_by_tool_and_input() {
	let learning = in_memory_loop(test_config());
	let failure = events::input_result(
		"edit-fail",
		"s",
		at(0),
		"Edit",
		serde_json::json!({ "path": "src/lib.rs", "old": "fn main()" }),
		true,
		"Error: old string not found in src/lib.rs",
	);
	let success = events::input_result(
		"edit-ok",
		"s",
		at(1),
		"Edit",
		serde_json::json!({ "path": "src/lib.rs", "old": "pub fn main()" }),
		false,
		"Applied edit.",
	);

	learning.ingest(&failure).await.expect("Failed to ingest failure.");

	let report = learning.ingest(&success).await.expect("Failed to ingest success.");
	let artifact = report.artifact.expect("Tool-only arcs must be mined.");

	assert_eq!(artifact.family, "tool:edit");
	assert!(artifact.error_signature.is_some());
}

#[tokio::test]
async fn second_session_strictly_raises_confidence() {
	let learning = in_memory_loop(test_config());

	for (idx, session) in ["s-1", "s-1"].iter().enumerate() {
		let base = idx as i64 * 10;

		learning
			.ingest(&events::tool_result(&format!("f{idx}"), session, at(base), "npm run lint", true))
			.await
			.expect("Failed to ingest failure.");
		learning
			.ingest(&events::tool_result(
				&format!("ok{idx}"),
				session,
				at(base + 1),
				"npm run lint --fix",
				false,
			))
			.await
			.expect("Failed to ingest success.");
	}

	let single = learning.artifacts(None).remove(0);

	assert_eq!(single.support_count, 2);
	assert_eq!(single.support_session_count, 1);
	assert!(!single.cross_session_support);

	learning
		.ingest(&events::tool_result("f-other", "s-2", at(30), "npm run lint", true))
		.await
		.expect("Failed to ingest failure.");

	let report = learning
		.ingest(&events::tool_result("ok-other", "s-2", at(31), "npm run lint --fix", false))
		.await
		.expect("Failed to ingest success.");

	assert!(!report.artifact_created);

	let artifacts = learning.artifacts(None);

	assert_eq!(artifacts.len(), 1);

	let cross = &artifacts[0];

	assert_eq!(cross.id, single.id);
	assert_eq!(cross.support_session_count, 2);
	assert!(cross.cross_session_support);
	assert!(cross.confidence > single.confidence);
	assert_eq!(cross.evidence_event_ids, vec!["f0", "ok0"]);

	let hits = learning
		.retrieve(&RetrieveRequest::new("npm lint failed").with_filter("kind", "wrong_turn"))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].document.metadata.get("support_session_count").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn mine_orders_by_confidence_then_support() {
	let learning = in_memory_loop(test_config());
	let arcs = [
		("a", "s-1", "make build", "make build -j4"),
		("b", "s-1", "docker compose up", "docker compose up --build"),
		("c", "s-2", "docker compose up", "docker compose up --build"),
	];

	for (idx, (id, session, failed, fixed)) in arcs.iter().enumerate() {
		let base = idx as i64 * 10;

		learning
			.ingest(&events::tool_result(&format!("{id}-f"), session, at(base), failed, true))
			.await
			.expect("Failed to ingest failure.");
		learning
			.ingest(&events::tool_result(&format!("{id}-ok"), session, at(base + 1), fixed, false))
			.await
			.expect("Failed to ingest success.");
	}

	let artifacts = learning.artifacts(None);

	assert_eq!(artifacts.len(), 2);
	assert_eq!(artifacts[0].family, "docker compose up");
	assert!(artifacts[0].confidence > artifacts[1].confidence);
	assert_eq!(learning.artifacts(Some(1)).len(), 1);
}
