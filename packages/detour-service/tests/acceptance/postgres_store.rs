use std::sync::Arc;

use detour_service::RetrieveRequest;
use detour_storage::Db;
use detour_testkit::{TestDatabase, events};

use super::{at, loop_over, test_config};

#[tokio::test]
#[ignore = "Requires external Postgres. Set DETOUR_PG_DSN to run."]
async fn postgres_store_survives_restart() {
	let Some(base_dsn) = detour_testkit::env_dsn() else {
		eprintln!("Skipping postgres_store_survives_restart; set DETOUR_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres_config("detour"))
		.await
		.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let db = Arc::new(db);
	let before = loop_over(test_config(), db.clone());

	before
		.ingest(&events::tool_result("f", "s-1", at(0), "npm run lint", true))
		.await
		.expect("Failed to ingest failure.");
	before
		.ingest(&events::tool_result("ok", "s-1", at(1), "npm run lint --fix", false))
		.await
		.expect("Failed to ingest success.");

	drop(before);

	let after = loop_over(test_config(), db.clone());
	let report = after.bootstrap_from_store().await.expect("Bootstrap must succeed.");

	assert_eq!(report.event_count, 2);
	assert_eq!(report.artifact_count, 1);

	let suggestions = after
		.suggest(&RetrieveRequest::new("lint failed"))
		.await
		.expect("Failed to suggest.");

	assert!(suggestions.iter().any(|suggestion| suggestion.rationale.contains("Prior run used")));

	drop(after);
	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}
