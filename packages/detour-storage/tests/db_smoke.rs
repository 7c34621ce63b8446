use time::macros::datetime;

use detour_config::Postgres;
use detour_storage::{Db, Error, EventFilter, EventStore};
use detour_testkit::{TestDatabase, events};

#[tokio::test]
#[ignore = "Requires external Postgres. Set DETOUR_PG_DSN to run."]
async fn events_round_trip_in_order() {
	let Some(base_dsn) = detour_testkit::env_dsn() else {
		eprintln!("Skipping events_round_trip_in_order; set DETOUR_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres_config("detour_smoke"))
		.await
		.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");
	db.ensure_schema().await.expect("Schema bootstrap must be repeatable.");

	let later = events::tool_result("b", "s-1", datetime!(2026-03-01 10:05 UTC), "npm test", false);
	let earlier = events::tool_result("a", "s-1", datetime!(2026-03-01 10:00 UTC), "npm test", true);

	db.append_many(&[later.clone(), earlier.clone()]).await.expect("Append must succeed.");

	let stored = db.query(&EventFilter::session("s-1")).await.expect("Query must succeed.");

	assert_eq!(stored, vec![earlier.clone(), later]);

	let duplicate = db.append(&earlier).await;

	assert!(matches!(duplicate, Err(Error::Conflict(_))));

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
async fn unsafe_schema_is_rejected_before_connecting() {
	let cfg = Postgres {
		dsn: "postgres://unreachable.invalid/detour".to_string(),
		pool_max_conns: 1,
		schema: "detour; DROP SCHEMA public".to_string(),
	};

	assert!(matches!(Db::connect(&cfg).await, Err(Error::Domain(_))));
}
