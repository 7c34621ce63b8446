use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use detour_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = r#"
[service]
log_level = "debug"

[index]
max_query_terms = 8

[fusion]
k = 0.0
primary_weight = 2.0
secondary_weight = 1.0

[miner]
near_dup_threshold = 0.75

[gate]
min_pairs = 3
bootstrap_samples = 200

[review]
reviewer_ids = ["alice", "bob", "carol"]
overlap = 2
"#;

fn write_temp_config(payload: &str) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("detour_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_str(payload: &str) -> detour_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = detour_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(payload: &str, needle: &str) {
	let err = load_str(payload).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");
	assert!(err.to_string().contains(needle), "Unexpected error message: {err}");
}

#[test]
fn sample_config_loads_with_defaults_filled_in() {
	let cfg = load_str(SAMPLE_CONFIG_TOML).expect("Sample config must load.");

	assert_eq!(cfg.service.log_level, "debug");
	assert_eq!(cfg.index.max_query_terms, 8);
	assert_eq!(cfg.index.min_token_chars, 2);
	assert_eq!(cfg.fusion.k, 0.0);
	assert_eq!(cfg.fusion.candidate_k, 50);
	assert_eq!(cfg.gate.min_pairs, 3);
	assert_eq!(cfg.gate.bootstrap_seed, 7);
	assert_eq!(cfg.review.reviewer_ids.len(), 3);
	assert!(cfg.storage.postgres.is_none());
}

#[test]
fn empty_file_yields_defaults() {
	let cfg = load_str("").expect("Empty config must load.");
	let defaults = detour_config::defaults();

	assert_eq!(cfg.learning.min_confidence, defaults.learning.min_confidence);
	assert_eq!(cfg.miner.session_weight, defaults.miner.session_weight);
	assert!(detour_config::validate(&defaults).is_ok());
}

#[test]
fn non_positive_fusion_weight_is_rejected() {
	expect_validation(
		"[fusion]\nprimary_weight = 0.0\n",
		"fusion.primary_weight must be a finite number greater than zero.",
	);
	expect_validation(
		"[fusion]\nsecondary_weight = -1.0\n",
		"fusion.secondary_weight must be a finite number greater than zero.",
	);
}

#[test]
fn negative_fusion_k_is_rejected() {
	expect_validation("[fusion]\nk = -1.0\n", "fusion.k must be a finite number");
}

#[test]
fn duplicate_reviewer_ids_are_rejected() {
	expect_validation(
		"[review]\nreviewer_ids = [\"alice\", \" alice \"]\n",
		"review.reviewer_ids contains duplicate id",
	);
}

#[test]
fn review_overlap_cannot_exceed_reviewers() {
	expect_validation(
		"[review]\nreviewer_ids = [\"alice\"]\noverlap = 2\n",
		"review.overlap must not exceed the number of reviewers.",
	);
}

#[test]
fn near_dup_threshold_bounds_are_enforced() {
	expect_validation(
		"[miner]\nnear_dup_threshold = 0.0\n",
		"miner.near_dup_threshold must be in the range (0.0, 1.0].",
	);
	expect_validation(
		"[miner]\nnear_dup_threshold = 1.5\n",
		"miner.near_dup_threshold must be in the range (0.0, 1.0].",
	);
}

#[test]
fn confidence_weights_must_leave_room_for_cross_session_support() {
	expect_validation(
		"[miner]\nsession_weight = 0.0\n",
		"miner.session_weight must be greater than zero.",
	);
	expect_validation(
		"[miner]\nbase_confidence = 0.5\nsupport_weight = 0.5\nsession_weight = 0.5\n",
		"must sum to 1.0 or less.",
	);
}

#[test]
fn gate_threshold_bounds_are_enforced() {
	expect_validation(
		"[gate]\nconfidence_level = 1.0\n",
		"gate.confidence_level must be in the range (0.0, 1.0).",
	);
	expect_validation(
		"[gate]\nmin_judgeable_coverage = 1.2\n",
		"gate.min_judgeable_coverage must be in the range 0.0-1.0.",
	);
	expect_validation(
		"[gate]\nbootstrap_samples = 0\n",
		"gate.bootstrap_samples must be greater than zero.",
	);
	expect_validation("[gate]\ncanary_percent = 101\n", "gate.canary_percent must be 100 or less.");
}

#[test]
fn postgres_section_requires_dsn() {
	expect_validation(
		"[storage.postgres]\ndsn = \"  \"\n",
		"storage.postgres.dsn must be non-empty.",
	);

	let cfg = load_str("[storage.postgres]\ndsn = \"postgres://localhost/detour\"\n")
		.expect("Postgres config must load.");
	let postgres = cfg.storage.postgres.expect("Postgres section must be present.");

	assert_eq!(postgres.schema, "detour");
	assert_eq!(postgres.pool_max_conns, 4);
}

#[test]
fn postgres_schema_must_be_a_plain_identifier() {
	let section = |schema: &str| {
		format!("[storage.postgres]\ndsn = \"postgres://localhost/detour\"\nschema = \"{schema}\"\n")
	};

	for schema in ["", "detour;drop", "1detour", "trace events"] {
		expect_validation(&section(schema), "storage.postgres.schema must be a plain SQL identifier.");
	}

	let cfg = load_str(&section("_detour_v2")).expect("Plain schema must load.");

	assert_eq!(cfg.storage.postgres.map(|postgres| postgres.schema).as_deref(), Some("_detour_v2"));
}

#[test]
fn missing_file_reports_read_error() {
	let err = detour_config::load(&PathBuf::from("/nonexistent/detour.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}

#[test]
fn stopwords_are_normalized() {
	let cfg = load_str("[index]\nstopwords = [\" The \", \"\", \"AND\"]\n")
		.expect("Stopword config must load.");

	assert_eq!(cfg.index.stopwords, Some(vec!["the".to_string(), "and".to_string()]));
}
