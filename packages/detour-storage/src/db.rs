use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};

use crate::{BoxFuture, Error, EventFilter, EventStore, Result, schema};
use detour_domain::{TraceEvent, validate_event_keys, validate_sql_identifier};

const SCHEMA_LOCK_ID: i64 = 7_120_301;

/// Postgres-backed event store. Each event is one row holding its JSON body.
pub struct Db {
	pub pool: PgPool,
	schema: String,
}
impl Db {
	pub async fn connect(cfg: &detour_config::Postgres) -> Result<Self> {
		validate_sql_identifier("storage.postgres.schema", &cfg.schema)?;

		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool, schema: cfg.schema.clone() })
	}

	pub fn schema(&self) -> &str {
		&self.schema
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema(&self.schema)?;
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	pub async fn insert_events(&self, events: &[TraceEvent]) -> Result<()> {
		for event in events {
			validate_event_keys(event)?;
		}

		let sql = format!(
			"\
INSERT INTO {}.trace_events (event_id, session_id, ts, scope, event_type, body)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (event_id) DO NOTHING",
			self.schema
		);
		let mut tx = self.pool.begin().await?;

		for event in events {
			let body = serde_json::to_value(event)?;
			let inserted = sqlx::query(&sql)
				.bind(event.id.as_str())
				.bind(event.session_id.as_str())
				.bind(event.timestamp)
				.bind(event.scope.as_str())
				.bind(event.event_type())
				.bind(body)
				.execute(&mut *tx)
				.await?;

			if inserted.rows_affected() == 0 {
				return Err(Error::Conflict(format!("Event {:?} already exists.", event.id)));
			}
		}

		tx.commit().await?;

		Ok(())
	}

	pub async fn select_events(&self, filter: &EventFilter) -> Result<Vec<TraceEvent>> {
		let mut builder: QueryBuilder<Postgres> =
			QueryBuilder::new(format!("SELECT body FROM {}.trace_events WHERE TRUE", self.schema));

		if let Some(session_id) = &filter.session_id {
			builder.push(" AND session_id = ").push_bind(session_id.clone());
		}
		if let Some(scope) = filter.scope {
			builder.push(" AND scope = ").push_bind(scope.as_str());
		}
		if let Some(since) = filter.since {
			builder.push(" AND ts >= ").push_bind(since);
		}
		if let Some(until) = filter.until {
			builder.push(" AND ts < ").push_bind(until);
		}

		builder.push(" ORDER BY ts ASC, event_id ASC");

		if let Some(limit) = filter.limit {
			let limit = i64::try_from(limit)
				.map_err(|_| Error::InvalidArgument("Query limit is too large.".to_string()))?;

			builder.push(" LIMIT ").push_bind(limit);
		}

		let rows: Vec<serde_json::Value> = builder.build_query_scalar().fetch_all(&self.pool).await?;
		let mut out = Vec::with_capacity(rows.len());

		for body in rows {
			match serde_json::from_value::<TraceEvent>(body) {
				Ok(event) => out.push(event),
				Err(err) => tracing::warn!(error = %err, "Skipping undecodable stored event."),
			}
		}

		Ok(out)
	}
}
impl EventStore for Db {
	fn append<'a>(&'a self, event: &'a TraceEvent) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.insert_events(std::slice::from_ref(event)))
	}

	fn append_many<'a>(&'a self, events: &'a [TraceEvent]) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.insert_events(events))
	}

	fn query<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<TraceEvent>>> {
		Box::pin(self.select_events(filter))
	}
}
