pub mod db;
pub mod memory;
pub mod schema;

mod error;

pub use db::Db;
pub use error::Error;
pub use memory::MemoryStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

use std::{future::Future, pin::Pin};

use time::OffsetDateTime;

use detour_domain::{Scope, TraceEvent};

/// Durable, append-only event log.
pub trait EventStore
where
	Self: Send + Sync,
{
	/// Appends one event. The event is durable once the future resolves. Ids are unique; a
	/// repeated id is a [`Error::Conflict`].
	fn append<'a>(&'a self, event: &'a TraceEvent) -> BoxFuture<'a, Result<()>>;

	/// Appends all events or none of them.
	fn append_many<'a>(&'a self, events: &'a [TraceEvent]) -> BoxFuture<'a, Result<()>>;

	/// Matching events ordered by `(timestamp, id)`.
	fn query<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<TraceEvent>>>;
}

#[derive(Clone, Debug, Default)]
pub struct EventFilter {
	pub session_id: Option<String>,
	pub scope: Option<Scope>,
	/// Inclusive lower bound.
	pub since: Option<OffsetDateTime>,
	/// Exclusive upper bound.
	pub until: Option<OffsetDateTime>,
	pub limit: Option<usize>,
}
impl EventFilter {
	pub fn all() -> Self {
		Self::default()
	}

	pub fn session(session_id: impl Into<String>) -> Self {
		Self { session_id: Some(session_id.into()), ..Default::default() }
	}

	pub fn matches(&self, event: &TraceEvent) -> bool {
		if let Some(session_id) = &self.session_id
			&& &event.session_id != session_id
		{
			return false;
		}
		if let Some(scope) = self.scope
			&& event.scope != scope
		{
			return false;
		}
		if let Some(since) = self.since
			&& event.timestamp < since
		{
			return false;
		}
		if let Some(until) = self.until
			&& event.timestamp >= until
		{
			return false;
		}

		true
	}
}
