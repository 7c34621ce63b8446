use std::{
	collections::{BTreeMap, HashSet},
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;

use crate::{BoxFuture, Error, EventFilter, EventStore, Result};
use detour_domain::{TraceEvent, validate_event_keys};

/// Process-local store. Durable only for the lifetime of the value.
#[derive(Default)]
pub struct MemoryStore {
	inner: Mutex<Inner>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.lock().ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn insert_all(&self, events: &[TraceEvent]) -> Result<()> {
		for event in events {
			validate_event_keys(event)?;
		}

		let mut inner = self.lock();
		let mut batch = HashSet::new();

		for event in events {
			if inner.ids.contains(&event.id) || !batch.insert(event.id.as_str()) {
				return Err(Error::Conflict(format!("Event {:?} already exists.", event.id)));
			}
		}
		for event in events {
			inner.ids.insert(event.id.clone());
			inner.events.insert((event.timestamp, event.id.clone()), event.clone());
		}

		Ok(())
	}

	fn select(&self, filter: &EventFilter) -> Vec<TraceEvent> {
		let inner = self.lock();
		let matching = inner.events.values().filter(|event| filter.matches(event)).cloned();

		match filter.limit {
			Some(limit) => matching.take(limit).collect(),
			None => matching.collect(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl EventStore for MemoryStore {
	fn append<'a>(&'a self, event: &'a TraceEvent) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.insert_all(std::slice::from_ref(event)) })
	}

	fn append_many<'a>(&'a self, events: &'a [TraceEvent]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.insert_all(events) })
	}

	fn query<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<TraceEvent>>> {
		Box::pin(async move { Ok(self.select(filter)) })
	}
}

#[derive(Default)]
struct Inner {
	ids: HashSet<String>,
	events: BTreeMap<(OffsetDateTime, String), TraceEvent>,
}
