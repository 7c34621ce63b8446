pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid {field}: {reason}")]
	InvalidKey { field: String, reason: String },
	#[error("Malformed trace event {event_id:?}: {reason}")]
	MalformedEvent { event_id: String, reason: String },
	#[error("{message}")]
	Config { message: String },
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
