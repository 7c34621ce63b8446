pub mod documents;
pub mod near_dup;
pub mod signature;
pub mod storage_key;
pub mod time_serde;
pub mod trace;

mod error;

pub use documents::{DocumentOptions, IndexedDocument, build_documents};
pub use error::{Error, Result};
pub use near_dup::NearDupDetector;
pub use storage_key::{
	BundleKey, validate_event_keys, validate_sql_identifier, validate_storage_key,
};
pub use trace::{EventPayload, Message, Metrics, Outcome, Scope, ToolCall, ToolResult, TraceEvent};
