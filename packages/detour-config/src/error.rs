use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read detour config {path:?}: {source}")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Cannot parse detour config {path:?}: {source}")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	/// Names the offending key.
	#[error("{message}")]
	Validation { message: String },
}
