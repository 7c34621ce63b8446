pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Config { message: String },
	#[error("Index backend {backend} failed: {message}")]
	Backend { backend: String, message: String },
}
