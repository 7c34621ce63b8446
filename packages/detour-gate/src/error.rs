pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	InvalidArgument { message: String },
	#[error(transparent)]
	Config(#[from] detour_config::Error),
}
