pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] detour_config::Error),
	#[error(transparent)]
	Domain(#[from] detour_domain::Error),
	#[error(transparent)]
	Index(#[from] detour_index::Error),
	#[error(transparent)]
	Storage(#[from] detour_storage::Error),
}
