// Registry error types

use thiserror::Error;

use crate::descriptor::Location;
use crate::store::StoreError;

/// Errors that can occur during registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("function '{0}' not found in registry")]
	NotFound(Location),

	#[error("stored record '{key}' is not a valid function descriptor: {message}")]
	CorruptRecord { key: String, message: String },

	#[error("entity store failure: {0}")]
	Store(#[from] StoreError),
}

impl RegistryError {
	pub fn not_found(location: &Location) -> Self {
		Self::NotFound(location.clone())
	}
}
