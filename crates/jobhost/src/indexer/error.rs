// Indexing error types

use thiserror::Error;

use crate::module::{LocatorError, ModuleError};
use crate::registry::RegistryError;

/// Failures that stop an indexing run as a whole.
///
/// Per-function problems never surface here; they are collected into the
/// run's report instead.
#[derive(Error, Debug)]
pub enum IndexError {
	#[error("module enumeration failed: {0}")]
	Module(#[from] ModuleError),

	#[error("registry unavailable: {0}")]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Locator(#[from] LocatorError),
}

impl IndexError {
	/// Whether the caller supplied bad input rather than the system failing
	pub fn is_user_error(&self) -> bool {
		matches!(self, IndexError::Locator(_))
	}
}
