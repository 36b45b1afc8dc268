// Module locators
//
// An index request names its module with a locator string:
// - file:///abs/path/module.yaml
// - a plain path ending in .json, .yaml or .yml

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use super::{ManifestModule, ModuleError};

/// Malformed locator strings; these are user errors, not run failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
	#[error("module locator is empty")]
	Empty,

	#[error("invalid module locator '{locator}': {message}")]
	Malformed { locator: String, message: String },

	#[error("unsupported module locator scheme '{0}'")]
	UnsupportedScheme(String),
}

/// Where to load a module from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLocator {
	/// Manifest file on the local filesystem
	File(PathBuf),
}

impl ModuleLocator {
	pub fn parse(locator: &str) -> Result<Self, LocatorError> {
		let locator = locator.trim();
		if locator.is_empty() {
			return Err(LocatorError::Empty);
		}

		if locator.contains("://") {
			let url = Url::parse(locator).map_err(|e| LocatorError::Malformed {
				locator: locator.to_string(),
				message: e.to_string(),
			})?;
			if url.scheme() != "file" {
				return Err(LocatorError::UnsupportedScheme(url.scheme().to_string()));
			}
			let path = url.to_file_path().map_err(|_| LocatorError::Malformed {
				locator: locator.to_string(),
				message: "not a local file path".to_string(),
			})?;
			return Self::from_path(locator, path);
		}

		Self::from_path(locator, PathBuf::from(locator))
	}

	fn from_path(locator: &str, path: PathBuf) -> Result<Self, LocatorError> {
		match path.extension().and_then(|e| e.to_str()) {
			Some("json" | "yaml" | "yml") => Ok(ModuleLocator::File(path)),
			_ => Err(LocatorError::Malformed {
				locator: locator.to_string(),
				message: "expected a .json, .yaml or .yml manifest".to_string(),
			}),
		}
	}

	pub fn path(&self) -> &Path {
		match self {
			ModuleLocator::File(path) => path,
		}
	}

	/// Load the module this locator names
	pub fn load(&self) -> Result<ManifestModule, ModuleError> {
		match self {
			ModuleLocator::File(path) => ManifestModule::from_path(path),
		}
	}
}

impl fmt::Display for ModuleLocator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ModuleLocator::File(path) => write!(f, "file://{}", path.display()),
		}
	}
}
