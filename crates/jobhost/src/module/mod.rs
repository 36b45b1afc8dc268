//! Module boundary consumed by the indexer.
//!
//! A module enumerates method descriptors: declaring type, name, visibility,
//! attached markers and declared parameters. Loading real code is the host's
//! business; this crate ships an in-code [`StaticModule`] and a
//! [`ManifestModule`] read from a JSON or YAML description.

mod locator;
mod manifest;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use locator::{LocatorError, ModuleLocator};
pub use manifest::ManifestModule;

use crate::descriptor::ParameterDescriptor;

/// Marker recognized as "this method is a job function"
pub const JOB_MARKER: &str = "job";

/// Marker carrying a human-readable description, as `description=...`
pub const DESCRIPTION_MARKER: &str = "description";

/// Failures that prevent a module from being enumerated at all
#[derive(Error, Debug)]
pub enum ModuleError {
	#[error("failed to read module '{module}': {source}")]
	Io {
		module: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse module '{module}': {message}")]
	Parse { module: String, message: String },

	#[error("module '{module}' could not be loaded: {message}")]
	Load { module: String, message: String },
}

/// One method as exposed by the code-loading layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
	pub declaring_type: String,
	pub name: String,
	#[serde(default = "default_public")]
	pub is_public: bool,
	#[serde(default)]
	pub markers: Vec<String>,
	#[serde(default)]
	pub parameters: Vec<ParameterDescriptor>,
}

fn default_public() -> bool {
	true
}

impl MethodInfo {
	pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			declaring_type: declaring_type.into(),
			name: name.into(),
			is_public: true,
			markers: Vec::new(),
			parameters: Vec::new(),
		}
	}

	pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
		self.markers.push(marker.into());
		self
	}

	pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
		self.parameters.push(parameter);
		self
	}

	pub fn private(mut self) -> Self {
		self.is_public = false;
		self
	}

	/// `Type.method`
	pub fn display_name(&self) -> String {
		format!("{}.{}", self.declaring_type, self.name)
	}

	pub fn has_marker(&self, marker: &str) -> bool {
		self.markers.iter().any(|m| marker_name(m) == marker)
	}

	/// Value of a `name=value` marker
	pub fn marker_value(&self, marker: &str) -> Option<&str> {
		self.markers
			.iter()
			.filter_map(|m| m.split_once('='))
			.find(|(name, _)| name.trim() == marker)
			.map(|(_, value)| value.trim())
	}
}

fn marker_name(marker: &str) -> &str {
	marker.split_once('=').map_or(marker, |(name, _)| name).trim()
}

/// A loaded module whose methods can be enumerated
pub trait ModuleSource: Send + Sync {
	/// Module name, used as the first component of every location
	fn name(&self) -> &str;

	/// Enumerate every method of the module
	fn methods(&self) -> Result<Vec<MethodInfo>, ModuleError>;
}

/// Module assembled in code
#[derive(Debug, Clone, Default)]
pub struct StaticModule {
	name: String,
	methods: Vec<MethodInfo>,
}

impl StaticModule {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			methods: Vec::new(),
		}
	}

	pub fn with_method(mut self, method: MethodInfo) -> Self {
		self.methods.push(method);
		self
	}
}

impl ModuleSource for StaticModule {
	fn name(&self) -> &str {
		&self.name
	}

	fn methods(&self) -> Result<Vec<MethodInfo>, ModuleError> {
		Ok(self.methods.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_markers() {
		let method = MethodInfo::new("Jobs", "Run")
			.with_marker(JOB_MARKER)
			.with_marker("description = Nightly cleanup");
		assert!(method.has_marker("job"));
		assert!(method.has_marker("description"));
		assert!(!method.has_marker("other"));
		assert_eq!(method.marker_value(DESCRIPTION_MARKER), Some("Nightly cleanup"));
		assert_eq!(method.display_name(), "Jobs.Run");
	}

	#[test]
	fn test_method_defaults_from_json() {
		let method: MethodInfo = serde_json::from_value(serde_json::json!({
			"declaringType": "Jobs",
			"name": "Run"
		}))
		.unwrap();
		assert!(method.is_public);
		assert!(method.markers.is_empty());
		assert!(method.parameters.is_empty());
	}
}
