//! Host configuration.
//!
//! ```yaml
//! registry:
//!   table: functions
//! store:
//!   type: file
//!   path: /var/lib/jobhost
//! candidates:
//!   mode: allPublic
//!   excludePrefixes: [Helper]
//! logging:
//!   filter: jobhost=debug
//!   format: json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::{AllPublic, Indexer, MarkedOnly};
use crate::module::JOB_MARKER;
use crate::registry::{DEFAULT_TABLE, FunctionRegistry};
use crate::store::{EntityStore, FileEntityStore, MemoryEntityStore, StoreError};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config: {0}")]
	Parse(String),

	#[error("failed to open store: {0}")]
	Store(#[from] StoreError),

	#[error("invalid logging configuration: {0}")]
	Logging(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostConfig {
	#[serde(default)]
	pub registry: RegistryConfig,
	#[serde(default)]
	pub store: StoreConfig,
	#[serde(default)]
	pub candidates: CandidateConfig,
	#[serde(default)]
	pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistryConfig {
	#[serde(default = "default_table")]
	pub table: String,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self { table: default_table() }
	}
}

fn default_table() -> String {
	DEFAULT_TABLE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", deny_unknown_fields)]
pub enum StoreConfig {
	#[default]
	Memory,
	File {
		path: PathBuf,
	},
}

/// Which methods count as job functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
	rename_all = "camelCase",
	rename_all_fields = "camelCase",
	tag = "mode",
	deny_unknown_fields
)]
pub enum CandidateConfig {
	MarkedOnly {
		#[serde(default = "default_markers")]
		markers: Vec<String>,
	},
	AllPublic {
		#[serde(default)]
		exclude_prefixes: Vec<String>,
	},
}

impl Default for CandidateConfig {
	fn default() -> Self {
		CandidateConfig::MarkedOnly {
			markers: default_markers(),
		}
	}
}

fn default_markers() -> Vec<String> {
	vec![JOB_MARKER.to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
	/// Default `EnvFilter` directive; `RUST_LOG` takes precedence
	#[serde(default = "default_filter")]
	pub filter: String,
	#[serde(default)]
	pub format: LogFormat,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			filter: default_filter(),
			format: LogFormat::default(),
		}
	}
}

fn default_filter() -> String {
	"info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

impl HostConfig {
	/// Load from a `.json`, `.yaml` or `.yml` file
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = fs_err::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		match path.extension().and_then(|e| e.to_str()) {
			Some("json") => Self::from_json_str(&contents),
			_ => Self::from_yaml_str(&contents),
		}
	}

	pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
		serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	pub fn build_store(&self) -> Result<Arc<dyn EntityStore>, ConfigError> {
		Ok(match &self.store {
			StoreConfig::Memory => Arc::new(MemoryEntityStore::new()),
			StoreConfig::File { path } => Arc::new(FileEntityStore::open(path.clone())?),
		})
	}

	/// Wire store, registry, default provider chain and candidate policy
	pub fn build_indexer(&self) -> Result<Indexer, ConfigError> {
		let registry = FunctionRegistry::with_table(self.build_store()?, self.registry.table.clone());
		let indexer = Indexer::new(registry);
		Ok(match &self.candidates {
			CandidateConfig::MarkedOnly { markers } => indexer.with_policy(MarkedOnly::new(markers.clone())),
			CandidateConfig::AllPublic { exclude_prefixes } => {
				indexer.with_policy(AllPublic::new(exclude_prefixes.clone()))
			},
		})
	}
}
