// Manifest-described modules
//
// A manifest lists a module's types and their methods:
//
//   module: billing
//   types:
//     - name: Billing.Jobs
//       methods:
//         - name: ProcessOrder
//           markers: [job]
//           parameters:
//             - name: order
//               type: { kind: object, name: Order }
//               binding: { kind: queue, name: orders }

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MethodInfo, ModuleError, ModuleSource};
use crate::descriptor::ParameterDescriptor;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Manifest {
	module: String,
	#[serde(default)]
	types: Vec<ManifestType>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestType {
	name: String,
	#[serde(default)]
	methods: Vec<ManifestMethod>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestMethod {
	name: String,
	#[serde(default = "default_public")]
	is_public: bool,
	#[serde(default)]
	markers: Vec<String>,
	#[serde(default)]
	parameters: Vec<ParameterDescriptor>,
}

fn default_public() -> bool {
	true
}

/// Module loaded from a JSON or YAML manifest
#[derive(Debug, Clone)]
pub struct ManifestModule {
	name: String,
	methods: Vec<MethodInfo>,
}

impl ManifestModule {
	/// Load a manifest, choosing the format from the file extension
	pub fn from_path(path: &Path) -> Result<Self, ModuleError> {
		let label = path.display().to_string();
		let contents = fs_err::read_to_string(path).map_err(|source| ModuleError::Io {
			module: label.clone(),
			source,
		})?;
		let module = match path.extension().and_then(|e| e.to_str()) {
			Some("yaml" | "yml") => Self::from_yaml_str(&contents),
			Some("json") => Self::from_json_str(&contents),
			_ => Err(ModuleError::Load {
				module: label.clone(),
				message: "manifest must have a .json, .yaml or .yml extension".to_string(),
			}),
		}?;
		debug!(target: "job_index", module = %module.name, path = %label, methods = module.methods.len(), "manifest loaded");
		Ok(module)
	}

	pub fn from_json_str(contents: &str) -> Result<Self, ModuleError> {
		let manifest: Manifest = serde_json::from_str(contents).map_err(|e| ModuleError::Parse {
			module: "<json>".to_string(),
			message: e.to_string(),
		})?;
		Ok(manifest.into())
	}

	pub fn from_yaml_str(contents: &str) -> Result<Self, ModuleError> {
		let manifest: Manifest = serde_yaml::from_str(contents).map_err(|e| ModuleError::Parse {
			module: "<yaml>".to_string(),
			message: e.to_string(),
		})?;
		Ok(manifest.into())
	}
}

impl From<Manifest> for ManifestModule {
	fn from(manifest: Manifest) -> Self {
		let methods = manifest
			.types
			.into_iter()
			.flat_map(|ty| {
				let declaring_type = ty.name;
				ty.methods.into_iter().map(move |m| MethodInfo {
					declaring_type: declaring_type.clone(),
					name: m.name,
					is_public: m.is_public,
					markers: m.markers,
					parameters: m.parameters,
				})
			})
			.collect();
		Self {
			name: manifest.module,
			methods,
		}
	}
}

impl ModuleSource for ManifestModule {
	fn name(&self) -> &str {
		&self.name
	}

	fn methods(&self) -> Result<Vec<MethodInfo>, ModuleError> {
		Ok(self.methods.clone())
	}
}
