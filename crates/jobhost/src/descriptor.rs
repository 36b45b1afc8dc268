// Function descriptor types
//
// A descriptor is the persisted shape of one discovered job function:
// - Location: stable identity (module + declaring type + method)
// - Parameters: ordered declarations as exposed by the module boundary
// - Bindings: one resolved binding description per parameter
// - Hints: route parameters and resource-name templates

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::{BindingError, ResourceKind};
use crate::store::Entity;

/// Characters escaped inside a single key component.
const KEY_COMPONENT: &AsciiSet = &CONTROLS.add(b'/').add(b'%').add(b' ');

/// Errors produced when parsing a location from its key or display form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationParseError {
	#[error("location key '{0}' must have exactly three components")]
	ComponentCount(String),

	#[error("location key '{key}' is not valid UTF-8 after decoding")]
	Encoding { key: String },

	#[error("'{0}' is not of the form module:Type.method")]
	Display(String),

	#[error("location component must not be empty in '{0}'")]
	EmptyComponent(String),
}

/// Stable identity of a discovered function.
///
/// Ordering and equality are structural, so two functions that happen to
/// render to the same display string are still distinct set elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
	pub module: String,
	pub type_name: String,
	pub method: String,
}

impl Location {
	pub fn new(module: impl Into<String>, type_name: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			module: module.into(),
			type_name: type_name.into(),
			method: method.into(),
		}
	}

	/// Human-readable short name (`Type.method`)
	pub fn short_name(&self) -> String {
		format!("{}.{}", self.type_name, self.method)
	}

	/// Storage key: percent-encoded components joined by `/`
	pub fn key(&self) -> String {
		[&self.module, &self.type_name, &self.method]
			.iter()
			.map(|c| utf8_percent_encode(c.as_str(), KEY_COMPONENT).to_string())
			.collect::<Vec<_>>()
			.join("/")
	}

	/// Inverse of [`Location::key`]
	pub fn from_key(key: &str) -> Result<Self, LocationParseError> {
		let parts: Vec<&str> = key.split('/').collect();
		let [module, type_name, method] = parts.as_slice() else {
			return Err(LocationParseError::ComponentCount(key.to_string()));
		};

		let decode = |part: &str| -> Result<String, LocationParseError> {
			let decoded = percent_decode_str(part)
				.decode_utf8()
				.map_err(|_| LocationParseError::Encoding { key: key.to_string() })?;
			if decoded.is_empty() {
				return Err(LocationParseError::EmptyComponent(key.to_string()));
			}
			Ok(decoded.into_owned())
		};

		Ok(Self {
			module: decode(module)?,
			type_name: decode(type_name)?,
			method: decode(method)?,
		})
	}

	/// Parse the display form `module:Type.method`.
	///
	/// The module ends at the first `:` and the method starts after the last `.`,
	/// so namespaced type names (`Billing.Jobs`) survive.
	pub fn parse_display(s: &str) -> Result<Self, LocationParseError> {
		let (module, rest) = s
			.split_once(':')
			.ok_or_else(|| LocationParseError::Display(s.to_string()))?;
		let (type_name, method) = rest
			.rsplit_once('.')
			.ok_or_else(|| LocationParseError::Display(s.to_string()))?;
		if module.is_empty() || type_name.is_empty() || method.is_empty() {
			return Err(LocationParseError::EmptyComponent(s.to_string()));
		}
		Ok(Self::new(module, type_name, method))
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}.{}", self.module, self.type_name, self.method)
	}
}

/// Parameter directionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
	In,
	Out,
	InOut,
}

impl Direction {
	pub fn is_input(self) -> bool {
		matches!(self, Direction::In | Direction::InOut)
	}

	pub fn is_output(self) -> bool {
		matches!(self, Direction::Out | Direction::InOut)
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Direction::In => "in",
			Direction::Out => "out",
			Direction::InOut => "inout",
		};
		f.write_str(s)
	}
}

/// Static type of a parameter as reported by the module boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "name")]
pub enum ParamType {
	/// Raw byte sequence
	Bytes,
	/// UTF-8 text
	Text,
	/// Structured, serializable type
	Object(String),
	/// Anything the host has no conversion for
	Other(String),
}

impl fmt::Display for ParamType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParamType::Bytes => f.write_str("bytes"),
			ParamType::Text => f.write_str("text"),
			ParamType::Object(name) | ParamType::Other(name) => f.write_str(name),
		}
	}
}

/// Resource attribute attached to a parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BindingAttribute {
	/// Queue message; the queue name defaults to the parameter name
	Queue {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
	},
	/// Blob at a (possibly templated) `container/path`
	Blob { path: String },
	/// Table record
	#[serde(rename_all = "camelCase")]
	Table {
		table: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		partition_key: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		row_key: Option<String>,
	},
	/// Value supplied by the host itself
	Host,
}

impl BindingAttribute {
	pub fn resource_kind(&self) -> ResourceKind {
		match self {
			BindingAttribute::Queue { .. } => ResourceKind::Queue,
			BindingAttribute::Blob { .. } => ResourceKind::Blob,
			BindingAttribute::Table { .. } => ResourceKind::Table,
			BindingAttribute::Host => ResourceKind::Host,
		}
	}

	/// Reject attribute shapes that cannot name a resource
	pub fn validate(&self) -> Result<(), BindingError> {
		match self {
			BindingAttribute::Table {
				table,
				partition_key: None,
				row_key: Some(_),
			} => Err(BindingError::invalid_template(
				table.as_str(),
				"a row key requires a partition key",
			)),
			_ => Ok(()),
		}
	}

	/// Resource-name template for this attribute, defaulting queue names to
	/// the parameter name.
	pub fn template(&self, parameter: &str) -> Option<String> {
		match self {
			BindingAttribute::Queue { name } => Some(name.clone().unwrap_or_else(|| parameter.to_string())),
			BindingAttribute::Blob { path } => Some(path.clone()),
			BindingAttribute::Table {
				table,
				partition_key,
				row_key,
			} => {
				let mut template = table.clone();
				if let Some(pk) = partition_key {
					template.push('/');
					template.push_str(pk);
					if let Some(rk) = row_key {
						template.push('/');
						template.push_str(rk);
					}
				}
				Some(template)
			},
			BindingAttribute::Host => None,
		}
	}
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
	pub name: String,
	#[serde(rename = "type")]
	pub param_type: ParamType,
	#[serde(default = "default_direction")]
	pub direction: Direction,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub binding: Option<BindingAttribute>,
}

fn default_direction() -> Direction {
	Direction::In
}

impl ParameterDescriptor {
	pub fn new(name: impl Into<String>, param_type: ParamType, direction: Direction) -> Self {
		Self {
			name: name.into(),
			param_type,
			direction,
			binding: None,
		}
	}

	pub fn with_binding(mut self, binding: BindingAttribute) -> Self {
		self.binding = Some(binding);
		self
	}
}

/// Persisted summary of a resolved binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingDescription {
	pub parameter: String,
	pub provider: String,
	pub resource: ResourceKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	pub direction: Direction,
}

/// Metadata attached by convention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingHints {
	/// Parameters filled from template tokens rather than from a resource
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub route_parameters: BTreeSet<String>,
	/// Parameter name -> resource-name template
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub templates: BTreeMap<String, String>,
	/// Free-form description marker, if the method carried one
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

/// Structured record of a discovered function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
	pub location: Location,
	pub parameters: Vec<ParameterDescriptor>,
	#[serde(default)]
	pub bindings: Vec<BindingDescription>,
	#[serde(default)]
	pub hints: BindingHints,
}

impl FunctionDescriptor {
	pub fn display_name(&self) -> String {
		self.location.short_name()
	}
}

impl Entity for FunctionDescriptor {
	fn entity_key(&self) -> String {
		self.location.key()
	}
}
