// Binding Resolution Module
//
// Maps a declared parameter onto an external resource:
// - BindingProvider: one capability check producing an ArgumentBinding or declining
// - ProviderChain: ordered providers, first match wins
// - ArgumentBinding: per-parameter conversion between resource content and value

mod io;
mod path;
mod providers;
#[cfg(any(test, feature = "testing"))]
pub mod recording;

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use io::{
	FlushOutcome, ParamValue, ResourceAddress, ResourceError, ResourceReader, ResourceWriter, RouteValues,
};
pub use path::ResourcePath;
pub use providers::{HostContextProvider, PayloadProvider, RouteParameterProvider, TableEntityProvider};

use crate::descriptor::{BindingDescription, Direction, ParamType, ParameterDescriptor};

/// Kind of external resource a parameter is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
	Queue,
	Blob,
	Table,
	/// Supplied by the host (invocation context and similar)
	Host,
	/// Filled from a template token of another binding
	Route,
	Other(String),
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceKind::Queue => f.write_str("queue"),
			ResourceKind::Blob => f.write_str("blob"),
			ResourceKind::Table => f.write_str("table"),
			ResourceKind::Host => f.write_str("host"),
			ResourceKind::Route => f.write_str("route"),
			ResourceKind::Other(name) => f.write_str(name),
		}
	}
}

/// Errors from binding resolution and from bound I/O
#[derive(Error, Debug)]
pub enum BindingError {
	#[error("no binding provider accepts parameter '{parameter}' ({direction} {param_type})")]
	Unbindable {
		parameter: String,
		param_type: ParamType,
		direction: Direction,
	},

	#[error("invalid resource template '{template}': {reason}")]
	InvalidTemplate { template: String, reason: String },

	#[error("template '{template}' references unknown parameter '{name}'")]
	UnknownTemplateParameter { template: String, name: String },

	#[error("no route value for '{name}' in template '{template}'")]
	MissingRouteValue { template: String, name: String },

	#[error("parameter '{parameter}' expects a {expected} value, got {actual}")]
	ValueMismatch {
		parameter: String,
		expected: &'static str,
		actual: &'static str,
	},

	#[error("parameter '{0}' has no inbound conversion")]
	NotReadable(String),

	#[error("parameter '{0}' has no outbound conversion")]
	NotWritable(String),

	#[error("failed to decode content for parameter '{parameter}': {message}")]
	Decode { parameter: String, message: String },

	#[error("failed to encode value for parameter '{parameter}': {message}")]
	Encode { parameter: String, message: String },

	#[error(transparent)]
	Resource(#[from] ResourceError),
}

impl BindingError {
	pub fn invalid_template(template: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidTemplate {
			template: template.into(),
			reason: reason.into(),
		}
	}

	pub fn unbindable(parameter: &ParameterDescriptor) -> Self {
		Self::Unbindable {
			parameter: parameter.name.clone(),
			param_type: parameter.param_type.clone(),
			direction: parameter.direction,
		}
	}
}

/// Wire representation a conversion reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
	Bytes,
	Text,
	Json,
}

impl Conversion {
	fn name(self) -> &'static str {
		match self {
			Conversion::Bytes => "bytes",
			Conversion::Text => "text",
			Conversion::Json => "json",
		}
	}

	/// Conversion matching a declared static type
	pub fn for_type(param_type: &ParamType) -> Self {
		match param_type {
			ParamType::Bytes => Conversion::Bytes,
			ParamType::Text => Conversion::Text,
			ParamType::Object(_) | ParamType::Other(_) => Conversion::Json,
		}
	}
}

/// How an inbound value is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
	/// Read resource content and decode it
	Content(Conversion),
	/// Take the route value named after the parameter
	Route,
}

/// Everything a provider may inspect when deciding on a parameter
#[derive(Debug, Clone, Copy)]
pub struct BindingRequest<'a> {
	pub parameter: &'a ParameterDescriptor,
	/// Parsed template of the parameter's binding attribute, if it has one
	pub path: Option<&'a ResourcePath>,
	/// Names referenced by template tokens anywhere in the function
	pub route_parameters: &'a BTreeSet<String>,
}

/// Resolved conversion strategy between one resource and one parameter
#[derive(Debug, Clone)]
pub struct ArgumentBinding {
	parameter: String,
	provider: &'static str,
	value_type: ParamType,
	direction: Direction,
	resource: ResourceKind,
	path: Option<ResourcePath>,
	inbound: Option<Inbound>,
	outbound: Option<Conversion>,
}

impl ArgumentBinding {
	pub fn new(provider: &'static str, request: &BindingRequest<'_>, resource: ResourceKind) -> Self {
		Self {
			parameter: request.parameter.name.clone(),
			provider,
			value_type: request.parameter.param_type.clone(),
			direction: request.parameter.direction,
			resource,
			path: request.path.cloned(),
			inbound: None,
			outbound: None,
		}
	}

	pub fn with_inbound(mut self, inbound: Inbound) -> Self {
		self.inbound = Some(inbound);
		self
	}

	pub fn with_outbound(mut self, conversion: Conversion) -> Self {
		self.outbound = Some(conversion);
		self
	}

	pub fn parameter(&self) -> &str {
		&self.parameter
	}

	/// Name of the provider that created this binding
	pub fn provider(&self) -> &'static str {
		self.provider
	}

	pub fn value_type(&self) -> &ParamType {
		&self.value_type
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	pub fn resource(&self) -> &ResourceKind {
		&self.resource
	}

	pub fn path(&self) -> Option<&ResourcePath> {
		self.path.as_ref()
	}

	pub fn can_read(&self) -> bool {
		self.inbound.is_some()
	}

	pub fn can_write(&self) -> bool {
		self.outbound.is_some()
	}

	/// Resolve the concrete resource for one invocation
	pub fn address(&self, route: &RouteValues) -> Result<ResourceAddress, BindingError> {
		let name = match &self.path {
			Some(path) => path.resolve(route)?,
			None => self.value_type.to_string(),
		};
		Ok(ResourceAddress::new(self.resource.clone(), name))
	}

	/// Produce the parameter value for an invocation.
	///
	/// Returns `Ok(None)` when the backing resource does not exist.
	pub async fn read_from(
		&self,
		route: &RouteValues,
		reader: &dyn ResourceReader,
	) -> Result<Option<ParamValue>, BindingError> {
		let inbound = self
			.inbound
			.ok_or_else(|| BindingError::NotReadable(self.parameter.clone()))?;

		let conversion = match inbound {
			Inbound::Route => {
				let value = route.get(&self.parameter).ok_or_else(|| BindingError::MissingRouteValue {
					template: self.path.as_ref().map(|p| p.to_string()).unwrap_or_default(),
					name: self.parameter.clone(),
				})?;
				return Ok(Some(ParamValue::Text(value.clone())));
			},
			Inbound::Content(conversion) => conversion,
		};

		let address = self.address(route)?;
		let Some(content) = reader.read(&address).await? else {
			debug!(target: "job_bindings", parameter = %self.parameter, %address, "resource missing");
			return Ok(None);
		};
		self.decode(conversion, content).map(Some)
	}

	/// Write an output value back to its resource.
	///
	/// `None` (or a JSON `null`) performs no write. Any present value,
	/// including an empty payload, performs exactly one write.
	pub async fn flush(
		&self,
		value: Option<ParamValue>,
		route: &RouteValues,
		writer: &dyn ResourceWriter,
	) -> Result<FlushOutcome, BindingError> {
		let conversion = self
			.outbound
			.ok_or_else(|| BindingError::NotWritable(self.parameter.clone()))?;

		let Some(payload) = value.map(|v| self.encode(conversion, v)).transpose()?.flatten() else {
			debug!(target: "job_bindings", parameter = %self.parameter, "output unset, skipping write");
			return Ok(FlushOutcome::Skipped);
		};

		let address = self.address(route)?;
		let len = payload.len();
		writer.write(&address, payload).await?;
		debug!(target: "job_bindings", parameter = %self.parameter, %address, len, "output written");
		Ok(FlushOutcome::Written { len })
	}

	/// Persisted summary of this binding
	pub fn describe(&self) -> BindingDescription {
		BindingDescription {
			parameter: self.parameter.clone(),
			provider: self.provider.to_string(),
			resource: self.resource.clone(),
			target: self.path.as_ref().map(|p| p.to_string()),
			direction: self.direction,
		}
	}

	fn decode(&self, conversion: Conversion, content: Bytes) -> Result<ParamValue, BindingError> {
		let decode_err = |message: String| BindingError::Decode {
			parameter: self.parameter.clone(),
			message,
		};
		match conversion {
			Conversion::Bytes => Ok(ParamValue::Bytes(content)),
			Conversion::Text => String::from_utf8(content.to_vec())
				.map(ParamValue::Text)
				.map_err(|e| decode_err(e.to_string())),
			Conversion::Json => serde_json::from_slice(&content)
				.map(ParamValue::Json)
				.map_err(|e| decode_err(e.to_string())),
		}
	}

	/// `Ok(None)` means the value counts as absent
	fn encode(&self, conversion: Conversion, value: ParamValue) -> Result<Option<Bytes>, BindingError> {
		match (conversion, value) {
			(Conversion::Bytes, ParamValue::Bytes(b)) => Ok(Some(b)),
			(Conversion::Text, ParamValue::Text(s)) => Ok(Some(Bytes::from(s))),
			(Conversion::Json, ParamValue::Json(serde_json::Value::Null)) => Ok(None),
			(Conversion::Json, ParamValue::Json(v)) => serde_json::to_vec(&v)
				.map(|b| Some(Bytes::from(b)))
				.map_err(|e| BindingError::Encode {
					parameter: self.parameter.clone(),
					message: e.to_string(),
				}),
			(expected, actual) => Err(BindingError::ValueMismatch {
				parameter: self.parameter.clone(),
				expected: expected.name(),
				actual: actual.kind(),
			}),
		}
	}
}

/// A capability-matching strategy that may bind a parameter
pub trait BindingProvider: Send + Sync {
	/// Stable name recorded in binding descriptions
	fn name(&self) -> &'static str;

	/// Return a binding if this provider handles the parameter, `None` to decline
	fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding>;
}

/// Ordered provider list; the first provider that accepts wins
#[derive(Default)]
pub struct ProviderChain {
	providers: Vec<Box<dyn BindingProvider>>,
}

impl fmt::Debug for ProviderChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderChain")
			.field("providers", &self.provider_names())
			.finish()
	}
}

impl ProviderChain {
	/// Create an empty chain
	pub fn new() -> Self {
		Self::default()
	}

	/// Built-in providers, most specific first
	pub fn default_chain() -> Self {
		Self::new()
			.with(PayloadProvider::output_bytes())
			.with(PayloadProvider::output_text())
			.with(PayloadProvider::output_object())
			.with(PayloadProvider::input_bytes())
			.with(PayloadProvider::input_text())
			.with(PayloadProvider::input_object())
			.with(TableEntityProvider)
			.with(RouteParameterProvider)
			.with(HostContextProvider)
	}

	/// Append a provider (builder form)
	pub fn with(mut self, provider: impl BindingProvider + 'static) -> Self {
		self.register(Box::new(provider));
		self
	}

	/// Append a provider after all existing ones
	pub fn register(&mut self, provider: Box<dyn BindingProvider>) {
		self.providers.push(provider);
	}

	pub fn len(&self) -> usize {
		self.providers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.providers.is_empty()
	}

	pub fn provider_names(&self) -> Vec<&'static str> {
		self.providers.iter().map(|p| p.name()).collect()
	}

	/// First non-declining provider's binding, in registration order
	pub fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding> {
		self.providers.iter().find_map(|provider| {
			let binding = provider.try_create(request)?;
			debug!(
				target: "job_bindings",
				parameter = %request.parameter.name,
				provider = provider.name(),
				"parameter bound"
			);
			Some(binding)
		})
	}

	/// Like [`ProviderChain::try_create`] but reports an unbindable parameter as an error
	pub fn resolve(&self, request: &BindingRequest<'_>) -> Result<ArgumentBinding, BindingError> {
		self.try_create(request)
			.ok_or_else(|| BindingError::unbindable(request.parameter))
	}
}
