//! Resource I/O boundary used by argument bindings at invocation time.
//!
//! The storage backend itself lives outside this crate; it is reached only
//! through [`ResourceReader`] and [`ResourceWriter`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use super::ResourceKind;

/// Values substituted into resource-name templates, keyed by parameter name
pub type RouteValues = BTreeMap<String, String>;

/// A concrete resource: kind plus resolved name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceAddress {
	pub kind: ResourceKind,
	pub name: String,
}

impl ResourceAddress {
	pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
		Self { kind, name: name.into() }
	}
}

impl fmt::Display for ResourceAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind, self.name)
	}
}

/// Runtime value of a bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
	Bytes(Bytes),
	Text(String),
	Json(Value),
}

impl ParamValue {
	pub fn kind(&self) -> &'static str {
		match self {
			ParamValue::Bytes(_) => "bytes",
			ParamValue::Text(_) => "text",
			ParamValue::Json(_) => "json",
		}
	}
}

impl From<Vec<u8>> for ParamValue {
	fn from(value: Vec<u8>) -> Self {
		ParamValue::Bytes(Bytes::from(value))
	}
}

impl From<&str> for ParamValue {
	fn from(value: &str) -> Self {
		ParamValue::Text(value.to_string())
	}
}

impl From<Value> for ParamValue {
	fn from(value: Value) -> Self {
		ParamValue::Json(value)
	}
}

/// Errors raised by the storage backend
#[derive(Error, Debug)]
pub enum ResourceError {
	#[error("resource '{address}' unavailable: {message}")]
	Unavailable { address: String, message: String },

	#[error("access to resource '{0}' denied")]
	AccessDenied(String),
}

/// Outcome of flushing an output binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
	/// The value was absent; nothing was written
	Skipped,
	/// One write of `len` bytes (possibly zero) occurred
	Written { len: usize },
}

/// Reads resource content for inbound bindings
#[async_trait]
pub trait ResourceReader: Send + Sync {
	/// Returns `Ok(None)` if the resource does not exist.
	async fn read(&self, address: &ResourceAddress) -> Result<Option<Bytes>, ResourceError>;
}

/// Writes resource content for outbound bindings.
///
/// An empty `payload` is a real write of empty content, distinct from no call.
#[async_trait]
pub trait ResourceWriter: Send + Sync {
	async fn write(&self, address: &ResourceAddress, payload: Bytes) -> Result<(), ResourceError>;
}
