//! Reporting boundary: what an indexing or delete request produced.
//!
//! Locations are kept as [`Location`] values until serialization, where they
//! are rendered as display strings.

use std::fmt;

use itertools::Itertools;
use serde::{Serialize, Serializer};

use super::IndexError;
use crate::descriptor::Location;
use crate::reconcile::ChangeSet;

/// A method that was examined and rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionError {
	/// Human-readable method name (`Type.method`)
	pub function: String,
	pub reason: String,
}

impl FunctionError {
	pub fn new(function: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			function: function.into(),
			reason: reason.into(),
		}
	}
}

impl fmt::Display for FunctionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.function, self.reason)
	}
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RunOutcome {
	Completed,
	CompletedWithErrors,
	Failed { reason: String },
}

/// Structured result of one indexing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
	pub module: String,
	pub outcome: RunOutcome,
	#[serde(serialize_with = "display_names")]
	pub added_functions: Vec<Location>,
	#[serde(serialize_with = "display_names")]
	pub updated_functions: Vec<Location>,
	#[serde(serialize_with = "display_names")]
	pub deleted_functions: Vec<Location>,
	pub errors: Vec<FunctionError>,
}

fn display_names<S: Serializer>(locations: &[Location], serializer: S) -> Result<S::Ok, S::Error> {
	serializer.collect_seq(locations.iter().map(|l| l.to_string()))
}

impl IndexReport {
	pub fn new(module: impl Into<String>, changes: ChangeSet, errors: Vec<FunctionError>) -> Self {
		let outcome = if errors.is_empty() {
			RunOutcome::Completed
		} else {
			RunOutcome::CompletedWithErrors
		};
		Self {
			module: module.into(),
			outcome,
			added_functions: changes.added.into_iter().collect(),
			updated_functions: changes.updated.into_iter().collect(),
			deleted_functions: changes.removed.into_iter().collect(),
			errors,
		}
	}

	/// Report for a run that could not complete
	pub fn from_failure(module: impl Into<String>, error: &IndexError) -> Self {
		Self {
			module: module.into(),
			outcome: RunOutcome::Failed {
				reason: error.to_string(),
			},
			added_functions: Vec::new(),
			updated_functions: Vec::new(),
			deleted_functions: Vec::new(),
			errors: Vec::new(),
		}
	}

	pub fn is_failure(&self) -> bool {
		matches!(self.outcome, RunOutcome::Failed { .. })
	}

	pub fn error_messages(&self) -> Vec<String> {
		self.errors.iter().map(ToString::to_string).collect()
	}
}

impl fmt::Display for IndexReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let RunOutcome::Failed { reason } = &self.outcome {
			return write!(f, "indexing {} failed: {}", self.module, reason);
		}
		write!(
			f,
			"indexed {}: {} added, {} updated, {} deleted, {} errors",
			self.module,
			self.added_functions.len(),
			self.updated_functions.len(),
			self.deleted_functions.len(),
			self.errors.len()
		)?;
		for (label, locations) in [
			("added", &self.added_functions),
			("updated", &self.updated_functions),
			("deleted", &self.deleted_functions),
		] {
			if !locations.is_empty() {
				write!(f, "\n  {}: {}", label, locations.iter().map(Location::short_name).join(", "))?;
			}
		}
		for error in &self.errors {
			write!(f, "\n  error: {}", error)?;
		}
		Ok(())
	}
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum DeleteOutcome {
	Deleted { function: String },
	NotFound { function: String },
	Invalid { identity: String, reason: String },
}

impl fmt::Display for DeleteOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeleteOutcome::Deleted { function } => write!(f, "deleted {}", function),
			DeleteOutcome::NotFound { function } => write!(f, "function not found: {}", function),
			DeleteOutcome::Invalid { identity, reason } => {
				write!(f, "invalid function identity '{}': {}", identity, reason)
			},
		}
	}
}
