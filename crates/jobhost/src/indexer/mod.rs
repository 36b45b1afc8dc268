// Indexer Module
//
// One indexing run walks a module's methods and reconciles them into the
// function registry:
// - candidate check through an injected CandidatePolicy
// - parameter binding through the provider chain
// - accepted descriptors are added and recorded in a per-run TouchedSet
// - entries of the module that were not submitted are removed
// - before/after snapshots feed the change-set reconciler

mod error;
mod report;
mod touched;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use error::IndexError;
pub use report::{DeleteOutcome, FunctionError, IndexReport, RunOutcome};
pub use touched::TouchedSet;

use crate::binding::{BindingError, BindingRequest, ProviderChain, ResourcePath};
use crate::descriptor::{BindingHints, FunctionDescriptor, Location};
use crate::module::{DESCRIPTION_MARKER, JOB_MARKER, MethodInfo, ModuleLocator, ModuleSource};
use crate::reconcile::ChangeSet;
use crate::registry::{FunctionRegistry, RegistryError};

/// Decides which methods of a module are job functions
pub trait CandidatePolicy: Send + Sync {
	fn is_candidate(&self, method: &MethodInfo) -> bool;
}

impl<F> CandidatePolicy for F
where
	F: Fn(&MethodInfo) -> bool + Send + Sync,
{
	fn is_candidate(&self, method: &MethodInfo) -> bool {
		self(method)
	}
}

/// Only methods carrying one of the configured markers are candidates
#[derive(Debug, Clone)]
pub struct MarkedOnly {
	markers: Vec<String>,
}

impl MarkedOnly {
	pub fn new(markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			markers: markers.into_iter().map(Into::into).collect(),
		}
	}
}

impl Default for MarkedOnly {
	fn default() -> Self {
		Self::new([JOB_MARKER])
	}
}

impl CandidatePolicy for MarkedOnly {
	fn is_candidate(&self, method: &MethodInfo) -> bool {
		self.markers.iter().any(|m| method.has_marker(m))
	}
}

/// Every public method is a candidate unless its name starts with an excluded
/// prefix. A job marker always makes a method a candidate.
#[derive(Debug, Clone, Default)]
pub struct AllPublic {
	exclude_prefixes: Vec<String>,
}

impl AllPublic {
	pub fn new(exclude_prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			exclude_prefixes: exclude_prefixes.into_iter().map(Into::into).collect(),
		}
	}
}

impl CandidatePolicy for AllPublic {
	fn is_candidate(&self, method: &MethodInfo) -> bool {
		if method.has_marker(JOB_MARKER) {
			return true;
		}
		method.is_public && !self.exclude_prefixes.iter().any(|p| method.name.starts_with(p.as_str()))
	}
}

/// Maps a method of a module to its stable identity
pub trait LocationResolver: Send + Sync {
	fn resolve(&self, module: &str, method: &MethodInfo) -> Location;
}

/// `module` + declaring type + method name
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaringTypeResolver;

impl LocationResolver for DeclaringTypeResolver {
	fn resolve(&self, module: &str, method: &MethodInfo) -> Location {
		Location::new(module, method.declaring_type.as_str(), method.name.as_str())
	}
}

#[derive(Clone)]
pub struct Indexer {
	registry: FunctionRegistry,
	providers: Arc<ProviderChain>,
	policy: Arc<dyn CandidatePolicy>,
	resolver: Arc<dyn LocationResolver>,
}

impl fmt::Debug for Indexer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Indexer")
			.field("registry", &self.registry)
			.field("providers", &self.providers)
			.finish_non_exhaustive()
	}
}

impl Indexer {
	/// Indexer with the default provider chain, marker policy and resolver
	pub fn new(registry: FunctionRegistry) -> Self {
		Self {
			registry,
			providers: Arc::new(ProviderChain::default_chain()),
			policy: Arc::new(MarkedOnly::default()),
			resolver: Arc::new(DeclaringTypeResolver),
		}
	}

	pub fn with_providers(mut self, providers: ProviderChain) -> Self {
		self.providers = Arc::new(providers);
		self
	}

	pub fn with_policy(mut self, policy: impl CandidatePolicy + 'static) -> Self {
		self.policy = Arc::new(policy);
		self
	}

	pub fn with_resolver(mut self, resolver: impl LocationResolver + 'static) -> Self {
		self.resolver = Arc::new(resolver);
		self
	}

	pub fn registry(&self) -> &FunctionRegistry {
		&self.registry
	}

	pub fn providers(&self) -> &ProviderChain {
		&self.providers
	}

	/// Build the descriptor for one method, or the reason it cannot be bound.
	///
	/// Every parameter is checked so that the reason lists all problems at once.
	pub fn describe(&self, location: Location, method: &MethodInfo) -> Result<FunctionDescriptor, String> {
		let mut problems: Vec<String> = Vec::new();

		let mut names = HashSet::new();
		for param in &method.parameters {
			if !names.insert(param.name.as_str()) {
				problems.push(format!("duplicate parameter '{}'", param.name));
			}
		}

		let mut paths: BTreeMap<String, ResourcePath> = BTreeMap::new();
		for param in &method.parameters {
			let Some(attribute) = &param.binding else {
				continue;
			};
			if let Err(e) = attribute.validate() {
				problems.push(e.to_string());
				continue;
			}
			let Some(template) = attribute.template(&param.name) else {
				continue;
			};
			match ResourcePath::parse(&template) {
				Ok(path) => {
					for token in path.tokens() {
						if token == param.name || !names.contains(token) {
							problems.push(
								BindingError::UnknownTemplateParameter {
									template: template.clone(),
									name: token.to_string(),
								}
								.to_string(),
							);
						}
					}
					paths.insert(param.name.clone(), path);
				},
				Err(e) => problems.push(e.to_string()),
			}
		}

		let route_parameters: BTreeSet<String> = paths
			.values()
			.flat_map(|p| p.tokens())
			.map(str::to_string)
			.collect();

		let mut bindings = Vec::with_capacity(method.parameters.len());
		for param in &method.parameters {
			let request = BindingRequest {
				parameter: param,
				path: paths.get(&param.name),
				route_parameters: &route_parameters,
			};
			match self.providers.resolve(&request) {
				Ok(binding) => bindings.push(binding.describe()),
				Err(e) => problems.push(e.to_string()),
			}
		}

		if !problems.is_empty() {
			return Err(problems.join("; "));
		}

		let hints = BindingHints {
			route_parameters,
			templates: paths.into_iter().map(|(name, path)| (name, path.to_string())).collect(),
			description: method.marker_value(DESCRIPTION_MARKER).map(str::to_string),
		};
		Ok(FunctionDescriptor {
			location,
			parameters: method.parameters.clone(),
			bindings,
			hints,
		})
	}

	/// Run one indexing pass over `module`.
	///
	/// Per-method problems end up in the report. The run itself fails only if
	/// the module cannot be enumerated or the registry is unreachable.
	pub async fn index(&self, module: &dyn ModuleSource) -> Result<IndexReport, IndexError> {
		let module_name = module.name().to_string();
		info!(target: "job_index", module = %module_name, "indexing started");

		let before = self.registry.snapshot().await?;
		let methods = module.methods()?;

		let mut touched = TouchedSet::new();
		let mut seen = HashSet::new();
		let mut errors = Vec::new();
		for method in &methods {
			if !self.policy.is_candidate(method) {
				debug!(target: "job_index", method = %method.display_name(), "not a candidate");
				continue;
			}

			let location = self.resolver.resolve(&module_name, method);
			if !seen.insert(location.clone()) {
				warn!(target: "job_index", function = %location, "duplicate function identity");
				errors.push(FunctionError::new(
					method.display_name(),
					format!("duplicate function identity {}", location),
				));
				continue;
			}

			match self.describe(location.clone(), method) {
				Ok(descriptor) => {
					let outcome = self.registry.add(&descriptor).await?;
					debug!(target: "job_index", function = %location, ?outcome, "function accepted");
					touched.record(location, outcome);
				},
				Err(reason) => {
					warn!(target: "job_index", function = %location, %reason, "function rejected");
					errors.push(FunctionError::new(method.display_name(), reason));
				},
			}
		}

		self.remove_stale(&module_name, &touched).await?;

		let after = self.registry.snapshot().await?;
		let changes = ChangeSet::compute(&before, &after, &touched.changed());
		let report = IndexReport::new(module_name, changes, errors);
		info!(
			target: "job_index",
			module = %report.module,
			added = report.added_functions.len(),
			updated = report.updated_functions.len(),
			deleted = report.deleted_functions.len(),
			errors = report.errors.len(),
			"indexing completed"
		);
		Ok(report)
	}

	/// Parse a locator, load the module it names and index it
	pub async fn index_locator(&self, locator: &str) -> Result<IndexReport, IndexError> {
		let locator = ModuleLocator::parse(locator)?;
		debug!(target: "job_index", %locator, "loading module");
		let module = locator.load()?;
		self.index(&module).await
	}

	/// Delete entries of `module` that this run did not submit
	async fn remove_stale(&self, module: &str, touched: &TouchedSet) -> Result<(), IndexError> {
		for descriptor in self.registry.read_module(module).await? {
			if touched.contains(&descriptor.location) {
				continue;
			}
			match self.registry.delete(&descriptor).await {
				Ok(()) => {
					debug!(target: "job_index", function = %descriptor.location, "removed stale function");
				},
				Err(RegistryError::NotFound(location)) => {
					debug!(target: "job_index", function = %location, "stale function already gone");
				},
				Err(e) => return Err(e.into()),
			}
		}
		Ok(())
	}

	/// Delete one function by storage key or `module:Type.method`
	pub async fn delete_function(&self, identity: &str) -> Result<DeleteOutcome, IndexError> {
		// Display names may contain '/' in the module, so they are tried first
		// whenever the identity carries a ':' separator.
		let parses = if identity.contains(':') {
			[Location::parse_display(identity), Location::from_key(identity)]
		} else {
			[Location::from_key(identity), Location::parse_display(identity)]
		};
		let mut candidates: Vec<Location> = Vec::with_capacity(2);
		let mut first_error = None;
		for parsed in parses {
			match parsed {
				Ok(location) if !candidates.contains(&location) => candidates.push(location),
				Ok(_) => {},
				Err(e) => {
					first_error.get_or_insert(e);
				},
			}
		}
		let Some(primary) = candidates.first().cloned() else {
			return Ok(DeleteOutcome::Invalid {
				identity: identity.to_string(),
				reason: first_error.map(|e| e.to_string()).unwrap_or_default(),
			});
		};

		for location in &candidates {
			let Some(descriptor) = self.registry.lookup(location).await? else {
				continue;
			};
			return match self.registry.delete(&descriptor).await {
				Ok(()) => Ok(DeleteOutcome::Deleted {
					function: location.to_string(),
				}),
				Err(RegistryError::NotFound(_)) => Ok(DeleteOutcome::NotFound {
					function: location.to_string(),
				}),
				Err(e) => Err(e.into()),
			};
		}

		info!(target: "job_index", function = %primary, "delete target not found");
		Ok(DeleteOutcome::NotFound {
			function: primary.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use assert_matches::assert_matches;

	use super::*;
	use crate::descriptor::{BindingAttribute, Direction, ParamType, ParameterDescriptor};
	use crate::module::{ModuleError, StaticModule};
	use crate::store::MemoryEntityStore;

	fn indexer() -> Indexer {
		Indexer::new(FunctionRegistry::new(Arc::new(MemoryEntityStore::new())))
	}

	fn queue_input(name: &str) -> ParameterDescriptor {
		ParameterDescriptor::new(name, ParamType::Text, Direction::In).with_binding(BindingAttribute::Queue { name: None })
	}

	fn job(name: &str) -> MethodInfo {
		MethodInfo::new("Jobs", name)
			.with_marker(JOB_MARKER)
			.with_parameter(queue_input("message"))
	}

	#[test]
	fn test_policies() {
		let marked = MethodInfo::new("Jobs", "Run").with_marker(JOB_MARKER);
		let plain = MethodInfo::new("Jobs", "Run");
		let hidden = MethodInfo::new("Jobs", "Run").private();
		let helper = MethodInfo::new("Jobs", "HelperRun");

		assert!(MarkedOnly::default().is_candidate(&marked));
		assert!(!MarkedOnly::default().is_candidate(&plain));

		let all = AllPublic::new(["Helper"]);
		assert!(all.is_candidate(&plain));
		assert!(!all.is_candidate(&hidden));
		assert!(!all.is_candidate(&helper));
		assert!(all.is_candidate(&marked.clone().private()));

		let closure = |m: &MethodInfo| m.name.ends_with("Run");
		assert!(closure.is_candidate(&plain));
	}

	#[test]
	fn test_describe_route_parameters_and_hints() {
		let method = MethodInfo::new("Jobs", "Archive")
			.with_marker(JOB_MARKER)
			.with_marker("description=Archive one order")
			.with_parameter(queue_input("message"))
			.with_parameter(ParameterDescriptor::new("id", ParamType::Text, Direction::In))
			.with_parameter(
				ParameterDescriptor::new("archive", ParamType::Bytes, Direction::Out).with_binding(
					BindingAttribute::Blob {
						path: "archive/{id}".to_string(),
					},
				),
			);

		let descriptor = indexer()
			.describe(Location::new("m", "Jobs", "Archive"), &method)
			.unwrap();

		assert_eq!(descriptor.hints.route_parameters, BTreeSet::from(["id".to_string()]));
		assert_eq!(descriptor.hints.templates.get("archive").map(String::as_str), Some("archive/{id}"));
		assert_eq!(descriptor.hints.templates.get("message").map(String::as_str), Some("message"));
		assert_eq!(descriptor.hints.description.as_deref(), Some("Archive one order"));
		let providers: Vec<_> = descriptor.bindings.iter().map(|b| b.provider.as_str()).collect();
		assert_eq!(providers, vec!["in-text", "route", "out-bytes"]);
	}

	#[test]
	fn test_describe_rejects_unknown_template_token() {
		let method = MethodInfo::new("Jobs", "Archive").with_parameter(
			ParameterDescriptor::new("archive", ParamType::Bytes, Direction::Out).with_binding(
				BindingAttribute::Blob {
					path: "archive/{missing}".to_string(),
				},
			),
		);
		let reason = indexer()
			.describe(Location::new("m", "Jobs", "Archive"), &method)
			.unwrap_err();
		assert!(reason.contains("missing"), "{reason}");
	}

	#[test]
	fn test_describe_rejects_row_key_without_partition_key() {
		let method = MethodInfo::new("Jobs", "Lookup")
			.with_parameter(queue_input("id"))
			.with_parameter(
				ParameterDescriptor::new("person", ParamType::Object("Person".into()), Direction::In).with_binding(
					BindingAttribute::Table {
						table: "people".to_string(),
						partition_key: None,
						row_key: Some("{id}".to_string()),
					},
				),
			);
		let reason = indexer()
			.describe(Location::new("m", "Jobs", "Lookup"), &method)
			.unwrap_err();
		assert!(reason.contains("partition key"), "{reason}");
	}

	#[test]
	fn test_describe_lists_every_problem() {
		let method = MethodInfo::new("Jobs", "Broken")
			.with_parameter(ParameterDescriptor::new("a", ParamType::Other("Socket".into()), Direction::In))
			.with_parameter(ParameterDescriptor::new("b", ParamType::Other("Thread".into()), Direction::In));
		let reason = indexer()
			.describe(Location::new("m", "Jobs", "Broken"), &method)
			.unwrap_err();
		assert_eq!(reason.split("; ").count(), 2, "{reason}");
	}

	#[tokio::test]
	async fn test_index_skips_non_candidates() {
		let indexer = indexer();
		let module = StaticModule::new("m")
			.with_method(job("A"))
			.with_method(MethodInfo::new("Jobs", "NotAJob"));

		let report = indexer.index(&module).await.unwrap();
		assert_eq!(report.added_functions, vec![Location::new("m", "Jobs", "A")]);
		assert!(report.errors.is_empty());
		assert_eq!(report.outcome, RunOutcome::Completed);
	}

	#[tokio::test]
	async fn test_index_rejects_duplicate_identity() {
		let indexer = indexer();
		let module = StaticModule::new("m").with_method(job("A")).with_method(job("A"));

		let report = indexer.index(&module).await.unwrap();
		assert_eq!(report.added_functions.len(), 1);
		assert_eq!(report.errors.len(), 1);
		assert_eq!(report.errors[0].function, "Jobs.A");
		assert_eq!(report.outcome, RunOutcome::CompletedWithErrors);
	}

	#[tokio::test]
	async fn test_stale_removal_is_scoped_to_module() {
		let indexer = indexer();
		indexer
			.index(&StaticModule::new("m").with_method(job("A")).with_method(job("B")))
			.await
			.unwrap();
		indexer
			.index(&StaticModule::new("other").with_method(job("A")))
			.await
			.unwrap();

		let report = indexer.index(&StaticModule::new("m").with_method(job("A"))).await.unwrap();
		assert_eq!(report.deleted_functions, vec![Location::new("m", "Jobs", "B")]);
		assert!(report.added_functions.is_empty());
		assert!(report.updated_functions.is_empty());

		let snapshot = indexer.registry().snapshot().await.unwrap();
		assert!(snapshot.contains(&Location::new("other", "Jobs", "A")));
		assert_eq!(snapshot.len(), 2);
	}

	struct Unloadable;

	impl ModuleSource for Unloadable {
		fn name(&self) -> &str {
			"broken"
		}

		fn methods(&self) -> Result<Vec<MethodInfo>, ModuleError> {
			Err(ModuleError::Load {
				module: "broken".to_string(),
				message: "missing dependency".to_string(),
			})
		}
	}

	#[tokio::test]
	async fn test_enumeration_failure_fails_run() {
		let err = indexer().index(&Unloadable).await.unwrap_err();
		assert_matches!(err, IndexError::Module(ModuleError::Load { .. }));
		assert!(!err.is_user_error());

		let report = IndexReport::from_failure("broken", &err);
		assert!(report.is_failure());
	}

	#[tokio::test]
	async fn test_index_locator_rejects_malformed() {
		let err = indexer().index_locator("ftp://host/m.json").await.unwrap_err();
		assert_matches!(err, IndexError::Locator(_));
		assert!(err.is_user_error());
	}

	#[tokio::test]
	async fn test_delete_function() {
		let indexer = indexer();
		indexer.index(&StaticModule::new("m").with_method(job("A"))).await.unwrap();

		let missing = indexer.delete_function("m:Jobs.Gone").await.unwrap();
		assert_eq!(
			missing,
			DeleteOutcome::NotFound {
				function: "m:Jobs.Gone".to_string()
			}
		);

		let key = Location::new("m", "Jobs", "A").key();
		let deleted = indexer.delete_function(&key).await.unwrap();
		assert_matches!(deleted, DeleteOutcome::Deleted { function } if function == "m:Jobs.A");
		assert!(indexer.registry().snapshot().await.unwrap().is_empty());

		assert_matches!(
			indexer.delete_function("no-separator").await.unwrap(),
			DeleteOutcome::Invalid { .. }
		);
	}

	#[tokio::test]
	async fn test_delete_by_display_name_with_slashed_module() {
		let indexer = indexer();
		indexer
			.index(
				&StaticModule::new("a/b/c").with_method(
					MethodInfo::new("T", "m")
						.with_marker(JOB_MARKER)
						.with_parameter(queue_input("message")),
				),
			)
			.await
			.unwrap();

		let deleted = indexer.delete_function("a/b/c:T.m").await.unwrap();
		assert_eq!(
			deleted,
			DeleteOutcome::Deleted {
				function: "a/b/c:T.m".to_string()
			}
		);
		assert!(indexer.registry().snapshot().await.unwrap().is_empty());
	}
}
