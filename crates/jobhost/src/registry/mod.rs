// Function Registry Module
//
// Persisted set of function descriptors in one entity-store table:
// - add: conditional insert, replace on changed content
// - read_all / read_module: scans used for snapshots
// - lookup / delete: point operations by location

mod error;

use std::fmt;
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, info, warn};

pub use error::RegistryError;

use crate::descriptor::{FunctionDescriptor, Location};
use crate::reconcile::RegistrySnapshot;
use crate::store::{EntityStore, Filter, GetOrInsert, RawEntity, StoreError, to_raw};

/// Default table holding function descriptors
pub const DEFAULT_TABLE: &str = "functions";

/// What [`FunctionRegistry::add`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
	/// No record existed; the descriptor was stored
	Inserted,
	/// An identical record existed; nothing was written
	Unchanged,
	/// A record with different content was replaced
	Replaced,
}

impl AddOutcome {
	/// Whether the stored content differs from before the call
	pub fn changed(self) -> bool {
		!matches!(self, AddOutcome::Unchanged)
	}
}

/// Registry of discovered functions backed by an [`EntityStore`]
#[derive(Clone)]
pub struct FunctionRegistry {
	store: Arc<dyn EntityStore>,
	table: String,
}

impl fmt::Debug for FunctionRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FunctionRegistry").field("table", &self.table).finish()
	}
}

impl FunctionRegistry {
	/// Create a registry over `store` using the default table
	pub fn new(store: Arc<dyn EntityStore>) -> Self {
		Self::with_table(store, DEFAULT_TABLE)
	}

	pub fn with_table(store: Arc<dyn EntityStore>, table: impl Into<String>) -> Self {
		Self {
			store,
			table: table.into(),
		}
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	/// Register a descriptor.
	///
	/// Identical content is a no-op. Different content under the same location
	/// is replaced by delete-then-insert; the window between the two is not
	/// atomic, and a concurrent run that re-inserts first wins.
	pub async fn add(&self, descriptor: &FunctionDescriptor) -> Result<AddOutcome, RegistryError> {
		let raw = to_raw(descriptor)?;
		let existing = match self.store.get_or_insert(&self.table, raw.clone()).await? {
			GetOrInsert::Inserted(_) => {
				debug!(target: "job_index", function = %descriptor.location, "function inserted");
				return Ok(AddOutcome::Inserted);
			},
			GetOrInsert::Existing(existing) => existing,
		};

		let unchanged = serde_json::from_value::<FunctionDescriptor>(existing.body).is_ok_and(|stored| stored == *descriptor);
		if unchanged {
			debug!(target: "job_index", function = %descriptor.location, "function unchanged");
			return Ok(AddOutcome::Unchanged);
		}

		self.replace(raw).await?;
		info!(target: "job_index", function = %descriptor.location, "function updated");
		Ok(AddOutcome::Replaced)
	}

	async fn replace(&self, raw: RawEntity) -> Result<(), RegistryError> {
		match self.store.delete(&self.table, &raw.key).await {
			Ok(()) | Err(StoreError::NotFound { .. }) => {},
			Err(e) => return Err(e.into()),
		}
		match self.store.insert_entity(&self.table, raw).await {
			Ok(()) => Ok(()),
			Err(StoreError::DuplicateKey { key, .. }) => {
				warn!(target: "job_index", key = %key, "function re-inserted concurrently, keeping stored record");
				Ok(())
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Every stored descriptor.
	///
	/// Not isolated from concurrent writers; callers must tolerate staleness.
	pub async fn read_all(&self) -> Result<Vec<FunctionDescriptor>, RegistryError> {
		self.scan(&[]).await
	}

	/// Stored descriptors declared in `module`
	pub async fn read_module(&self, module: &str) -> Result<Vec<FunctionDescriptor>, RegistryError> {
		self.scan(&[Filter::eq("location.module", module)]).await
	}

	/// Locations of every stored descriptor, as an immutable snapshot
	pub async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
		let descriptors = self.read_all().await?;
		Ok(descriptors.into_iter().map(|d| d.location).collect())
	}

	async fn scan(&self, filters: &[Filter]) -> Result<Vec<FunctionDescriptor>, RegistryError> {
		let mut rows = self.store.query(&self.table, usize::MAX, filters).await?;
		let mut descriptors = Vec::new();
		while let Some(raw) = rows.try_next().await? {
			descriptors.push(decode(raw)?);
		}
		Ok(descriptors)
	}

	/// Point lookup; an absent location is `Ok(None)`
	pub async fn lookup(&self, location: &Location) -> Result<Option<FunctionDescriptor>, RegistryError> {
		self.store
			.get(&self.table, &location.key())
			.await?
			.map(decode)
			.transpose()
	}

	/// Remove a descriptor's record
	pub async fn delete(&self, descriptor: &FunctionDescriptor) -> Result<(), RegistryError> {
		self.delete_location(&descriptor.location).await
	}

	/// Remove the record stored under `location`
	pub async fn delete_location(&self, location: &Location) -> Result<(), RegistryError> {
		match self.store.delete(&self.table, &location.key()).await {
			Ok(()) => {
				info!(target: "job_index", function = %location, "function deleted");
				Ok(())
			},
			Err(StoreError::NotFound { .. }) => Err(RegistryError::not_found(location)),
			Err(e) => Err(e.into()),
		}
	}
}

fn decode(raw: RawEntity) -> Result<FunctionDescriptor, RegistryError> {
	serde_json::from_value(raw.body).map_err(|e| RegistryError::CorruptRecord {
		key: raw.key,
		message: e.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::descriptor::{Direction, ParamType, ParameterDescriptor};
	use crate::store::MemoryEntityStore;

	fn descriptor(module: &str, method: &str) -> FunctionDescriptor {
		FunctionDescriptor {
			location: Location::new(module, "Jobs", method),
			parameters: vec![ParameterDescriptor::new("input", ParamType::Text, Direction::In)],
			bindings: Vec::new(),
			hints: Default::default(),
		}
	}

	fn registry() -> (Arc<MemoryEntityStore>, FunctionRegistry) {
		let store = Arc::new(MemoryEntityStore::new());
		let registry = FunctionRegistry::new(store.clone());
		(store, registry)
	}

	#[tokio::test]
	async fn test_add_is_idempotent() {
		let (store, registry) = registry();
		let d = descriptor("m", "Run");

		assert_eq!(registry.add(&d).await.unwrap(), AddOutcome::Inserted);
		assert_eq!(registry.add(&d).await.unwrap(), AddOutcome::Unchanged);
		assert_eq!(store.len(DEFAULT_TABLE), 1);
	}

	#[tokio::test]
	async fn test_add_replaces_changed_content() {
		let (store, registry) = registry();
		let d = descriptor("m", "Run");
		registry.add(&d).await.unwrap();

		let mut changed = d.clone();
		changed
			.parameters
			.push(ParameterDescriptor::new("extra", ParamType::Bytes, Direction::In));
		assert_eq!(registry.add(&changed).await.unwrap(), AddOutcome::Replaced);

		assert_eq!(store.len(DEFAULT_TABLE), 1);
		assert_eq!(registry.lookup(&d.location).await.unwrap(), Some(changed));
	}

	#[tokio::test]
	async fn test_add_replaces_corrupt_record() {
		let (store, registry) = registry();
		let d = descriptor("m", "Run");
		store
			.insert_entity(DEFAULT_TABLE, RawEntity::new(d.location.key(), serde_json::json!({"bogus": true})))
			.await
			.unwrap();

		assert_eq!(registry.add(&d).await.unwrap(), AddOutcome::Replaced);
		assert_eq!(registry.lookup(&d.location).await.unwrap(), Some(d));
	}

	/// Store that lets another writer re-insert a record right after the
	/// registry deletes it
	struct InterleavedWriter {
		inner: MemoryEntityStore,
		pending: parking_lot::Mutex<Option<RawEntity>>,
	}

	#[async_trait::async_trait]
	impl EntityStore for InterleavedWriter {
		async fn get_or_insert(&self, table: &str, entity: RawEntity) -> Result<GetOrInsert<RawEntity>, StoreError> {
			self.inner.get_or_insert(table, entity).await
		}

		async fn insert_entity(&self, table: &str, entity: RawEntity) -> Result<(), StoreError> {
			self.inner.insert_entity(table, entity).await
		}

		async fn query(
			&self,
			table: &str,
			limit: usize,
			filters: &[Filter],
		) -> Result<crate::store::EntityStream, StoreError> {
			self.inner.query(table, limit, filters).await
		}

		async fn get(&self, table: &str, key: &str) -> Result<Option<RawEntity>, StoreError> {
			self.inner.get(table, key).await
		}

		async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
			self.inner.delete(table, key).await?;
			let pending = self.pending.lock().take();
			if let Some(entity) = pending {
				self.inner.insert_entity(table, entity).await?;
			}
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_replace_keeps_concurrently_inserted_record() {
		let d = descriptor("m", "Run");
		let mut ours = d.clone();
		ours
			.parameters
			.push(ParameterDescriptor::new("ours", ParamType::Bytes, Direction::In));
		let mut theirs = d.clone();
		theirs
			.parameters
			.push(ParameterDescriptor::new("theirs", ParamType::Bytes, Direction::In));

		let store = Arc::new(InterleavedWriter {
			inner: MemoryEntityStore::new(),
			pending: parking_lot::Mutex::new(Some(to_raw(&theirs).unwrap())),
		});
		let registry = FunctionRegistry::new(store.clone());
		store.inner.insert_entity(DEFAULT_TABLE, to_raw(&d).unwrap()).await.unwrap();

		assert_eq!(registry.add(&ours).await.unwrap(), AddOutcome::Replaced);
		assert_eq!(store.inner.len(DEFAULT_TABLE), 1);
		assert_eq!(registry.lookup(&d.location).await.unwrap(), Some(theirs));
	}

	#[tokio::test]
	async fn test_lookup_absent_is_none() {
		let (_, registry) = registry();
		assert_eq!(registry.lookup(&Location::new("m", "Jobs", "Nope")).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_delete_missing_is_not_found() {
		let (_, registry) = registry();
		let err = registry.delete(&descriptor("m", "Gone")).await.unwrap_err();
		assert_matches!(err, RegistryError::NotFound(location) if location.method == "Gone");
	}

	#[tokio::test]
	async fn test_read_module_filters() {
		let (_, registry) = registry();
		for (module, method) in [("a", "One"), ("b", "Two"), ("a", "Three")] {
			registry.add(&descriptor(module, method)).await.unwrap();
		}

		let mut methods: Vec<String> = registry
			.read_module("a")
			.await
			.unwrap()
			.into_iter()
			.map(|d| d.location.method)
			.collect();
		methods.sort();
		assert_eq!(methods, vec!["One".to_string(), "Three".to_string()]);

		let snapshot = registry.snapshot().await.unwrap();
		assert_eq!(snapshot.len(), 3);
		assert!(snapshot.contains(&Location::new("b", "Jobs", "Two")));
	}

	#[tokio::test]
	async fn test_corrupt_record_fails_scan() {
		let (store, registry) = registry();
		store
			.insert_entity(DEFAULT_TABLE, RawEntity::new("x", serde_json::json!(42)))
			.await
			.unwrap();
		assert_matches!(registry.read_all().await, Err(RegistryError::CorruptRecord { key, .. }) if key == "x");
	}
}
