//! In-memory implementation of EntityStore.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use super::{EntityStore, EntityStream, Filter, GetOrInsert, RawEntity, StoreError, select};

/// In-memory implementation of EntityStore.
///
/// Suitable for tests and single-process hosts. Rows within a table are
/// ordered by key, which is the order `query` yields them in.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
	tables: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryEntityStore {
	/// Create a new empty memory store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of entities in a table.
	pub fn len(&self, table: &str) -> usize {
		self.tables.lock().get(table).map_or(0, BTreeMap::len)
	}

	/// Check if a table is empty or missing.
	pub fn is_empty(&self, table: &str) -> bool {
		self.len(table) == 0
	}

	/// Remove every table.
	pub fn clear(&self) {
		self.tables.lock().clear();
	}
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
	async fn get_or_insert(&self, table: &str, entity: RawEntity) -> Result<GetOrInsert<RawEntity>, StoreError> {
		let mut tables = self.tables.lock();
		let rows = tables.entry(table.to_string()).or_default();
		if let Some(existing) = rows.get(&entity.key) {
			return Ok(GetOrInsert::Existing(RawEntity::new(entity.key, existing.clone())));
		}
		rows.insert(entity.key.clone(), entity.body.clone());
		Ok(GetOrInsert::Inserted(entity))
	}

	async fn insert_entity(&self, table: &str, entity: RawEntity) -> Result<(), StoreError> {
		let mut tables = self.tables.lock();
		let rows = tables.entry(table.to_string()).or_default();
		if rows.contains_key(&entity.key) {
			return Err(StoreError::DuplicateKey {
				table: table.to_string(),
				key: entity.key,
			});
		}
		rows.insert(entity.key, entity.body);
		Ok(())
	}

	async fn query(&self, table: &str, limit: usize, filters: &[Filter]) -> Result<EntityStream, StoreError> {
		let selected = {
			let tables = self.tables.lock();
			match tables.get(table) {
				Some(rows) => select(
					rows.iter().map(|(k, v)| RawEntity::new(k.clone(), v.clone())),
					limit,
					filters,
				),
				None => Vec::new(),
			}
		};
		Ok(futures::stream::iter(selected.into_iter().map(Ok)).boxed())
	}

	async fn get(&self, table: &str, key: &str) -> Result<Option<RawEntity>, StoreError> {
		let tables = self.tables.lock();
		Ok(tables
			.get(table)
			.and_then(|rows| rows.get(key))
			.map(|body| RawEntity::new(key, body.clone())))
	}

	async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
		let mut tables = self.tables.lock();
		let removed = tables.get_mut(table).and_then(|rows| rows.remove(key));
		match removed {
			Some(_) => Ok(()),
			None => Err(StoreError::NotFound {
				table: table.to_string(),
				key: key.to_string(),
			}),
		}
	}
}
