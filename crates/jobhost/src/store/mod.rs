//! Entity store abstraction backing the function registry.
//!
//! Stores hold JSON bodies grouped into named tables and keyed by a string.
//! The only concurrency primitive the rest of the crate relies on is
//! [`EntityStore::get_or_insert`], which must be atomic per key.

mod file;
mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use file::FileEntityStore;
pub use memory::MemoryEntityStore;

/// Error type for EntityStore operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("entity '{key}' already exists in table '{table}'")]
	DuplicateKey { table: String, key: String },
	#[error("entity '{key}' not found in table '{table}'")]
	NotFound { table: String, key: String },
	#[error("serialization error: {0}")]
	Serialization(String),
	#[error("storage error: {0}")]
	Storage(String),
}

/// A stored record: key plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
	pub key: String,
	pub body: Value,
}

impl RawEntity {
	pub fn new(key: impl Into<String>, body: Value) -> Self {
		Self { key: key.into(), body }
	}
}

/// Result of a conditional insert
#[derive(Debug, Clone, PartialEq)]
pub enum GetOrInsert<E> {
	/// No entity existed; the given one was stored
	Inserted(E),
	/// An entity already existed and was returned unchanged
	Existing(E),
}

impl<E> GetOrInsert<E> {
	pub fn into_inner(self) -> E {
		match self {
			GetOrInsert::Inserted(e) | GetOrInsert::Existing(e) => e,
		}
	}

	pub fn was_inserted(&self) -> bool {
		matches!(self, GetOrInsert::Inserted(_))
	}

	fn try_map<T, Err>(self, f: impl FnOnce(E) -> Result<T, Err>) -> Result<GetOrInsert<T>, Err> {
		Ok(match self {
			GetOrInsert::Inserted(e) => GetOrInsert::Inserted(f(e)?),
			GetOrInsert::Existing(e) => GetOrInsert::Existing(f(e)?),
		})
	}
}

/// What a [`Filter`] inspects.
///
/// Body paths are walked one object member per segment. Segments are matched
/// literally, so names containing `.`, `/` or `~` are addressable through
/// [`Field::segments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
	/// The entity key
	Key,
	/// Object members of the JSON body, outermost first
	Body(Vec<String>),
}

impl Field {
	/// Body path from a dotted string (`location.module`)
	pub fn path(dotted: &str) -> Self {
		Field::Body(dotted.split('.').map(str::to_string).collect())
	}

	pub fn segments(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Field::Body(segments.into_iter().map(Into::into).collect())
	}

	fn lookup(&self, entity: &RawEntity) -> Option<Value> {
		match self {
			Field::Key => Some(Value::String(entity.key.clone())),
			Field::Body(segments) => segments
				.iter()
				.try_fold(&entity.body, |value, segment| value.get(segment.as_str()))
				.cloned(),
		}
	}
}

impl From<&str> for Field {
	fn from(dotted: &str) -> Self {
		Field::path(dotted)
	}
}

/// Query predicate evaluated by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
	Eq { field: Field, value: Value },
	/// Inclusive lower bound, exclusive upper bound
	Range {
		field: Field,
		lower: Option<Value>,
		upper: Option<Value>,
	},
}

impl Filter {
	pub fn eq(field: impl Into<Field>, value: impl Into<Value>) -> Self {
		Filter::Eq {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn range(field: impl Into<Field>, lower: Option<Value>, upper: Option<Value>) -> Self {
		Filter::Range {
			field: field.into(),
			lower,
			upper,
		}
	}

	/// Evaluate this filter against an entity
	pub fn matches(&self, entity: &RawEntity) -> bool {
		match self {
			Filter::Eq { field, value } => field.lookup(entity).is_some_and(|v| v == *value),
			Filter::Range { field, lower, upper } => {
				let Some(v) = field.lookup(entity) else {
					return false;
				};
				let above = lower
					.as_ref()
					.is_none_or(|l| matches!(compare_values(&v, l), Some(Ordering::Greater | Ordering::Equal)));
				let below = upper
					.as_ref()
					.is_none_or(|u| matches!(compare_values(&v, u), Some(Ordering::Less)));
				above && below
			},
		}
	}
}

/// Strings compare with strings and numbers with numbers; anything else is unordered.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		(Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
		(Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
		_ => None,
	}
}

/// Lazy, finite, single-pass sequence of query results
pub type EntityStream = BoxStream<'static, Result<RawEntity, StoreError>>;

/// EntityStore trait for persisted records with conditional insert.
#[async_trait]
pub trait EntityStore: Send + Sync {
	/// Insert `entity` unless its key already exists.
	///
	/// Returns the stored entity: the given one if inserted, otherwise the
	/// existing one unchanged.
	async fn get_or_insert(&self, table: &str, entity: RawEntity) -> Result<GetOrInsert<RawEntity>, StoreError>;

	/// Insert `entity`, failing with [`StoreError::DuplicateKey`] if the key exists.
	async fn insert_entity(&self, table: &str, entity: RawEntity) -> Result<(), StoreError>;

	/// Return up to `limit` entities matching every filter.
	async fn query(&self, table: &str, limit: usize, filters: &[Filter]) -> Result<EntityStream, StoreError>;

	/// Point read.
	async fn get(&self, table: &str, key: &str) -> Result<Option<RawEntity>, StoreError>;

	/// Delete an entity, failing with [`StoreError::NotFound`] if absent.
	async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError>;
}

/// Entities carry their own storage key
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
	fn entity_key(&self) -> String;
}

pub(crate) fn to_raw<E: Entity>(entity: &E) -> Result<RawEntity, StoreError> {
	let body = serde_json::to_value(entity).map_err(|e| StoreError::Serialization(e.to_string()))?;
	Ok(RawEntity::new(entity.entity_key(), body))
}

fn from_raw<E: Entity>(raw: RawEntity) -> Result<E, StoreError> {
	serde_json::from_value(raw.body).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Typed JSON layer over an [`EntityStore`]
#[async_trait]
pub trait EntityStoreExt: EntityStore {
	async fn get_or_insert_as<E: Entity + 'static>(&self, table: &str, entity: &E) -> Result<GetOrInsert<E>, StoreError> {
		let raw = to_raw(entity)?;
		self.get_or_insert(table, raw).await?.try_map(from_raw)
	}

	async fn insert_as<E: Entity>(&self, table: &str, entity: &E) -> Result<(), StoreError> {
		let raw = to_raw(entity)?;
		self.insert_entity(table, raw).await
	}

	async fn get_as<E: Entity + 'static>(&self, table: &str, key: &str) -> Result<Option<E>, StoreError> {
		self.get(table, key).await?.map(from_raw).transpose()
	}

	async fn query_as<E: Entity + 'static>(
		&self,
		table: &str,
		limit: usize,
		filters: &[Filter],
	) -> Result<BoxStream<'static, Result<E, StoreError>>, StoreError> {
		let stream = self.query(table, limit, filters).await?;
		Ok(stream.map(|item| item.and_then(from_raw)).boxed())
	}
}

// Blanket implementation for all EntityStore implementations
impl<T: EntityStore + ?Sized> EntityStoreExt for T {}

/// Apply filters and limit to an already-materialized table scan
fn select(rows: impl Iterator<Item = RawEntity>, limit: usize, filters: &[Filter]) -> Vec<RawEntity> {
	rows
		.filter(|row| filters.iter().all(|f| f.matches(row)))
		.take(limit)
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn entity() -> RawEntity {
		RawEntity::new(
			"billing/Jobs/Run",
			json!({"location": {"module": "billing", "method": "Run"}, "count": 3}),
		)
	}

	#[test]
	fn test_eq_filter_on_nested_field() {
		assert!(Filter::eq("location.module", "billing").matches(&entity()));
		assert!(!Filter::eq("location.module", "shipping").matches(&entity()));
		assert!(!Filter::eq("location.missing", "billing").matches(&entity()));
	}

	#[test]
	fn test_eq_filter_on_key() {
		assert!(Filter::eq(Field::Key, "billing/Jobs/Run").matches(&entity()));
		assert!(!Filter::eq("key", "billing/Jobs/Run").matches(&entity()));
	}

	#[test]
	fn test_body_segments_match_literally() {
		let e = RawEntity::new(
			"k",
			json!({"key": "body-key", "a/b": {"c~d": 1}, "x.y": true, "a": {"b": {"c~d": 2}}}),
		);
		assert!(Filter::eq("key", "body-key").matches(&e));
		assert!(Filter::eq(Field::segments(["a/b", "c~d"]), 1).matches(&e));
		assert!(Filter::eq(Field::segments(["x.y"]), true).matches(&e));
		assert!(!Filter::eq("x.y", true).matches(&e));
	}

	#[test]
	fn test_range_filter_bounds() {
		let e = entity();
		assert!(Filter::range("count", Some(json!(3)), Some(json!(4))).matches(&e));
		assert!(!Filter::range("count", Some(json!(4)), None).matches(&e));
		assert!(!Filter::range("count", None, Some(json!(3))).matches(&e));
		assert!(Filter::range(Field::Key, Some(json!("billing/")), Some(json!("billing0"))).matches(&e));
	}

	#[test]
	fn test_range_filter_mixed_types_never_match() {
		assert!(!Filter::range("count", Some(json!("a")), None).matches(&entity()));
	}

	#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
	struct Counter {
		name: String,
		count: u32,
	}

	impl Entity for Counter {
		fn entity_key(&self) -> String {
			self.name.clone()
		}
	}

	#[tokio::test]
	async fn test_typed_extension() {
		use futures::TryStreamExt;

		let store = MemoryEntityStore::new();
		let first = Counter {
			name: "a".to_string(),
			count: 1,
		};
		let second = Counter {
			name: "a".to_string(),
			count: 2,
		};

		assert!(store.get_or_insert_as("t", &first).await.unwrap().was_inserted());
		let existing = store.get_or_insert_as("t", &second).await.unwrap();
		assert!(!existing.was_inserted());
		assert_eq!(existing.into_inner(), first);

		store
			.insert_as(
				"t",
				&Counter {
					name: "b".to_string(),
					count: 5,
				},
			)
			.await
			.unwrap();
		assert_eq!(store.get_as::<Counter>("t", "b").await.unwrap().map(|c| c.count), Some(5));
		assert_eq!(store.get_as::<Counter>("t", "zz").await.unwrap(), None);

		let big: Vec<Counter> = store
			.query_as("t", 10, &[Filter::range("count", Some(json!(2)), None)])
			.await
			.unwrap()
			.try_collect()
			.await
			.unwrap();
		assert_eq!(big.len(), 1);
		assert_eq!(big[0].name, "b");
	}
}
