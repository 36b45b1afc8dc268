//! File-backed implementation of EntityStore.
//!
//! Each table is one JSON document (`<root>/<table>.json`) mapping keys to
//! bodies. Every read-modify-write of a table holds an exclusive OS lock on
//! `<root>/<table>.lock`, so handles opened separately on the same directory,
//! in this process or another, serialize their writes. New contents are
//! written to a uniquely named temp file in `root` and renamed over the table
//! file, so readers never observe a partial document.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use futures::StreamExt;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use super::{EntityStore, EntityStream, Filter, GetOrInsert, RawEntity, StoreError, select};

type Table = BTreeMap<String, Value>;

fn storage(e: impl std::fmt::Display) -> StoreError {
	StoreError::Storage(e.to_string())
}

/// EntityStore persisted as JSON documents in a directory.
#[derive(Debug)]
pub struct FileEntityStore {
	root: PathBuf,
	/// Keeps this handle's writers from occupying blocking threads while they
	/// wait on the table lock.
	write_lock: Mutex<()>,
}

impl FileEntityStore {
	/// Open a store rooted at `root`, creating the directory if needed.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let root = root.into();
		fs_err::create_dir_all(&root).map_err(storage)?;
		Ok(Self {
			root,
			write_lock: Mutex::new(()),
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn check_table(table: &str) -> Result<(), StoreError> {
		let valid = !table.is_empty()
			&& table
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
		if !valid {
			return Err(StoreError::Storage(format!("invalid table name '{}'", table)));
		}
		Ok(())
	}

	fn table_path(&self, table: &str) -> Result<PathBuf, StoreError> {
		Self::check_table(table)?;
		Ok(self.root.join(format!("{}.json", table)))
	}

	async fn load(&self, table: &str) -> Result<Table, StoreError> {
		let path = self.table_path(table)?;
		match fs_err::tokio::read_to_string(&path).await {
			Ok(contents) => parse_table(&contents),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
			Err(e) => Err(storage(e)),
		}
	}

	/// Run `change` against the current table contents under the table lock.
	///
	/// `change` returns its result and whether the table must be written back.
	async fn modify<T, F>(&self, table: &str, change: F) -> Result<T, StoreError>
	where
		T: Send + 'static,
		F: FnOnce(&mut Table) -> Result<(T, bool), StoreError> + Send + 'static,
	{
		let path = self.table_path(table)?;
		let lock_path = self.root.join(format!("{}.lock", table));
		let root = self.root.clone();
		let table = table.to_string();

		let _guard = self.write_lock.lock().await;
		tokio::task::spawn_blocking(move || {
			let lock = fs_err::OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(&lock_path)
				.map_err(storage)?;
			// Released when `lock` is dropped at the end of this closure
			lock.file().lock_exclusive().map_err(storage)?;

			let mut rows = match fs_err::read_to_string(&path) {
				Ok(contents) => parse_table(&contents)?,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
				Err(e) => return Err(storage(e)),
			};
			let (result, dirty) = change(&mut rows)?;
			if dirty {
				write_table(&root, &path, &rows)?;
				debug!(target: "job_index", table = %table, rows = rows.len(), "table persisted");
			}
			Ok(result)
		})
		.await
		.map_err(storage)?
	}
}

fn parse_table(contents: &str) -> Result<Table, StoreError> {
	serde_json::from_str(contents).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_table(root: &Path, path: &Path, rows: &Table) -> Result<(), StoreError> {
	let contents = serde_json::to_vec_pretty(rows).map_err(|e| StoreError::Serialization(e.to_string()))?;
	let mut tmp = NamedTempFile::new_in(root).map_err(storage)?;
	tmp.write_all(&contents).map_err(storage)?;
	tmp.as_file().sync_all().map_err(storage)?;
	tmp.persist(path).map_err(storage)?;
	Ok(())
}

#[async_trait]
impl EntityStore for FileEntityStore {
	async fn get_or_insert(&self, table: &str, entity: RawEntity) -> Result<GetOrInsert<RawEntity>, StoreError> {
		self.modify(table, move |rows| {
			if let Some(existing) = rows.get(&entity.key) {
				let existing = RawEntity::new(entity.key.clone(), existing.clone());
				return Ok((GetOrInsert::Existing(existing), false));
			}
			rows.insert(entity.key.clone(), entity.body.clone());
			Ok((GetOrInsert::Inserted(entity), true))
		})
		.await
	}

	async fn insert_entity(&self, table: &str, entity: RawEntity) -> Result<(), StoreError> {
		let table_name = table.to_string();
		self.modify(table, move |rows| {
			if rows.contains_key(&entity.key) {
				return Err(StoreError::DuplicateKey {
					table: table_name,
					key: entity.key,
				});
			}
			rows.insert(entity.key, entity.body);
			Ok(((), true))
		})
		.await
	}

	async fn query(&self, table: &str, limit: usize, filters: &[Filter]) -> Result<EntityStream, StoreError> {
		let rows = self.load(table).await?;
		let selected = select(
			rows.into_iter().map(|(k, v)| RawEntity::new(k, v)),
			limit,
			filters,
		);
		Ok(futures::stream::iter(selected.into_iter().map(Ok)).boxed())
	}

	async fn get(&self, table: &str, key: &str) -> Result<Option<RawEntity>, StoreError> {
		let mut rows = self.load(table).await?;
		Ok(rows.remove(key).map(|body| RawEntity::new(key, body)))
	}

	async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
		let table_name = table.to_string();
		let key = key.to_string();
		self.modify(table, move |rows| {
			if rows.remove(&key).is_none() {
				return Err(StoreError::NotFound { table: table_name, key });
			}
			Ok(((), true))
		})
		.await
	}
}
