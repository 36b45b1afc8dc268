//! In-memory resources that record writes, for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{ResourceAddress, ResourceError, ResourceReader, ResourceWriter};

/// Reader/writer pair over in-memory content.
///
/// Every call to `write` is recorded in order, so tests can assert both the
/// number of writes and their payloads.
#[derive(Debug, Default)]
pub struct RecordingResources {
	content: Mutex<HashMap<ResourceAddress, Bytes>>,
	writes: Mutex<Vec<(ResourceAddress, Bytes)>>,
}

impl RecordingResources {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed content served by `read`
	pub fn put(&self, address: ResourceAddress, content: impl Into<Bytes>) {
		self.content.lock().insert(address, content.into());
	}

	/// All writes so far, in call order
	pub fn writes(&self) -> Vec<(ResourceAddress, Bytes)> {
		self.writes.lock().clone()
	}
}

#[async_trait]
impl ResourceReader for RecordingResources {
	async fn read(&self, address: &ResourceAddress) -> Result<Option<Bytes>, ResourceError> {
		Ok(self.content.lock().get(address).cloned())
	}
}

#[async_trait]
impl ResourceWriter for RecordingResources {
	async fn write(&self, address: &ResourceAddress, payload: Bytes) -> Result<(), ResourceError> {
		self.writes.lock().push((address.clone(), payload.clone()));
		self.content.lock().insert(address.clone(), payload);
		Ok(())
	}
}
