//! In-memory document backend implementation for the marketplace engine.
//!
//! This module provides a memory-based implementation of the DocumentBackend
//! trait, useful for testing and development scenarios where persistence is
//! not required.

use crate::{DocumentBackend, StorageError};
use async_trait::async_trait;
use market_types::{ConfigSchema, Schema, ValidationError};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory document backend.
///
/// Holds the serialized document in a shared buffer, providing fast access
/// but no persistence across restarts. [`share`](Self::share) hands out a
/// second handle over the same buffer, which lets tests reopen a "fresh"
/// database against the bytes a previous instance saved.
pub struct MemoryBackend {
	/// The persisted document, `None` until the first save.
	buffer: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemoryBackend {
	/// Creates a new MemoryBackend with an empty buffer.
	pub fn new() -> Self {
		Self {
			buffer: Arc::new(RwLock::new(None)),
		}
	}

	/// Returns another handle over the same underlying buffer.
	pub fn share(&self) -> Self {
		Self {
			buffer: self.buffer.clone(),
		}
	}
}

impl Default for MemoryBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
	async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
		let buffer = self.buffer.read().await;
		Ok(buffer.clone())
	}

	async fn save(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
		let mut buffer = self.buffer.write().await;
		*buffer = Some(bytes);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryBackendSchema)
	}
}

/// Configuration schema for MemoryBackend.
pub struct MemoryBackendSchema;

impl ConfigSchema for MemoryBackendSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory backend from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_backend(_config: &toml::Value) -> Result<Box<dyn DocumentBackend>, StorageError> {
	Ok(Box::new(MemoryBackend::new()))
}

/// Registry entry for the memory backend.
pub struct Registry;

impl market_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::BackendFactory;

	fn factory() -> Self::Factory {
		create_backend
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fresh_backend_is_empty() {
		let backend = MemoryBackend::new();
		assert!(backend.load().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_save_then_load() {
		let backend = MemoryBackend::new();
		let doc = b"{\"schemaVersion\":3}".to_vec();
		backend.save(doc.clone()).await.unwrap();
		assert_eq!(backend.load().await.unwrap(), Some(doc));
	}

	#[tokio::test]
	async fn test_shared_handles_see_the_same_document() {
		let backend = MemoryBackend::new();
		let other = backend.share();

		backend.save(b"one".to_vec()).await.unwrap();
		assert_eq!(other.load().await.unwrap(), Some(b"one".to_vec()));

		other.save(b"two".to_vec()).await.unwrap();
		assert_eq!(backend.load().await.unwrap(), Some(b"two".to_vec()));
	}
}
