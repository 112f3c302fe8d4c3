//! File-based document backend implementation for the marketplace engine.
//!
//! This module provides a file-backed implementation of the DocumentBackend
//! trait. The document lives in a single file; saves go through a temporary
//! sibling file and an atomic rename so a crash mid-write never corrupts
//! the previously persisted document.

use crate::{DocumentBackend, StorageError};
use async_trait::async_trait;
use fs2::FileExt;
use market_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::fs::File;
use std::path::PathBuf;
use tokio::fs;

/// File-backed document backend.
///
/// Holds an exclusive advisory lock on a `.lock` sibling for its whole
/// lifetime, so two processes cannot open the same store concurrently.
pub struct FileBackend {
	/// Path of the persisted document.
	path: PathBuf,
	/// Lock file handle. The advisory lock is released when this is
	/// dropped.
	_lock: File,
}

impl FileBackend {
	/// Creates a new FileBackend persisting to `path`.
	///
	/// Creates parent directories as needed and takes the exclusive lock.
	/// Fails with `Backend` when another process already holds the lock.
	pub fn new(path: PathBuf) -> Result<Self, StorageError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)
					.map_err(|e| StorageError::Backend(format!("Failed to create {}: {}", parent.display(), e)))?;
			}
		}

		let mut lock_path = path.clone().into_os_string();
		lock_path.push(".lock");
		let lock = File::create(&lock_path)
			.map_err(|e| StorageError::Backend(format!("Failed to create lock file: {}", e)))?;
		lock.try_lock_exclusive().map_err(|e| {
			StorageError::Backend(format!(
				"Store at {} is locked by another process: {}",
				path.display(),
				e
			))
		})?;

		Ok(Self { path, _lock: lock })
	}

	fn temp_path(&self) -> PathBuf {
		let mut os = self.path.clone().into_os_string();
		os.push(".tmp");
		PathBuf::from(os)
	}
}

#[async_trait]
impl DocumentBackend for FileBackend {
	async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(&self.path).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(format!(
				"Failed to read {}: {}",
				self.path.display(),
				e
			))),
		}
	}

	async fn save(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
		let temp = self.temp_path();
		fs::write(&temp, &bytes).await.map_err(|e| {
			StorageError::Backend(format!("Failed to write {}: {}", temp.display(), e))
		})?;
		// Atomic on the same filesystem.
		fs::rename(&temp, &self.path).await.map_err(|e| {
			StorageError::Backend(format!(
				"Failed to move {} into place: {}",
				temp.display(),
				e
			))
		})
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileBackendSchema)
	}
}

/// Configuration schema for FileBackend.
pub struct FileBackendSchema;

impl ConfigSchema for FileBackendSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![Field::new("path", FieldType::String)],
			// Optional fields
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file backend from configuration.
///
/// Configuration parameters:
/// - `path`: Where the document file lives (required)
pub fn create_backend(config: &toml::Value) -> Result<Box<dyn DocumentBackend>, StorageError> {
	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("Missing 'path' in file backend config".into()))?;

	Ok(Box::new(FileBackend::new(PathBuf::from(path))?))
}

/// Registry entry for the file backend.
pub struct Registry;

impl market_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
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
	async fn test_fresh_store_loads_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path().join("store.json")).unwrap();
		assert!(backend.load().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_save_then_load_roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.json");
		let doc = b"{\"schemaVersion\":3}".to_vec();

		{
			let backend = FileBackend::new(path.clone()).unwrap();
			backend.save(doc.clone()).await.unwrap();
		}

		// Reopen after the first handle released its lock.
		let backend = FileBackend::new(path).unwrap();
		assert_eq!(backend.load().await.unwrap(), Some(doc));
	}

	#[tokio::test]
	async fn test_creates_missing_parent_directories() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested/deeper/store.json");
		let backend = FileBackend::new(path.clone()).unwrap();
		backend.save(b"x".to_vec()).await.unwrap();
		assert!(path.exists());
	}

	#[tokio::test]
	async fn test_second_open_is_rejected_while_locked() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.json");
		let _first = FileBackend::new(path.clone()).unwrap();
		assert!(matches!(
			FileBackend::new(path),
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_factory_requires_path() {
		let config: toml::Value = toml::from_str("").unwrap();
		assert!(matches!(
			create_backend(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
