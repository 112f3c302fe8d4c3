//! Storage module for the marketplace engine.
//!
//! This module is the persistence gateway: it owns durable storage
//! exclusively. It provides document backends (where the bytes live),
//! a transactional [`Database`] over the three tables, typed per-entity
//! stores with live snapshot streams, and the schema migration registry
//! applied when a store is opened.

use async_trait::async_trait;
use market_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub mod database;
pub mod migrations;
pub mod stores;

pub use database::{CommitNotice, Database, Tables, TxTables};
pub use migrations::{Migration, MigrationRegistry, SCHEMA_VERSION};
pub use stores::{ApplicationStore, AssignmentStore, OrderStore};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested row is not present.
	#[error("Not found")]
	NotFound,
	/// Serialization/deserialization of the persisted document failed.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The storage backend failed.
	#[error("Backend error: {0}")]
	Backend(String),
	/// The store cannot be opened with the registered configuration,
	/// for example a gap in the migration chain. Fatal at startup, never
	/// retried.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for document backends.
///
/// A backend holds the single persisted document the database serializes
/// its tables into. Durability and atomicity of `save` are the backend's
/// responsibility; transactional semantics live above, in [`Database`].
#[async_trait]
pub trait DocumentBackend: Send + Sync {
	/// Loads the persisted document, or `None` when no document exists
	/// yet (a fresh store).
	async fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

	/// Persists the document. Must be all-or-nothing: a failed save
	/// leaves the previously persisted document intact.
	async fn save(&self, bytes: Vec<u8>) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for backend factory functions.
///
/// This is the function signature that all storage backends must provide
/// to create instances of their document backend.
pub type BackendFactory = fn(&toml::Value) -> Result<Box<dyn DocumentBackend>, StorageError>;

/// Registry trait for storage backends.
pub trait StorageRegistry: ImplementationRegistry<Factory = BackendFactory> {}

/// Get all registered storage backends.
///
/// Returns a vector of (name, factory) tuples for all available backends.
pub fn get_all_implementations() -> Vec<(&'static str, BackendFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}
