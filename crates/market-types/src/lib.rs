//! Common types module for the crew marketplace engine.
//!
//! This module defines the core data types and structures shared by every
//! component of the marketplace: the order aggregate and its owned
//! collections, user identity types, table identifiers for the persistence
//! layer, and the configuration validation framework.

/// Order aggregate, applications, assignments and their status enums.
pub mod order;
/// Implementation registry trait for self-registering backends.
pub mod registry;
/// Table identifiers for the persistence layer.
pub mod storage;
/// Current user identity and role types.
pub mod user;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use user::*;
pub use validation::*;
