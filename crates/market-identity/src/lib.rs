//! Identity module for the marketplace engine.
//!
//! This module provides abstractions for resolving the current signed-in
//! user and their role. The lifecycle engine consults it for role-scoped
//! visibility and for operations performed "as the current user"; reactive
//! consumers can watch for sign-in and sign-out transitions.

use async_trait::async_trait;
use market_types::{ConfigSchema, CurrentUser, ImplementationRegistry};
use thiserror::Error;
use tokio::sync::watch;

/// Re-export implementations
pub mod implementations {
	pub mod fixed;
}

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
	/// Error that occurs when the provider cannot resolve the user.
	#[error("Resolution failed: {0}")]
	ResolutionFailed(String),
	/// Error that occurs when interacting with the identity implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for identity implementations.
///
/// This trait must be implemented by any identity provider that wants to
/// integrate with the engine. `None` means no user is signed in.
#[async_trait]
pub trait CurrentUserProvider: Send + Sync {
	/// Returns the configuration schema for this identity implementation.
	///
	/// The schema is used to validate TOML configuration before
	/// initializing the identity implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves the currently signed-in user, or `None` when signed out.
	async fn current_user(&self) -> Result<Option<CurrentUser>, IdentityError>;

	/// Returns a watch receiver that tracks sign-in state changes.
	///
	/// The receiver always holds the latest known user.
	fn observe_current_user(&self) -> watch::Receiver<Option<CurrentUser>>;
}

/// Type alias for identity factory functions.
///
/// This is the function signature that all identity implementations must
/// provide to create instances of their provider.
pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn CurrentUserProvider>, IdentityError>;

/// Registry trait for identity implementations.
pub trait IdentityRegistry: ImplementationRegistry<Factory = IdentityFactory> {}

/// Get all registered identity implementations.
///
/// Returns a vector of (name, factory) tuples for all available identity
/// implementations.
pub fn get_all_implementations() -> Vec<(&'static str, IdentityFactory)> {
	use implementations::fixed;

	vec![(fixed::Registry::NAME, fixed::Registry::factory())]
}

/// Service that manages identity resolution.
///
/// This struct provides a high-level interface for identity operations,
/// wrapping an underlying provider implementation.
pub struct IdentityService {
	/// The underlying identity implementation.
	implementation: Box<dyn CurrentUserProvider>,
}

impl IdentityService {
	/// Creates a new IdentityService with the specified implementation.
	pub fn new(implementation: Box<dyn CurrentUserProvider>) -> Self {
		Self { implementation }
	}

	/// Resolves the currently signed-in user, or `None` when signed out.
	pub async fn current_user(&self) -> Result<Option<CurrentUser>, IdentityError> {
		self.implementation.current_user().await
	}

	/// Returns a watch receiver tracking sign-in state changes.
	pub fn observe_current_user(&self) -> watch::Receiver<Option<CurrentUser>> {
		self.implementation.observe_current_user()
	}
}
