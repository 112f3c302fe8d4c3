//! Fixed identity implementation for the marketplace engine.
//!
//! This module provides an identity provider whose user comes from static
//! configuration. It is the provider used by single-operator deployments
//! and by tests; sign-out is still observable through the watch channel.

use crate::{CurrentUserProvider, IdentityError};
use async_trait::async_trait;
use market_types::{ConfigSchema, CurrentUser, Field, FieldType, Schema, UserRole, ValidationError};
use tokio::sync::watch;

/// Identity provider backed by static configuration.
pub struct FixedIdentity {
	sender: watch::Sender<Option<CurrentUser>>,
}

impl FixedIdentity {
	/// Creates a provider already signed in as the given user.
	pub fn new(user: CurrentUser) -> Self {
		let (sender, _) = watch::channel(Some(user));
		Self { sender }
	}

	/// Creates a provider with nobody signed in.
	pub fn signed_out() -> Self {
		let (sender, _) = watch::channel(None);
		Self { sender }
	}

	/// Signs the given user in, notifying watchers.
	pub fn sign_in(&self, user: CurrentUser) {
		self.sender.send_replace(Some(user));
	}

	/// Signs the current user out, notifying watchers.
	pub fn sign_out(&self) {
		self.sender.send_replace(None);
	}
}

#[async_trait]
impl CurrentUserProvider for FixedIdentity {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixedIdentitySchema)
	}

	async fn current_user(&self) -> Result<Option<CurrentUser>, IdentityError> {
		Ok(self.sender.borrow().clone())
	}

	fn observe_current_user(&self) -> watch::Receiver<Option<CurrentUser>> {
		self.sender.subscribe()
	}
}

/// Configuration schema for FixedIdentity.
pub struct FixedIdentitySchema;

impl ConfigSchema for FixedIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new(
					"user_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("role", FieldType::String).with_validator(|value| {
					let role = value.as_str().unwrap_or_default();
					role.parse::<UserRole>()
						.map(|_| ())
						.map_err(|_| "must be 'dispatcher' or 'loader'".to_string())
				}),
			],
			// Optional fields
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a fixed identity provider from configuration.
///
/// Configuration parameters:
/// - `user_id`: Identifier of the signed-in user (required)
/// - `role`: "dispatcher" or "loader" (required)
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn CurrentUserProvider>, IdentityError> {
	let user_id = config
		.get("user_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| IdentityError::Implementation("Missing 'user_id' in config".into()))?;

	let role = config
		.get("role")
		.and_then(|v| v.as_str())
		.ok_or_else(|| IdentityError::Implementation("Missing 'role' in config".into()))?
		.parse::<UserRole>()
		.map_err(|e| IdentityError::Implementation(e))?;

	Ok(Box::new(FixedIdentity::new(CurrentUser {
		id: user_id,
		role,
	})))
}

/// Registry entry for the fixed identity provider.
pub struct Registry;

impl market_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "fixed";
	type Factory = crate::IdentityFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::IdentityRegistry for Registry {}
