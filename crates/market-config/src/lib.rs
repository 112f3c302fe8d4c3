//! Configuration module for the marketplace engine.
//!
//! This module provides structures and utilities for managing engine
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the marketplace engine.
///
/// This structure contains all configuration sections required for the
/// engine to operate: lifecycle rules, the storage backend, and the
/// identity provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Lifecycle rules for order processing.
	#[serde(default)]
	pub engine: EngineConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the identity provider.
	pub identity: IdentityConfig,
}

/// Lifecycle rules for order processing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// How many open applications a loader may hold across active orders.
	/// Defaults to 3 if not specified.
	#[serde(default = "default_max_active_applications")]
	pub max_active_applications: u32,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_active_applications: default_max_active_applications(),
		}
	}
}

/// Returns the default open-application limit per loader.
fn default_max_active_applications() -> u32 {
	3
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the identity provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of identity implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).ok_or_else(|| {
			ConfigError::Parse("Malformed environment variable reference".into())
		})?;
		let var_name = cap
			.get(1)
			.ok_or_else(|| ConfigError::Parse("Malformed environment variable reference".into()))?
			.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let contents = tokio::fs::read_to_string(path).await?;
		contents.parse()
	}

	/// Validates the configuration to ensure all required fields are
	/// properly set.
	///
	/// - Ensures a storage primary is specified and configured
	/// - Ensures an identity primary is specified and configured
	/// - Validates lifecycle rule bounds
	fn validate(&self) -> Result<(), ConfigError> {
		// Validate engine config
		if self.engine.max_active_applications == 0 {
			return Err(ConfigError::Validation(
				"max_active_applications must be at least 1".into(),
			));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Validate identity config
		if self.identity.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one identity implementation must be configured".into(),
			));
		}
		if self.identity.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Identity primary implementation cannot be empty".into(),
			));
		}
		if !self
			.identity
			.implementations
			.contains_key(&self.identity.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary identity '{}' not found in implementations",
				self.identity.primary
			)));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is
/// automatically validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
