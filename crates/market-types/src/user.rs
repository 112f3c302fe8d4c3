//! Current user identity types for the marketplace engine.
//!
//! The engine never authenticates anyone; these types are what it reads
//! from the identity capability to drive visibility filtering and to stamp
//! `created_by_user_id` / `loader_id` on writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a signed-in user.
///
/// A tagged variant rather than a runtime type check: read-side projections
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserRole {
	/// Posts orders and manages their staffing.
	Dispatcher,
	/// Applies to and performs orders.
	Loader,
}

impl fmt::Display for UserRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			UserRole::Dispatcher => write!(f, "dispatcher"),
			UserRole::Loader => write!(f, "loader"),
		}
	}
}

impl FromStr for UserRole {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"dispatcher" => Ok(UserRole::Dispatcher),
			"loader" => Ok(UserRole::Loader),
			other => Err(format!("Unknown role: {}", other)),
		}
	}
}

/// The identity the engine sees for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
	pub id: i64,
	pub role: UserRole,
}
