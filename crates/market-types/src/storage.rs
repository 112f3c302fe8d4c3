//! Storage-related types for the marketplace engine.

use std::str::FromStr;

/// Identifiers for the persisted tables.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTable {
	/// Flat order rows.
	Orders,
	/// Loader applications, keyed by (order, loader).
	Applications,
	/// Worker assignments, keyed by (order, loader).
	Assignments,
}

impl StoreTable {
	/// Returns the string representation of the table identifier, which is
	/// also the key used in the persisted document.
	pub fn as_str(&self) -> &'static str {
		match self {
			StoreTable::Orders => "orders",
			StoreTable::Applications => "applications",
			StoreTable::Assignments => "assignments",
		}
	}

	/// Returns an iterator over all StoreTable variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::Applications, Self::Assignments].into_iter()
	}
}

impl FromStr for StoreTable {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"applications" => Ok(Self::Applications),
			"assignments" => Ok(Self::Assignments),
			_ => Err(()),
		}
	}
}

impl From<StoreTable> for &'static str {
	fn from(table: StoreTable) -> Self {
		table.as_str()
	}
}
